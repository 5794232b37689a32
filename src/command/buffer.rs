//! Append-only command buffer
//!
//! The script thread appends commands; the host drains them in append order.
//! The buffer itself is not synchronized: the owning execution context
//! guarantees that append and drain never overlap.
//!
//! Batching: the first append (with `request_update`) after a reset raises a
//! flush request; every later append in the same window rides along with it.

use super::item::Command;
use crate::error::{BridgeError, Result};
use log::{debug, error, trace};

/// Result of a single append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Sequence number of the appended command (1-based, never reused)
    pub seq: u64,
    /// Whether this append opened a batching window and the host must be woken
    pub flush_requested: bool,
}

/// Commands removed from the buffer by one drain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBatch {
    first_seq: u64,
    commands: Vec<Command>,
}

impl CommandBatch {
    pub(crate) fn new(first_seq: u64, commands: Vec<Command>) -> Self {
        CommandBatch {
            first_seq,
            commands,
        }
    }

    /// Empty batch positioned after `last_seq`
    pub fn empty_after(last_seq: u64) -> Self {
        CommandBatch {
            first_seq: last_seq + 1,
            commands: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Sequence number of the first command in the batch
    #[inline]
    pub fn first_seq(&self) -> u64 {
        self.first_seq
    }

    /// Sequence number of the last command in the batch; for an empty batch
    /// this is the sequence number just before it
    #[inline]
    pub fn last_seq(&self) -> u64 {
        (self.first_seq + self.commands.len() as u64).saturating_sub(1)
    }

    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

impl Default for CommandBatch {
    /// Empty batch before any command was appended
    fn default() -> Self {
        CommandBatch::empty_after(0)
    }
}

impl IntoIterator for CommandBatch {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommandBatch {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// Buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Commands appended over the buffer's lifetime
    pub appended: u64,
    /// Non-empty drains
    pub drains: u64,
    /// Capacity doublings
    pub growths: u64,
    /// Flush requests raised
    pub flush_requests: u64,
}

/// Growable contiguous command buffer
pub struct CommandBuffer {
    items: Vec<Command>,
    /// Logical capacity; doubles when full
    capacity: usize,
    /// Growth beyond this many items is treated as allocation failure
    limit: Option<usize>,
    update_batched: bool,
    /// Sequence number of the last command handed out by `drain`
    drained_through: u64,
    stats: BufferStats,
}

impl CommandBuffer {
    /// Default initial capacity
    pub const DEFAULT_CAPACITY: usize = 2048;

    /// Create a buffer with room for `capacity` commands
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_limit(capacity, None)
    }

    /// Create a buffer whose growth stops at `limit` commands
    pub fn with_limit(capacity: usize, limit: Option<usize>) -> Result<Self> {
        let capacity = capacity.max(1);
        if limit.is_some_and(|limit| capacity > limit) {
            return Err(BridgeError::AllocationFailure {
                requested: capacity,
            });
        }
        let mut items = Vec::new();
        items
            .try_reserve_exact(capacity)
            .map_err(|_| BridgeError::AllocationFailure {
                requested: capacity,
            })?;
        Ok(CommandBuffer {
            items,
            capacity,
            limit,
            update_batched: false,
            drained_through: 0,
            stats: BufferStats::default(),
        })
    }

    /// Append a command
    ///
    /// Fails only when storage cannot grow. The caller must treat that as
    /// fatal: a dropped mutation leaves the host tree inconsistent.
    pub fn append(&mut self, item: Command, request_update: bool) -> Result<Appended> {
        if self.items.len() >= self.capacity {
            self.grow()?;
        }

        trace!("append {}", item);
        self.items.push(item);
        self.stats.appended += 1;

        let flush_requested = request_update && !self.update_batched;
        if flush_requested {
            self.update_batched = true;
            self.stats.flush_requests += 1;
        }

        Ok(Appended {
            seq: self.stats.appended,
            flush_requested,
        })
    }

    fn grow(&mut self) -> Result<()> {
        let requested = self.capacity.checked_mul(2).ok_or(BridgeError::AllocationFailure {
            requested: usize::MAX,
        })?;
        if self.limit.is_some_and(|limit| requested > limit) {
            error!(
                "command buffer limit reached ({} items), cannot grow to {}",
                self.capacity, requested
            );
            return Err(BridgeError::AllocationFailure { requested });
        }
        self.items
            .try_reserve_exact(requested - self.items.len())
            .map_err(|_| {
                error!("command buffer allocation failed for {} items", requested);
                BridgeError::AllocationFailure { requested }
            })?;

        debug!("command buffer grew {} -> {}", self.capacity, requested);
        self.capacity = requested;
        self.stats.growths += 1;
        Ok(())
    }

    /// Take every command appended since the last drain, in append order
    ///
    /// Storage keeps its capacity. The batching flag is untouched; call
    /// [`reset`](Self::reset) once the batch has been applied.
    pub fn drain(&mut self) -> CommandBatch {
        if self.items.is_empty() {
            return CommandBatch::empty_after(self.drained_through);
        }

        let first_seq = self.drained_through + 1;
        let commands: Vec<Command> = self.items.drain(..).collect();
        self.drained_through += commands.len() as u64;
        self.stats.drains += 1;
        trace!(
            "drained {} commands (#{}..=#{})",
            commands.len(),
            first_seq,
            self.drained_through
        );
        CommandBatch::new(first_seq, commands)
    }

    /// Close the current batching window
    ///
    /// Returns `true` if commands were appended after the last drain: the
    /// window is reopened for them and the host must be woken again.
    pub fn reset(&mut self) -> bool {
        self.update_batched = false;
        if self.items.is_empty() {
            return false;
        }
        self.update_batched = true;
        self.stats.flush_requests += 1;
        debug!(
            "{} commands arrived during apply, requesting another flush",
            self.items.len()
        );
        true
    }

    /// Commands waiting to be drained
    #[inline]
    pub fn data(&self) -> &[Command] {
        &self.items
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_update_batched(&self) -> bool {
        self.update_batched
    }

    /// Sequence number of the last appended command
    #[inline]
    pub fn last_seq(&self) -> u64 {
        self.stats.appended
    }

    /// Sequence number of the last drained command
    #[inline]
    pub fn drained_through(&self) -> u64 {
        self.drained_through
    }

    #[inline]
    pub fn stats(&self) -> BufferStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use proptest::prelude::*;

    fn cmd(id: i64) -> Command {
        Command::set_property(id, "k", &id.to_string())
    }

    #[test]
    fn test_append_then_drain() {
        let mut buf = CommandBuffer::new(8).unwrap();
        for id in 0..3 {
            buf.append(cmd(id), true).unwrap();
        }
        assert_eq!(buf.len(), 3);

        let batch = buf.drain();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.first_seq(), 1);
        assert_eq!(batch.last_seq(), 3);
        let ids: Vec<_> = batch.iter().map(Command::target_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);

        let again = buf.drain();
        assert!(again.is_empty());
        assert_eq!(again.last_seq(), 3);
    }

    #[test]
    fn test_growth_preserves_entries() {
        let mut buf = CommandBuffer::new(4).unwrap();
        let expected: Vec<_> = (0..50).map(cmd).collect();
        for c in &expected {
            buf.append(c.clone(), false).unwrap();
        }
        // 4 -> 8 -> 16 -> 32 -> 64
        assert_eq!(buf.capacity(), 64);
        assert_eq!(buf.stats().growths, 4);
        assert_eq!(buf.data(), expected.as_slice());
        assert_eq!(buf.drain().into_commands(), expected);
    }

    #[test]
    fn test_flush_requested_once_per_window() {
        for n in [1usize, 2, 1000] {
            let mut buf = CommandBuffer::new(16).unwrap();
            let requests = (0..n)
                .map(|i| buf.append(cmd(i as i64), true).unwrap())
                .filter(|a| a.flush_requested)
                .count();
            assert_eq!(requests, 1, "{} appends", n);
            assert!(buf.is_update_batched());

            assert_eq!(buf.drain().len(), n);
            assert!(!buf.reset());
            assert!(!buf.is_update_batched());

            assert!(buf.append(cmd(0), true).unwrap().flush_requested);
        }
    }

    #[test]
    fn test_append_without_update_request() {
        let mut buf = CommandBuffer::new(4).unwrap();
        assert!(!buf.append(cmd(1), false).unwrap().flush_requested);
        assert!(!buf.is_update_batched());
        assert!(buf.append(cmd(2), true).unwrap().flush_requested);
    }

    #[test]
    fn test_reset_reopens_window_for_late_appends() {
        let mut buf = CommandBuffer::new(4).unwrap();
        buf.append(cmd(1), true).unwrap();
        let batch = buf.drain();

        // Appended while the host applies `batch`
        assert!(!buf.append(cmd(2), true).unwrap().flush_requested);
        assert_eq!(batch.len(), 1);

        assert!(buf.reset());
        assert!(buf.is_update_batched());
        let next = buf.drain();
        assert_eq!(next.first_seq(), 2);
        assert_eq!(next.commands()[0].target_id(), 2);
        assert_eq!(buf.stats().flush_requests, 2);
    }

    #[test]
    fn test_limit_is_allocation_failure() {
        let mut buf = CommandBuffer::with_limit(2, Some(2)).unwrap();
        buf.append(cmd(1), true).unwrap();
        buf.append(cmd(2), true).unwrap();
        let err = buf.append(cmd(3), true).unwrap_err();
        assert_eq!(err, BridgeError::AllocationFailure { requested: 4 });
        assert_eq!(buf.len(), 2);

        assert!(CommandBuffer::with_limit(8, Some(4)).is_err());
    }

    #[test]
    fn test_empty_batch_sequence_numbers() {
        let batch = CommandBatch::default();
        assert!(batch.is_empty());
        assert_eq!(batch.first_seq(), 1);
        assert_eq!(batch.last_seq(), 0);

        let mut buf = CommandBuffer::new(4).unwrap();
        buf.append(cmd(1), true).unwrap();
        buf.append(cmd(2), true).unwrap();
        assert_eq!(buf.drain().last_seq(), 2);
        let empty = buf.drain();
        assert_eq!((empty.first_seq(), empty.last_seq()), (3, 2));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buf = CommandBuffer::new(0).unwrap();
        assert_eq!(buf.capacity(), 1);
        buf.append(Command::new(CommandKind::ClearStyle, 1), true).unwrap();
        buf.append(Command::new(CommandKind::ClearStyle, 2), true).unwrap();
        assert_eq!(buf.capacity(), 2);
    }

    proptest! {
        #[test]
        fn prop_drain_returns_all_in_order(ids in proptest::collection::vec(any::<i64>(), 0..300)) {
            let mut buf = CommandBuffer::new(4).unwrap();
            for id in &ids {
                buf.append(cmd(*id), true).unwrap();
            }
            let drained: Vec<_> = buf.drain().iter().map(Command::target_id).collect();
            prop_assert_eq!(drained, ids);
            prop_assert!(buf.drain().is_empty());
        }

        #[test]
        fn prop_one_flush_request_per_cycle(
            cycles in proptest::collection::vec(1usize..64, 1..10)
        ) {
            let mut buf = CommandBuffer::new(4).unwrap();
            for n in &cycles {
                let mut requests = 0;
                for i in 0..*n {
                    if buf.append(cmd(i as i64), true).unwrap().flush_requested {
                        requests += 1;
                    }
                }
                prop_assert_eq!(requests, 1);
                prop_assert_eq!(buf.drain().len(), *n);
                prop_assert!(!buf.reset());
            }
            prop_assert_eq!(buf.stats().flush_requests, cycles.len() as u64);
        }
    }
}
