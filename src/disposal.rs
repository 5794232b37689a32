//! Deferred release of native objects
//!
//! When a script object dies, its native counterpart may still be referenced
//! by commands the host has not applied yet. The release is therefore
//! recorded here, stamped with the sequence number of the last command
//! appended at that moment, and only executed once the host has acknowledged
//! every command up to that stamp.

use crate::error::{BridgeError, Result};
use crate::native::{
    release_native, NativeHandle, NativeKind, NativeObject, ReleaseCounts, SlotTable,
};
use log::{error, trace};
use std::collections::HashSet;

/// A pending release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisposalRecord {
    pub handle: NativeHandle,
    pub kind: NativeKind,
    /// Last command sequence number appended before the registration
    pub registered_after: u64,
}

/// Outcome of a disposal drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisposalReport {
    pub released: usize,
    /// Records whose handle was already gone (double registration)
    pub stale: usize,
}

/// Queue of pending releases, in registration order
#[derive(Default)]
pub struct DisposalQueue {
    records: Vec<DisposalRecord>,
    /// Handles in `records`
    queued: HashSet<NativeHandle>,
    counts: ReleaseCounts,
}

impl DisposalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a release; nothing is freed yet
    ///
    /// Returns `false` if `handle` is already queued.
    pub fn register(
        &mut self,
        handle: NativeHandle,
        kind: NativeKind,
        registered_after: u64,
    ) -> bool {
        if !self.queued.insert(handle) {
            return false;
        }
        debug_assert!(
            self.records
                .last()
                .is_none_or(|last| last.registered_after <= registered_after),
            "disposal stamps must be monotonic"
        );
        trace!("disposal of {} {} after #{}", kind, handle, registered_after);
        self.records.push(DisposalRecord {
            handle,
            kind,
            registered_after,
        });
        true
    }

    /// Whether a release of `handle` is pending
    #[inline]
    pub fn contains(&self, handle: NativeHandle) -> bool {
        self.queued.contains(&handle)
    }

    /// Fail if any pending record still waits on unacknowledged commands
    pub fn check_order(&self, acknowledged: u64) -> Result<()> {
        match self
            .records
            .iter()
            .find(|record| record.registered_after > acknowledged)
        {
            Some(record) => {
                let err = BridgeError::OrderingViolation {
                    handle: record.handle,
                    registered_after: record.registered_after,
                    acknowledged,
                };
                error!("{}", err);
                #[cfg(feature = "strict-ordering")]
                panic!("{}", err);
                #[cfg(not(feature = "strict-ordering"))]
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Execute every pending release in registration order and clear the queue
    ///
    /// `acknowledged` is the last command sequence number the host has
    /// applied. If any record is newer than that, nothing is released and an
    /// ordering violation is returned.
    pub fn drain(
        &mut self,
        slots: &mut SlotTable<NativeObject>,
        acknowledged: u64,
    ) -> Result<DisposalReport> {
        self.check_order(acknowledged)?;
        let records = std::mem::take(&mut self.records);
        Ok(self.release_all(slots, records))
    }

    /// Execute only the releases whose commands have been acknowledged
    ///
    /// Records newer than `acknowledged` stay queued for a later round.
    pub fn release_acknowledged(
        &mut self,
        slots: &mut SlotTable<NativeObject>,
        acknowledged: u64,
    ) -> DisposalReport {
        let ready = self
            .records
            .iter()
            .take_while(|record| record.registered_after <= acknowledged)
            .count();
        let records: Vec<_> = self.records.drain(..ready).collect();
        self.release_all(slots, records)
    }

    fn release_all(
        &mut self,
        slots: &mut SlotTable<NativeObject>,
        records: Vec<DisposalRecord>,
    ) -> DisposalReport {
        let mut report = DisposalReport::default();
        for record in records {
            self.queued.remove(&record.handle);
            match release_native(slots, record.handle, record.kind, &mut self.counts) {
                Ok(()) => report.released += 1,
                Err(err) => {
                    error!("disposal of {} {}: {}", record.kind, record.handle, err);
                    report.stale += 1;
                }
            }
        }
        report
    }

    #[inline]
    pub fn pending(&self) -> &[DisposalRecord] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Releases executed so far, per kind
    #[inline]
    pub fn released(&self) -> ReleaseCounts {
        self.counts
    }
}
