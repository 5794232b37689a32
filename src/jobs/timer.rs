//! Active timer list of a context
//!
//! Tasks created by `setTimeout` / `setInterval`. The coordinator only keeps
//! the bookkeeping; the host scheduler decides when a timer elapses and asks
//! the owning context to fire it.

use super::registry::{job_handle, HandleRegistry};
use super::ScriptCallback;
use log::{debug, trace};

job_handle!(
    /// Handle of a scheduled timer
    TimerId,
    "timer"
);

struct TimerEntry {
    interval_ms: u64,
    repeating: bool,
    due_at: u64,
    /// `None` while the callback is running
    callback: Option<ScriptCallback>,
    fire_count: u64,
}

/// Snapshot of a pending timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: TimerId,
    pub due_at: u64,
    pub interval_ms: u64,
    pub repeating: bool,
}

/// Per-context timer registry
#[derive(Default)]
pub struct TimerCoordinator {
    timers: HandleRegistry<TimerId, TimerEntry>,
}

impl TimerCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a timer due `interval_ms` after `now_ms`
    pub fn schedule(
        &mut self,
        now_ms: u64,
        interval_ms: u64,
        repeating: bool,
        callback: ScriptCallback,
    ) -> TimerId {
        let id = self.timers.insert(TimerEntry {
            interval_ms,
            repeating,
            due_at: now_ms.saturating_add(interval_ms),
            callback: Some(callback),
            fire_count: 0,
        });
        trace!(
            "schedule {} interval_ms={} repeating={}",
            id, interval_ms, repeating
        );
        id
    }

    /// Cancel a timer; unknown or already fired handles are ignored
    ///
    /// Returns whether a pending timer was removed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let removed = self.timers.remove(id).is_some();
        if !removed {
            debug!("cancel of inactive {} ignored", id);
        }
        removed
    }

    /// Take the callback of `id` out for invocation
    ///
    /// A one-shot timer is removed before its callback runs, so a failing
    /// callback can never leave it armed. A repeating timer stays registered
    /// and is re-armed for `fired_at + interval`. Returns `None` for unknown
    /// handles and for a repeating timer whose callback is already running.
    pub fn begin_fire(&mut self, id: TimerId, fired_at: u64) -> Option<ScriptCallback> {
        let entry = self.timers.get_mut(id)?;
        if !entry.repeating {
            return self.timers.remove(id).and_then(|entry| entry.callback);
        }
        let callback = entry.callback.take()?;
        entry.fire_count += 1;
        entry.due_at = fired_at.saturating_add(entry.interval_ms.max(1));
        Some(callback)
    }

    /// Hand the callback back after invocation
    ///
    /// Dropped if the timer was cancelled (or was one-shot) in the meantime.
    pub fn finish_fire(&mut self, id: TimerId, callback: ScriptCallback) {
        if let Some(entry) = self.timers.get_mut(id)
            && entry.callback.is_none()
        {
            entry.callback = Some(callback);
        }
    }

    /// Timers due at `now_ms`, earliest first, ties in scheduling order
    pub fn due(&self, now_ms: u64) -> Vec<TimerId> {
        let mut due: Vec<_> = self
            .timers
            .iter()
            .filter(|(_, entry)| entry.due_at <= now_ms && entry.callback.is_some())
            .map(|(id, entry)| (entry.due_at, id))
            .collect();
        due.sort();
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn pending(&self) -> Vec<PendingTimer> {
        let mut timers: Vec<_> = self
            .timers
            .iter()
            .map(|(id, entry)| PendingTimer {
                id,
                due_at: entry.due_at,
                interval_ms: entry.interval_ms,
                repeating: entry.repeating,
            })
            .collect();
        timers.sort_by_key(|timer| (timer.due_at, timer.id));
        timers
    }

    #[inline]
    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains(id)
    }

    /// How many times a repeating timer has fired
    pub fn fire_count(&self, id: TimerId) -> Option<u64> {
        self.timers.get(id).map(|entry| entry.fire_count)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Cancel every timer (context teardown)
    pub fn cancel_all(&mut self) -> usize {
        self.timers.clear()
    }
}
