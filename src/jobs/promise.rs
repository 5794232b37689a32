//! Pending promise jobs and rejection tracking

use super::PromiseJob;
use crate::command::NativeString;
use log::trace;
use std::collections::VecDeque;
use std::fmt;

/// Identity of a promise, assigned by the script engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(pub u64);

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promise#{}", self.0)
    }
}

/// FIFO of promise reaction jobs
#[derive(Default)]
pub struct PromiseJobQueue {
    jobs: VecDeque<PromiseJob>,
}

impl PromiseJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: PromiseJob) {
        self.jobs.push_back(job);
    }

    pub fn pop(&mut self) -> Option<PromiseJob> {
        self.jobs.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.jobs.len();
        self.jobs.clear();
        count
    }
}

/// A rejection seen by the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub promise: PromiseId,
    pub reason: NativeString,
}

/// Tracks promises rejected without a handler
///
/// A rejection is first held as pending. If a handler is attached before the
/// next checkpoint it is forgotten silently; otherwise the checkpoint reports
/// it as unhandled. A handler attached after that report produces a
/// "rejection handled" notification instead.
///
/// Reported rejections are kept for that notification up to
/// [`MAX_REPORTED`](Self::MAX_REPORTED) entries; the oldest are forgotten
/// first.
#[derive(Default)]
pub struct RejectedPromises {
    pending: Vec<Rejection>,
    reported: VecDeque<Rejection>,
}

impl RejectedPromises {
    pub const MAX_REPORTED: usize = 1000;

    pub fn new() -> Self {
        Self::default()
    }

    /// A promise was rejected with no handler attached
    pub fn track_rejected(&mut self, promise: PromiseId, reason: impl Into<NativeString>) {
        trace!("{} rejected without handler", promise);
        self.pending.retain(|r| r.promise != promise);
        self.pending.push(Rejection {
            promise,
            reason: reason.into(),
        });
    }

    /// A handler was attached to a rejected promise
    ///
    /// Returns the rejection if it had already been reported as unhandled.
    pub fn track_handled(&mut self, promise: PromiseId) -> Option<Rejection> {
        if let Some(pos) = self.pending.iter().position(|r| r.promise == promise) {
            self.pending.remove(pos);
            return None;
        }
        let pos = self.reported.iter().position(|r| r.promise == promise)?;
        self.reported.remove(pos)
    }

    /// Move every pending rejection to the reported set and return them
    pub fn take_unhandled(&mut self) -> Vec<Rejection> {
        let unhandled = std::mem::take(&mut self.pending);
        self.reported.extend(unhandled.iter().cloned());
        let overflow = self.reported.len().saturating_sub(Self::MAX_REPORTED);
        if overflow > 0 {
            trace!("forgetting {} oldest reported rejections", overflow);
            self.reported.drain(..overflow);
        }
        unhandled
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Reported rejections still waiting for a late handler
    #[inline]
    pub fn reported_len(&self) -> usize {
        self.reported.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.reported.clear();
    }
}
