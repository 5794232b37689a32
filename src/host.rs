//! Host side of the bridge, as seen from a context
//!
//! Used for the synchronous paths: a host method call that must see every
//! pending mutation first, and the final batch at teardown.

use crate::command::{CommandBatch, NativeValue, TargetId};
use crate::context::ContextId;
use crate::error::ScriptError;

/// Consumer of command batches that also answers method calls
pub trait HostBridge {
    /// Apply a drained batch; on return the batch counts as processed
    fn apply(&mut self, context_id: ContextId, batch: &CommandBatch);

    /// Call `method` on the host object behind `target`
    fn invoke(
        &mut self,
        context_id: ContextId,
        target: TargetId,
        method: &str,
        args: &[NativeValue],
    ) -> Result<NativeValue, ScriptError>;
}

/// A call received by [`RecordingHost`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub context_id: ContextId,
    pub target: TargetId,
    pub method: String,
    pub args: Vec<NativeValue>,
    /// Commands applied before this call arrived
    pub applied_before: usize,
}

/// Host that records everything it is given
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub batches: Vec<(ContextId, CommandBatch)>,
    pub calls: Vec<RecordedCall>,
    /// Value returned from every `invoke`
    pub reply: NativeValue,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands applied so far, across batches
    pub fn applied(&self) -> usize {
        self.batches.iter().map(|(_, batch)| batch.len()).sum()
    }
}

impl HostBridge for RecordingHost {
    fn apply(&mut self, context_id: ContextId, batch: &CommandBatch) {
        self.batches.push((context_id, batch.clone()));
    }

    fn invoke(
        &mut self,
        context_id: ContextId,
        target: TargetId,
        method: &str,
        args: &[NativeValue],
    ) -> Result<NativeValue, ScriptError> {
        let applied_before = self.applied();
        self.calls.push(RecordedCall {
            context_id,
            target,
            method: method.to_string(),
            args: args.to_vec(),
            applied_before,
        });
        Ok(self.reply.clone())
    }
}
