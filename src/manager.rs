//! Registry of live execution contexts
//!
//! The host thread and the script threads meet here. Each context sits
//! behind its own lock, so a host draining one context never blocks script
//! work on another.

use crate::command::CommandBatch;
use crate::config::ContextConfig;
use crate::context::{ContextId, ContextState, ExecutionContext, TeardownReport};
use crate::disposal::DisposalReport;
use crate::engine::ScriptEngine;
use crate::error::{BridgeError, Result};
use crate::host::HostBridge;
use crate::signal::FlushSignal;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

/// Shared handle to one context
pub type SharedContext = Arc<Mutex<ExecutionContext>>;

/// Owns every context and hands out ids
pub struct ContextManager {
    contexts: Mutex<HashMap<ContextId, SharedContext>>,
    next_id: AtomicI32,
    flush_signal: FlushSignal,
    default_config: ContextConfig,
}

impl ContextManager {
    pub fn new(flush_signal: FlushSignal) -> Self {
        Self::with_config(flush_signal, ContextConfig::default())
    }

    pub fn with_config(flush_signal: FlushSignal, default_config: ContextConfig) -> Self {
        ContextManager {
            contexts: Mutex::new(HashMap::new()),
            next_id: AtomicI32::new(1),
            flush_signal,
            default_config,
        }
    }

    /// Create and activate a context with the default configuration
    pub fn create(&self, engine: Box<dyn ScriptEngine>) -> Result<ContextId> {
        self.create_with(self.default_config.clone(), engine)
    }

    pub fn create_with(
        &self,
        config: ContextConfig,
        engine: Box<dyn ScriptEngine>,
    ) -> Result<ContextId> {
        let id = ContextId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut context = ExecutionContext::new(id, config, engine, self.flush_signal.clone())?;
        context.activate()?;
        self.contexts.lock().insert(id, Arc::new(Mutex::new(context)));
        debug!("context {} created", id);
        Ok(id)
    }

    fn missing(&self, id: ContextId) -> BridgeError {
        // Ids are never reused, so anything below the counter once existed
        if id.0 >= 1 && id.0 < self.next_id.load(Ordering::Relaxed) {
            BridgeError::InvalidContext {
                id,
                state: ContextState::Destroyed,
            }
        } else {
            BridgeError::UnknownContext(id)
        }
    }

    pub fn get(&self, id: ContextId) -> Result<SharedContext> {
        self.contexts
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| self.missing(id))
    }

    /// Run `f` with the context locked
    pub fn with_context<R>(
        &self,
        id: ContextId,
        f: impl FnOnce(&mut ExecutionContext) -> Result<R>,
    ) -> Result<R> {
        let context = self.get(id)?;
        let mut guard = context.lock();
        f(&mut guard)
    }

    pub fn is_context_valid(&self, id: ContextId) -> bool {
        self.get(id).is_ok_and(|context| context.lock().is_valid())
    }

    /// Host side: take the pending batch of `id`
    ///
    /// An unknown or destroyed context yields an empty batch; the host may
    /// still be reacting to a flush request that raced with teardown.
    pub fn drain(&self, id: ContextId) -> CommandBatch {
        match self.with_context(id, |context| context.drain_commands()) {
            Ok(batch) => batch,
            Err(err) => {
                debug!("drain of {}: {}", id, err);
                CommandBatch::empty_after(0)
            }
        }
    }

    /// Host side: the last drained batch of `id` has been applied
    pub fn acknowledge(&self, id: ContextId) -> Result<DisposalReport> {
        self.with_context(id, |context| context.acknowledge())
    }

    /// Drain and apply through `host`, then acknowledge
    pub fn flush(&self, id: ContextId, host: &mut dyn HostBridge) -> Result<DisposalReport> {
        self.with_context(id, |context| context.flush_to(host))
    }

    /// Tear `id` down and forget it
    pub fn destroy(&self, id: ContextId, host: &mut dyn HostBridge) -> Result<TeardownReport> {
        let context = self.contexts.lock().remove(&id).ok_or_else(|| self.missing(id))?;
        let report = context.lock().teardown(host);
        match &report {
            Ok(report) => debug!("context {} destroyed: {:?}", id, report),
            Err(err) => warn!("context {} teardown failed: {}", id, err),
        }
        report
    }

    /// Destroy every context, in id order
    pub fn destroy_all(
        &self,
        host: &mut dyn HostBridge,
    ) -> Vec<(ContextId, Result<TeardownReport>)> {
        self.ids()
            .into_iter()
            .map(|id| (id, self.destroy(id, &mut *host)))
            .collect()
    }

    /// Ids of the live contexts, ascending
    pub fn ids(&self) -> Vec<ContextId> {
        let mut ids: Vec<_> = self.contexts.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }
}
