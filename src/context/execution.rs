//! The execution context
//!
//! All mutation happens on the script thread that owns the context. The host
//! reaches in only through [`drain_commands`](ExecutionContext::drain_commands)
//! and [`acknowledge`](ExecutionContext::acknowledge), in that order, and the
//! owner serializes those calls with the script thread's own (the
//! [`ContextManager`](crate::ContextManager) does it with one lock per
//! context).

use super::state::{ContextId, ContextState};
use crate::command::{BufferStats, Command, CommandBatch, CommandBuffer, NativeValue, TargetId};
use crate::config::ContextConfig;
use crate::disposal::{DisposalQueue, DisposalReport};
use crate::engine::ScriptEngine;
use crate::error::{BridgeError, Result};
use crate::host::HostBridge;
use crate::jobs::{
    ListenerId, ModuleCallback, ModuleCallbackCoordinator, ModuleCallbackId, ModuleEvent,
    ModuleListener, ModuleListenerContainer, PendingTimer, PromiseId, PromiseJob,
    PromiseJobQueue, RejectedPromises, Rejection, ScriptCallback, TimerCoordinator, TimerId,
};
use crate::native::{NativeHandle, NativeObject, SlotTable};
use crate::signal::{FlushRequest, FlushSignal};
use log::{debug, error, trace, warn};

/// Receives uncaught script errors of a context
pub type ExceptionHandler = Box<dyn Fn(ContextId, &str) + Send>;

/// Outcome of a promise job checkpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromiseCheckpoint {
    pub jobs_run: usize,
    /// Rejections reported as unhandled at this checkpoint
    pub unhandled: Vec<Rejection>,
    /// Previously reported rejections that got a handler since
    pub handled: Vec<Rejection>,
}

/// What teardown cleaned up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub cancelled_timers: usize,
    pub dropped_listeners: usize,
    pub dropped_module_callbacks: usize,
    pub dropped_promise_jobs: usize,
    /// Commands handed to the host by the final drain
    pub final_commands: usize,
    pub disposals: DisposalReport,
    /// Native objects that were never registered for disposal
    pub evicted_natives: usize,
}

/// Counters of a context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub buffer: BufferStats,
    pub acknowledged: u64,
    pub live_natives: usize,
    pub pending_disposals: usize,
    pub released_natives: u64,
    pub active_timers: usize,
    pub module_listeners: usize,
    pub module_callbacks: usize,
    pub pending_promise_jobs: usize,
    pub errors_reported: u64,
}

/// Script execution environment and everything it owns
pub struct ExecutionContext {
    id: ContextId,
    state: ContextState,
    config: ContextConfig,
    engine: Box<dyn ScriptEngine>,

    command_buffer: CommandBuffer,
    natives: SlotTable<NativeObject>,
    disposals: DisposalQueue,

    timers: TimerCoordinator,
    module_listeners: ModuleListenerContainer,
    module_callbacks: ModuleCallbackCoordinator,
    promise_jobs: PromiseJobQueue,
    rejected_promises: RejectedPromises,
    late_handled: Vec<Rejection>,

    flush_signal: FlushSignal,
    exception_handler: Option<ExceptionHandler>,

    /// Host clock as of the last timer run, in milliseconds
    now_ms: u64,
    next_target_id: TargetId,
    /// Last command sequence number the host has applied
    acknowledged: u64,
    /// Command storage could not grow; no further work is accepted
    failed: bool,
    final_drained: bool,
    /// The engine was initialized and not released yet
    engine_live: bool,
    errors_reported: u64,
    teardown: TeardownReport,
}

impl ExecutionContext {
    /// Create a context in the `Created` state
    pub fn new(
        id: ContextId,
        config: ContextConfig,
        engine: Box<dyn ScriptEngine>,
        flush_signal: FlushSignal,
    ) -> Result<Self> {
        let command_buffer = CommandBuffer::with_limit(
            config.initial_command_capacity,
            config.command_capacity_limit,
        )?;

        Ok(ExecutionContext {
            id,
            state: ContextState::Created,
            config,
            engine,
            command_buffer,
            natives: SlotTable::new(),
            disposals: DisposalQueue::new(),
            timers: TimerCoordinator::new(),
            module_listeners: ModuleListenerContainer::new(),
            module_callbacks: ModuleCallbackCoordinator::new(),
            promise_jobs: PromiseJobQueue::new(),
            rejected_promises: RejectedPromises::new(),
            late_handled: Vec::new(),
            flush_signal,
            exception_handler: None,
            now_ms: 0,
            next_target_id: 0,
            acknowledged: 0,
            failed: false,
            final_drained: false,
            engine_live: false,
            errors_reported: 0,
            teardown: TeardownReport::default(),
        })
    }

    /// Bring the engine up and install the global bindings
    pub fn activate(&mut self) -> Result<()> {
        if !self.state.can_transition_to(ContextState::Active) {
            return Err(self.invalid_transition(ContextState::Active));
        }
        self.engine.initialize(self.id)?;
        self.engine_live = true;
        self.engine.install_bindings()?;
        self.transition(ContextState::Active)
    }

    fn invalid_transition(&self, to: ContextState) -> BridgeError {
        BridgeError::InvalidTransition {
            id: self.id,
            from: self.state,
            to,
        }
    }

    fn transition(&mut self, to: ContextState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(self.invalid_transition(to));
        }
        debug!("context {}: {} -> {}", self.id, self.state, to);
        self.state = to;
        Ok(())
    }

    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> ContextState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Whether the context accepts new work
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.state == ContextState::Active && !self.failed
    }

    fn reject(&self, operation: &str) -> BridgeError {
        warn!(
            "context {}: {} rejected in state {}{}",
            self.id,
            operation,
            self.state,
            if self.failed { " (failed)" } else { "" }
        );
        BridgeError::InvalidContext {
            id: self.id,
            state: self.state,
        }
    }

    fn ensure_valid(&self, operation: &str) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(self.reject(operation))
        }
    }

    /// Commands are accepted while active, and during teardown until the
    /// final drain so destructors can still report their nodes
    fn ensure_accepting_commands(&self, operation: &str) -> Result<()> {
        let accepting = !self.failed
            && match self.state {
                ContextState::Active => true,
                ContextState::TearingDown => !self.final_drained,
                ContextState::Created | ContextState::Destroyed => false,
            };
        if accepting {
            Ok(())
        } else {
            Err(self.reject(operation))
        }
    }

    pub fn set_exception_handler(&mut self, handler: impl Fn(ContextId, &str) + Send + 'static) {
        self.exception_handler = Some(Box::new(handler));
    }

    /// Report an uncaught script error
    pub fn report_error(&mut self, message: &str) {
        self.errors_reported += 1;
        error!("context {}: {}", self.id, message);
        if let Some(handler) = &self.exception_handler {
            handler(self.id, message);
        }
    }

    /// Evaluate source in the engine, then run pending promise jobs
    pub fn evaluate(&mut self, source: &str, url: &str, line: u32) -> Result<NativeValue> {
        self.ensure_valid("evaluate")?;
        match self.engine.evaluate(source, url, line) {
            Ok(value) => {
                self.microtask_checkpoint();
                Ok(value)
            }
            Err(err) => {
                self.report_error(&err.message);
                Err(err.into())
            }
        }
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Append a command and request a host flush if this opens a batch
    pub fn append_command(&mut self, command: Command) -> Result<u64> {
        self.append_command_with(command, true)
    }

    /// Append a command; `request_update = false` never wakes the host
    ///
    /// Returns the command's sequence number. Failure to grow the buffer is
    /// fatal for the context: it stops accepting work and must be torn down.
    pub fn append_command_with(&mut self, command: Command, request_update: bool) -> Result<u64> {
        self.ensure_accepting_commands("append")?;
        let appended = match self.command_buffer.append(command, request_update) {
            Ok(appended) => appended,
            Err(err) => {
                error!("context {}: {}; context is no longer usable", self.id, err);
                self.failed = true;
                return Err(err);
            }
        };
        if appended.flush_requested && self.state == ContextState::Active {
            self.request_flush();
        }
        Ok(appended.seq)
    }

    fn request_flush(&self) {
        self.flush_signal.request(FlushRequest {
            context_id: self.id,
            dedicated: self.config.dedicated,
        });
    }

    /// Allocate the id of a new node
    pub fn allocate_target_id(&mut self) -> TargetId {
        self.next_target_id += 1;
        self.next_target_id
    }

    /// Commands appended but not drained yet
    #[inline]
    pub fn pending_commands(&self) -> &[Command] {
        self.command_buffer.data()
    }

    // ---------------------------------------------------------------------
    // Native objects
    // ---------------------------------------------------------------------

    /// Store a native object and return its handle
    pub fn create_native(&mut self, object: NativeObject) -> Result<NativeHandle> {
        self.ensure_valid("create native")?;
        Ok(self.natives.insert(object))
    }

    pub fn native(&self, handle: NativeHandle) -> Result<&NativeObject> {
        self.natives
            .get(handle)
            .ok_or(BridgeError::StaleHandle(handle))
    }

    pub fn native_mut(&mut self, handle: NativeHandle) -> Result<&mut NativeObject> {
        self.natives
            .get_mut(handle)
            .ok_or(BridgeError::StaleHandle(handle))
    }

    /// Create an element node: native object, fresh target id and the
    /// `createElement` command
    pub fn create_element(&mut self, tag_name: &str) -> Result<(TargetId, NativeHandle)> {
        let native = self.create_native(NativeObject::element(tag_name))?;
        let target_id = self.allocate_target_id();
        self.append_command(Command::create_element(target_id, tag_name, native))?;
        Ok((target_id, native))
    }

    /// Queue the release of a native object
    ///
    /// The release waits until the host has acknowledged every command
    /// appended before this call, including any that reference `handle`.
    pub fn register_disposal(&mut self, handle: NativeHandle) -> Result<()> {
        self.ensure_accepting_commands("register disposal")?;
        let kind = self.native(handle)?.kind();
        let stamp = self.command_buffer.last_seq();
        if !self.disposals.register(handle, kind, stamp) {
            debug!("context {}: {} already queued for disposal", self.id, handle);
        }
        Ok(())
    }

    /// Tell the host a node is gone, then queue its native object for release
    pub fn dispose_event_target(
        &mut self,
        target_id: TargetId,
        handle: NativeHandle,
    ) -> Result<()> {
        self.native(handle)?;
        self.append_command(Command::dispose_event_target(target_id, handle))?;
        self.register_disposal(handle)
    }

    // ---------------------------------------------------------------------
    // Host side
    // ---------------------------------------------------------------------

    /// Take every command appended since the last drain
    pub fn drain_commands(&mut self) -> Result<CommandBatch> {
        if self.state == ContextState::Destroyed || self.final_drained {
            return Err(self.reject("drain"));
        }
        let batch = self.command_buffer.drain();
        #[cfg(feature = "dump")]
        dump_batch(self.id, &batch);
        Ok(batch)
    }

    /// The host has applied everything drained so far
    ///
    /// Closes the batching window (re-requesting a flush if commands arrived
    /// meanwhile) and releases the native objects whose commands are now
    /// processed.
    pub fn acknowledge(&mut self) -> Result<DisposalReport> {
        if self.state == ContextState::Destroyed {
            return Err(self.reject("acknowledge"));
        }
        self.acknowledged = self.command_buffer.drained_through();
        if self.command_buffer.reset() && self.state == ContextState::Active {
            self.request_flush();
        }
        let report = self
            .disposals
            .release_acknowledged(&mut self.natives, self.acknowledged);
        trace!(
            "context {}: acknowledged #{}, released {}",
            self.id, self.acknowledged, report.released
        );
        Ok(report)
    }

    /// Drain into `host` and acknowledge in one step
    pub fn flush_to(&mut self, host: &mut dyn HostBridge) -> Result<DisposalReport> {
        let batch = self.drain_commands()?;
        if !batch.is_empty() {
            host.apply(self.id, &batch);
        }
        self.acknowledge()
    }

    /// Synchronous call into the host
    ///
    /// Pending commands are flushed first so the host answers against an
    /// up-to-date tree.
    pub fn invoke_host_method(
        &mut self,
        host: &mut dyn HostBridge,
        target: TargetId,
        method: &str,
        args: &[NativeValue],
    ) -> Result<NativeValue> {
        self.ensure_valid("invoke host method")?;
        self.flush_to(host)?;
        match host.invoke(self.id, target, method, args) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.report_error(&err.message);
                Err(err.into())
            }
        }
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    pub fn set_timeout(&mut self, delay_ms: u64, callback: ScriptCallback) -> Result<TimerId> {
        self.schedule_timer(delay_ms, false, callback)
    }

    pub fn set_interval(&mut self, interval_ms: u64, callback: ScriptCallback) -> Result<TimerId> {
        self.schedule_timer(interval_ms, true, callback)
    }

    pub fn schedule_timer(
        &mut self,
        interval_ms: u64,
        repeating: bool,
        callback: ScriptCallback,
    ) -> Result<TimerId> {
        self.ensure_valid("schedule timer")?;
        Ok(self
            .timers
            .schedule(self.now_ms, interval_ms, repeating, callback))
    }

    /// Cancel a timer; a no-op for fired, cancelled or unknown handles
    pub fn clear_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    /// Run a timer's callback now
    ///
    /// Returns `false` when the handle no longer names a pending timer. A
    /// failing callback is reported through the exception path.
    pub fn fire_timer(&mut self, id: TimerId) -> Result<bool> {
        self.ensure_valid("fire timer")?;
        let Some(mut callback) = self.timers.begin_fire(id, self.now_ms) else {
            debug!("context {}: fire of inactive {} ignored", self.id, id);
            return Ok(false);
        };
        let result = callback(self);
        self.timers.finish_fire(id, callback);
        if let Err(err) = result {
            self.report_error(&err.message);
        }
        self.microtask_checkpoint();
        Ok(true)
    }

    /// Advance the clock to `now_ms` and fire every timer due by then
    pub fn run_due_timers(&mut self, now_ms: u64) -> Result<usize> {
        self.ensure_valid("run timers")?;
        self.now_ms = self.now_ms.max(now_ms);
        let mut ran = 0;
        for id in self.timers.due(self.now_ms) {
            if !self.is_valid() {
                break;
            }
            if self.fire_timer(id)? {
                ran += 1;
            }
        }
        Ok(ran)
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        self.timers.pending()
    }

    #[inline]
    pub fn is_timer_active(&self, id: TimerId) -> bool {
        self.timers.is_active(id)
    }

    // ---------------------------------------------------------------------
    // Module listeners and callbacks
    // ---------------------------------------------------------------------

    pub fn add_module_listener(
        &mut self,
        module: &str,
        listener: ModuleListener,
    ) -> Result<ListenerId> {
        self.ensure_valid("add module listener")?;
        Ok(self.module_listeners.add(module, listener))
    }

    pub fn remove_module_listener(&mut self, id: ListenerId) -> bool {
        self.module_listeners.remove(id)
    }

    /// Deliver a host module event to its listeners, in registration order
    pub fn dispatch_module_event(&mut self, module: &str, payload: NativeValue) -> Result<usize> {
        self.ensure_valid("dispatch module event")?;
        let event = ModuleEvent {
            module: module.into(),
            payload,
        };
        let mut delivered = 0;
        for id in self.module_listeners.listeners_for(module) {
            if !self.is_valid() {
                break;
            }
            let Some(mut listener) = self.module_listeners.begin_dispatch(id) else {
                continue;
            };
            let result = listener(self, &event);
            self.module_listeners.finish_dispatch(id, listener);
            if let Err(err) = result {
                self.report_error(&err.message);
            }
            delivered += 1;
        }
        self.microtask_checkpoint();
        Ok(delivered)
    }

    pub fn register_module_callback(
        &mut self,
        callback: ModuleCallback,
    ) -> Result<ModuleCallbackId> {
        self.ensure_valid("register module callback")?;
        Ok(self.module_callbacks.register(callback))
    }

    pub fn cancel_module_callback(&mut self, id: ModuleCallbackId) -> bool {
        self.module_callbacks.cancel(id)
    }

    /// Complete a host module invocation; unknown handles are ignored
    pub fn invoke_module_callback(
        &mut self,
        id: ModuleCallbackId,
        result: std::result::Result<NativeValue, String>,
    ) -> Result<bool> {
        self.ensure_valid("invoke module callback")?;
        let Some(callback) = self.module_callbacks.take(id) else {
            debug!("context {}: completion of inactive {} ignored", self.id, id);
            return Ok(false);
        };
        if let Err(err) = callback(self, result) {
            self.report_error(&err.message);
        }
        self.microtask_checkpoint();
        Ok(true)
    }

    // ---------------------------------------------------------------------
    // Promises
    // ---------------------------------------------------------------------

    pub fn enqueue_promise_job(&mut self, job: PromiseJob) -> Result<()> {
        self.ensure_valid("enqueue promise job")?;
        self.promise_jobs.push(job);
        Ok(())
    }

    /// Rejection hook for the engine: a promise was rejected, or a handler
    /// was attached to a rejected one
    pub fn track_promise_rejection(
        &mut self,
        promise: PromiseId,
        reason: &str,
        is_handled: bool,
    ) -> Result<()> {
        self.ensure_valid("track promise rejection")?;
        if is_handled {
            if let Some(rejection) = self.rejected_promises.track_handled(promise) {
                self.late_handled.push(rejection);
            }
        } else {
            self.rejected_promises.track_rejected(promise, reason);
        }
        Ok(())
    }

    /// Run promise jobs until the queue is empty, then report rejections
    ///
    /// Jobs enqueued by running jobs are run in the same checkpoint.
    pub fn drain_pending_promise_jobs(&mut self) -> Result<PromiseCheckpoint> {
        self.ensure_valid("drain promise jobs")?;
        let mut checkpoint = PromiseCheckpoint::default();
        while self.is_valid() {
            let Some(job) = self.promise_jobs.pop() else {
                break;
            };
            if let Err(err) = job(self) {
                self.report_error(&err.message);
            }
            checkpoint.jobs_run += 1;
        }

        checkpoint.unhandled = self.rejected_promises.take_unhandled();
        for rejection in &checkpoint.unhandled {
            let message = format!("Uncaught (in promise) {}", rejection.reason);
            self.report_error(&message);
        }
        checkpoint.handled = std::mem::take(&mut self.late_handled);
        for rejection in &checkpoint.handled {
            debug!(
                "context {}: rejection of {} handled late",
                self.id, rejection.promise
            );
        }
        Ok(checkpoint)
    }

    fn microtask_checkpoint(&mut self) {
        let pending = !self.promise_jobs.is_empty() || self.rejected_promises.pending_len() > 0;
        if self.is_valid() && pending {
            // Only fails on an invalid context, which is checked here
            let _ = self.drain_pending_promise_jobs();
        }
    }

    // ---------------------------------------------------------------------
    // Teardown
    // ---------------------------------------------------------------------

    /// Start teardown: the context stops being valid and every job is dropped
    ///
    /// Commands and disposals are still accepted until
    /// [`final_drain`](Self::final_drain), so destructors running now can
    /// report their nodes. Destruction commands for live nodes are the
    /// caller's to append; the context does not synthesize them.
    pub fn begin_teardown(&mut self) -> Result<()> {
        self.transition(ContextState::TearingDown)?;
        self.teardown.cancelled_timers = self.timers.cancel_all();
        self.teardown.dropped_listeners = self.module_listeners.clear();
        self.teardown.dropped_module_callbacks = self.module_callbacks.clear();
        self.teardown.dropped_promise_jobs = self.promise_jobs.clear();
        self.rejected_promises.clear();
        self.late_handled.clear();
        Ok(())
    }

    /// Hand out the last batch; nothing can be appended afterwards
    pub fn final_drain(&mut self) -> Result<CommandBatch> {
        if self.state != ContextState::TearingDown || self.final_drained {
            return Err(self.reject("final drain"));
        }
        let batch = self.command_buffer.drain();
        self.final_drained = true;
        self.teardown.final_commands = batch.len();
        #[cfg(feature = "dump")]
        dump_batch(self.id, &batch);
        Ok(batch)
    }

    /// Finish teardown once the host has applied the final batch
    ///
    /// Runs every pending disposal, invalidates all native handles, releases
    /// the engine and moves to `Destroyed`.
    pub fn finish_teardown(&mut self) -> Result<TeardownReport> {
        if self.state != ContextState::TearingDown || !self.final_drained {
            return Err(self.invalid_transition(ContextState::Destroyed));
        }
        self.acknowledged = self.command_buffer.drained_through();
        self.teardown.disposals = self.disposals.drain(&mut self.natives, self.acknowledged)?;

        let evicted = self.natives.invalidate_all();
        if !evicted.is_empty() {
            warn!(
                "context {}: {} native objects were never disposed",
                self.id,
                evicted.len()
            );
        }
        self.teardown.evicted_natives = evicted.len();

        self.release_engine();
        self.transition(ContextState::Destroyed)?;
        Ok(self.teardown)
    }

    /// Full teardown with `host` applying the final batch
    pub fn teardown(&mut self, host: &mut dyn HostBridge) -> Result<TeardownReport> {
        self.begin_teardown()?;
        let batch = self.final_drain()?;
        if !batch.is_empty() {
            host.apply(self.id, &batch);
        }
        self.finish_teardown()
    }

    fn release_engine(&mut self) {
        if self.engine_live {
            self.engine.release();
            self.engine_live = false;
        }
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            buffer: self.command_buffer.stats(),
            acknowledged: self.acknowledged,
            live_natives: self.natives.len(),
            pending_disposals: self.disposals.len(),
            released_natives: self.disposals.released().total(),
            active_timers: self.timers.len(),
            module_listeners: self.module_listeners.len(),
            module_callbacks: self.module_callbacks.len(),
            pending_promise_jobs: self.promise_jobs.len(),
            errors_reported: self.errors_reported,
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if self.state != ContextState::Destroyed {
            warn!(
                "context {} dropped in state {} without teardown",
                self.id, self.state
            );
            self.release_engine();
        }
    }
}

#[cfg(feature = "dump")]
fn dump_batch(id: ContextId, batch: &CommandBatch) {
    for (offset, command) in batch.iter().enumerate() {
        trace!(
            "context {} #{}: {}",
            id,
            batch.first_seq() + offset as u64,
            command
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::engine::NullEngine;
    use crate::error::ScriptError;
    use crate::host::RecordingHost;
    use crate::signal::{flush_channel, FlushReceiver};
    use std::sync::{Arc, Mutex};

    fn active_context() -> (ExecutionContext, FlushReceiver) {
        let (signal, receiver) = flush_channel();
        let mut ctx = ExecutionContext::new(
            ContextId(1),
            ContextConfig::default().with_initial_command_capacity(4),
            NullEngine::boxed(),
            signal,
        )
        .unwrap();
        ctx.activate().unwrap();
        (ctx, receiver)
    }

    fn counter() -> (Arc<Mutex<u32>>, impl Fn() -> u32) {
        let count = Arc::new(Mutex::new(0));
        let read = {
            let count = count.clone();
            move || *count.lock().unwrap()
        };
        (count, read)
    }

    /// Engine whose binding installation fails; records its release
    struct BrokenBindings(Arc<Mutex<u32>>);

    impl ScriptEngine for BrokenBindings {
        fn initialize(&mut self, _context_id: ContextId) -> std::result::Result<(), ScriptError> {
            Ok(())
        }

        fn install_bindings(&mut self) -> std::result::Result<(), ScriptError> {
            Err(ScriptError::new("window is not defined"))
        }

        fn evaluate(
            &mut self,
            _source: &str,
            _url: &str,
            _line: u32,
        ) -> std::result::Result<NativeValue, ScriptError> {
            Err(ScriptError::new("not running"))
        }

        fn release(&mut self) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_failed_activation_releases_engine_once() {
        let (signal, _rx) = flush_channel();
        let (count, released) = counter();
        let mut ctx = ExecutionContext::new(
            ContextId(2),
            ContextConfig::default(),
            Box::new(BrokenBindings(count.clone())),
            signal.clone(),
        )
        .unwrap();
        assert!(matches!(ctx.activate(), Err(BridgeError::Script(_))));
        assert_eq!(ctx.state(), ContextState::Created);
        drop(ctx);
        assert_eq!(released(), 1);

        // Torn down explicitly: released by teardown, not again by drop
        let mut ctx = ExecutionContext::new(
            ContextId(3),
            ContextConfig::default(),
            Box::new(BrokenBindings(count)),
            signal,
        )
        .unwrap();
        assert!(ctx.activate().is_err());
        ctx.teardown(&mut RecordingHost::new()).unwrap();
        drop(ctx);
        assert_eq!(released(), 2);
    }

    #[test]
    fn test_lifecycle_states() {
        let (signal, _rx) = flush_channel();
        let mut ctx = ExecutionContext::new(
            ContextId(9),
            ContextConfig::default(),
            NullEngine::boxed(),
            signal,
        )
        .unwrap();
        assert_eq!(ctx.state(), ContextState::Created);
        assert!(!ctx.is_valid());
        assert!(ctx.append_command(Command::remove_node(1)).is_err());

        ctx.activate().unwrap();
        assert!(ctx.is_valid());
        assert!(matches!(
            ctx.activate(),
            Err(BridgeError::InvalidTransition { .. })
        ));

        let report = ctx.teardown(&mut RecordingHost::new()).unwrap();
        assert_eq!(report.final_commands, 0);
        assert_eq!(ctx.state(), ContextState::Destroyed);
    }

    #[test]
    fn test_anchor_scenario() {
        let (mut ctx, _rx) = active_context();
        let (id, native) = ctx.create_element("a").unwrap();
        assert_eq!(id, 1);
        ctx.append_command(Command::set_property(id, "href", "https://x")).unwrap();
        ctx.append_command(Command::set_property(id, "target", "_blank")).unwrap();

        let batch = ctx.drain_commands().unwrap();
        let rendered: Vec<_> = batch.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                Command::create_element(1, "a", native).to_string(),
                Command::set_property(1, "href", "https://x").to_string(),
                Command::set_property(1, "target", "_blank").to_string(),
            ]
        );

        ctx.register_disposal(native).unwrap();
        let mut host = RecordingHost::new();
        let report = ctx.teardown(&mut host).unwrap();
        assert_eq!(report.final_commands, 0);
        assert_eq!(report.disposals.released, 1);
        assert_eq!(ctx.stats().released_natives, 1);
        assert_eq!(ctx.native(native), Err(BridgeError::StaleHandle(native)));
    }

    #[test]
    fn test_flush_signal_once_per_batch() {
        let (mut ctx, rx) = active_context();
        for id in 0..10 {
            ctx.append_command(Command::set_property(id, "k", "v")).unwrap();
        }
        assert_eq!(rx.pending().len(), 1);

        assert_eq!(ctx.drain_commands().unwrap().len(), 10);
        ctx.acknowledge().unwrap();
        assert!(rx.try_recv().is_none());

        ctx.append_command(Command::remove_node(1)).unwrap();
        let requests = rx.pending();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].context_id, ContextId(1));
    }

    #[test]
    fn test_appends_during_apply_trigger_new_flush() {
        let (mut ctx, rx) = active_context();
        ctx.append_command(Command::remove_node(1)).unwrap();
        let batch = ctx.drain_commands().unwrap();
        ctx.append_command(Command::remove_node(2)).unwrap();
        assert_eq!(rx.pending().len(), 1);
        assert_eq!(batch.len(), 1);

        ctx.acknowledge().unwrap();
        assert_eq!(rx.pending().len(), 1);
        assert_eq!(ctx.drain_commands().unwrap().commands()[0].target_id(), 2);
    }

    #[test]
    fn test_disposal_waits_for_acknowledge() {
        let (mut ctx, _rx) = active_context();
        let (id, native) = ctx.create_element("div").unwrap();
        ctx.dispose_event_target(id, native).unwrap();

        // Nothing released before the host has seen the commands
        let report = ctx.acknowledge().unwrap();
        assert_eq!(report.released, 0);
        assert!(ctx.native(native).is_ok());

        let batch = ctx.drain_commands().unwrap();
        assert!(batch.iter().any(|c| c.references(native)));
        assert!(ctx.native(native).is_ok());

        let report = ctx.acknowledge().unwrap();
        assert_eq!(report.released, 1);
        assert_eq!(ctx.native(native), Err(BridgeError::StaleHandle(native)));
    }

    #[test]
    fn test_disposal_registered_after_drain_waits_for_next_ack() {
        let (mut ctx, _rx) = active_context();
        let (id, native) = ctx.create_element("span").unwrap();
        ctx.drain_commands().unwrap();

        ctx.dispose_event_target(id, native).unwrap();
        // The drained batch predates the dispose command
        assert_eq!(ctx.acknowledge().unwrap().released, 0);

        ctx.drain_commands().unwrap();
        assert_eq!(ctx.acknowledge().unwrap().released, 1);
    }

    #[test]
    fn test_register_disposal_twice_is_noop() {
        let (mut ctx, _rx) = active_context();
        let native = ctx.create_native(NativeObject::text("hi")).unwrap();
        ctx.register_disposal(native).unwrap();
        ctx.register_disposal(native).unwrap();
        assert_eq!(ctx.stats().pending_disposals, 1);
    }

    #[test]
    fn test_register_disposal_after_release() {
        let (mut ctx, _rx) = active_context();
        let first = ctx.create_native(NativeObject::text("a")).unwrap();
        ctx.register_disposal(first).unwrap();
        ctx.acknowledge().unwrap();
        assert_eq!(ctx.stats().released_natives, 1);

        // A released handle cannot be queued again
        assert_eq!(
            ctx.register_disposal(first),
            Err(BridgeError::StaleHandle(first))
        );

        let handles: Vec<_> = (0..1_000)
            .map(|_| ctx.create_native(NativeObject::comment("c")).unwrap())
            .collect();
        for handle in handles.iter().chain(handles.iter()) {
            ctx.register_disposal(*handle).unwrap();
        }
        assert_eq!(ctx.stats().pending_disposals, 1_000);
        assert_eq!(ctx.acknowledge().unwrap().released, 1_000);
        assert_eq!(ctx.stats().pending_disposals, 0);
    }

    #[test]
    fn test_one_shot_timer() {
        let (mut ctx, _rx) = active_context();
        let (count, fired) = counter();
        let id = ctx
            .set_timeout(
                10,
                Box::new(move |ctx| {
                    *count.lock().unwrap() += 1;
                    ctx.append_command(Command::remove_node(5))?;
                    Ok(())
                }),
            )
            .unwrap();

        assert_eq!(ctx.run_due_timers(9).unwrap(), 0);
        assert_eq!(ctx.run_due_timers(10).unwrap(), 1);
        assert_eq!(fired(), 1);
        assert_eq!(ctx.pending_commands().len(), 1);

        // Cancel after firing is a no-op
        assert!(!ctx.clear_timer(id));
        assert!(!ctx.fire_timer(id).unwrap());
        assert_eq!(fired(), 1);
    }

    #[test]
    fn test_cancelled_timer_never_runs() {
        let (mut ctx, _rx) = active_context();
        let (count, fired) = counter();
        let id = ctx
            .set_timeout(5, Box::new(move |_| {
                *count.lock().unwrap() += 1;
                Ok(())
            }))
            .unwrap();
        assert!(ctx.clear_timer(id));
        assert_eq!(ctx.run_due_timers(100).unwrap(), 0);
        assert_eq!(fired(), 0);
    }

    #[test]
    fn test_interval_rearms_and_cancels_itself() {
        let (mut ctx, _rx) = active_context();
        let (count, fired) = counter();
        let id = Arc::new(Mutex::new(None));
        let own_id = id.clone();
        let timer = ctx
            .set_interval(
                10,
                Box::new(move |ctx| {
                    let mut n = count.lock().unwrap();
                    *n += 1;
                    if *n == 3
                        && let Some(id) = *own_id.lock().unwrap()
                    {
                        ctx.clear_timer(id);
                    }
                    Ok(())
                }),
            )
            .unwrap();
        *id.lock().unwrap() = Some(timer);

        for now in [10, 20, 30, 40, 50] {
            ctx.run_due_timers(now).unwrap();
        }
        assert_eq!(fired(), 3);
        assert!(!ctx.is_timer_active(timer));
    }

    #[test]
    fn test_failing_timer_is_reported_and_not_rearmed() {
        let (mut ctx, _rx) = active_context();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        ctx.set_exception_handler(move |_, msg| sink.lock().unwrap().push(msg.to_string()));

        let id = ctx
            .set_timeout(0, Box::new(|_| Err(ScriptError::new("TypeError: x is undefined"))))
            .unwrap();
        assert!(ctx.fire_timer(id).unwrap());
        assert!(!ctx.is_timer_active(id));
        assert_eq!(*messages.lock().unwrap(), vec!["TypeError: x is undefined"]);
        assert_eq!(ctx.stats().errors_reported, 1);
    }

    #[test]
    fn test_module_listeners_and_callbacks() {
        let (mut ctx, _rx) = active_context();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        let listener = ctx
            .add_module_listener(
                "battery",
                Box::new(move |_, event| {
                    log.lock().unwrap().push(event.payload.clone());
                    Ok(())
                }),
            )
            .unwrap();
        assert_eq!(ctx.dispatch_module_event("battery", 80i64.into()).unwrap(), 1);
        assert_eq!(ctx.dispatch_module_event("network", NativeValue::Null).unwrap(), 0);
        assert!(ctx.remove_module_listener(listener));
        assert_eq!(ctx.dispatch_module_event("battery", 70i64.into()).unwrap(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![NativeValue::Int64(80)]);

        let log = seen.clone();
        let callback = ctx
            .register_module_callback(Box::new(move |_, result| {
                log.lock().unwrap().push(result.unwrap_or(NativeValue::Null));
                Ok(())
            }))
            .unwrap();
        assert!(ctx.invoke_module_callback(callback, Ok("done".into())).unwrap());
        assert!(!ctx.invoke_module_callback(callback, Ok("again".into())).unwrap());
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_promise_jobs_drain_nested() {
        let (mut ctx, _rx) = active_context();
        let (count, ran) = counter();
        let inner = count.clone();
        ctx.enqueue_promise_job(Box::new(move |ctx| {
            *count.lock().unwrap() += 1;
            ctx.enqueue_promise_job(Box::new(move |_| {
                *inner.lock().unwrap() += 1;
                Ok(())
            }))?;
            Ok(())
        }))
        .unwrap();

        let checkpoint = ctx.drain_pending_promise_jobs().unwrap();
        assert_eq!(checkpoint.jobs_run, 2);
        assert_eq!(ran(), 2);
        assert_eq!(ctx.stats().pending_promise_jobs, 0);
    }

    #[test]
    fn test_unhandled_rejection_reporting() {
        let (mut ctx, _rx) = active_context();
        ctx.track_promise_rejection(PromiseId(1), "nope", false).unwrap();
        ctx.track_promise_rejection(PromiseId(2), "caught", false).unwrap();
        ctx.track_promise_rejection(PromiseId(2), "", true).unwrap();

        let checkpoint = ctx.drain_pending_promise_jobs().unwrap();
        assert_eq!(checkpoint.unhandled.len(), 1);
        assert_eq!(checkpoint.unhandled[0].promise, PromiseId(1));
        assert_eq!(ctx.stats().errors_reported, 1);

        ctx.track_promise_rejection(PromiseId(1), "", true).unwrap();
        let checkpoint = ctx.drain_pending_promise_jobs().unwrap();
        assert!(checkpoint.unhandled.is_empty());
        assert_eq!(checkpoint.handled.len(), 1);
    }

    #[test]
    fn test_invoke_host_method_flushes_first() {
        let (mut ctx, _rx) = active_context();
        let (id, _) = ctx.create_element("canvas").unwrap();
        ctx.append_command(Command::set_property(id, "width", "300")).unwrap();

        let mut host = RecordingHost::new();
        host.reply = NativeValue::Float64(300.0);
        let value = ctx
            .invoke_host_method(&mut host, id, "getBoundingClientRect", &[])
            .unwrap();
        assert_eq!(value, NativeValue::Float64(300.0));
        assert_eq!(host.calls[0].applied_before, 2);
        assert!(ctx.pending_commands().is_empty());
        assert_eq!(ctx.stats().acknowledged, 2);
    }

    #[test]
    fn test_teardown_cancels_jobs() {
        let (mut ctx, _rx) = active_context();
        let (count, fired) = counter();
        ctx.set_interval(1, Box::new(move |_| {
            *count.lock().unwrap() += 1;
            Ok(())
        }))
        .unwrap();
        ctx.add_module_listener("m", Box::new(|_, _| Ok(()))).unwrap();
        ctx.register_module_callback(Box::new(|_, _| Ok(()))).unwrap();
        ctx.enqueue_promise_job(Box::new(|_| Ok(()))).unwrap();

        ctx.begin_teardown().unwrap();
        assert!(!ctx.is_valid());
        assert!(matches!(
            ctx.run_due_timers(10),
            Err(BridgeError::InvalidContext { .. })
        ));

        ctx.final_drain().unwrap();
        let report = ctx.finish_teardown().unwrap();
        assert_eq!(report.cancelled_timers, 1);
        assert_eq!(report.dropped_listeners, 1);
        assert_eq!(report.dropped_module_callbacks, 1);
        assert_eq!(report.dropped_promise_jobs, 1);
        assert_eq!(fired(), 0);
    }

    #[test]
    fn test_teardown_accepts_commands_until_final_drain() {
        let (mut ctx, _rx) = active_context();
        let (id, native) = ctx.create_element("video").unwrap();

        ctx.begin_teardown().unwrap();
        // A destructor running during teardown
        ctx.dispose_event_target(id, native).unwrap();
        assert!(matches!(
            ctx.set_timeout(1, Box::new(|_| Ok(()))),
            Err(BridgeError::InvalidContext { .. })
        ));

        let batch = ctx.final_drain().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.commands()[1].kind(), CommandKind::DisposeEventTarget);

        assert!(matches!(
            ctx.append_command(Command::remove_node(id)),
            Err(BridgeError::InvalidContext { .. })
        ));
        assert!(ctx.final_drain().is_err());

        let report = ctx.finish_teardown().unwrap();
        assert_eq!(report.disposals.released, 1);
        assert_eq!(report.evicted_natives, 0);
    }

    #[test]
    fn test_destroyed_context_rejects_everything() {
        let (mut ctx, _rx) = active_context();
        let native = ctx.create_native(NativeObject::event("load")).unwrap();
        let report = ctx.teardown(&mut RecordingHost::new()).unwrap();
        assert_eq!(report.evicted_natives, 1);

        let before = ctx.stats();
        let invalid = |r: Result<()>| matches!(r, Err(BridgeError::InvalidContext { .. }));
        assert!(invalid(ctx.append_command(Command::remove_node(1)).map(|_| ())));
        assert!(invalid(ctx.set_timeout(1, Box::new(|_| Ok(()))).map(|_| ())));
        assert!(invalid(ctx.register_disposal(native)));
        assert!(invalid(ctx.create_native(NativeObject::text("x")).map(|_| ())));
        assert!(invalid(ctx.drain_commands().map(|_| ())));
        assert!(invalid(ctx.acknowledge().map(|_| ())));
        assert!(invalid(ctx.evaluate("1", "x.js", 1).map(|_| ())));
        assert!(matches!(
            ctx.begin_teardown(),
            Err(BridgeError::InvalidTransition { .. })
        ));
        assert_eq!(ctx.stats(), before);
    }

    #[test]
    fn test_allocation_failure_is_fatal() {
        let (signal, _rx) = flush_channel();
        let config = ContextConfig::default()
            .with_initial_command_capacity(2)
            .with_command_capacity_limit(2);
        let mut ctx =
            ExecutionContext::new(ContextId(5), config, NullEngine::boxed(), signal).unwrap();
        ctx.activate().unwrap();

        ctx.append_command(Command::remove_node(1)).unwrap();
        ctx.append_command(Command::remove_node(2)).unwrap();
        assert_eq!(
            ctx.append_command(Command::remove_node(3)),
            Err(BridgeError::AllocationFailure { requested: 4 })
        );
        assert!(!ctx.is_valid());
        assert!(matches!(
            ctx.append_command(Command::remove_node(4)),
            Err(BridgeError::InvalidContext { .. })
        ));

        // Teardown still hands the host what was buffered
        let mut host = RecordingHost::new();
        ctx.teardown(&mut host).unwrap();
        assert_eq!(host.applied(), 2);
    }

    #[cfg(feature = "dump")]
    #[test]
    fn test_dump_leaves_batches_intact() {
        let (mut ctx, _rx) = active_context();
        ctx.append_command(Command::set_style(1, "color", "red")).unwrap();
        ctx.append_command(Command::remove_node(1)).unwrap();
        dump_batch(ctx.id(), &CommandBatch::default());

        let batch = ctx.drain_commands().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.commands()[1].kind(), CommandKind::RemoveNode);

        ctx.begin_teardown().unwrap();
        ctx.append_command(Command::remove_node(2)).unwrap();
        let last = ctx.final_drain().unwrap();
        assert_eq!((last.first_seq(), last.len()), (3, 1));
    }

    #[test]
    fn test_evaluate_runs_checkpoint() {
        let (mut ctx, _rx) = active_context();
        let (count, ran) = counter();
        ctx.enqueue_promise_job(Box::new(move |_| {
            *count.lock().unwrap() += 1;
            Ok(())
        }))
        .unwrap();
        assert_eq!(ctx.evaluate("void 0", "inline.js", 1).unwrap(), NativeValue::Null);
        assert_eq!(ran(), 1);
    }
}
