//! Per-context job registries
//!
//! Timers, module listeners, module callbacks and promise jobs. Every entry
//! is owned by exactly one execution context and dies with it. Callbacks get
//! the owning context back when they run so they can append commands or
//! schedule further work.

mod module;
mod promise;
pub(crate) mod registry;
mod timer;

use crate::command::NativeValue;
use crate::context::ExecutionContext;
use crate::error::ScriptError;

pub use module::{
    ListenerId, ModuleCallbackCoordinator, ModuleCallbackId, ModuleEvent, ModuleListenerContainer,
};
pub use promise::{PromiseId, PromiseJobQueue, RejectedPromises, Rejection};
pub use registry::{HandleRegistry, JobHandle};
pub use timer::{PendingTimer, TimerCoordinator, TimerId};

/// Result of running a script callback
pub type CallbackResult = Result<(), ScriptError>;

/// Timer callback; may run many times for repeating timers
pub type ScriptCallback = Box<dyn FnMut(&mut ExecutionContext) -> CallbackResult + Send>;

/// Listener for host module events
pub type ModuleListener =
    Box<dyn FnMut(&mut ExecutionContext, &ModuleEvent) -> CallbackResult + Send>;

/// Completion of a host module invocation: the module's result or its error message
pub type ModuleCallback =
    Box<dyn FnOnce(&mut ExecutionContext, Result<NativeValue, String>) -> CallbackResult + Send>;

/// Promise reaction job
pub type PromiseJob = Box<dyn FnOnce(&mut ExecutionContext) -> CallbackResult + Send>;
