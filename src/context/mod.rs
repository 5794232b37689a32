//! Execution contexts
//!
//! An environment in which script executes. Window, document and execution
//! context are 1:1:1 at any point in time; the context exclusively owns the
//! command buffer, the native slot table, the disposal queue and every job
//! registry of that environment.

mod execution;
mod state;

pub use execution::{
    ContextStats, ExceptionHandler, ExecutionContext, PromiseCheckpoint, TeardownReport,
};
pub use state::{ContextId, ContextState};
