//! Error taxonomy for the bridge
//!
//! Invalid-context and allocation failures are reported to the caller.
//! Stale job handles are not errors at all: cancelling or firing an unknown
//! timer/listener/callback is a no-op, because the producer and the host may
//! race benignly on them.

use crate::context::{ContextId, ContextState};
use crate::native::NativeHandle;
use thiserror::Error;

/// Error raised by a script callback or by the script engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        ScriptError {
            message: message.into(),
        }
    }
}

/// Bridge error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Operation against a context that is no longer valid
    #[error("invalid context {id} (state: {state})")]
    InvalidContext { id: ContextId, state: ContextState },

    /// No context is registered under this id
    #[error("unknown context {0}")]
    UnknownContext(ContextId),

    /// Command storage could not grow; fatal for the owning context
    #[error("allocation failure growing command buffer to {requested} items")]
    AllocationFailure { requested: usize },

    /// A disposal would run before the commands referencing its handle were acknowledged
    #[error(
        "ordering violation: release of {handle} registered after command #{registered_after}, \
         host acknowledged only up to #{acknowledged}"
    )]
    OrderingViolation {
        handle: NativeHandle,
        registered_after: u64,
        acknowledged: u64,
    },

    /// Native slot lookup with a handle whose object was already released
    #[error("stale native handle {0}")]
    StaleHandle(NativeHandle),

    /// Lifecycle transition not allowed from the current state
    #[error("context {id}: cannot go from {from} to {to}")]
    InvalidTransition {
        id: ContextId,
        from: ContextState,
        to: ContextState,
    },

    /// Error surfaced from the script side
    #[error("script error: {0}")]
    Script(#[from] ScriptError),
}

/// Bridge failures inside a script callback surface as script errors
impl From<BridgeError> for ScriptError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Script(script) => script,
            other => ScriptError::new(other.to_string()),
        }
    }
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
