//! Context identity and lifecycle states

use std::fmt;

/// Identifier of an execution context, unique within a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub i32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an execution context
///
/// ```text
/// Created -> Active -> TearingDown -> Destroyed
///    \_________________^
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// Buffers allocated, engine not started
    Created,
    /// The only state accepting new work
    Active,
    /// Jobs cancelled; commands still accepted until the final drain
    TearingDown,
    /// Engine released; every operation fails
    Destroyed,
}

impl ContextState {
    pub fn can_transition_to(self, next: ContextState) -> bool {
        matches!(
            (self, next),
            (ContextState::Created, ContextState::Active)
                | (ContextState::Created, ContextState::TearingDown)
                | (ContextState::Active, ContextState::TearingDown)
                | (ContextState::TearingDown, ContextState::Destroyed)
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            ContextState::Created => "created",
            ContextState::Active => "active",
            ContextState::TearingDown => "tearing-down",
            ContextState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
