//! Context configuration

use crate::command::CommandBuffer;

/// Tunables of an execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Commands the buffer holds before its first growth
    pub initial_command_capacity: usize,
    /// Growth past this many commands is treated as allocation failure
    pub command_capacity_limit: Option<usize>,
    /// Context backs a dedicated (worker-like) environment; forwarded to the host
    pub dedicated: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            initial_command_capacity: CommandBuffer::DEFAULT_CAPACITY,
            command_capacity_limit: None,
            dedicated: false,
        }
    }
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial buffer capacity (clamped to at least 1)
    pub fn with_initial_command_capacity(mut self, capacity: usize) -> Self {
        self.initial_command_capacity = capacity.max(1);
        self
    }

    pub fn with_command_capacity_limit(mut self, limit: usize) -> Self {
        self.command_capacity_limit = Some(limit);
        self
    }

    pub fn with_dedicated(mut self, dedicated: bool) -> Self {
        self.dedicated = dedicated;
        self
    }
}
