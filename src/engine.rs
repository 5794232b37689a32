//! Script engine seam
//!
//! The engine's object model and garbage collector are outside this crate.
//! An execution context only needs to bring an engine up, evaluate source
//! with it and release it at teardown.

use crate::command::NativeValue;
use crate::context::ContextId;
use crate::error::ScriptError;
use log::debug;

/// Script engine instance owned by one execution context
pub trait ScriptEngine: Send {
    /// Create the engine state for `context_id`
    fn initialize(&mut self, context_id: ContextId) -> Result<(), ScriptError>;

    /// Install the global bindings (window, document, timers, ...)
    fn install_bindings(&mut self) -> Result<(), ScriptError>;

    /// Evaluate source text
    fn evaluate(&mut self, source: &str, url: &str, line: u32) -> Result<NativeValue, ScriptError>;

    /// Free the engine; called exactly once, last thing before destruction
    fn release(&mut self);
}

/// Engine that evaluates nothing
///
/// Stands in for a real engine in hosts that drive a context purely through
/// its API (the shell, tests, benchmarks).
#[derive(Debug, Default)]
pub struct NullEngine {
    context_id: Option<ContextId>,
    bindings_installed: bool,
    evaluations: usize,
    released: bool,
}

impl NullEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Box<dyn ScriptEngine> {
        Box::new(Self::new())
    }

    #[inline]
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl ScriptEngine for NullEngine {
    fn initialize(&mut self, context_id: ContextId) -> Result<(), ScriptError> {
        self.context_id = Some(context_id);
        Ok(())
    }

    fn install_bindings(&mut self) -> Result<(), ScriptError> {
        if self.context_id.is_none() {
            return Err(ScriptError::new("bindings installed before initialize"));
        }
        self.bindings_installed = true;
        Ok(())
    }

    fn evaluate(
        &mut self,
        _source: &str,
        url: &str,
        _line: u32,
    ) -> Result<NativeValue, ScriptError> {
        if !self.bindings_installed || self.released {
            return Err(ScriptError::new(format!("{}: engine not running", url)));
        }
        self.evaluations += 1;
        Ok(NativeValue::Null)
    }

    fn release(&mut self) {
        if let Some(id) = self.context_id {
            debug!("null engine of context {} released", id);
        }
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut engine = NullEngine::new();
        assert!(engine.install_bindings().is_err());
        engine.initialize(ContextId(1)).unwrap();
        assert!(engine.evaluate("1", "a.js", 1).is_err());
        engine.install_bindings().unwrap();
        assert_eq!(engine.evaluate("1", "a.js", 1).unwrap(), NativeValue::Null);
        assert_eq!(engine.evaluations(), 1);
        engine.release();
        assert!(engine.is_released());
        assert!(engine.evaluate("1", "a.js", 1).is_err());
    }
}
