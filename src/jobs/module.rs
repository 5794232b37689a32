//! Module listeners and module callbacks
//!
//! Listeners are registered by script for events a host module emits and
//! stay until removed. Module callbacks are the one-shot completions passed
//! to a host module invocation.

use super::registry::{job_handle, HandleRegistry};
use super::{ModuleCallback, ModuleListener};
use crate::command::{NativeString, NativeValue};
use log::debug;

job_handle!(
    /// Handle of a module listener
    ListenerId,
    "listener"
);

job_handle!(
    /// Handle of a pending module callback
    ModuleCallbackId,
    "module-callback"
);

/// Event emitted by a host module
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleEvent {
    pub module: NativeString,
    pub payload: NativeValue,
}

struct ListenerEntry {
    module: NativeString,
    /// `None` while the listener is running
    listener: Option<ModuleListener>,
}

/// Listeners keyed by handle, dispatched by module name
#[derive(Default)]
pub struct ModuleListenerContainer {
    listeners: HandleRegistry<ListenerId, ListenerEntry>,
}

impl ModuleListenerContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, module: impl Into<NativeString>, listener: ModuleListener) -> ListenerId {
        self.listeners.insert(ListenerEntry {
            module: module.into(),
            listener: Some(listener),
        })
    }

    /// Remove a listener; unknown handles are ignored
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(id).is_some();
        if !removed {
            debug!("removal of inactive {} ignored", id);
        }
        removed
    }

    /// Listeners registered for `module`, in registration order
    pub fn listeners_for(&self, module: &str) -> Vec<ListenerId> {
        self.listeners
            .handles_where(|entry| &*entry.module == module && entry.listener.is_some())
    }

    /// Take a listener out for invocation
    pub fn begin_dispatch(&mut self, id: ListenerId) -> Option<ModuleListener> {
        self.listeners.get_mut(id)?.listener.take()
    }

    /// Put a listener back; dropped if it was removed while running
    pub fn finish_dispatch(&mut self, id: ListenerId, listener: ModuleListener) {
        if let Some(entry) = self.listeners.get_mut(id)
            && entry.listener.is_none()
        {
            entry.listener = Some(listener);
        }
    }

    #[inline]
    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.contains(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Drop every listener (context teardown)
    pub fn clear(&mut self) -> usize {
        self.listeners.clear()
    }
}

/// Pending one-shot callbacks of host module invocations
#[derive(Default)]
pub struct ModuleCallbackCoordinator {
    callbacks: HandleRegistry<ModuleCallbackId, ModuleCallback>,
}

impl ModuleCallbackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: ModuleCallback) -> ModuleCallbackId {
        self.callbacks.insert(callback)
    }

    /// Remove a callback without running it; unknown handles are ignored
    pub fn cancel(&mut self, id: ModuleCallbackId) -> bool {
        let removed = self.callbacks.remove(id).is_some();
        if !removed {
            debug!("cancel of inactive {} ignored", id);
        }
        removed
    }

    /// Take a callback for its single invocation
    pub fn take(&mut self, id: ModuleCallbackId) -> Option<ModuleCallback> {
        self.callbacks.remove(id)
    }

    #[inline]
    pub fn contains(&self, id: ModuleCallbackId) -> bool {
        self.callbacks.contains(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Drop every callback (context teardown)
    pub fn clear(&mut self) -> usize {
        self.callbacks.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener() -> ModuleListener {
        Box::new(|_, _| Ok(()))
    }

    #[test]
    fn test_listeners_for_module_in_order() {
        let mut container = ModuleListenerContainer::new();
        let a = container.add("geolocation", listener());
        let _other = container.add("clipboard", listener());
        let b = container.add("geolocation", listener());
        assert_eq!(container.listeners_for("geolocation"), vec![a, b]);
        assert!(container.listeners_for("missing").is_empty());
    }

    #[test]
    fn test_removed_while_dispatching() {
        let mut container = ModuleListenerContainer::new();
        let id = container.add("m", listener());
        let taken = container.begin_dispatch(id).unwrap();
        assert!(container.listeners_for("m").is_empty());
        assert!(container.remove(id));
        container.finish_dispatch(id, taken);
        assert!(!container.contains(id));
        assert!(!container.remove(id));
    }

    #[test]
    fn test_module_callback_is_one_shot() {
        let mut callbacks = ModuleCallbackCoordinator::new();
        let id = callbacks.register(Box::new(|_, _| Ok(())));
        assert!(callbacks.take(id).is_some());
        assert!(callbacks.take(id).is_none());
        assert!(!callbacks.cancel(id));
    }

    #[test]
    fn test_clear() {
        let mut callbacks = ModuleCallbackCoordinator::new();
        callbacks.register(Box::new(|_, _| Ok(())));
        callbacks.register(Box::new(|_, _| Ok(())));
        assert_eq!(callbacks.clear(), 2);
        assert!(callbacks.is_empty());
    }
}
