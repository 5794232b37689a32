//! Encoded UI command
//!
//! A command is one mutation instruction: a kind, the id of the target node,
//! up to two string arguments and up to two native handles. Once appended a
//! command is never modified; the buffer owns it until it is drained.

use super::kind::CommandKind;
use crate::native::NativeHandle;
use std::fmt;
use std::sync::Arc;

/// Shared immutable string carried by commands
///
/// Reference counted so a drained batch can cross to the host thread without
/// copying payloads.
pub type NativeString = Arc<str>;

/// Identifier of the native node a command targets
pub type TargetId = i64;

/// A single UI command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    target_id: TargetId,
    arg1: Option<NativeString>,
    arg2: Option<NativeString>,
    native_ptr: Option<NativeHandle>,
    native_ptr2: Option<NativeHandle>,
}

impl Command {
    /// Create a command with no arguments
    pub fn new(kind: CommandKind, target_id: TargetId) -> Self {
        Command {
            kind,
            target_id,
            arg1: None,
            arg2: None,
            native_ptr: None,
            native_ptr2: None,
        }
    }

    pub fn with_arg1(mut self, arg: impl Into<NativeString>) -> Self {
        self.arg1 = Some(arg.into());
        self
    }

    pub fn with_arg2(mut self, arg: impl Into<NativeString>) -> Self {
        self.arg2 = Some(arg.into());
        self
    }

    pub fn with_native(mut self, handle: NativeHandle) -> Self {
        self.native_ptr = Some(handle);
        self
    }

    pub fn with_native2(mut self, handle: NativeHandle) -> Self {
        self.native_ptr2 = Some(handle);
        self
    }

    /// `createElement` for `target_id` with the given tag
    pub fn create_element(target_id: TargetId, tag_name: &str, native: NativeHandle) -> Self {
        Command::new(CommandKind::CreateElement, target_id)
            .with_arg1(tag_name)
            .with_native(native)
    }

    /// `createTextNode` carrying the initial data
    pub fn create_text_node(target_id: TargetId, data: &str, native: NativeHandle) -> Self {
        Command::new(CommandKind::CreateTextNode, target_id)
            .with_arg1(data)
            .with_native(native)
    }

    pub fn set_property(target_id: TargetId, key: &str, value: &str) -> Self {
        Command::new(CommandKind::SetProperty, target_id)
            .with_arg1(key)
            .with_arg2(value)
    }

    pub fn remove_property(target_id: TargetId, key: &str) -> Self {
        Command::new(CommandKind::RemoveProperty, target_id).with_arg1(key)
    }

    pub fn set_style(target_id: TargetId, key: &str, value: &str) -> Self {
        Command::new(CommandKind::SetStyle, target_id)
            .with_arg1(key)
            .with_arg2(value)
    }

    pub fn add_event(target_id: TargetId, event_type: &str) -> Self {
        Command::new(CommandKind::AddEvent, target_id).with_arg1(event_type)
    }

    /// `insertAdjacentNode`: insert `node_id` at `position` relative to `target_id`
    pub fn insert_adjacent_node(target_id: TargetId, position: &str, node_id: TargetId) -> Self {
        Command::new(CommandKind::InsertAdjacentNode, target_id)
            .with_arg1(position)
            .with_arg2(node_id.to_string())
    }

    pub fn remove_node(target_id: TargetId) -> Self {
        Command::new(CommandKind::RemoveNode, target_id)
    }

    /// Tell the host the node is gone; references the native object one last time
    pub fn dispose_event_target(target_id: TargetId, native: NativeHandle) -> Self {
        Command::new(CommandKind::DisposeEventTarget, target_id).with_native(native)
    }

    #[inline]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[inline]
    pub fn target_id(&self) -> TargetId {
        self.target_id
    }

    #[inline]
    pub fn arg1(&self) -> Option<&str> {
        self.arg1.as_deref()
    }

    #[inline]
    pub fn arg2(&self) -> Option<&str> {
        self.arg2.as_deref()
    }

    #[inline]
    pub fn native_ptr(&self) -> Option<NativeHandle> {
        self.native_ptr
    }

    #[inline]
    pub fn native_ptr2(&self) -> Option<NativeHandle> {
        self.native_ptr2
    }

    /// Whether either native slot of this command refers to `handle`
    pub fn references(&self, handle: NativeHandle) -> bool {
        self.native_ptr == Some(handle) || self.native_ptr2 == Some(handle)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(id={}", self.kind, self.target_id)?;
        if let Some(arg) = &self.arg1 {
            write!(f, ", {:?}", arg)?;
        }
        if let Some(arg) = &self.arg2 {
            write!(f, ", {:?}", arg)?;
        }
        if let Some(handle) = self.native_ptr {
            write!(f, ", {}", handle)?;
        }
        if let Some(handle) = self.native_ptr2 {
            write!(f, ", {}", handle)?;
        }
        write!(f, ")")
    }
}
