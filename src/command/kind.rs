//! Command kinds
//!
//! The discriminants are part of the wire format shared with the host and
//! must never be renumbered.

use std::fmt;

/// Kind of a UI command
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    StartRecordingCommand = 0,
    CreateElement = 1,
    CreateTextNode = 2,
    CreateComment = 3,
    CreateDocumentFragment = 4,
    CreateSvgElement = 5,
    CreateElementNs = 6,
    DisposeEventTarget = 7,
    AddEvent = 8,
    RemoveEvent = 9,
    InsertAdjacentNode = 10,
    RemoveNode = 11,
    CloneNode = 12,
    SetStyle = 13,
    ClearStyle = 14,
    SetProperty = 15,
    RemoveProperty = 16,
    SetAttribute = 17,
    RemoveAttribute = 18,
    FinishRecordingCommand = 19,
}

impl CommandKind {
    pub const COUNT: usize = 20;

    const ALL: [CommandKind; Self::COUNT] = [
        CommandKind::StartRecordingCommand,
        CommandKind::CreateElement,
        CommandKind::CreateTextNode,
        CommandKind::CreateComment,
        CommandKind::CreateDocumentFragment,
        CommandKind::CreateSvgElement,
        CommandKind::CreateElementNs,
        CommandKind::DisposeEventTarget,
        CommandKind::AddEvent,
        CommandKind::RemoveEvent,
        CommandKind::InsertAdjacentNode,
        CommandKind::RemoveNode,
        CommandKind::CloneNode,
        CommandKind::SetStyle,
        CommandKind::ClearStyle,
        CommandKind::SetProperty,
        CommandKind::RemoveProperty,
        CommandKind::SetAttribute,
        CommandKind::RemoveAttribute,
        CommandKind::FinishRecordingCommand,
    ];

    /// Decode a wire discriminant
    #[inline]
    pub fn from_i32(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Wire discriminant
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Name used by the host protocol and in logs
    pub const fn name(self) -> &'static str {
        match self {
            CommandKind::StartRecordingCommand => "startRecordingCommand",
            CommandKind::CreateElement => "createElement",
            CommandKind::CreateTextNode => "createTextNode",
            CommandKind::CreateComment => "createComment",
            CommandKind::CreateDocumentFragment => "createDocumentFragment",
            CommandKind::CreateSvgElement => "createSVGElement",
            CommandKind::CreateElementNs => "createElementNS",
            CommandKind::DisposeEventTarget => "disposeEventTarget",
            CommandKind::AddEvent => "addEvent",
            CommandKind::RemoveEvent => "removeEvent",
            CommandKind::InsertAdjacentNode => "insertAdjacentNode",
            CommandKind::RemoveNode => "removeNode",
            CommandKind::CloneNode => "cloneNode",
            CommandKind::SetStyle => "setStyle",
            CommandKind::ClearStyle => "clearStyle",
            CommandKind::SetProperty => "setProperty",
            CommandKind::RemoveProperty => "removeProperty",
            CommandKind::SetAttribute => "setAttribute",
            CommandKind::RemoveAttribute => "removeAttribute",
            CommandKind::FinishRecordingCommand => "finishRecordingCommand",
        }
    }

    /// Look a kind up by its protocol name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Whether this command brings a new native node into existence
    pub const fn is_creation(self) -> bool {
        matches!(
            self,
            CommandKind::CreateElement
                | CommandKind::CreateTextNode
                | CommandKind::CreateComment
                | CommandKind::CreateDocumentFragment
                | CommandKind::CreateSvgElement
                | CommandKind::CreateElementNs
                | CommandKind::CloneNode
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
