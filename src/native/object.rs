//! Native objects referenced by commands
//!
//! Each object kind has exactly one release function. Disposal records carry
//! the kind tag instead of a type-erased destructor, and
//! [`release_native`] dispatches on it.

use super::slots::{NativeHandle, SlotTable};
use crate::command::NativeString;
use crate::error::{BridgeError, Result};
use log::trace;
use std::fmt;

/// Kind tag of a native object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeKind {
    Element,
    TextNode,
    Comment,
    DocumentFragment,
    Event,
    MediaErrorEvent,
    Path2D,
}

impl NativeKind {
    pub const COUNT: usize = 7;

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            NativeKind::Element => "element",
            NativeKind::TextNode => "text",
            NativeKind::Comment => "comment",
            NativeKind::DocumentFragment => "fragment",
            NativeKind::Event => "event",
            NativeKind::MediaErrorEvent => "media-error-event",
            NativeKind::Path2D => "path2d",
        }
    }
}

impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Native side of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeElement {
    pub tag_name: NativeString,
}

/// Native side of a text or comment node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCharacterData {
    pub data: NativeString,
}

/// Native side of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEvent {
    pub event_type: NativeString,
}

/// Native side of a media error event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeMediaErrorEvent {
    pub event: NativeEvent,
    pub code: i64,
    pub message: Option<NativeString>,
}

/// Native side of a Path2D
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativePath2D {
    /// Flattened path ops as recorded by the canvas binding
    pub ops: Vec<f64>,
}

/// A native object stored in a context's slot table
#[derive(Debug, Clone, PartialEq)]
pub enum NativeObject {
    Element(NativeElement),
    TextNode(NativeCharacterData),
    Comment(NativeCharacterData),
    DocumentFragment,
    Event(NativeEvent),
    MediaErrorEvent(NativeMediaErrorEvent),
    Path2D(NativePath2D),
}

impl NativeObject {
    pub fn element(tag_name: impl Into<NativeString>) -> Self {
        NativeObject::Element(NativeElement {
            tag_name: tag_name.into(),
        })
    }

    pub fn text(data: impl Into<NativeString>) -> Self {
        NativeObject::TextNode(NativeCharacterData { data: data.into() })
    }

    pub fn comment(data: impl Into<NativeString>) -> Self {
        NativeObject::Comment(NativeCharacterData { data: data.into() })
    }

    pub fn event(event_type: impl Into<NativeString>) -> Self {
        NativeObject::Event(NativeEvent {
            event_type: event_type.into(),
        })
    }

    pub fn kind(&self) -> NativeKind {
        match self {
            NativeObject::Element(_) => NativeKind::Element,
            NativeObject::TextNode(_) => NativeKind::TextNode,
            NativeObject::Comment(_) => NativeKind::Comment,
            NativeObject::DocumentFragment => NativeKind::DocumentFragment,
            NativeObject::Event(_) => NativeKind::Event,
            NativeObject::MediaErrorEvent(_) => NativeKind::MediaErrorEvent,
            NativeObject::Path2D(_) => NativeKind::Path2D,
        }
    }
}

/// Per-kind release counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseCounts {
    counts: [u64; NativeKind::COUNT],
}

impl ReleaseCounts {
    #[inline]
    pub fn get(&self, kind: NativeKind) -> u64 {
        self.counts[kind.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn bump(&mut self, kind: NativeKind) {
        self.counts[kind.index()] += 1;
    }
}

fn release_element(handle: NativeHandle, element: NativeElement) {
    trace!("release <{}> {}", element.tag_name, handle);
}

fn release_character_data(handle: NativeHandle, node: NativeCharacterData) {
    trace!("release character data ({} bytes) {}", node.data.len(), handle);
}

fn release_event(handle: NativeHandle, event: NativeEvent) {
    trace!("release event '{}' {}", event.event_type, handle);
}

fn release_media_error_event(handle: NativeHandle, event: NativeMediaErrorEvent) {
    trace!("release media error event code={} {}", event.code, handle);
    release_event(handle, event.event);
}

fn release_path(handle: NativeHandle, path: NativePath2D) {
    trace!("release path2d ({} ops) {}", path.ops.len(), handle);
}

/// Release the object behind `handle`
///
/// The object is evicted from `slots` (invalidating the handle) and handed to
/// the release function of `kind`.
pub fn release_native(
    slots: &mut SlotTable<NativeObject>,
    handle: NativeHandle,
    kind: NativeKind,
    counts: &mut ReleaseCounts,
) -> Result<()> {
    let object = slots
        .remove(handle)
        .ok_or(BridgeError::StaleHandle(handle))?;
    debug_assert_eq!(object.kind(), kind, "disposal tagged with the wrong kind");

    let actual = object.kind();
    match object {
        NativeObject::Element(element) => release_element(handle, element),
        NativeObject::TextNode(node) | NativeObject::Comment(node) => {
            release_character_data(handle, node)
        }
        NativeObject::DocumentFragment => trace!("release fragment {}", handle),
        NativeObject::Event(event) => release_event(handle, event),
        NativeObject::MediaErrorEvent(event) => release_media_error_event(handle, event),
        NativeObject::Path2D(path) => release_path(handle, path),
    }
    counts.bump(actual);
    Ok(())
}
