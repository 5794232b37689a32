//! Native objects and their handles
//!
//! Everything a command may point at lives here, owned by the execution
//! context's slot table.

mod object;
mod slots;

pub use object::{
    release_native, NativeCharacterData, NativeElement, NativeEvent, NativeKind,
    NativeMediaErrorEvent, NativeObject, NativePath2D, ReleaseCounts,
};
pub use slots::{NativeHandle, SlotTable};
