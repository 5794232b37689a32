//! UI commands and the buffer that carries them to the host
//!
//! - `kind`: command kinds and their wire discriminants
//! - `item`: the encoded command
//! - `value`: values for synchronous host calls
//! - `buffer`: the growable, batching command buffer

mod buffer;
mod item;
mod kind;
mod value;

pub use buffer::{Appended, BufferStats, CommandBatch, CommandBuffer};
pub use item::{Command, NativeString, TargetId};
pub use kind::CommandKind;
pub use value::NativeValue;
