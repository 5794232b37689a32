//! UIBridge - UI command buffering between script runtimes and a host
//!
//! Script threads record UI mutations into a per-context command buffer; a
//! host thread drains the buffer in batches and applies them to its own
//! rendering tree. Every context also owns the asynchronous work scheduled
//! from script: timers, module listeners and callbacks, promise jobs.
//!
//! # Features
//! - Append-only command buffer, one flush request per batching window
//! - Native object releases deferred until the host acknowledged the
//!   commands referencing them
//! - Generational handles for native objects and job registrations
//! - Context lifecycle: created, active, tearing down, destroyed
//!
//! # Example
//! ```
//! use uibridge::{flush_channel, Command, ContextManager, NullEngine};
//!
//! let (signal, requests) = flush_channel();
//! let manager = ContextManager::new(signal);
//! let id = manager.create(NullEngine::boxed()).unwrap();
//!
//! manager
//!     .with_context(id, |ctx| {
//!         let (target, _native) = ctx.create_element("a")?;
//!         ctx.append_command(Command::set_property(target, "href", "/home"))?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let request = requests.try_recv().unwrap();
//! let batch = manager.drain(request.context_id);
//! assert_eq!(batch.len(), 2);
//! manager.acknowledge(id).unwrap();
//! ```

// Command recording
pub mod command;
pub mod disposal;
pub mod native;

// Contexts and their jobs
pub mod config;
pub mod context;
pub mod jobs;
pub mod manager;

// Seams to the engine and the host
pub mod engine;
pub mod host;
pub mod signal;

pub mod error;

// Re-export main types
pub use command::{Command, CommandBatch, CommandBuffer, CommandKind, NativeValue, TargetId};
pub use config::ContextConfig;
pub use context::{ContextId, ContextState, ExecutionContext};
pub use engine::{NullEngine, ScriptEngine};
pub use error::{BridgeError, Result, ScriptError};
pub use host::{HostBridge, RecordingHost};
pub use manager::ContextManager;
pub use native::{NativeHandle, NativeKind, NativeObject};
pub use signal::{flush_channel, FlushReceiver, FlushRequest, FlushSignal};
