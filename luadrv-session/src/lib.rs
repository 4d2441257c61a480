//! Session lifecycle and execution pipeline for the luadrv script device.
//!
//! A session accumulates written bytes into a [`ScriptBuffer`] and owns one
//! Lua [`Interpreter`] for its whole life. Closing the session runs the
//! [`ExecutionPipeline`]: the buffer is compiled with the interpreter's
//! `load` function, the resulting chunk is called, the outcome is reported to
//! an [`ExecutionSink`], and both the buffer and the interpreter are
//! released.

pub mod buffer;
pub mod error;
pub mod extensions;
pub mod interpreter;
pub mod manager;
pub mod pipeline;
pub mod session;
pub mod sink;

/// Re-exported so [`Extension`] implementations can name engine types.
pub use mlua;

pub use buffer::ScriptBuffer;
pub use error::{InitFailure, SessionError};
pub use extensions::Extension;
pub use interpreter::{InstanceTracker, Interpreter};
pub use manager::SessionManager;
pub use pipeline::{ExecutionPipeline, ExecutionResult, Outcome};
pub use session::{FinalizeStage, Session, SessionHandle, SessionState};
pub use sink::{ExecutionSink, LogSink, MemorySink};
