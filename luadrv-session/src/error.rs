//! Typed error types for luadrv-session.
//!
//! Every variant is terminal for the operation that produced it; nothing in
//! this crate retries.

use luadrv_config::ExtensionName;
use thiserror::Error;

use crate::session::SessionHandle;

/// Errors surfaced by session creation, writes, and finalize.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session's interpreter could not be set up. No session was
    /// registered and no handle was produced.
    #[error("interpreter initialization failed: {0}")]
    Initialization(#[from] InitFailure),

    /// The script buffer could not grow to hold the chunk.
    #[error("buffer allocation failed: {0}")]
    Allocation(String),

    /// The chunk could not be read from its source. Nothing from the chunk
    /// remains in the buffer.
    #[error("copy fault after {copied} of {expected} bytes: {source}")]
    CopyFault {
        /// Bytes transferred before the fault was detected.
        copied: usize,
        /// Bytes the caller announced.
        expected: usize,
        /// Underlying transfer error.
        #[source]
        source: std::io::Error,
    },

    /// The accumulated source did not compile.
    #[error("load error: {0}")]
    Compile(String),

    /// The compiled chunk raised an error while running.
    #[error("execution error: {0}")]
    Execution(String),

    /// The handle is unknown, or its session has already been finalized.
    #[error("invalid session handle {0}")]
    InvalidHandle(SessionHandle),
}

/// Why an interpreter instance could not be created.
#[derive(Debug, Error)]
pub enum InitFailure {
    /// The engine itself failed to allocate a new state.
    #[error("engine could not allocate a new state: {0}")]
    Engine(#[source] mlua::Error),

    /// The global `load` function is missing or is not callable.
    #[error("load function not found")]
    MissingLoad,

    /// The configuration enables an extension module this build lacks.
    #[error("extension module '{0}' is not compiled into this build")]
    UnavailableExtension(ExtensionName),

    /// An extension module raised an error while registering itself.
    #[error("extension module '{name}' failed to register: {source}")]
    Extension {
        /// Module name.
        name: String,
        /// Error raised by the module's setup.
        #[source]
        source: mlua::Error,
    },
}

impl SessionError {
    /// True when the failure came from running out of memory, either in the
    /// engine or in the script buffer.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self,
            SessionError::Allocation(_) | SessionError::Initialization(InitFailure::Engine(_))
        )
    }
}
