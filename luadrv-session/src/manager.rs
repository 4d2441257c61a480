//! Registry of open sessions, keyed by opaque handle.
//!
//! [`SessionManager`] creates a [`Session`] per Open, routes writes to it by
//! [`SessionHandle`], runs the [`ExecutionPipeline`] at Close, and forgets the
//! session afterwards. Sessions never share a buffer, an interpreter, or a lock.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use luadrv_config::DeviceConfig;
use parking_lot::RwLock;

use crate::buffer::ScriptBuffer;
use crate::error::{InitFailure, SessionError};
use crate::extensions::{self, Extension};
use crate::interpreter::{InstanceTracker, Interpreter};
use crate::pipeline::ExecutionPipeline;
use crate::session::{Session, SessionHandle, SessionState};
use crate::sink::{ExecutionSink, LogSink};

/// Creates, looks up, finalizes, and discards sessions.
///
/// All methods take `&self`; the manager can be shared between threads that
/// each drive their own sessions.
pub struct SessionManager {
    /// Device name used as the log prefix.
    name: String,
    /// Next handle value to assign.
    next_handle: AtomicU64,
    /// Sessions that have been opened and not yet destroyed.
    sessions: RwLock<HashMap<SessionHandle, Arc<Session>>>,
    /// Modules registered into every new interpreter, in order.
    extensions: Vec<Arc<dyn Extension>>,
    /// Per-session source cap.
    max_source_bytes: Option<usize>,
    tracker: InstanceTracker,
    pipeline: ExecutionPipeline,
}

impl SessionManager {
    /// Create a manager that reports results through the `log` facade.
    ///
    /// # Errors
    /// Returns [`SessionError::Initialization`] if the configuration enables
    /// an extension module this build does not include.
    pub fn new(config: &DeviceConfig) -> Result<Self, SessionError> {
        Self::with_sink(config, Arc::new(LogSink::new(config.device_name.clone())))
    }

    /// Create a manager that reports results to `sink`.
    pub fn with_sink(
        config: &DeviceConfig,
        sink: Arc<dyn ExecutionSink>,
    ) -> Result<Self, SessionError> {
        let extensions = config
            .extensions
            .iter()
            .map(|&name| extensions::builtin(name).ok_or(InitFailure::UnavailableExtension(name)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.device_name.clone(),
            next_handle: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
            extensions,
            max_source_bytes: config.max_source_bytes,
            tracker: InstanceTracker::new(),
            pipeline: ExecutionPipeline::new(sink),
        })
    }

    /// Add a module to be registered into every interpreter created after this call.
    pub fn register_extension(&mut self, extension: Arc<dyn Extension>) {
        self.extensions.push(extension);
    }

    /// Open a new session with a fresh interpreter and an empty buffer.
    ///
    /// # Errors
    /// Returns [`SessionError::Initialization`] if the interpreter cannot be
    /// created. No session is registered in that case.
    pub fn create(&self) -> Result<SessionHandle, SessionError> {
        let interpreter = Interpreter::new(&self.extensions, &self.tracker).inspect_err(|e| {
            log::error!("[{}] open failed: {}", self.name, e);
        })?;

        let handle = SessionHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let buffer = ScriptBuffer::with_limit(self.max_source_bytes);
        let session = Arc::new(Session::new(handle, interpreter, buffer));
        self.sessions.write().insert(handle, session);

        log::info!("[{}] session {} opened", self.name, handle);
        Ok(handle)
    }

    /// Resolve `handle` to its session.
    ///
    /// # Errors
    /// [`SessionError::InvalidHandle`] if the handle is unknown or its
    /// session has already been finalized.
    pub fn lookup(&self, handle: SessionHandle) -> Result<Arc<Session>, SessionError> {
        let session = self
            .sessions
            .read()
            .get(&handle)
            .cloned()
            .ok_or(SessionError::InvalidHandle(handle))?;

        if session.state() == SessionState::Closed {
            return Err(SessionError::InvalidHandle(handle));
        }
        Ok(session)
    }

    /// Append `chunk` to the session's script source.
    pub fn append(&self, handle: SessionHandle, chunk: &[u8]) -> Result<usize, SessionError> {
        log::debug!("[{}] session {} write of {} bytes", self.name, handle, chunk.len());
        self.lookup(handle)?.append(chunk).inspect_err(|e| {
            log::warn!("[{}] session {} write failed: {}", self.name, handle, e);
        })
    }

    /// Append exactly `len` bytes read from `reader` to the session's script source.
    pub fn append_from<R: Read + ?Sized>(
        &self,
        handle: SessionHandle,
        reader: &mut R,
        len: usize,
    ) -> Result<usize, SessionError> {
        log::debug!("[{}] session {} write of {} bytes", self.name, handle, len);
        self.lookup(handle)?
            .append_from(reader, len)
            .inspect_err(|e| {
                log::warn!("[{}] session {} write failed: {}", self.name, handle, e);
            })
    }

    /// Reads never return data; script results only reach the execution sink.
    pub fn read(&self, handle: SessionHandle, _buf: &mut [u8]) -> Result<usize, SessionError> {
        self.lookup(handle)?;
        Ok(0)
    }

    /// Run the compile/execute pass for `handle` and release its resources.
    ///
    /// The session stays registered until [`destroy`](Self::destroy).
    pub fn finalize(&self, handle: SessionHandle) -> Result<(), SessionError> {
        let session = self
            .sessions
            .read()
            .get(&handle)
            .cloned()
            .ok_or(SessionError::InvalidHandle(handle))?;
        self.pipeline.finalize(&session)
    }

    /// Remove a finalized session from the registry.
    ///
    /// # Errors
    /// [`SessionError::InvalidHandle`] if the handle is not registered,
    /// including when it was already destroyed.
    pub fn destroy(&self, handle: SessionHandle) -> Result<(), SessionError> {
        let session = self
            .sessions
            .write()
            .remove(&handle)
            .ok_or(SessionError::InvalidHandle(handle))?;

        if session.state() != SessionState::Closed {
            log::warn!(
                "[{}] session {} destroyed before finalize",
                self.name,
                handle
            );
        }
        log::info!("[{}] session {} released", self.name, handle);
        Ok(())
    }

    /// Finalize and destroy `handle`.
    ///
    /// A compile or execute failure is returned after the session has been
    /// removed. A handle that is unknown or already being closed is left alone.
    pub fn close(&self, handle: SessionHandle) -> Result<(), SessionError> {
        let outcome = self.finalize(handle);
        if let Err(SessionError::InvalidHandle(_)) = outcome {
            return outcome;
        }
        self.destroy(handle)?;
        outcome
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Number of interpreter instances currently alive.
    pub fn live_interpreters(&self) -> usize {
        self.tracker.live()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let remaining = self.sessions.get_mut().len();
        if remaining > 0 {
            log::warn!(
                "[{}] dropping {} session(s) that were never closed",
                self.name,
                remaining
            );
        }
    }
}
