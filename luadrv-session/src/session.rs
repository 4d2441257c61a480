//! A single Open-to-Close session.

use std::fmt;
use std::io::Read;

use parking_lot::{Mutex, MutexGuard};

use crate::buffer::ScriptBuffer;
use crate::error::SessionError;
use crate::interpreter::Interpreter;

/// Opaque identifier for a session, stored in the device's per-open context slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// Never assigned to a session. Reported when a call arrives on a file
    /// that has no session attached.
    pub const DETACHED: SessionHandle = SessionHandle(0);

    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which half of finalize is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeStage {
    Compile,
    Execute,
}

/// Lifecycle state. Transitions only move forward:
/// `Open -> Finalizing(Compile) -> Finalizing(Execute) -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Finalizing(FinalizeStage),
    Closed,
}

/// One script buffer and one interpreter, guarded by a lock private to the session.
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    inner: Mutex<SessionInner>,
}

#[derive(Debug)]
pub(crate) struct SessionInner {
    pub(crate) state: SessionState,
    pub(crate) buffer: Option<ScriptBuffer>,
    pub(crate) interpreter: Option<Interpreter>,
}

impl Session {
    pub(crate) fn new(handle: SessionHandle, interpreter: Interpreter, buffer: ScriptBuffer) -> Self {
        Self {
            handle,
            inner: Mutex::new(SessionInner {
                state: SessionState::Open,
                buffer: Some(buffer),
                interpreter: Some(interpreter),
            }),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Current lifecycle state. Blocks while another thread holds the
    /// session lock (a write or a running finalize).
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Append a whole chunk to the script source.
    ///
    /// # Errors
    /// [`SessionError::InvalidHandle`] once finalize has begun, or
    /// [`SessionError::Allocation`] if the buffer cannot grow.
    pub fn append(&self, chunk: &[u8]) -> Result<usize, SessionError> {
        let mut inner = self.inner.lock();
        inner.writable_buffer(self.handle)?.append(chunk)
    }

    /// Append exactly `len` bytes read from `reader`.
    ///
    /// A transfer fault discards whatever this call had already copied.
    pub fn append_from<R: Read + ?Sized>(
        &self,
        reader: &mut R,
        len: usize,
    ) -> Result<usize, SessionError> {
        let mut inner = self.inner.lock();
        inner.writable_buffer(self.handle)?.append_from(reader, len)
    }

    /// Length of the source accumulated so far.
    pub fn source_len(&self) -> Result<usize, SessionError> {
        let mut inner = self.inner.lock();
        Ok(inner.writable_buffer(self.handle)?.len())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock()
    }
}

impl SessionInner {
    fn writable_buffer(&mut self, handle: SessionHandle) -> Result<&mut ScriptBuffer, SessionError> {
        match (self.state, self.buffer.as_mut()) {
            (SessionState::Open, Some(buffer)) => Ok(buffer),
            _ => Err(SessionError::InvalidHandle(handle)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::InstanceTracker;

    fn open_session(limit: Option<usize>) -> Session {
        let tracker = InstanceTracker::new();
        let interp = Interpreter::new(&[], &tracker).unwrap();
        Session::new(SessionHandle::new(7), interp, ScriptBuffer::with_limit(limit))
    }

    #[test]
    fn test_new_session_is_open_and_empty() {
        let session = open_session(None);
        assert_eq!(session.handle().as_u64(), 7);
        assert_eq!(session.handle().to_string(), "#7");
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.source_len().unwrap(), 0);
    }

    #[test]
    fn test_append_grows_source() {
        let session = open_session(None);
        assert_eq!(session.append(b"return ").unwrap(), 7);
        let mut reader: &[u8] = b"1";
        assert_eq!(session.append_from(&mut reader, 1).unwrap(), 1);
        assert_eq!(session.source_len().unwrap(), 8);
    }

    #[test]
    fn test_append_rejected_after_open() {
        let session = open_session(None);
        session.lock().state = SessionState::Finalizing(FinalizeStage::Compile);
        assert!(matches!(
            session.append(b"x"),
            Err(SessionError::InvalidHandle(h)) if h == session.handle()
        ));
    }
}
