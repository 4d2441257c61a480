//! Byte-stream device boundary.
//!
//! The host (a character device, a FUSE file, a test harness) delivers
//! Open/Write/Read/Release calls, each carrying a [`ContextSlot`] that lives
//! as long as one open file. [`Device`] stores the session handle in that
//! slot on Open, finds the session through it on Write, and finalizes it on
//! Release. Every failure is reported as a negative errno; the detail only
//! goes to the log.

use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::sync::Arc;

use luadrv_config::DeviceConfig;
use luadrv_session::{ExecutionSink, InitFailure, SessionError, SessionHandle, SessionManager};

/// Return value of Open and Release: 0 on success, a negative errno otherwise.
pub type Status = i32;

/// Per-open storage owned by the host and handed back on every call.
///
/// Holds the session handle between Open and Release. Its contents are
/// opaque to the host.
#[derive(Debug, Default)]
pub struct ContextSlot {
    handle: Option<SessionHandle>,
}

impl ContextSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no session is attached (before Open, after Release, or
    /// after a failed Open).
    pub fn is_empty(&self) -> bool {
        self.handle.is_none()
    }
}

/// Map a session error to the negative errno reported to the caller.
pub fn status_for(err: &SessionError) -> Status {
    let errno = match err {
        SessionError::Initialization(InitFailure::Engine(_)) | SessionError::Allocation(_) => {
            libc::ENOMEM
        }
        SessionError::Initialization(_)
        | SessionError::Compile(_)
        | SessionError::Execution(_) => libc::ECANCELED,
        SessionError::CopyFault { .. } => libc::EFAULT,
        SessionError::InvalidHandle(_) => libc::EBADF,
    };
    -errno
}

fn count(n: usize) -> isize {
    isize::try_from(n).unwrap_or(isize::MAX)
}

/// File operations for the script device.
pub struct Device {
    manager: SessionManager,
}

impl Device {
    /// Build a device whose results go to the log.
    pub fn new(config: &DeviceConfig) -> Result<Self, SessionError> {
        Ok(Self::with_manager(SessionManager::new(config)?))
    }

    /// Build a device whose results go to `sink`.
    pub fn with_sink(
        config: &DeviceConfig,
        sink: Arc<dyn ExecutionSink>,
    ) -> Result<Self, SessionError> {
        Ok(Self::with_manager(SessionManager::with_sink(config, sink)?))
    }

    pub fn with_manager(manager: SessionManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Open callback: create a session and remember it in `slot`.
    ///
    /// Returns `-ENOMEM` if the engine could not allocate, `-ECANCELED` if
    /// the interpreter could not be set up, and `-EBUSY` if `slot` already
    /// holds a session.
    pub fn open(&self, slot: &mut ContextSlot) -> Status {
        log::debug!("[{}] open callback", self.manager.name());
        if !slot.is_empty() {
            return -libc::EBUSY;
        }
        match self.manager.create() {
            Ok(handle) => {
                slot.handle = Some(handle);
                0
            }
            Err(e) => status_for(&e),
        }
    }

    /// Write callback: append `buf` to the session's script source.
    ///
    /// Returns the number of bytes accepted (always all of them) or a
    /// negative errno.
    pub fn write(&self, slot: &ContextSlot, buf: &[u8]) -> isize {
        log::debug!("[{}] write callback", self.manager.name());
        let result = slot
            .handle
            .ok_or_else(|| self.detached())
            .and_then(|h| self.manager.append(h, buf));
        match result {
            Ok(n) => count(n),
            Err(e) => status_for(&e) as isize,
        }
    }

    /// Write callback for hosts that hand over a reader instead of a slice.
    ///
    /// A reader that fails or ends before `len` bytes yields `-EFAULT`, and
    /// none of this call's bytes are kept.
    pub fn write_from<R: Read + ?Sized>(
        &self,
        slot: &ContextSlot,
        reader: &mut R,
        len: usize,
    ) -> isize {
        log::debug!("[{}] write callback", self.manager.name());
        let result = slot
            .handle
            .ok_or_else(|| self.detached())
            .and_then(|h| self.manager.append_from(h, reader, len));
        match result {
            Ok(n) => count(n),
            Err(e) => status_for(&e) as isize,
        }
    }

    /// Read callback: always end-of-file for an open session.
    pub fn read(&self, slot: &ContextSlot, buf: &mut [u8]) -> isize {
        let result = slot
            .handle
            .ok_or_else(|| self.detached())
            .and_then(|h| self.manager.read(h, buf));
        match result {
            Ok(n) => count(n),
            Err(e) => status_for(&e) as isize,
        }
    }

    /// Release callback: compile and run the accumulated script, then tear
    /// the session down.
    ///
    /// Returns 0 if both stages succeeded and a negative errno otherwise.
    /// The slot is emptied in every case, so a second release yields `-EBADF`.
    pub fn release(&self, slot: &mut ContextSlot) -> Status {
        log::debug!("[{}] release callback", self.manager.name());
        let Some(handle) = slot.handle.take() else {
            return status_for(&self.detached());
        };
        match self.manager.close(handle) {
            Ok(()) => 0,
            Err(e) => status_for(&e),
        }
    }

    /// Dispatch a single event against `slots`, returning the callback's result.
    pub fn dispatch(&self, slots: &mut HashMap<FileId, ContextSlot>, event: DeviceEvent) -> isize {
        match event {
            DeviceEvent::Open { file } => {
                let slot = slots.entry(file).or_default();
                let status = self.open(slot);
                if slot.is_empty() {
                    slots.remove(&file);
                }
                status as isize
            }
            DeviceEvent::Write { file, data } => match slots.get(&file) {
                Some(slot) => self.write(slot, &data),
                None => -libc::EBADF as isize,
            },
            DeviceEvent::Read { file, len } => match slots.get(&file) {
                Some(slot) => self.read(slot, &mut vec![0; len]),
                None => -libc::EBADF as isize,
            },
            DeviceEvent::Release { file } => match slots.remove(&file) {
                Some(mut slot) => self.release(&mut slot) as isize,
                None => -libc::EBADF as isize,
            },
        }
    }

    /// Drain `source`, dispatching each event and reporting each result back.
    ///
    /// Files the source opened but never released are released once the
    /// source is exhausted, so every session is torn down. Returns the
    /// number of events handled.
    pub fn serve<S: EventSource + ?Sized>(&self, source: &mut S) -> usize {
        let mut slots: HashMap<FileId, ContextSlot> = HashMap::new();
        let mut handled = 0;

        while let Some(event) = source.next_event() {
            let file = event.file();
            let kind = event.kind();
            let ret = self.dispatch(&mut slots, event);
            source.complete(Completion { file, kind, ret });
            handled += 1;
        }

        if !slots.is_empty() {
            log::warn!(
                "[{}] event source ended with {} file(s) still open; releasing",
                self.manager.name(),
                slots.len()
            );
            let mut leftover: Vec<_> = slots.into_iter().collect();
            leftover.sort_by_key(|(file, _)| *file);
            for (file, mut slot) in leftover {
                let ret = self.release(&mut slot) as isize;
                source.complete(Completion {
                    file,
                    kind: EventKind::Release,
                    ret,
                });
            }
        }

        handled
    }

    fn detached(&self) -> SessionError {
        log::warn!("[{}] call on a file with no session", self.manager.name());
        SessionError::InvalidHandle(SessionHandle::DETACHED)
    }
}

/// Host-side identifier of one open file.
pub type FileId = u64;

/// A file operation delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Open { file: FileId },
    Write { file: FileId, data: Vec<u8> },
    Read { file: FileId, len: usize },
    Release { file: FileId },
}

/// The kind of a [`DeviceEvent`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Open,
    Write,
    Read,
    Release,
}

impl DeviceEvent {
    pub fn file(&self) -> FileId {
        match self {
            DeviceEvent::Open { file }
            | DeviceEvent::Write { file, .. }
            | DeviceEvent::Read { file, .. }
            | DeviceEvent::Release { file } => *file,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            DeviceEvent::Open { .. } => EventKind::Open,
            DeviceEvent::Write { .. } => EventKind::Write,
            DeviceEvent::Read { .. } => EventKind::Read,
            DeviceEvent::Release { .. } => EventKind::Release,
        }
    }
}

/// Result of one dispatched event, as reported back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub file: FileId,
    pub kind: EventKind,
    pub ret: isize,
}

/// Something that produces file operations for the device to serve.
pub trait EventSource {
    /// Next event, or `None` once the source is exhausted.
    fn next_event(&mut self) -> Option<DeviceEvent>;

    /// Called with the result of every dispatched event.
    fn complete(&mut self, completion: Completion);
}

/// An in-memory event source: a fixed queue of events and a log of completions.
#[derive(Debug, Default)]
pub struct ScriptedEvents {
    pending: VecDeque<DeviceEvent>,
    completions: Vec<Completion>,
}

impl ScriptedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: DeviceEvent) -> &mut Self {
        self.pending.push_back(event);
        self
    }

    /// Queue Open, one Write per chunk of `source`, then Release, all for `file`.
    pub fn push_script(&mut self, file: FileId, source: &[u8], chunk_size: usize) -> &mut Self {
        self.push(DeviceEvent::Open { file });
        for chunk in source.chunks(chunk_size.max(1)) {
            self.push(DeviceEvent::Write {
                file,
                data: chunk.to_vec(),
            });
        }
        self.push(DeviceEvent::Release { file })
    }

    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    /// Result of the Release for `file`, if one was dispatched.
    pub fn release_status(&self, file: FileId) -> Option<isize> {
        self.completions
            .iter()
            .rev()
            .find(|c| c.file == file && c.kind == EventKind::Release)
            .map(|c| c.ret)
    }
}

impl EventSource for ScriptedEvents {
    fn next_event(&mut self) -> Option<DeviceEvent> {
        self.pending.pop_front()
    }

    fn complete(&mut self, completion: Completion) {
        self.completions.push(completion);
    }
}
