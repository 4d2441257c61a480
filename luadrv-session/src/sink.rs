//! Side channel for execution results.
//!
//! Close only ever reports a status code; the result text of a script, or
//! the engine's error message, goes to an [`ExecutionSink`] instead.

use parking_lot::Mutex;

use crate::pipeline::{ExecutionResult, Outcome};
use crate::session::SessionHandle;

/// Receives the result of every finalize pass.
pub trait ExecutionSink: Send + Sync {
    fn record(&self, handle: SessionHandle, result: &ExecutionResult);
}

/// Writes results through the `log` facade, prefixed with the device name.
#[derive(Debug, Clone)]
pub struct LogSink {
    prefix: String,
}

impl LogSink {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ExecutionSink for LogSink {
    fn record(&self, handle: SessionHandle, result: &ExecutionResult) {
        match result.outcome {
            Outcome::Success => log::info!("[{}] session {}: {}", self.prefix, handle, result),
            Outcome::CompileFailure | Outcome::ExecutionFailure => {
                log::error!("[{}] session {}: {}", self.prefix, handle, result)
            }
        }
    }
}

/// Keeps every result in memory, in the order they were recorded.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(SessionHandle, ExecutionResult)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<(SessionHandle, ExecutionResult)> {
        self.records.lock().clone()
    }

    /// The result recorded for `handle`, if its session has been finalized.
    pub fn result_for(&self, handle: SessionHandle) -> Option<ExecutionResult> {
        self.records
            .lock()
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, r)| r.clone())
    }

    /// Drain all recorded results.
    pub fn take(&self) -> Vec<(SessionHandle, ExecutionResult)> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl ExecutionSink for MemorySink {
    fn record(&self, handle: SessionHandle, result: &ExecutionResult) {
        self.records.lock().push((handle, result.clone()));
    }
}
