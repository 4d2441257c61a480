//! Compile-then-execute pass run once when a session closes.

use std::fmt;
use std::sync::Arc;

use mlua::{Function, Lua, MultiValue, Value};

use crate::error::SessionError;
use crate::interpreter::Interpreter;
use crate::session::{FinalizeStage, Session, SessionInner, SessionState};
use crate::sink::ExecutionSink;

/// How a finalize pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    CompileFailure,
    ExecutionFailure,
}

/// What a finalize pass produced. Reported to the [`ExecutionSink`] only;
/// the caller of Close sees nothing but a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub outcome: Outcome,
    /// The stringified return value on success, the engine's error text otherwise.
    pub message: String,
}

impl ExecutionResult {
    fn from_outcome(outcome: &Result<String, SessionError>) -> Self {
        match outcome {
            Ok(value) => Self {
                outcome: Outcome::Success,
                message: value.clone(),
            },
            Err(SessionError::Compile(msg)) => Self {
                outcome: Outcome::CompileFailure,
                message: msg.clone(),
            },
            Err(SessionError::Execution(msg)) => Self {
                outcome: Outcome::ExecutionFailure,
                message: msg.clone(),
            },
            Err(other) => Self {
                outcome: Outcome::ExecutionFailure,
                message: other.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            Outcome::Success => write!(f, "final return: {}", self.message),
            Outcome::CompileFailure => write!(f, "load error: {}", self.message),
            Outcome::ExecutionFailure => write!(f, "execution error: {}", self.message),
        }
    }
}

/// Runs finalize for sessions and reports each result to a sink.
#[derive(Clone)]
pub struct ExecutionPipeline {
    sink: Arc<dyn ExecutionSink>,
}

impl ExecutionPipeline {
    pub fn new(sink: Arc<dyn ExecutionSink>) -> Self {
        Self { sink }
    }

    /// Compile and execute the session's accumulated source, then release
    /// its buffer and interpreter.
    ///
    /// Holds the session lock for the whole pass. The buffer and interpreter
    /// are taken out of the session before compiling, so they are dropped
    /// exactly once whichever stage fails. There is no timeout: a script
    /// that never returns blocks this call forever.
    ///
    /// # Errors
    /// - [`SessionError::InvalidHandle`] if finalize already ran (or is
    ///   running) for this session. Nothing is torn down a second time.
    /// - [`SessionError::Compile`] or [`SessionError::Execution`] if the
    ///   corresponding stage failed. Teardown still happened.
    pub fn finalize(&self, session: &Session) -> Result<(), SessionError> {
        let handle = session.handle();
        let mut inner = session.lock();
        if inner.state != SessionState::Open {
            return Err(SessionError::InvalidHandle(handle));
        }
        inner.state = SessionState::Finalizing(FinalizeStage::Compile);

        let interpreter = inner.interpreter.take();
        let buffer = inner.buffer.take();

        let outcome = match (&interpreter, &buffer) {
            (Some(interpreter), Some(buffer)) => run(&mut inner, interpreter, buffer.contents()),
            _ => Err(SessionError::InvalidHandle(handle)),
        };

        drop(interpreter);
        drop(buffer);
        inner.state = SessionState::Closed;
        drop(inner);

        let result = ExecutionResult::from_outcome(&outcome);
        self.sink.record(handle, &result);

        outcome.map(|_| ())
    }
}

fn run(
    inner: &mut SessionInner,
    interpreter: &Interpreter,
    source: &[u8],
) -> Result<String, SessionError> {
    let chunk = compile(interpreter, source)?;
    inner.state = SessionState::Finalizing(FinalizeStage::Execute);
    execute(interpreter, &chunk)
}

/// Call the interpreter's `load` with `source` as a single string argument.
///
/// `load` signals a syntax error by returning `nil, message` rather than
/// raising, so anything other than a function in the first result is a
/// compile failure.
pub fn compile(interpreter: &Interpreter, source: &[u8]) -> Result<Function, SessionError> {
    let text = interpreter
        .lua()
        .create_string(source)
        .map_err(|e| SessionError::Compile(e.to_string()))?;

    let results: MultiValue = interpreter
        .load_fn()
        .call(text)
        .map_err(|e| SessionError::Compile(e.to_string()))?;

    let mut results = results.into_iter();
    match results.next() {
        Some(Value::Function(chunk)) => Ok(chunk),
        _ => {
            let message = match results.next() {
                Some(Value::String(msg)) => msg.to_string_lossy().to_string(),
                _ => "load returned no chunk".to_string(),
            };
            Err(SessionError::Compile(message))
        }
    }
}

/// Call a compiled chunk with no arguments and stringify its first return value.
///
/// Numbers and strings are converted by the engine itself, so floats keep
/// Lua's formatting (`2.0`, `1e+100`).
pub fn execute(interpreter: &Interpreter, chunk: &Function) -> Result<String, SessionError> {
    let value: Value = chunk
        .call(())
        .map_err(|e| SessionError::Execution(e.to_string()))?;
    Ok(describe(interpreter.lua(), value))
}

fn describe(lua: &Lua, value: Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(_) | Value::Number(_) | Value::String(_) => {
            let type_name = value.type_name();
            match lua.coerce_string(value) {
                Ok(Some(text)) => text.to_string_lossy().to_string(),
                _ => format!("<{type_name}>"),
            }
        }
        other => format!("<{}>", other.type_name()),
    }
}
