//! One embedded Lua state per session.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mlua::{Function, Lua, LuaOptions, StdLib, Value};

use crate::error::InitFailure;
use crate::extensions::{self, Extension};

/// Counts interpreter instances that are currently alive.
///
/// Cloning shares the same counter.
#[derive(Debug, Clone, Default)]
pub struct InstanceTracker {
    live: Arc<AtomicUsize>,
}

impl InstanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of interpreters created through this tracker and not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> InstanceGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        InstanceGuard {
            live: Arc::clone(&self.live),
        }
    }
}

struct InstanceGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A Lua state with the safe standard libraries, the selected extension
/// modules, and a resolved handle to the global `load` function.
///
/// Dropping the interpreter closes the Lua state.
pub struct Interpreter {
    // Declared before `lua` so the function reference is released first.
    load: Function,
    lua: Lua,
    _guard: InstanceGuard,
}

impl Interpreter {
    /// Allocate a new state, register `extensions`, and resolve `load`.
    ///
    /// # Errors
    /// - [`InitFailure::Engine`] if the state cannot be allocated.
    /// - [`InitFailure::Extension`] if a module fails to register.
    /// - [`InitFailure::MissingLoad`] if `load` is not a function once all
    ///   modules are registered. The state is closed before returning.
    pub fn new(
        extensions: &[Arc<dyn Extension>],
        tracker: &InstanceTracker,
    ) -> Result<Self, InitFailure> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())
            .map_err(InitFailure::Engine)?;

        for extension in extensions {
            extensions::register(&lua, extension.as_ref()).map_err(|source| {
                InitFailure::Extension {
                    name: extension.name().to_string(),
                    source,
                }
            })?;
        }

        let load = match lua.globals().get::<Value>("load") {
            Ok(Value::Function(load)) => load,
            Ok(other) => {
                log::error!("load function not found (global is {})", other.type_name());
                return Err(InitFailure::MissingLoad);
            }
            Err(e) => {
                log::error!("load function not found: {}", e);
                return Err(InitFailure::MissingLoad);
            }
        };

        Ok(Self {
            load,
            lua,
            _guard: tracker.acquire(),
        })
    }

    /// The global `load` function as it was when the interpreter was created.
    pub fn load_fn(&self) -> &Function {
        &self.load
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Bytes currently allocated by the Lua state.
    pub fn used_memory(&self) -> usize {
        self.lua.used_memory()
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("used_memory", &self.used_memory())
            .finish_non_exhaustive()
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        log::debug!(
            "closing interpreter ({} bytes in use)",
            self.lua.used_memory()
        );
    }
}
