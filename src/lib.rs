// Library exports for testing and potential library use
//
// Sessions are independent: each owns its own script buffer, interpreter,
// and `parking_lot::Mutex`. The only state shared between sessions is the
// `SessionManager` registry, which is held just long enough to insert,
// look up, or remove a handle and is never held while a script runs.

/// Application version (root crate version, for use by sub-crates).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod debug;
pub mod device;

// Re-export workspace crates under short names
pub use luadrv_config as config;
pub use luadrv_session as session;
