//! Shared integration test helpers for luadrv.
//!
//! Include this module at the top of each test file that needs it:
//!
//! ```ignore
//! mod common;
//! use common::{memory_device, test_config};
//! ```
//!
//! The `#[allow(dead_code)]` attribute suppresses warnings when only a
//! subset of helpers is used per file.

#![allow(dead_code)]

use std::sync::Arc;

use luadrv::config::DeviceConfig;
use luadrv::device::Device;
use luadrv::session::{MemorySink, SessionManager};

/// Default config with every extension module that this build includes.
pub fn test_config() -> DeviceConfig {
    let mut config = DeviceConfig::default();
    config.extensions.retain(|name| {
        luadrv::session::extensions::builtin(*name).is_some()
    });
    config
}

/// A session manager whose results are captured in memory.
pub fn memory_manager(config: &DeviceConfig) -> (SessionManager, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let manager = SessionManager::with_sink(config, sink.clone())
        .expect("Failed to create session manager");
    (manager, sink)
}

/// A device whose results are captured in memory.
pub fn memory_device(config: &DeviceConfig) -> (Device, Arc<MemorySink>) {
    let (manager, sink) = memory_manager(config);
    (Device::with_manager(manager), sink)
}
