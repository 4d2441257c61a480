//! Configuration system for the luadrv script device.
//!
//! This crate provides configuration loading, saving, and default values
//! for the device and its sessions. It includes:
//!
//! - Device identity (device and class names used as log prefixes)
//! - Log verbosity
//! - Extension module selection
//! - Per-session source size limits

pub mod config;
pub mod defaults;
pub mod error;
mod types;

// Re-export main types for convenience
pub use config::DeviceConfig;
pub use error::ConfigError;
pub use types::{ExtensionName, LogLevel};
