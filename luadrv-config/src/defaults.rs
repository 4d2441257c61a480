//! Default value functions for configuration.
//!
//! Used as `#[serde(default = "crate::defaults::...")]` attributes on
//! [`DeviceConfig`](crate::DeviceConfig) fields.

use crate::types::{ExtensionName, LogLevel};

pub fn device_name() -> String {
    "luadrv".to_string()
}

pub fn class_name() -> String {
    "lua".to_string()
}

pub fn log_level() -> LogLevel {
    LogLevel::Info
}

/// Every extension module known to the device is enabled out of the box.
/// Modules that were not compiled into the build are rejected when the
/// session manager is constructed.
pub fn extensions() -> Vec<ExtensionName> {
    vec![ExtensionName::Base64, ExtensionName::Json]
}
