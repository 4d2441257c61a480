//! Device configuration: loading, saving, and validation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ExtensionName, LogLevel};

/// Configuration for the script device and the sessions it hosts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Device node name, used as the log prefix for every session message
    #[serde(default = "crate::defaults::device_name")]
    pub device_name: String,

    /// Device class name
    #[serde(default = "crate::defaults::class_name")]
    pub class_name: String,

    /// Log verbosity for the debug log file
    #[serde(default = "crate::defaults::log_level")]
    pub log_level: LogLevel,

    /// Extension modules registered into every session before `load` is resolved
    #[serde(default = "crate::defaults::extensions")]
    pub extensions: Vec<ExtensionName>,

    /// Upper bound on a session's accumulated script source, in bytes.
    ///
    /// A write that would grow the source past this limit is rejected as an
    /// allocation failure. `None` leaves the buffer unbounded.
    #[serde(default)]
    pub max_source_bytes: Option<usize>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: crate::defaults::device_name(),
            class_name: crate::defaults::class_name(),
            log_level: crate::defaults::log_level(),
            extensions: crate::defaults::extensions(),
            max_source_bytes: None,
        }
    }
}

impl DeviceConfig {
    /// Load configuration from the default location, or return defaults if
    /// no config file exists yet.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        log::info!("Config path: {:?}", config_path);

        if config_path.exists() {
            log::info!("Loading existing config from {:?}", config_path);
            Ok(Self::load_from(&config_path)?)
        } else {
            log::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load and validate configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_yaml_ng::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to an explicit path.
    ///
    /// Writes to a temp file first and renames it into place.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml_ng::to_string(self)?;
        let temp_path = path.with_extension("yaml.tmp");
        fs::write(&temp_path, &yaml)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())?;
        Ok(())
    }

    /// Get the configuration file path (using XDG convention)
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.yaml")
    }

    /// Get the configuration directory path
    pub fn config_dir() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            if let Some(config_dir) = dirs::config_dir() {
                config_dir.join("luadrv")
            } else {
                PathBuf::from(".")
            }
        }
        #[cfg(not(target_os = "windows"))]
        {
            if let Some(home_dir) = dirs::home_dir() {
                home_dir.join(".config").join("luadrv")
            } else {
                PathBuf::from(".")
            }
        }
    }

    /// Check field values that serde alone cannot enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("device_name", &self.device_name),
            ("class_name", &self.class_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{field} must not be empty")));
            }
            if value.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "{field} '{value}' must not contain '/'"
                )));
            }
        }

        for (i, ext) in self.extensions.iter().enumerate() {
            if self.extensions[..i].contains(ext) {
                return Err(ConfigError::Validation(format!(
                    "extension '{ext}' is listed more than once"
                )));
            }
        }

        if self.max_source_bytes == Some(0) {
            return Err(ConfigError::Validation(
                "max_source_bytes must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }
}
