//! # Configuration Management Module
//!
//! Persistent application settings stored in platform-appropriate locations.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `auto_scan`: begin discovery as soon as the adapter powers on
//! - `devices_file`: override for the saved device roster location
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/blueroster/config.toml
//! - Linux: ~/.config/blueroster/config.toml
//! - Windows: %APPDATA%\blueroster\config.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, StoreError};
use crate::session::SessionOptions;
use crate::store::default_devices_path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Start scanning as soon as the adapter reports itself powered on.
    pub auto_scan: bool,
    /// Roster file location; `None` uses the platform data directory.
    pub devices_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_scan: true,
            devices_file: None,
        }
    }
}

impl Config {
    fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("blueroster").join("config.toml"))
    }

    /// Load config from the default location, creating it if it doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load config from an explicit path, creating the default file when the
    /// path does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(ConfigError::ParseFailed),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// Save config to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    /// Session options derived from this config.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            auto_scan: self.auto_scan,
        }
    }

    /// Roster location for this config, falling back to the platform default
    /// when no override is set.
    pub fn devices_path(&self) -> Result<PathBuf, StoreError> {
        match &self.devices_file {
            Some(path) => Ok(path.clone()),
            None => default_devices_path(),
        }
    }
}
