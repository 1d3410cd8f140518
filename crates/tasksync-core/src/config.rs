//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/tasksync/config.toml)
//! 3. Environment variables (TASKSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::control::is_valid_collection_name;

/// Environment variable prefix
const ENV_PREFIX: &str = "TASKSYNC";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory for data storage (the store file and default log)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Application name; the sync control collection is `<app_name>_sync_state`
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Name this device announces to peers
    #[serde(default)]
    pub device_name: Option<String>,

    /// Replication endpoint (optional)
    #[serde(default)]
    pub websocket_url: Option<String>,

    /// Log file path (defaults to stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            app_name: default_app_name(),
            device_name: None,
            websocket_url: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (TASKSYNC_DATA_DIR, TASKSYNC_APP_NAME, ...)
    /// 2. Config file (~/.config/tasksync/config.toml or TASKSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_APP_NAME", ENV_PREFIX)) {
            if !val.is_empty() {
                self.app_name = val;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_DEVICE_NAME", ENV_PREFIX)) {
            self.device_name = optional(val);
        }

        if let Ok(val) = std::env::var(format!("{}_WEBSOCKET_URL", ENV_PREFIX)) {
            self.websocket_url = optional(val);
        }

        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = optional(val).map(PathBuf::from);
        }
    }

    /// Reject values that would produce an unusable store layout
    pub fn validate(&self) -> Result<()> {
        if !is_valid_collection_name(&self.sync_state_collection()) {
            bail!(
                "Invalid app_name '{}': use letters, digits and underscores",
                self.app_name
            );
        }
        Ok(())
    }

    /// Set a value by key, as used by `tasksync config set`
    ///
    /// Empty strings and `none` clear optional values.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "app_name" => self.app_name = value.to_string(),
            "device_name" => self.device_name = optional(value.to_string()),
            "websocket_url" => self.websocket_url = optional(value.to_string()),
            "log_file" => self.log_file = optional(value.to_string()).map(PathBuf::from),
            _ => bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, app_name, device_name, websocket_url, log_file",
                key
            ),
        }
        self.validate()
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with TASKSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tasksync")
            .join("config.toml")
    }

    /// Get the path to the embedded store file
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.automerge")
    }

    /// Name of the collection holding the sync control document
    pub fn sync_state_collection(&self) -> String {
        format!("{}_sync_state", self.app_name)
    }
}

fn optional(value: String) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tasksync")
}

fn default_app_name() -> String {
    "tasks".to_string()
}
