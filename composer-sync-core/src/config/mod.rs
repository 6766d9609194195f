//! Configuration management
//!
//! [`SettingsManager`] loads and saves [`SyncSettings`] as TOML.

mod manager;
pub mod settings;

use thiserror::Error;

pub use manager::{SETTINGS_FILE_NAME, SettingsManager};
pub use settings::{
    APP_DIR_NAME, FetchPolicy, IpcSettings, LoggingSettings, PlatformSettings, SyncSettings,
};

/// Errors raised while loading or saving settings
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Settings file could not be read
    #[error("Failed to read settings: {0}")]
    Read(String),
    /// Settings file is not valid TOML for [`SyncSettings`]
    #[error("Failed to parse settings: {0}")]
    Parse(String),
    /// Settings could not be encoded
    #[error("Failed to serialize settings: {0}")]
    Serialize(String),
    /// Settings file could not be written
    #[error("Failed to write settings: {0}")]
    Write(String),
    /// A value is out of range
    #[error("Invalid setting {field}: {reason}")]
    Validation {
        /// Offending field
        field: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
