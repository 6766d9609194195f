use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::settings::{APP_DIR_NAME, SyncSettings};
use super::{ConfigError, ConfigResult};

/// Settings file name inside the config directory
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Loads and saves [`SyncSettings`]
#[derive(Debug, Clone)]
pub struct SettingsManager {
    config_dir: PathBuf,
}

impl SettingsManager {
    /// Creates a manager for the platform config directory
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the platform has no config directory.
    pub fn new() -> ConfigResult<Self> {
        let config_dir = dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or_else(|| ConfigError::Validation {
                field: "config_dir".to_string(),
                reason: "no platform config directory".to_string(),
            })?;
        Ok(Self { config_dir })
    }

    /// Creates a manager for an explicit directory
    #[must_use]
    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Returns the config directory
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns the settings file path
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE_NAME)
    }

    /// Loads settings; a missing file yields the defaults
    ///
    /// # Errors
    ///
    /// Returns `Parse` for malformed TOML and `Validation` for out-of-range
    /// values.
    pub fn load_settings(&self) -> ConfigResult<SyncSettings> {
        let path = self.settings_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(SyncSettings::default());
            }
            Err(e) => return Err(ConfigError::Read(format!("{}: {e}", path.display()))),
        };

        let settings: SyncSettings = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        settings.validate()?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Saves settings, creating the config directory if needed
    ///
    /// # Errors
    ///
    /// Returns `Serialize` or `Write` on failure.
    pub fn save_settings(&self, settings: &SyncSettings) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(settings).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::create_dir_all(&self.config_dir)
            .map_err(|e| ConfigError::Write(format!("{}: {e}", self.config_dir.display())))?;
        let path = self.settings_path();
        std::fs::write(&path, content)
            .map_err(|e| ConfigError::Write(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }
}
