//! Gateway settings stored in `settings.toml`

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tracing::TracingLevel;

use super::{ConfigError, ConfigResult};

/// Directory name used under the platform data directory
pub const APP_DIR_NAME: &str = "composer-sync";

/// How `fetch_platform_data` treats a partial failure of its three listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Any failed listing fails the fetch and nothing is committed
    #[default]
    AllOrNothing,
    /// Successful listings are committed; the fetch fails only if all failed
    BestEffort,
}

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Directory holding `local.json` and `user.json`; `~` is expanded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// IPC channel settings
    pub ipc: IpcSettings,
    /// Platform REST settings
    pub platform: PlatformSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// IPC channel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcSettings {
    /// Buffered change notifications per watched key
    pub watch_buffer: usize,
}

impl Default for IpcSettings {
    fn default() -> Self {
        Self { watch_buffer: 64 }
    }
}

/// Platform REST settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    /// Partial failure handling for platform refreshes
    pub fetch_policy: FetchPolicy,
    /// Seconds before a REST call is abandoned
    pub request_timeout_secs: u64,
    /// Items requested per page
    pub page_limit: usize,
    /// Seconds a fetched cache counts as fresh for `fetch --if-stale`
    pub max_cache_age_secs: u64,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            fetch_policy: FetchPolicy::AllOrNothing,
            request_timeout_secs: 60,
            page_limit: 100,
            max_cache_age_secs: 300,
        }
    }
}

impl PlatformSettings {
    /// Returns the REST timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the age after which platform caches are refreshed
    #[must_use]
    pub const fn max_cache_age(&self) -> Duration {
        Duration::from_secs(self.max_cache_age_secs)
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level used when no `-v` flag is given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<TracingLevel>,
    /// Optional log file instead of stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl SyncSettings {
    /// Resolves the data directory
    ///
    /// # Errors
    ///
    /// Returns `Validation` if no directory is configured and the platform
    /// has no data directory.
    pub fn data_dir(&self) -> ConfigResult<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(PathBuf::from(shellexpand::tilde(dir).into_owned()));
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or_else(|| ConfigError::Validation {
                field: "data_dir".to_string(),
                reason: "no platform data directory; set data_dir explicitly".to_string(),
            })
    }

    /// Checks value ranges
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        let checks = [
            (self.ipc.watch_buffer == 0, "ipc.watch_buffer"),
            (self.platform.request_timeout_secs == 0, "platform.request_timeout_secs"),
            (self.platform.page_limit == 0, "platform.page_limit"),
        ];
        match checks.into_iter().find(|(bad, _)| *bad) {
            Some((_, field)) => Err(ConfigError::Validation {
                field: field.to_string(),
                reason: "must be greater than zero".to_string(),
            }),
            None => Ok(()),
        }
    }
}
