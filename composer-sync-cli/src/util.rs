//! Shared utility functions used across command modules.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use composer_sync_core::{
    JsonFileBackend, KeyStore, LocalFileSystem, RepositoryGateway, SbgConnector, SettingsManager,
    StoreLock, SyncSettings, TracingConfig, TracingLevel, TracingOutput, init_tracing,
};
use tracing::{debug, warn};

use crate::error::CliError;

/// Creates a `SettingsManager` using the optional custom config directory
/// from CLI args.
pub fn create_config_manager(config_path: Option<&Path>) -> Result<SettingsManager, CliError> {
    match config_path {
        Some(path) => Ok(SettingsManager::with_config_dir(path.to_path_buf())),
        None => SettingsManager::new()
            .map_err(|e| CliError::Config(format!("Failed to initialize config: {e}"))),
    }
}

/// Parse a key=value pair where the value is JSON
pub fn parse_key_val(s: &str) -> Result<(String, serde_json::Value), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=json: no `=` found in `{s}`"))?;
    let value = serde_json::from_str(&s[pos + 1..])
        .map_err(|e| format!("invalid JSON for `{}`: {e}", &s[..pos]))?;
    Ok((s[..pos].to_string(), value))
}

/// Sets up logging to stderr, or to the configured log file
///
/// `-v`/`-q` win over `logging.level` from the settings file; a `RUST_LOG`
/// directive replaces both.
pub fn init_logging(config_path: Option<&Path>, verbose: u8, quiet: bool) -> Result<(), CliError> {
    let settings = create_config_manager(config_path)
        .and_then(|manager| manager.load_settings().map_err(CliError::from))
        .unwrap_or_default();

    let level = match settings.logging.level {
        Some(level) if verbose == 0 && !quiet => level,
        _ => TracingLevel::from_verbosity(verbose, quiet),
    };
    let output = settings
        .logging
        .file
        .as_deref()
        .map_or(TracingOutput::Stderr, |file| {
            TracingOutput::File(PathBuf::from(file))
        });

    let mut config = TracingConfig::new().with_level(level).with_output(output);
    if let Ok(filter) = std::env::var("RUST_LOG")
        && !filter.is_empty()
    {
        config = config.with_filter(filter);
    }
    init_tracing(&config)?;
    Ok(())
}

/// Runs `future` to completion on a fresh runtime
pub fn block_on<F: Future>(future: F) -> Result<F::Output, CliError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Config(format!("Failed to create async runtime: {e}")))?;
    Ok(runtime.block_on(future))
}

/// A gateway over the configured data directory
///
/// Holds the directory lock for as long as it lives.
pub struct Session {
    /// Loaded settings
    pub settings: SyncSettings,
    /// Locked data directory
    pub data_dir: PathBuf,
    /// Gateway over the persisted namespaces
    pub gateway: Arc<RepositoryGateway>,
    _lock: StoreLock,
}

/// Locks the data directory and opens a gateway over it
pub async fn open_session(config_path: Option<&Path>) -> Result<Session, CliError> {
    let settings = create_config_manager(config_path)?.load_settings()?;
    let data_dir = settings.data_dir()?;
    let lock = StoreLock::acquire(&data_dir)?;
    debug!(data_dir = %data_dir.display(), "Data directory locked");

    let store = Arc::new(
        KeyStore::new(Arc::new(JsonFileBackend::new(data_dir.clone())))
            .with_channel_capacity(settings.ipc.watch_buffer),
    );
    let report = store.load().await;
    for (namespace, error) in &report.degraded {
        warn!(%namespace, %error, "Namespace reset to defaults");
    }

    let connector = SbgConnector::new()
        .with_timeout(settings.platform.request_timeout())
        .with_page_limit(settings.platform.page_limit);
    let gateway = RepositoryGateway::new(
        store,
        Arc::new(LocalFileSystem::new()),
        Arc::new(connector),
    )
    .with_fetch_policy(settings.platform.fetch_policy);

    Ok(Session {
        settings,
        data_dir,
        gateway: Arc::new(gateway),
        _lock: lock,
    })
}

/// Prints a JSON value, pretty-printed
pub fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Repository(format!("Failed to encode output: {e}")))?;
    println!("{text}");
    Ok(())
}
