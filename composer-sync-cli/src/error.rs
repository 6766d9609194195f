//! CLI error types and exit codes.

use composer_sync_core::{ConfigError, ErrorKind, RepositoryError, StoreLockError, TracingError};

/// Exit codes for CLI operations
pub mod exit_codes {
    /// General error - configuration, validation, I/O or IPC failures
    pub const GENERAL_ERROR: i32 = 1;
    /// A key, credential or file does not exist, or a precondition failed
    pub const NOT_FOUND: i32 = 2;
    /// The platform rejected or failed a request
    pub const UPSTREAM_FAILURE: i32 = 3;
}

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data directory is owned by another process
    #[error("{0}")]
    Locked(String),

    /// Invalid command-line input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Key, credentials or path not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the current state
    #[error("{0}")]
    Precondition(String),

    /// Platform failure
    #[error("Platform error: {0}")]
    Upstream(String),

    /// Any other repository failure
    #[error("{0}")]
    Repository(String),

    /// Logging could not be set up
    #[error("Logging error: {0}")]
    Logging(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RepositoryError> for CliError {
    fn from(err: RepositoryError) -> Self {
        let message = err.detail();
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Precondition => Self::Precondition(message),
            ErrorKind::Upstream => Self::Upstream(message),
            ErrorKind::Validation => Self::InvalidArgument(message),
            ErrorKind::Io
            | ErrorKind::Timeout
            | ErrorKind::Cancelled
            | ErrorKind::ChannelClosed
            | ErrorKind::Protocol => Self::Repository(err.to_string()),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<StoreLockError> for CliError {
    fn from(err: StoreLockError) -> Self {
        match err {
            StoreLockError::Held { .. } => Self::Locked(err.to_string()),
            StoreLockError::Io(e) => Self::Io(e),
        }
    }
}

impl From<TracingError> for CliError {
    fn from(err: TracingError) -> Self {
        Self::Logging(err.to_string())
    }
}

impl CliError {
    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit codes:
    /// - 0: Success (not an error)
    /// - 1: General error (configuration, validation, lock, IO)
    /// - 2: Missing key, credentials or path, or a failed precondition
    /// - 3: Platform failure
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) | Self::Precondition(_) => exit_codes::NOT_FOUND,
            Self::Upstream(_) => exit_codes::UPSTREAM_FAILURE,
            Self::Config(_)
            | Self::Locked(_)
            | Self::InvalidArgument(_)
            | Self::Repository(_)
            | Self::Logging(_)
            | Self::Io(_) => exit_codes::GENERAL_ERROR,
        }
    }
}
