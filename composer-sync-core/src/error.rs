//! Error types for the state synchronization layer
//!
//! `RepositoryError` is the single error type that crosses the gateway and the
//! IPC boundary. On the wire it travels as an [`ErrorPayload`] so that the
//! receiving side can rebuild the same variant.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a [`RepositoryError`], carried in every error payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Disk read/write failure
    Io,
    /// A key, credential or path that was requested explicitly does not exist
    NotFound,
    /// The operation requires state that is absent
    Precondition,
    /// An external collaborator (REST API, filesystem) failed
    Upstream,
    /// A payload or patch was rejected at the boundary
    Validation,
    /// A request did not receive a reply in time
    Timeout,
    /// A request was cancelled by the caller
    Cancelled,
    /// The IPC channel was closed while the request was pending
    ChannelClosed,
    /// A malformed frame or an unexpected reply was received
    Protocol,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Io => "io",
            Self::NotFound => "notFound",
            Self::Precondition => "precondition",
            Self::Upstream => "upstream",
            Self::Validation => "validation",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::ChannelClosed => "channelClosed",
            Self::Protocol => "protocol",
        };
        f.write_str(name)
    }
}

/// Errors produced by the store, the gateway and the IPC channel
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Disk read/write failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Missing key or credential requested explicitly
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation requires state that is absent
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// External collaborator failure, wrapped with context
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Rejected payload or patch
    #[error("Validation error: {0}")]
    Validation(String),

    /// No reply arrived in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Cancelled through a cancellation token
    #[error("Request was cancelled")]
    Cancelled,

    /// The channel closed while the request was pending
    #[error("IPC channel closed")]
    ChannelClosed,

    /// Malformed frame or protocol violation
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Structured error payload sent across the IPC boundary
///
/// The UI layer renders `message`; `kind` lets callers branch without parsing
/// text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human readable description
    pub message: String,
    /// Error classification
    pub kind: ErrorKind,
}

impl RepositoryError {
    /// Returns the classification of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ChannelClosed => ErrorKind::ChannelClosed,
            Self::Protocol(_) => ErrorKind::Protocol,
        }
    }

    /// Returns the message without the variant prefix
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Io(msg)
            | Self::NotFound(msg)
            | Self::Precondition(msg)
            | Self::Upstream(msg)
            | Self::Validation(msg)
            | Self::Timeout(msg)
            | Self::Protocol(msg) => msg.clone(),
            Self::Cancelled | Self::ChannelClosed => self.to_string(),
        }
    }

    /// Converts the error into its wire representation
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            message: self.detail(),
            kind: self.kind(),
        }
    }

    /// Rebuilds an error from its wire representation
    #[must_use]
    pub fn from_payload(payload: ErrorPayload) -> Self {
        let ErrorPayload { message, kind } = payload;
        match kind {
            ErrorKind::Io => Self::Io(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Precondition => Self::Precondition(message),
            ErrorKind::Upstream => Self::Upstream(message),
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::Timeout => Self::Timeout(message),
            ErrorKind::Cancelled => Self::Cancelled,
            ErrorKind::ChannelClosed => Self::ChannelClosed,
            ErrorKind::Protocol => Self::Protocol(message),
        }
    }
}

impl From<ErrorPayload> for RepositoryError {
    fn from(payload: ErrorPayload) -> Self {
        Self::from_payload(payload)
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}
