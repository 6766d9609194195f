//! Filesystem collaborator
//!
//! The gateway never touches the disk for file content directly; it goes
//! through [`FileSystem`], so tests can swap in an in-memory implementation.

mod local;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::RepositoryError;

pub use local::LocalFileSystem;

/// Errors raised by filesystem operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FsError {
    /// Path does not exist
    #[error("No such file or directory: {0}")]
    NotFound(String),
    /// Access denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Path already exists
    #[error("Path already exists: {0}")]
    AlreadyExists(String),
    /// Any other I/O failure
    #[error("I/O error on {path}: {message}")]
    Io {
        /// Path the operation targeted
        path: String,
        /// Underlying error message
        message: String,
    },
}

/// Result type for filesystem operations
pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Classifies an I/O error for `path`
    #[must_use]
    pub fn from_io(path: &Path, error: &std::io::Error) -> Self {
        let display = path.display().to_string();
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(display),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(display),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(display),
            _ => Self::Io {
                path: display,
                message: error.to_string(),
            },
        }
    }
}

impl From<FsError> for RepositoryError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound(_) => Self::NotFound(err.to_string()),
            FsError::AlreadyExists(_) => Self::Precondition(err.to_string()),
            FsError::PermissionDenied(_) | FsError::Io { .. } => Self::Io(err.to_string()),
        }
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// File name
    pub name: String,
    /// Full path
    pub path: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// Whether the entry is a regular file
    pub is_file: bool,
}

/// File access used by the gateway
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Reads a UTF-8 file
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist.
    async fn read_file(&self, path: &str) -> FsResult<String>;

    /// Writes a file, replacing any content
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    async fn save_file(&self, path: &str, content: &str) -> FsResult<()>;

    /// Creates a new file
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if something is already at `path`.
    async fn create_file(&self, path: &str, content: &str) -> FsResult<()>;

    /// Lists a directory, sorted by name
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the directory does not exist.
    async fn read_directory(&self, path: &str) -> FsResult<Vec<DirectoryEntry>>;

    /// Checks whether `path` exists
    async fn path_exists(&self, path: &str) -> bool;

    /// Creates a directory and its parents
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    async fn create_directory(&self, path: &str) -> FsResult<()>;

    /// Removes a file or a directory tree
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is at `path`.
    async fn delete_path(&self, path: &str) -> FsResult<()>;
}
