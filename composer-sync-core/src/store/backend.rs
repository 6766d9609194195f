//! Storage backends for namespace documents
//!
//! The store keeps one flat JSON object per namespace. A backend only knows
//! how to read and replace those documents; merging and notification live in
//! [`KeyStore`](super::KeyStore).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{RepositoryError, RepositoryResult};
use crate::models::Namespace;

/// Persistent storage for namespace documents
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the document of `namespace`
    ///
    /// Returns `Ok(None)` if no document was ever written.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the document exists but cannot be read or parsed.
    async fn read(&self, namespace: Namespace) -> RepositoryResult<Option<Map<String, Value>>>;

    /// Replaces the document of `namespace`
    ///
    /// # Errors
    ///
    /// Returns `Io` if the document cannot be written.
    async fn write(&self, namespace: Namespace, record: &Map<String, Value>)
    -> RepositoryResult<()>;
}

/// Stores each namespace as `<dir>/<namespace>.json`
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    /// Creates a backend rooted at `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory holding the documents
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the document for `namespace`
    #[must_use]
    pub fn path_for(&self, namespace: Namespace) -> PathBuf {
        self.dir.join(namespace.file_name())
    }
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    async fn read(&self, namespace: Namespace) -> RepositoryResult<Option<Map<String, Value>>> {
        let path = self.path_for(namespace);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RepositoryError::Io(format!(
                    "Failed to read '{}': {e}",
                    path.display()
                )));
            }
        };

        let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
            RepositoryError::Io(format!("Corrupt document '{}': {e}", path.display()))
        })?;
        match value {
            Value::Object(record) => Ok(Some(record)),
            _ => Err(RepositoryError::Io(format!(
                "Corrupt document '{}': expected a JSON object",
                path.display()
            ))),
        }
    }

    async fn write(
        &self,
        namespace: Namespace,
        record: &Map<String, Value>,
    ) -> RepositoryResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            RepositoryError::Io(format!(
                "Failed to create data directory '{}': {e}",
                self.dir.display()
            ))
        })?;

        let path = self.path_for(namespace);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(record)
            .map_err(|e| RepositoryError::Io(format!("Failed to serialize {namespace}: {e}")))?;

        tokio::fs::write(&tmp_path, content).await.map_err(|e| {
            RepositoryError::Io(format!("Failed to write '{}': {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            RepositoryError::Io(format!(
                "Failed to move '{}' into place: {e}",
                tmp_path.display()
            ))
        })
    }
}
