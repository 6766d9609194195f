use std::path::PathBuf;

use async_trait::async_trait;

use super::{DirectoryEntry, FileSystem, FsError, FsResult};

/// [`FileSystem`] backed by the local disk
///
/// A leading `~` in a path is expanded to the home directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Creates the filesystem
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn resolve(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).into_owned())
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_file(&self, path: &str) -> FsResult<String> {
        let path = Self::resolve(path);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| FsError::from_io(&path, &e))
    }

    async fn save_file(&self, path: &str, content: &str) -> FsResult<()> {
        let path = Self::resolve(path);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| FsError::from_io(&path, &e))
    }

    async fn create_file(&self, path: &str, content: &str) -> FsResult<()> {
        let path = Self::resolve(path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::from_io(parent, &e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| FsError::from_io(&path, &e))?;
        tokio::io::AsyncWriteExt::write_all(&mut file, content.as_bytes())
            .await
            .map_err(|e| FsError::from_io(&path, &e))
    }

    async fn read_directory(&self, path: &str) -> FsResult<Vec<DirectoryEntry>> {
        let dir = Self::resolve(path);
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| FsError::from_io(&dir, &e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(&dir, &e))?
        {
            let entry_path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| FsError::from_io(&entry_path, &e))?;
            entries.push(DirectoryEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry_path.to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
                is_file: file_type.is_file(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn path_exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(Self::resolve(path))
            .await
            .unwrap_or(false)
    }

    async fn create_directory(&self, path: &str) -> FsResult<()> {
        let path = Self::resolve(path);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| FsError::from_io(&path, &e))
    }

    async fn delete_path(&self, path: &str) -> FsResult<()> {
        let path = Self::resolve(path);
        let metadata = tokio::fs::symlink_metadata(&path)
            .await
            .map_err(|e| FsError::from_io(&path, &e))?;
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.map_err(|e| FsError::from_io(&path, &e))
    }
}
