//! Exclusive ownership of a data directory
//!
//! Only one gateway process may own the namespace documents. The owner holds
//! `<data_dir>/composer-sync.lock`, created with `create_new` and removed on
//! release or drop. A lock whose recorded owner is no longer running is
//! taken over.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the lock file inside the data directory
pub const LOCK_FILE_NAME: &str = "composer-sync.lock";

/// Metadata written into the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLockMeta {
    /// Process id of the owner
    pub pid: u32,
    /// When the lock was taken, ms since epoch
    pub started_at_ms: i64,
    /// Version of the owning binary
    pub version: String,
}

/// Errors raised while taking the store lock
#[derive(Debug, Error)]
pub enum StoreLockError {
    /// Another process owns the data directory
    #[error("Data directory is locked by process {} ({path:?})", .meta.as_ref().map_or_else(|| "?".to_string(), |m| m.pid.to_string()))]
    Held {
        /// Lock file path
        path: PathBuf,
        /// Metadata of the current owner, if readable
        meta: Option<StoreLockMeta>,
    },
    /// I/O failure
    #[error("Lock file I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Held lock on a data directory
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    meta: StoreLockMeta,
    released: bool,
}

impl StoreLock {
    /// Takes the lock in `data_dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns `Held` if another running process already owns the directory.
    pub fn acquire(data_dir: &Path) -> Result<Self, StoreLockError> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(LOCK_FILE_NAME);

        let mut file = match open_new(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let meta = read_meta(&path);
                let Some(stale) = meta.as_ref().filter(|m| !process_alive(m.pid)) else {
                    return Err(StoreLockError::Held { path, meta });
                };
                tracing::warn!(
                    path = %path.display(),
                    pid = stale.pid,
                    "Taking over store lock of a process that is no longer running"
                );
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                match open_new(&path) {
                    Ok(file) => file,
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        let meta = read_meta(&path);
                        return Err(StoreLockError::Held { path, meta });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        };

        let meta = StoreLockMeta {
            pid: std::process::id(),
            started_at_ms: chrono::Utc::now().timestamp_millis(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let bytes = serde_json::to_vec(&meta).map_err(io::Error::other)?;
        file.write_all(&bytes)?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), pid = meta.pid, "Acquired store lock");
        Ok(Self {
            path,
            meta,
            released: false,
        })
    }

    /// Returns the lock file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the owner metadata
    #[must_use]
    pub const fn meta(&self) -> &StoreLockMeta {
        &self.meta
    }

    /// Releases the lock
    ///
    /// # Errors
    ///
    /// Returns `Io` if the lock file cannot be removed.
    pub fn release(mut self) -> Result<(), StoreLockError> {
        self.released = true;
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

fn open_new(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}

fn read_meta(path: &Path) -> Option<StoreLockMeta> {
    fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
}

/// Whether a process with `pid` is running
///
/// Unknown platforms report every process as alive.
#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    pid == std::process::id() || Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn process_alive(pid: u32) -> bool {
    pid == std::process::id()
        || std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map_or(true, |status| status.success())
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}
