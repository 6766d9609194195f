//! Durable key-value storage
//!
//! [`KeyStore`] holds one flat JSON record per [`Namespace`](crate::Namespace),
//! persists every patch through a [`StorageBackend`] before resolving, and
//! notifies per-key subscribers.

mod backend;
mod key_store;
mod lock;

pub use backend::{JsonFileBackend, StorageBackend};
pub use key_store::{DEFAULT_CHANNEL_CAPACITY, KeyStore, LoadReport};
pub use lock::{LOCK_FILE_NAME, StoreLock, StoreLockError, StoreLockMeta};
