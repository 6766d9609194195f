use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{RepositoryError, RepositoryResult};
use crate::ipc::{IpcClient, Route};
use crate::models::{Namespace, RepositoryKey, RepositoryPatch};

/// Last frame of a watch: nothing yet, a value, or the error it delivered
type Slot = Option<RepositoryResult<Value>>;

struct MirrorEntry {
    rx: watch::Receiver<Slot>,
    task: JoinHandle<()>,
}

impl MirrorEntry {
    fn is_live(&self) -> bool {
        !self.task.is_finished() && !matches!(*self.rx.borrow(), Some(Err(_)))
    }
}

/// Client-side replica of one namespace
///
/// Each key is backed by at most one IPC watch, opened when the first
/// reader asks for it. Readers share the last value seen, so a late
/// reader starts from the current value without another round-trip. An
/// error frame is kept in place of the value, and the next reader of that key
/// opens a fresh watch.
pub struct RepositoryMirror {
    client: IpcClient,
    namespace: Namespace,
    entries: Mutex<HashMap<RepositoryKey, MirrorEntry>>,
}

impl RepositoryMirror {
    /// Creates an empty mirror of `namespace`
    #[must_use]
    pub fn new(client: IpcClient, namespace: Namespace) -> Self {
        Self {
            client,
            namespace,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Namespace being mirrored
    #[must_use]
    pub const fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// IPC client used by the mirror
    #[must_use]
    pub const fn client(&self) -> &IpcClient {
        &self.client
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<RepositoryKey, MirrorEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Returns a reader for `key`, opening the underlying watch if needed
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `key` belongs to the other namespace, and
    /// `ChannelClosed` if the watch cannot be opened.
    pub fn reader(&self, key: RepositoryKey) -> RepositoryResult<MirrorReader> {
        if !key.belongs_to(self.namespace) {
            return Err(RepositoryError::Validation(format!(
                "Key \"{}\" does not belong to the {} repository",
                key.as_str(),
                self.namespace
            )));
        }

        let mut entries = self.entries();
        if let Some(entry) = entries.get(&key) {
            if entry.is_live() {
                return Ok(MirrorReader::new(entry.rx.clone()));
            }
            entry.task.abort();
        }

        let route = match self.namespace {
            Namespace::Local => Route::WatchLocalRepository,
            Namespace::User => Route::WatchUserRepository,
        };
        let mut ipc_watch = self.client.watch(route, json!({ "key": key.as_str() }))?;
        let (tx, rx) = watch::channel(None);
        let namespace = self.namespace;
        let task = tokio::spawn(async move {
            while let Some(item) = ipc_watch.next().await {
                if let Err(e) = &item {
                    warn!(
                        namespace = %namespace,
                        key = key.as_str(),
                        error = %e,
                        "Watch delivered an error"
                    );
                }
                if tx.send(Some(item)).is_err() {
                    break;
                }
            }
        });
        debug!(namespace = %namespace, key = key.as_str(), "Mirroring key");

        entries.insert(
            key,
            MirrorEntry {
                rx: rx.clone(),
                task,
            },
        );
        Ok(MirrorReader::new(rx))
    }

    /// Latest value of `key`, waiting for the first one if necessary
    ///
    /// # Errors
    ///
    /// Returns the error the watch delivered, `ChannelClosed` if the watch
    /// ends before a value arrives, and `Validation` if the value has an
    /// unexpected shape.
    pub async fn value<T: DeserializeOwned>(&self, key: RepositoryKey) -> RepositoryResult<T> {
        self.reader(key)?.latest().await
    }

    /// Sends a patch for this namespace
    ///
    /// The mirror is not touched; new values arrive through the watches.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error for the patch.
    pub async fn patch(&self, patch: RepositoryPatch) -> RepositoryResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let route = match self.namespace {
            Namespace::Local => Route::PatchLocalRepository,
            Namespace::User => Route::PatchUserRepository,
        };
        self.client
            .request(route, Value::Object(patch.into_map()))
            .await
            .map(|_| ())
    }

    /// Number of keys with a live watch
    #[must_use]
    pub fn watched_keys(&self) -> usize {
        self.entries()
            .values()
            .filter(|entry| !entry.task.is_finished())
            .count()
    }
}

impl Drop for RepositoryMirror {
    fn drop(&mut self) {
        for entry in self.entries().values() {
            entry.task.abort();
        }
    }
}

impl std::fmt::Debug for RepositoryMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryMirror")
            .field("namespace", &self.namespace)
            .field("watched_keys", &self.watched_keys())
            .finish_non_exhaustive()
    }
}

/// One reader of a mirrored key
#[derive(Debug, Clone)]
pub struct MirrorReader {
    rx: watch::Receiver<Slot>,
    primed: bool,
}

impl MirrorReader {
    const fn new(rx: watch::Receiver<Slot>) -> Self {
        Self { rx, primed: false }
    }

    /// Last value seen, without waiting
    ///
    /// `None` before the first frame and after an error frame.
    #[must_use]
    pub fn current(&self) -> Option<Value> {
        match &*self.rx.borrow() {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Yields the current frame first, then one frame per change
    ///
    /// An error the watch delivered is yielded like a value. Returns `None`
    /// once the underlying watch has ended.
    pub async fn next(&mut self) -> Option<RepositoryResult<Value>> {
        if !self.primed {
            self.primed = true;
            return self
                .rx
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|slot| slot.clone());
        }
        loop {
            self.rx.changed().await.ok()?;
            let slot = self.rx.borrow_and_update().clone();
            if slot.is_some() {
                return slot;
            }
        }
    }

    /// Typed variant of [`next`](Self::next)
    ///
    /// # Errors
    ///
    /// Returns the error the watch delivered, `ChannelClosed` when the watch
    /// has ended, and `Validation` if the value has an unexpected shape.
    pub async fn next_as<T: DeserializeOwned>(&mut self) -> RepositoryResult<T> {
        let value = self.next().await.ok_or(RepositoryError::ChannelClosed)??;
        Ok(serde_json::from_value(value)?)
    }

    /// Latest frame, waiting for the first one if none has arrived
    ///
    /// # Errors
    ///
    /// Same as [`next_as`](Self::next_as).
    pub async fn latest<T: DeserializeOwned>(&mut self) -> RepositoryResult<T> {
        let slot = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| RepositoryError::ChannelClosed)?
            .clone();
        self.primed = true;
        let value = slot.unwrap_or(Ok(Value::Null))?;
        Ok(serde_json::from_value(value)?)
    }
}
