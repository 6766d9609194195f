//! Namespaced key-value store with per-key change notification

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{RepositoryError, RepositoryResult};
use crate::models::{Namespace, default_records};
use crate::tracing::span_names;

use super::backend::StorageBackend;

/// Default number of buffered change notifications per key
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Outcome of [`KeyStore::load`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Namespaces whose document was unreadable and fell back to defaults
    pub degraded: Vec<(Namespace, RepositoryError)>,
}

impl LoadReport {
    /// Returns true if every document loaded (or was absent)
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.degraded.is_empty()
    }
}

struct StoreState {
    records: HashMap<Namespace, Map<String, Value>>,
    channels: HashMap<(Namespace, String), broadcast::Sender<Value>>,
}

impl StoreState {
    fn record(&self, namespace: Namespace) -> Map<String, Value> {
        self.records.get(&namespace).cloned().unwrap_or_default()
    }

    fn prune_channels(&mut self) {
        self.channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

/// Durable, namespaced key-value storage
///
/// The store is explicitly constructed and shared by `Arc`. All mutations go
/// through a fair async mutex, so patches are applied one at a time in the
/// order they were issued, and each patch is persisted before it resolves.
/// Every key has its own broadcast channel; dropping a receiver is the
/// unsubscribe.
///
/// Operations issued before [`load`](Self::load) completes wait for it.
/// Patches queue on a separate writer lock before that wait, so patches
/// issued before the load still apply in issue order.
pub struct KeyStore {
    backend: Arc<dyn StorageBackend>,
    defaults: HashMap<Namespace, Map<String, Value>>,
    writer: Mutex<()>,
    state: Mutex<StoreState>,
    loaded: watch::Sender<bool>,
    channel_capacity: usize,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("loaded", &self.is_loaded())
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Creates an unloaded store with the repository's default records
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_defaults(backend, default_records())
    }

    /// Creates an unloaded store with custom default records
    #[must_use]
    pub fn with_defaults(
        backend: Arc<dyn StorageBackend>,
        defaults: HashMap<Namespace, Map<String, Value>>,
    ) -> Self {
        let (loaded, _) = watch::channel(false);
        Self {
            backend,
            defaults,
            writer: Mutex::new(()),
            state: Mutex::new(StoreState {
                records: HashMap::new(),
                channels: HashMap::new(),
            }),
            loaded,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Sets the per-key notification buffer size
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Creates a store and loads it
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Arc<Self> {
        let store = Arc::new(Self::new(backend));
        store.load().await;
        store
    }

    /// Returns true once the initial load has completed
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        *self.loaded.borrow()
    }

    /// Reads persisted state into memory
    ///
    /// A missing document yields the defaults. An unreadable or corrupt
    /// document is logged and replaced by the defaults, so startup never fails
    /// on bad state. Calling `load` again after it completed does nothing.
    #[instrument(name = "store.load", skip(self))]
    pub async fn load(&self) -> LoadReport {
        let mut state = self.state.lock().await;
        let mut report = LoadReport::default();
        if self.is_loaded() {
            debug!("Store already loaded");
            return report;
        }

        for namespace in Namespace::ALL {
            let mut record = self.defaults.get(&namespace).cloned().unwrap_or_default();
            match self.backend.read(namespace).await {
                Ok(Some(stored)) => {
                    debug!(namespace = %namespace, keys = stored.len(), "Loaded namespace");
                    record.extend(stored);
                }
                Ok(None) => {
                    debug!(namespace = %namespace, "No stored document, using defaults");
                }
                Err(e) => {
                    error!(
                        namespace = %namespace,
                        error = %e,
                        "Failed to load namespace, falling back to defaults"
                    );
                    report.degraded.push((namespace, e));
                }
            }
            state.records.insert(namespace, record);
        }

        self.loaded.send_replace(true);
        info!(degraded = report.degraded.len(), "Repository loaded");
        report
    }

    async fn wait_loaded(&self) {
        let mut rx = self.loaded.subscribe();
        // The sender lives as long as `self`, so this only returns once loaded.
        let _ = rx.wait_for(|loaded| *loaded).await;
    }

    /// Returns the value stored under `key`, if any
    pub async fn get(&self, namespace: Namespace, key: &str) -> Option<Value> {
        self.wait_loaded().await;
        let state = self.state.lock().await;
        state
            .records
            .get(&namespace)
            .and_then(|record| record.get(key))
            .cloned()
    }

    /// Returns the whole record of `namespace`
    pub async fn get_namespace(&self, namespace: Namespace) -> Map<String, Value> {
        self.wait_loaded().await;
        self.state.lock().await.record(namespace)
    }

    /// Shallow-merges `partial` into `namespace`
    ///
    /// Each key in `partial` replaces the stored value. The merged record is
    /// persisted before anything changes in memory; then one notification is
    /// sent per key, in key order.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the record cannot be persisted. The in-memory state is
    /// left unchanged and no notification is sent.
    #[instrument(
        name = "store.patch",
        skip(self, partial),
        fields(namespace = %namespace, keys = partial.len())
    )]
    pub async fn patch(
        &self,
        namespace: Namespace,
        partial: Map<String, Value>,
    ) -> RepositoryResult<()> {
        let _writer = self.writer.lock().await;
        self.wait_loaded().await;
        if partial.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        let mut next = state.record(namespace);
        for (key, value) in &partial {
            next.insert(key.clone(), value.clone());
        }

        if let Err(e) = self.backend.write(namespace, &next).await {
            warn!(error = %e, "Failed to persist patch");
            return Err(e);
        }
        state.records.insert(namespace, next);

        for (key, value) in partial {
            if let Some(tx) = state.channels.get(&(namespace, key.clone())) {
                let delivered = tx.send(value).unwrap_or(0);
                debug!(
                    event = %format!("update.{namespace}.{key}"),
                    subscribers = delivered,
                    "Emitted change"
                );
            }
        }
        Ok(())
    }

    /// Subscribes to changes of `key`
    ///
    /// Returns the current value together with the receiver. Both are taken
    /// under the store lock, so no change can slip between them.
    pub async fn subscribe(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> (Option<Value>, broadcast::Receiver<Value>) {
        self.wait_loaded().await;
        let mut state = self.state.lock().await;
        state.prune_channels();

        let current = state
            .records
            .get(&namespace)
            .and_then(|record| record.get(key))
            .cloned();
        let capacity = self.channel_capacity;
        let rx = state
            .channels
            .entry((namespace, key.to_string()))
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        debug!(
            span = span_names::STORE_SUBSCRIBE,
            namespace = %namespace,
            key,
            "Subscribed to key"
        );
        (current, rx)
    }

    /// Returns how many live receivers watch `key`
    pub async fn subscriber_count(&self, namespace: Namespace, key: &str) -> usize {
        let state = self.state.lock().await;
        state
            .channels
            .get(&(namespace, key.to_string()))
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;
    use serde_json::json;
    use std::time::Duration;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn fresh_store_has_defaults() {
        let store = KeyStore::open(Arc::new(MemoryBackend::new())).await;
        assert_eq!(store.get(Namespace::User, "projects").await, Some(json!([])));
        assert_eq!(
            store.get(Namespace::Local, "activeCredentials").await,
            Some(Value::Null)
        );
        assert_eq!(store.get(Namespace::Local, "nope").await, None);
    }

    #[tokio::test]
    async fn stored_values_override_defaults() {
        let backend = MemoryBackend::new()
            .with_document(Namespace::Local, json!({"localFolders": ["/w"], "extra": 1}));
        let store = KeyStore::open(Arc::new(backend)).await;

        assert_eq!(store.get(Namespace::Local, "localFolders").await, Some(json!(["/w"])));
        assert_eq!(store.get(Namespace::Local, "extra").await, Some(json!(1)));
        assert_eq!(store.get(Namespace::Local, "credentials").await, Some(json!([])));
    }

    #[tokio::test]
    async fn corrupt_document_degrades_to_defaults() {
        let backend = MemoryBackend::new().with_document(Namespace::User, json!("garbage"));
        let store = KeyStore::new(Arc::new(backend));

        let report = store.load().await;

        assert!(!report.is_clean());
        assert_eq!(report.degraded[0].0, Namespace::User);
        assert_eq!(store.get(Namespace::User, "apps").await, Some(json!([])));
    }

    #[tokio::test]
    async fn patch_waits_for_load() {
        let store = Arc::new(KeyStore::new(Arc::new(MemoryBackend::new())));

        let pending = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.patch(Namespace::Local, map(json!({"a": 1}))).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        store.load().await;
        pending.await.unwrap().unwrap();
        assert_eq!(store.get(Namespace::Local, "a").await, Some(json!(1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn patches_issued_before_load_apply_in_issue_order() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(KeyStore::new(backend.clone()));

        let mut pending = Vec::new();
        for n in 0..16 {
            let store = Arc::clone(&store);
            pending.push(tokio::spawn(async move {
                store
                    .patch(Namespace::Local, map(json!({"last": n, (format!("k{n}")): n})))
                    .await
            }));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        store.load().await;
        for task in pending {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.get(Namespace::Local, "last").await, Some(json!(15)));
        assert_eq!(backend.document(Namespace::Local).unwrap()["last"], json!(15));
        assert_eq!(backend.write_count(), 16);
    }

    #[tokio::test]
    async fn patch_is_written_through() {
        let backend = Arc::new(MemoryBackend::new());
        let store = KeyStore::open(backend.clone()).await;

        store
            .patch(Namespace::Local, map(json!({"sidebarHidden": true})))
            .await
            .unwrap();

        let document = backend.document(Namespace::Local).unwrap();
        assert_eq!(document["sidebarHidden"], json!(true));
        assert_eq!(document["localFolders"], json!([]));
    }

    #[tokio::test]
    async fn failed_write_leaves_state_and_subscribers_untouched() {
        let backend = Arc::new(MemoryBackend::new());
        let store = KeyStore::open(backend.clone()).await;
        let (_, mut rx) = store.subscribe(Namespace::Local, "sidebarHidden").await;

        backend.set_fail_writes(true);
        let err = store
            .patch(Namespace::Local, map(json!({"sidebarHidden": true})))
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Io(_)));
        assert_eq!(store.get(Namespace::Local, "sidebarHidden").await, Some(json!(false)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscribers_see_changes_in_order() {
        let store = KeyStore::open(Arc::new(MemoryBackend::new())).await;
        let (current, mut rx) = store.subscribe(Namespace::User, "openProjects").await;
        assert_eq!(current, Some(json!([])));

        for n in 0..3 {
            store
                .patch(Namespace::User, map(json!({"openProjects": [format!("p{n}")]})))
                .await
                .unwrap();
        }

        for n in 0..3 {
            assert_eq!(rx.recv().await.unwrap(), json!([format!("p{n}")]));
        }
    }

    #[tokio::test]
    async fn dropping_receiver_unsubscribes() {
        let store = KeyStore::open(Arc::new(MemoryBackend::new())).await;
        let (_, rx) = store.subscribe(Namespace::Local, "credentials").await;
        assert_eq!(store.subscriber_count(Namespace::Local, "credentials").await, 1);

        drop(rx);
        assert_eq!(store.subscriber_count(Namespace::Local, "credentials").await, 0);
    }

    #[tokio::test]
    async fn second_load_is_a_no_op() {
        let backend = Arc::new(MemoryBackend::new());
        let store = KeyStore::open(backend.clone()).await;
        store.patch(Namespace::Local, map(json!({"a": 1}))).await.unwrap();

        let report = store.load().await;
        assert!(report.is_clean());
        assert_eq!(store.get(Namespace::Local, "a").await, Some(json!(1)));
    }
}
