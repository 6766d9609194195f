use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::models::Namespace;
use crate::store::KeyStore;

/// Live view of one repository key
///
/// The first call to [`next`](Self::next) yields the value at subscription
/// time; every later call waits for the next change. A watcher that falls
/// behind the notification buffer is handed the current value instead of the
/// changes it missed.
#[derive(Debug)]
pub struct KeyWatch {
    store: Arc<KeyStore>,
    namespace: Namespace,
    key: String,
    pending: Option<Value>,
    rx: broadcast::Receiver<Value>,
}

impl KeyWatch {
    pub(crate) fn new(
        store: Arc<KeyStore>,
        namespace: Namespace,
        key: String,
        current: Value,
        rx: broadcast::Receiver<Value>,
    ) -> Self {
        Self {
            store,
            namespace,
            key,
            pending: Some(current),
            rx,
        }
    }

    /// Namespace being watched
    #[must_use]
    pub const fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Key being watched
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for the next value
    ///
    /// Returns `None` only if the store went away.
    pub async fn next(&mut self) -> Option<Value> {
        if let Some(value) = self.pending.take() {
            return Some(value);
        }
        match self.rx.recv().await {
            Ok(value) => Some(value),
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    namespace = %self.namespace,
                    key = %self.key,
                    skipped,
                    "Watcher fell behind, resynchronising"
                );
                self.rx = self.rx.resubscribe();
                Some(
                    self.store
                        .get(self.namespace, &self.key)
                        .await
                        .unwrap_or(Value::Null),
                )
            }
            Err(RecvError::Closed) => None,
        }
    }
}
