//! Repository gateway
//!
//! [`RepositoryGateway`] is the only writer of the [`KeyStore`]. It resolves
//! key names, validates patches, and keeps cross-key invariants:
//!
//! - `local.activeCredentials`, when set, is one of `local.credentials`;
//!   a patch that drops the active entry from the list also clears it.
//! - When the active identity changes, the platform-derived `user` keys are
//!   reset to their defaults.
//! - File content reads prefer the pending swap edit over the disk.
//!
//! Read-modify-write operations run behind one write gate, so invariants are
//! checked against the state they are applied to.

mod fetch;
mod watch;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::config::FetchPolicy;
use crate::error::{RepositoryError, RepositoryResult};
use crate::fs::FileSystem;
use crate::models::{
    CredentialsEntry, IDENTITY_SCOPED_KEYS, Namespace, RepositoryKey, RepositoryPatch,
};
use crate::platform::PlatformConnector;
use crate::store::KeyStore;

pub use fetch::FETCH_SUCCESS;
pub use watch::KeyWatch;

fn decode<T: DeserializeOwned>(key: RepositoryKey, value: Value) -> RepositoryResult<T> {
    serde_json::from_value(value).map_err(|e| {
        RepositoryError::Validation(format!("Stored value of \"{key}\" is malformed: {e}"))
    })
}

/// Process-side owner of repository state
pub struct RepositoryGateway {
    store: Arc<KeyStore>,
    fs: Arc<dyn FileSystem>,
    platform: Arc<dyn PlatformConnector>,
    fetch_policy: FetchPolicy,
    write_gate: Mutex<()>,
}

impl std::fmt::Debug for RepositoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryGateway")
            .field("store", &self.store)
            .field("fetch_policy", &self.fetch_policy)
            .finish_non_exhaustive()
    }
}

impl RepositoryGateway {
    /// Creates a gateway over `store` and its collaborators
    #[must_use]
    pub fn new(
        store: Arc<KeyStore>,
        fs: Arc<dyn FileSystem>,
        platform: Arc<dyn PlatformConnector>,
    ) -> Self {
        Self {
            store,
            fs,
            platform,
            fetch_policy: FetchPolicy::default(),
            write_gate: Mutex::new(()),
        }
    }

    /// Sets how partial platform failures are handled
    #[must_use]
    pub const fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    /// Returns the underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    /// Returns the filesystem collaborator
    #[must_use]
    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Returns the configured fetch policy
    #[must_use]
    pub const fn fetch_policy(&self) -> FetchPolicy {
        self.fetch_policy
    }

    /// Reads one key, or the whole namespace when `key` is `None`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` listing the available keys if `key` is not defined
    /// for `namespace`.
    pub async fn get(&self, namespace: Namespace, key: Option<&str>) -> RepositoryResult<Value> {
        let Some(name) = key else {
            return Ok(Value::Object(self.store.get_namespace(namespace).await));
        };
        let key = RepositoryKey::lookup(namespace, name)?;
        Ok(self.read_raw(namespace, key).await)
    }

    async fn read_raw(&self, namespace: Namespace, key: RepositoryKey) -> Value {
        self.store
            .get(namespace, key.as_str())
            .await
            .unwrap_or_else(|| key.default_value())
    }

    async fn read<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: RepositoryKey,
    ) -> RepositoryResult<T> {
        decode(key, self.read_raw(namespace, key).await)
    }

    /// Returns the registered credentials
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the stored list is malformed.
    pub async fn credentials(&self) -> RepositoryResult<Vec<CredentialsEntry>> {
        self.read(Namespace::Local, RepositoryKey::Credentials).await
    }

    /// Returns the active credentials, if any
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the stored entry is malformed.
    pub async fn active_credentials(&self) -> RepositoryResult<Option<CredentialsEntry>> {
        self.read(Namespace::Local, RepositoryKey::ActiveCredentials)
            .await
    }

    /// Subscribes to one key
    ///
    /// The returned watch yields the current value first, then every change.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` listing the available keys if `key` is not defined
    /// for `namespace`.
    pub async fn watch(&self, namespace: Namespace, key: &str) -> RepositoryResult<KeyWatch> {
        let key = RepositoryKey::lookup(namespace, key)?;
        let (current, rx) = self.store.subscribe(namespace, key.as_str()).await;
        Ok(KeyWatch::new(
            Arc::clone(&self.store),
            namespace,
            key.as_str().to_string(),
            current.unwrap_or_else(|| key.default_value()),
            rx,
        ))
    }

    /// Applies a validated patch
    ///
    /// # Errors
    ///
    /// Returns `Validation` for keys of the other namespace or values of the
    /// wrong shape, `NotFound` if `activeCredentials` names unregistered
    /// credentials, and `Io` if the patch cannot be persisted.
    #[instrument(
        name = "gateway.patch",
        skip(self, patch),
        fields(namespace = %namespace, keys = patch.len())
    )]
    pub async fn patch(
        &self,
        namespace: Namespace,
        patch: RepositoryPatch,
    ) -> RepositoryResult<()> {
        patch.validate_for(namespace)?;
        let _gate = self.write_gate.lock().await;
        self.commit(namespace, patch).await
    }

    /// Enforces invariants and writes; the caller holds the write gate
    async fn commit(
        &self,
        namespace: Namespace,
        mut patch: RepositoryPatch,
    ) -> RepositoryResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        if namespace != Namespace::Local
            || !(patch.contains(RepositoryKey::Credentials)
                || patch.contains(RepositoryKey::ActiveCredentials))
        {
            return self.store.patch(namespace, patch.into_map()).await;
        }

        let previous = self.active_credentials().await?.map(|entry| entry.id);
        let credentials: Vec<CredentialsEntry> = match patch.get(RepositoryKey::Credentials) {
            Some(value) => decode(RepositoryKey::Credentials, value.clone())?,
            None => self.credentials().await?,
        };
        let registered = |id: &str| credentials.iter().any(|entry| entry.id == id);

        let next = match patch.get(RepositoryKey::ActiveCredentials) {
            Some(value) => {
                let active: Option<CredentialsEntry> =
                    decode(RepositoryKey::ActiveCredentials, value.clone())?;
                if let Some(entry) = &active
                    && !registered(&entry.id)
                {
                    return Err(RepositoryError::NotFound(format!(
                        "Credentials \"{}\" are not registered",
                        entry.id
                    )));
                }
                active.map(|entry| entry.id)
            }
            None => match previous.as_deref() {
                Some(id) if !registered(id) => {
                    debug!(id, "Active credentials removed, clearing");
                    patch.insert(RepositoryKey::ActiveCredentials, Value::Null);
                    None
                }
                _ => previous.clone(),
            },
        };

        self.store.patch(namespace, patch.into_map()).await?;

        if previous != next {
            info!(
                from = previous.as_deref().unwrap_or("-"),
                to = next.as_deref().unwrap_or("-"),
                "Active identity changed, resetting platform state"
            );
            let reset = IDENTITY_SCOPED_KEYS
                .into_iter()
                .map(|key| (key.as_str().to_string(), key.default_value()))
                .collect();
            self.store.patch(Namespace::User, reset).await?;
        }
        Ok(())
    }

    /// Makes registered credentials the active identity
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no credentials with `credentials_id` are
    /// registered.
    #[instrument(name = "gateway.activate_user", skip(self))]
    pub async fn activate_user(&self, credentials_id: &str) -> RepositoryResult<()> {
        let _gate = self.write_gate.lock().await;
        let entry = self
            .credentials()
            .await?
            .into_iter()
            .find(|entry| entry.id == credentials_id)
            .ok_or_else(|| {
                RepositoryError::NotFound(format!(
                    "No credentials registered with id \"{credentials_id}\""
                ))
            })?;
        let patch = RepositoryPatch::new().with_typed(RepositoryKey::ActiveCredentials, &entry)?;
        self.commit(Namespace::Local, patch).await
    }

    /// Clears the active identity
    ///
    /// # Errors
    ///
    /// Returns `Io` if the change cannot be persisted.
    #[instrument(name = "gateway.deactivate_user", skip(self))]
    pub async fn deactivate_user(&self) -> RepositoryResult<()> {
        let _gate = self.write_gate.lock().await;
        let patch = RepositoryPatch::new().with(RepositoryKey::ActiveCredentials, Value::Null);
        self.commit(Namespace::Local, patch).await
    }

    /// Registers credentials, updating an equivalent entry in place
    ///
    /// If the entry is the active identity, the active copy is refreshed too.
    /// Returns the stored entry with its derived id.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the entry's id is inconsistent with its URL
    /// and username.
    #[instrument(name = "gateway.add_credentials", skip(self, entry), fields(id = %entry.id))]
    pub async fn add_credentials(
        &self,
        mut entry: CredentialsEntry,
    ) -> RepositoryResult<CredentialsEntry> {
        entry.normalize()?;
        let _gate = self.write_gate.lock().await;

        let mut credentials = self.credentials().await?;
        match credentials.iter_mut().find(|existing| existing.equals(&entry)) {
            Some(existing) => existing.update_to_match(&entry),
            None => credentials.push(entry.clone()),
        }

        let mut patch =
            RepositoryPatch::new().with_typed(RepositoryKey::Credentials, &credentials)?;
        if self
            .active_credentials()
            .await?
            .is_some_and(|active| active.equals(&entry))
        {
            patch = patch.with_typed(RepositoryKey::ActiveCredentials, &entry)?;
        }
        self.commit(Namespace::Local, patch).await?;
        Ok(entry)
    }

    /// Unregisters credentials; removing the active entry clears it
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no credentials with `credentials_id` are
    /// registered.
    #[instrument(name = "gateway.remove_credentials", skip(self))]
    pub async fn remove_credentials(&self, credentials_id: &str) -> RepositoryResult<()> {
        let _gate = self.write_gate.lock().await;
        let mut credentials = self.credentials().await?;
        let before = credentials.len();
        credentials.retain(|entry| entry.id != credentials_id);
        if credentials.len() == before {
            return Err(RepositoryError::NotFound(format!(
                "No credentials registered with id \"{credentials_id}\""
            )));
        }
        let patch = RepositoryPatch::new().with_typed(RepositoryKey::Credentials, &credentials)?;
        self.commit(Namespace::Local, patch).await
    }

    /// Sets or clears the pending edit for `swap_id`
    ///
    /// # Errors
    ///
    /// Returns `Io` if the change cannot be persisted.
    #[instrument(
        name = "gateway.patch_swap",
        skip(self, content),
        fields(namespace = %namespace, set = content.is_some())
    )]
    pub async fn patch_swap(
        &self,
        namespace: Namespace,
        swap_id: &str,
        content: Option<String>,
    ) -> RepositoryResult<()> {
        let _gate = self.write_gate.lock().await;
        self.patch_swap_locked(namespace, swap_id, content).await
    }

    async fn patch_swap_locked(
        &self,
        namespace: Namespace,
        swap_id: &str,
        content: Option<String>,
    ) -> RepositoryResult<()> {
        let mut swap: BTreeMap<String, String> =
            self.read(namespace, RepositoryKey::Swap).await?;
        let changed = match content {
            Some(content) => swap.insert(swap_id.to_string(), content.clone()) != Some(content),
            None => swap.remove(swap_id).is_some(),
        };
        if !changed {
            return Ok(());
        }
        let patch = RepositoryPatch::new().with_typed(RepositoryKey::Swap, &swap)?;
        self.commit(namespace, patch).await
    }

    /// Reads a local file, preferring its pending edit
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no pending edit and no file at `path`.
    pub async fn get_file_content(&self, path: &str) -> RepositoryResult<String> {
        let swap: BTreeMap<String, String> =
            self.read(Namespace::Local, RepositoryKey::Swap).await?;
        if let Some(content) = swap.get(path) {
            debug!(path, "Serving content from swap");
            return Ok(content.clone());
        }
        Ok(self.fs.read_file(path).await?)
    }

    /// Writes a local file and drops its pending edit
    ///
    /// # Errors
    ///
    /// Returns the filesystem error if the write fails; the pending edit is
    /// kept in that case.
    #[instrument(name = "gateway.save_file_content", skip(self, content))]
    pub async fn save_file_content(&self, path: &str, content: &str) -> RepositoryResult<()> {
        self.fs.save_file(path, content).await?;
        let _gate = self.write_gate.lock().await;
        self.patch_swap_locked(Namespace::Local, path, None).await
    }
}
