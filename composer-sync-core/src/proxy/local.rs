use serde_json::{Value, json};
use tracing::debug;

use crate::error::RepositoryResult;
use crate::ipc::{IpcClient, Route, TokenPayload};
use crate::models::{CredentialsEntry, Namespace, PlatformUser, RepositoryKey, RepositoryPatch};

use super::mirror::{MirrorReader, RepositoryMirror};

/// Typed view of the `local` repository for UI code
#[derive(Debug)]
pub struct LocalRepositoryProxy {
    mirror: RepositoryMirror,
}

impl LocalRepositoryProxy {
    /// Creates a proxy over `client`
    #[must_use]
    pub fn new(client: IpcClient) -> Self {
        Self {
            mirror: RepositoryMirror::new(client, Namespace::Local),
        }
    }

    /// Underlying mirror
    #[must_use]
    pub const fn mirror(&self) -> &RepositoryMirror {
        &self.mirror
    }

    /// Streams changes of `key`
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a `user` key.
    pub fn watch(&self, key: RepositoryKey) -> RepositoryResult<MirrorReader> {
        self.mirror.reader(key)
    }

    /// Workspace folders
    ///
    /// # Errors
    ///
    /// Returns an error if the watch fails before a value arrives.
    pub async fn local_folders(&self) -> RepositoryResult<Vec<String>> {
        self.mirror.value(RepositoryKey::LocalFolders).await
    }

    /// Expanded nodes of the local tree
    ///
    /// # Errors
    ///
    /// Returns an error if the watch fails before a value arrives.
    pub async fn expanded_nodes(&self) -> RepositoryResult<Vec<String>> {
        self.mirror.value(RepositoryKey::ExpandedNodes).await
    }

    /// Registered credentials
    ///
    /// # Errors
    ///
    /// Returns an error if the watch fails before a value arrives.
    pub async fn credentials(&self) -> RepositoryResult<Vec<CredentialsEntry>> {
        self.mirror.value(RepositoryKey::Credentials).await
    }

    /// Active credentials, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the watch fails before a value arrives.
    pub async fn active_credentials(&self) -> RepositoryResult<Option<CredentialsEntry>> {
        self.mirror.value(RepositoryKey::ActiveCredentials).await
    }

    /// Replaces the credentials list
    ///
    /// Active credentials missing from `credentials` are cleared in the same
    /// patch.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error for the patch.
    pub async fn set_credentials(&self, credentials: Vec<CredentialsEntry>) -> RepositoryResult<()> {
        let mut patch =
            RepositoryPatch::new().with_typed(RepositoryKey::Credentials, &credentials)?;
        if let Some(active) = self.active_credentials().await?
            && !credentials.iter().any(|entry| entry.equals(&active))
        {
            debug!(id = %active.id, "Active credentials removed, deactivating");
            patch.insert(RepositoryKey::ActiveCredentials, Value::Null);
        }
        self.mirror.patch(patch).await
    }

    /// Sets or clears the active credentials directly
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `credentials` are not registered.
    pub async fn set_active_credentials(
        &self,
        credentials: Option<CredentialsEntry>,
    ) -> RepositoryResult<()> {
        let patch =
            RepositoryPatch::new().with_typed(RepositoryKey::ActiveCredentials, &credentials)?;
        self.mirror.patch(patch).await
    }

    /// Appends folders not already present, keeping their order
    ///
    /// # Errors
    ///
    /// Returns the gateway's error for the patch.
    pub async fn add_local_folders<I, S>(&self, folders: I) -> RepositoryResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut current = self.local_folders().await?;
        let before = current.len();
        for folder in folders {
            let folder = folder.into();
            if !current.contains(&folder) {
                current.push(folder);
            }
        }
        if current.len() == before {
            return Ok(());
        }
        let patch = RepositoryPatch::new().with_typed(RepositoryKey::LocalFolders, &current)?;
        self.mirror.patch(patch).await
    }

    /// Shows or hides the side bar
    ///
    /// # Errors
    ///
    /// Returns the gateway's error for the patch.
    pub async fn set_sidebar_hidden(&self, hidden: bool) -> RepositoryResult<()> {
        let patch = RepositoryPatch::new().with(RepositoryKey::SidebarHidden, json!(hidden));
        self.mirror.patch(patch).await
    }

    /// Looks up the account `token` belongs to on the platform at `url`
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed URL or token and `Upstream` if
    /// the platform rejects the token.
    pub async fn get_user_by_token(&self, url: &str, token: &str) -> RepositoryResult<PlatformUser> {
        let payload = TokenPayload {
            url: url.to_string(),
            token: token.to_string(),
        };
        let user = self
            .mirror
            .client()
            .request(Route::GetUserByToken, serde_json::to_value(payload)?)
            .await?;
        Ok(serde_json::from_value(user)?)
    }

    /// Makes registered credentials active
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no credentials have that id.
    pub async fn activate_user(&self, credentials_id: &str) -> RepositoryResult<()> {
        self.mirror
            .client()
            .request(Route::ActivateUser, json!(credentials_id))
            .await
            .map(|_| ())
    }
}
