use std::collections::HashMap;

use serde_json::Value;

use crate::error::{RepositoryError, RepositoryResult};
use crate::gateway::FETCH_SUCCESS;
use crate::ipc::{IpcClient, RequestOptions, Route};
use crate::models::{App, Namespace, Project, RepositoryKey, RepositoryPatch};

use super::mirror::{MirrorReader, RepositoryMirror};

/// Typed view of the `user` repository for UI code
#[derive(Debug)]
pub struct UserRepositoryProxy {
    mirror: RepositoryMirror,
}

impl UserRepositoryProxy {
    /// Creates a proxy over `client`
    #[must_use]
    pub fn new(client: IpcClient) -> Self {
        Self {
            mirror: RepositoryMirror::new(client, Namespace::User),
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
    /// Returns `Validation` for a `local` key.
    pub fn watch(&self, key: RepositoryKey) -> RepositoryResult<MirrorReader> {
        self.mirror.reader(key)
    }

    /// Cached projects
    ///
    /// # Errors
    ///
    /// Returns an error if the watch fails before a value arrives.
    pub async fn projects(&self) -> RepositoryResult<Vec<Project>> {
        self.mirror.value(RepositoryKey::Projects).await
    }

    /// Cached private apps
    ///
    /// # Errors
    ///
    /// Returns an error if the watch fails before a value arrives.
    pub async fn apps(&self) -> RepositoryResult<Vec<App>> {
        self.mirror.value(RepositoryKey::Apps).await
    }

    /// Ids of projects open in the side bar
    ///
    /// # Errors
    ///
    /// Returns an error if the watch fails before a value arrives.
    pub async fn open_projects(&self) -> RepositoryResult<Vec<String>> {
        self.mirror.value(RepositoryKey::OpenProjects).await
    }

    /// Expanded nodes of the platform tree
    ///
    /// # Errors
    ///
    /// Returns an error if the watch fails before a value arrives.
    pub async fn expanded_nodes(&self) -> RepositoryResult<Vec<String>> {
        self.mirror.value(RepositoryKey::ExpandedNodes).await
    }

    /// Private apps that belong to `project_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the watch fails before a value arrives.
    pub async fn apps_for_project(&self, project_id: &str) -> RepositoryResult<Vec<App>> {
        let mut apps = self.apps().await?;
        apps.retain(|app| app.project == project_id);
        Ok(apps)
    }

    /// Open projects resolved against the project cache
    ///
    /// Ids without a cached project are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if either watch fails before a value arrives.
    pub async fn open_project_entries(&self) -> RepositoryResult<Vec<Project>> {
        let open = self.open_projects().await?;
        let mut projects: HashMap<String, Project> = self
            .projects()
            .await?
            .into_iter()
            .map(|project| (project.id.clone(), project))
            .collect();
        Ok(open.iter().filter_map(|id| projects.remove(id)).collect())
    }

    /// Marks a tree node expanded or collapsed
    ///
    /// # Errors
    ///
    /// Returns the gateway's error for the patch.
    pub async fn set_node_expansion(&self, node_id: &str, expanded: bool) -> RepositoryResult<()> {
        let mut nodes = self.expanded_nodes().await?;
        let present = nodes.iter().any(|node| node == node_id);
        match (expanded, present) {
            (true, false) => nodes.push(node_id.to_string()),
            (false, true) => nodes.retain(|node| node != node_id),
            _ => return Ok(()),
        }
        let patch = RepositoryPatch::new().with_typed(RepositoryKey::ExpandedNodes, &nodes)?;
        self.mirror.patch(patch).await
    }

    /// Opens projects in the side bar, skipping ones already open
    ///
    /// # Errors
    ///
    /// Returns the gateway's error for the patch.
    pub async fn add_open_projects(&self, project_ids: &[String]) -> RepositoryResult<()> {
        let mut open = self.open_projects().await?;
        let before = open.len();
        for id in project_ids {
            if !open.contains(id) {
                open.push(id.clone());
            }
        }
        if open.len() == before {
            return Ok(());
        }
        let patch = RepositoryPatch::new().with_typed(RepositoryKey::OpenProjects, &open)?;
        self.mirror.patch(patch).await
    }

    /// Closes projects in the side bar
    ///
    /// # Errors
    ///
    /// Returns the gateway's error for the patch.
    pub async fn remove_open_projects(&self, project_ids: &[String]) -> RepositoryResult<()> {
        let mut open = self.open_projects().await?;
        let before = open.len();
        open.retain(|id| !project_ids.contains(id));
        if open.len() == before {
            return Ok(());
        }
        let patch = RepositoryPatch::new().with_typed(RepositoryKey::OpenProjects, &open)?;
        self.mirror.patch(patch).await
    }

    /// Asks the gateway to refresh platform data
    ///
    /// # Errors
    ///
    /// Returns the gateway's error, or `Protocol` if it answers with
    /// anything other than success.
    pub async fn fetch(&self, options: RequestOptions) -> RepositoryResult<()> {
        let reply = self
            .mirror
            .client()
            .request_with(Route::FetchPlatformData, Value::Null, options)
            .await?;
        if reply.as_str() == Some(FETCH_SUCCESS) {
            Ok(())
        } else {
            Err(RepositoryError::Protocol(format!(
                "Unexpected fetch reply: {reply}"
            )))
        }
    }
}
