//! In-memory collaborators for tests and offline runs
//!
//! [`MemoryBackend`], [`MemoryFileSystem`] and [`StaticPlatform`] stand in
//! for the namespace documents, the disk and the platform REST API. Each can
//! be told to fail, so store and gateway error paths are testable without a
//! network.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{RepositoryError, RepositoryResult};
use crate::fs::{DirectoryEntry, FileSystem, FsError, FsResult};
use crate::models::{App, AppQuery, CredentialsEntry, Namespace, PlatformUser, Project};
use crate::platform::{PlatformApi, PlatformConnector, PlatformError, PlatformResult};
use crate::store::StorageBackend;

/// Storage backend keeping documents in memory
///
/// Writes can be made to fail to exercise the store's error path.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: Mutex<HashMap<Namespace, Value>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBackend {
    /// Creates an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a raw document, which need not be a JSON object
    #[must_use]
    pub fn with_document(self, namespace: Namespace, document: Value) -> Self {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(namespace, document);
        self
    }

    /// Makes every following write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the stored document of `namespace`
    #[must_use]
    pub fn document(&self, namespace: Namespace) -> Option<Value> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&namespace)
            .cloned()
    }

    /// Returns how many writes succeeded
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, namespace: Namespace) -> RepositoryResult<Option<Map<String, Value>>> {
        match self.document(namespace) {
            None => Ok(None),
            Some(Value::Object(record)) => Ok(Some(record)),
            Some(_) => Err(RepositoryError::Io(format!(
                "Corrupt {namespace} document: expected a JSON object"
            ))),
        }
    }

    async fn write(
        &self,
        namespace: Namespace,
        record: &Map<String, Value>,
    ) -> RepositoryResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Io(format!(
                "Simulated write failure for {namespace}"
            )));
        }
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(namespace, Value::Object(record.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Files kept in a map keyed by absolute path
///
/// Directories are implicit: a path is a directory if some file lives under
/// it, or if it was created with `create_directory`.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<String, String>>,
    dirs: Mutex<HashSet<String>>,
}

impl MemoryFileSystem {
    /// Creates an empty filesystem
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file
    #[must_use]
    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), content.into());
        self
    }

    /// Returns the content of a file, if present
    #[must_use]
    pub fn file(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    fn is_dir(&self, path: &str) -> bool {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.dirs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
            || self
                .files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .keys()
                .any(|file| file.starts_with(&prefix))
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn read_file(&self, path: &str) -> FsResult<String> {
        self.file(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    async fn save_file(&self, path: &str, content: &str) -> FsResult<()> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn create_file(&self, path: &str, content: &str) -> FsResult<()> {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        if files.contains_key(path) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        files.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn read_directory(&self, path: &str) -> FsResult<Vec<DirectoryEntry>> {
        if !self.is_dir(path) {
            return Err(FsError::NotFound(path.to_string()));
        }
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut children = BTreeMap::new();
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let dirs = self.dirs.lock().unwrap_or_else(PoisonError::into_inner);
        for candidate in files.keys().chain(dirs.iter()) {
            let Some(rest) = candidate.strip_prefix(&prefix) else {
                continue;
            };
            let (name, nested) = match rest.split_once('/') {
                Some((name, _)) => (name, true),
                None => (rest, !files.contains_key(candidate.as_str())),
            };
            if !name.is_empty() {
                children.entry(name.to_string()).or_insert(nested);
            }
        }
        Ok(children
            .into_iter()
            .map(|(name, is_dir)| DirectoryEntry {
                path: format!("{prefix}{name}"),
                name,
                is_dir,
                is_file: !is_dir,
            })
            .collect())
    }

    async fn path_exists(&self, path: &str) -> bool {
        self.file(path).is_some() || self.is_dir(path)
    }

    async fn create_directory(&self, path: &str) -> FsResult<()> {
        let mut dirs = self.dirs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut current = String::new();
        for segment in Path::new(path).iter().skip(1) {
            current.push('/');
            current.push_str(&segment.to_string_lossy());
            dirs.insert(current.clone());
        }
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> FsResult<()> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let mut dirs = self.dirs.lock().unwrap_or_else(PoisonError::into_inner);
        let before = files.len() + dirs.len();
        files.retain(|file, _| file != path && !file.starts_with(&prefix));
        dirs.retain(|dir| dir != path && !dir.starts_with(&prefix));
        if files.len() + dirs.len() == before {
            return Err(FsError::NotFound(path.to_string()));
        }
        Ok(())
    }
}

/// One of the three listings a platform refresh performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformListing {
    /// `projects_all`
    Projects,
    /// `apps_private`
    PrivateApps,
    /// `apps_public`
    PublicApps,
}

#[derive(Debug, Default)]
struct StaticPlatformState {
    user: Option<PlatformUser>,
    projects: Vec<Project>,
    apps: Vec<App>,
    public_apps: Vec<App>,
    failing: HashSet<PlatformListing>,
    delay: Option<Duration>,
    connections: Vec<String>,
    rejected_tokens: HashSet<String>,
}

/// Platform with canned listings
///
/// Cloning shares the state, so a test can keep a handle while the gateway
/// owns the connector.
#[derive(Debug, Clone, Default)]
pub struct StaticPlatform {
    state: Arc<Mutex<StaticPlatformState>>,
    calls: Arc<AtomicUsize>,
}

impl StaticPlatform {
    /// Creates a platform with empty listings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StaticPlatformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the account returned by `current_user`
    #[must_use]
    pub fn with_user(self, user: PlatformUser) -> Self {
        self.state().user = Some(user);
        self
    }

    /// Makes handles built for `token` answer as an unknown account
    #[must_use]
    pub fn with_rejected_token(self, token: impl Into<String>) -> Self {
        self.state().rejected_tokens.insert(token.into());
        self
    }

    /// Sets the project listing
    #[must_use]
    pub fn with_projects(self, projects: Vec<Project>) -> Self {
        self.state().projects = projects;
        self
    }

    /// Sets the private app listing
    #[must_use]
    pub fn with_apps(self, apps: Vec<App>) -> Self {
        self.state().apps = apps;
        self
    }

    /// Sets the public app listing
    #[must_use]
    pub fn with_public_apps(self, apps: Vec<App>) -> Self {
        self.state().public_apps = apps;
        self
    }

    /// Delays every listing call
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state().delay = Some(delay);
        self
    }

    /// Makes `listing` fail (or succeed again)
    pub fn set_failing(&self, listing: PlatformListing, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing.insert(listing);
        } else {
            state.failing.remove(&listing);
        }
    }

    /// Returns how many listing calls were made
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the credentials ids clients were built for, in order
    #[must_use]
    pub fn connections(&self) -> Vec<String> {
        self.state().connections.clone()
    }

    async fn listing<T: Clone>(
        &self,
        listing: PlatformListing,
        pick: impl FnOnce(&StaticPlatformState) -> Vec<T>,
    ) -> PlatformResult<Vec<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        if state.failing.contains(&listing) {
            return Err(PlatformError::Status {
                status: 503,
                message: format!("{listing:?} unavailable"),
            });
        }
        Ok(pick(&state))
    }
}

#[async_trait]
impl PlatformApi for StaticPlatform {
    async fn current_user(&self) -> PlatformResult<PlatformUser> {
        self.state().user.clone().ok_or(PlatformError::Status {
            status: 401,
            message: "Unauthorized".to_string(),
        })
    }

    async fn projects_all(&self) -> PlatformResult<Vec<Project>> {
        self.listing(PlatformListing::Projects, |s| s.projects.clone())
            .await
    }

    async fn apps_private(&self, query: &AppQuery) -> PlatformResult<Vec<App>> {
        let project = query.project.clone();
        self.listing(PlatformListing::PrivateApps, move |s| {
            s.apps
                .iter()
                .filter(|app| project.as_ref().is_none_or(|p| &app.project == p))
                .cloned()
                .collect()
        })
        .await
    }

    async fn apps_public(&self) -> PlatformResult<Vec<App>> {
        self.listing(PlatformListing::PublicApps, |s| s.public_apps.clone())
            .await
    }
}

impl PlatformConnector for StaticPlatform {
    fn connect_token(&self, _url: &str, token: &str) -> PlatformResult<Arc<dyn PlatformApi>> {
        if self.state().rejected_tokens.contains(token) {
            return Ok(Arc::new(Self::new()));
        }
        Ok(Arc::new(self.clone()))
    }

    fn connect(&self, credentials: &CredentialsEntry) -> PlatformResult<Arc<dyn PlatformApi>> {
        self.state().connections.push(credentials.id.clone());
        self.connect_token(&credentials.url, &credentials.token)
    }
}
