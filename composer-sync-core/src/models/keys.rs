//! Known repository keys and typed patches
//!
//! Every key the editor persists is listed in [`RepositoryKey`]. A
//! [`RepositoryPatch`] only accepts known keys and is checked against the
//! namespace and the key's value shape before it reaches the store.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::error::{RepositoryError, RepositoryResult};

use super::credentials::CredentialsEntry;
use super::namespace::Namespace;
use super::platform::{App, Project};
use super::preferences::{ActiveTab, AppMetaEntry, AppPanel, PublicAppsGrouping};

/// A key known to the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RepositoryKey {
    /// Last active editor tab (both namespaces)
    ActiveTab,
    /// Expanded tree nodes (both namespaces)
    ExpandedNodes,
    /// Open editor tabs (both namespaces)
    OpenTabs,
    /// Unsaved edits keyed by item id (both namespaces)
    Swap,
    /// Recently opened apps (both namespaces)
    RecentApps,
    /// Per-app run settings (both namespaces)
    AppMeta,
    /// Registered platform credentials (`local`)
    Credentials,
    /// Credentials acting as the current identity (`local`)
    ActiveCredentials,
    /// Workspace folders added by the user (`local`)
    LocalFolders,
    /// Public apps grouping mode (`local`)
    PublicAppsGrouping,
    /// Selected side bar panel (`local`)
    SelectedAppPanel,
    /// Whether the side bar is hidden (`local`)
    SidebarHidden,
    /// Cached platform projects (`user`)
    Projects,
    /// Cached private apps (`user`)
    Apps,
    /// Cached public apps (`user`)
    PublicApps,
    /// Ids of projects opened in the side bar (`user`)
    OpenProjects,
    /// When projects were last fetched, ms since epoch (`user`)
    ProjectFetchTimestamp,
    /// When apps were last fetched, ms since epoch (`user`)
    AppFetchTimestamp,
}

const COMMON_KEYS: [RepositoryKey; 6] = [
    RepositoryKey::ActiveTab,
    RepositoryKey::ExpandedNodes,
    RepositoryKey::OpenTabs,
    RepositoryKey::Swap,
    RepositoryKey::RecentApps,
    RepositoryKey::AppMeta,
];

const LOCAL_KEYS: [RepositoryKey; 6] = [
    RepositoryKey::Credentials,
    RepositoryKey::ActiveCredentials,
    RepositoryKey::LocalFolders,
    RepositoryKey::PublicAppsGrouping,
    RepositoryKey::SelectedAppPanel,
    RepositoryKey::SidebarHidden,
];

const USER_KEYS: [RepositoryKey; 6] = [
    RepositoryKey::Projects,
    RepositoryKey::Apps,
    RepositoryKey::PublicApps,
    RepositoryKey::OpenProjects,
    RepositoryKey::ProjectFetchTimestamp,
    RepositoryKey::AppFetchTimestamp,
];

/// Platform-derived `user` keys, reset when the active identity changes
pub const IDENTITY_SCOPED_KEYS: [RepositoryKey; 7] = [
    RepositoryKey::Swap,
    RepositoryKey::Projects,
    RepositoryKey::Apps,
    RepositoryKey::PublicApps,
    RepositoryKey::OpenProjects,
    RepositoryKey::ProjectFetchTimestamp,
    RepositoryKey::AppFetchTimestamp,
];

fn check_shape<T: DeserializeOwned>(key: RepositoryKey, value: &Value) -> RepositoryResult<()> {
    T::deserialize_from(key, value).map(|_| ())
}

fn check_credentials(entry: &CredentialsEntry) -> RepositoryResult<()> {
    let mut copy = entry.clone();
    copy.normalize()?;
    if entry.id.is_empty() {
        return Err(RepositoryError::Validation(format!(
            "Credentials for \"{}\" are missing their id",
            entry.user.username
        )));
    }
    Ok(())
}

impl RepositoryKey {
    /// Returns the wire name of the key
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ActiveTab => "activeTab",
            Self::ExpandedNodes => "expandedNodes",
            Self::OpenTabs => "openTabs",
            Self::Swap => "swap",
            Self::RecentApps => "recentApps",
            Self::AppMeta => "appMeta",
            Self::Credentials => "credentials",
            Self::ActiveCredentials => "activeCredentials",
            Self::LocalFolders => "localFolders",
            Self::PublicAppsGrouping => "publicAppsGrouping",
            Self::SelectedAppPanel => "selectedAppPanel",
            Self::SidebarHidden => "sidebarHidden",
            Self::Projects => "projects",
            Self::Apps => "apps",
            Self::PublicApps => "publicApps",
            Self::OpenProjects => "openProjects",
            Self::ProjectFetchTimestamp => "projectFetchTimestamp",
            Self::AppFetchTimestamp => "appFetchTimestamp",
        }
    }

    /// Returns every key defined for `namespace`
    #[must_use]
    pub fn keys_for(namespace: Namespace) -> Vec<Self> {
        let scoped = match namespace {
            Namespace::Local => LOCAL_KEYS,
            Namespace::User => USER_KEYS,
        };
        COMMON_KEYS.iter().chain(scoped.iter()).copied().collect()
    }

    /// Returns true if the key is defined for `namespace`
    #[must_use]
    pub fn belongs_to(self, namespace: Namespace) -> bool {
        COMMON_KEYS.contains(&self)
            || match namespace {
                Namespace::Local => LOCAL_KEYS.contains(&self),
                Namespace::User => USER_KEYS.contains(&self),
            }
    }

    /// Resolves a wire name to a key defined for `namespace`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` listing the available keys if the name is unknown
    /// or belongs to the other namespace.
    pub fn lookup(namespace: Namespace, name: &str) -> RepositoryResult<Self> {
        name.parse::<Self>()
            .ok()
            .filter(|key| key.belongs_to(namespace))
            .ok_or_else(|| {
                let available: Vec<&str> = Self::keys_for(namespace)
                    .into_iter()
                    .map(Self::as_str)
                    .collect();
                RepositoryError::NotFound(format!(
                    "Key \"{name}\" does not exist in {namespace} storage. Available keys: {}",
                    available.join(", ")
                ))
            })
    }

    /// Returns the value a fresh repository holds for this key
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            Self::ActiveTab | Self::ActiveCredentials => Value::Null,
            Self::ExpandedNodes
            | Self::OpenTabs
            | Self::RecentApps
            | Self::Credentials
            | Self::LocalFolders
            | Self::Projects
            | Self::Apps
            | Self::PublicApps
            | Self::OpenProjects => json!([]),
            Self::Swap | Self::AppMeta => json!({}),
            Self::PublicAppsGrouping => json!("toolkit"),
            Self::SelectedAppPanel => json!("myApps"),
            Self::SidebarHidden => json!(false),
            Self::ProjectFetchTimestamp | Self::AppFetchTimestamp => json!(0),
        }
    }

    /// Checks that `value` has the shape this key stores
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the value does not deserialize into the key's
    /// type, or if a credentials entry carries an inconsistent id.
    pub fn validate(self, value: &Value) -> RepositoryResult<()> {
        match self {
            Self::ActiveTab => check_shape::<Option<ActiveTab>>(self, value),
            Self::ExpandedNodes | Self::LocalFolders | Self::OpenProjects => {
                check_shape::<Vec<String>>(self, value)
            }
            Self::OpenTabs | Self::RecentApps => check_shape::<Vec<Map<String, Value>>>(self, value),
            Self::Swap => check_shape::<BTreeMap<String, String>>(self, value),
            Self::AppMeta => check_shape::<BTreeMap<String, AppMetaEntry>>(self, value),
            Self::Credentials => {
                let entries = Vec::<CredentialsEntry>::deserialize_from(self, value)?;
                entries.iter().try_for_each(check_credentials)
            }
            Self::ActiveCredentials => {
                match Option::<CredentialsEntry>::deserialize_from(self, value)? {
                    Some(entry) => check_credentials(&entry),
                    None => Ok(()),
                }
            }
            Self::PublicAppsGrouping => check_shape::<PublicAppsGrouping>(self, value),
            Self::SelectedAppPanel => check_shape::<AppPanel>(self, value),
            Self::SidebarHidden => check_shape::<bool>(self, value),
            Self::Projects => check_shape::<Vec<Project>>(self, value),
            Self::Apps | Self::PublicApps => check_shape::<Vec<App>>(self, value),
            Self::ProjectFetchTimestamp | Self::AppFetchTimestamp => check_shape::<u64>(self, value),
        }
    }
}

trait DeserializeFrom: Sized {
    fn deserialize_from(key: RepositoryKey, value: &Value) -> RepositoryResult<Self>;
}

impl<T: DeserializeOwned> DeserializeFrom for T {
    fn deserialize_from(key: RepositoryKey, value: &Value) -> RepositoryResult<Self> {
        T::deserialize(value).map_err(|e| {
            RepositoryError::Validation(format!("Invalid value for \"{}\": {e}", key.as_str()))
        })
    }
}

impl std::fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RepositoryKey {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        COMMON_KEYS
            .iter()
            .chain(LOCAL_KEYS.iter())
            .chain(USER_KEYS.iter())
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| RepositoryError::Validation(format!("Unknown repository key \"{s}\"")))
    }
}

/// Default record for a namespace
#[must_use]
pub fn default_record(namespace: Namespace) -> Map<String, Value> {
    RepositoryKey::keys_for(namespace)
        .into_iter()
        .map(|key| (key.as_str().to_string(), key.default_value()))
        .collect()
}

/// Default records for both namespaces
#[must_use]
pub fn default_records() -> HashMap<Namespace, Map<String, Value>> {
    Namespace::ALL
        .into_iter()
        .map(|ns| (ns, default_record(ns)))
        .collect()
}

/// A partial update of one namespace
///
/// Each entry fully replaces the stored value for its key; there is no deep
/// merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryPatch {
    entries: BTreeMap<RepositoryKey, Value>,
}

impl RepositoryPatch {
    /// Creates an empty patch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a raw JSON value for `key`
    #[must_use]
    pub fn with(mut self, key: RepositoryKey, value: Value) -> Self {
        self.entries.insert(key, value);
        self
    }

    /// Adds a serializable value for `key`
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the value cannot be represented as JSON.
    pub fn with_typed<T: Serialize + ?Sized>(
        self,
        key: RepositoryKey,
        value: &T,
    ) -> RepositoryResult<Self> {
        Ok(self.with(key, serde_json::to_value(value)?))
    }

    /// Inserts or replaces the value for `key`
    pub fn insert(&mut self, key: RepositoryKey, value: Value) {
        self.entries.insert(key, value);
    }

    /// Builds a patch from a JSON object with wire key names
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the payload is not an object or names an
    /// unknown key.
    pub fn from_json(payload: &Value) -> RepositoryResult<Self> {
        let object = payload.as_object().ok_or_else(|| {
            RepositoryError::Validation("Patch payload must be a JSON object".to_string())
        })?;
        let mut patch = Self::new();
        for (name, value) in object {
            patch.insert(name.parse()?, value.clone());
        }
        Ok(patch)
    }

    /// Checks every entry against `namespace` and its value shape
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a key of the other namespace or a value of
    /// the wrong shape.
    pub fn validate_for(&self, namespace: Namespace) -> RepositoryResult<()> {
        for (key, value) in &self.entries {
            if !key.belongs_to(namespace) {
                return Err(RepositoryError::Validation(format!(
                    "Key \"{key}\" cannot be stored in {namespace} storage"
                )));
            }
            key.validate(value)?;
        }
        Ok(())
    }

    /// Returns the value for `key`, if present
    #[must_use]
    pub fn get(&self, key: RepositoryKey) -> Option<&Value> {
        self.entries.get(&key)
    }

    /// Returns true if the patch sets `key`
    #[must_use]
    pub fn contains(&self, key: RepositoryKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Returns true if the patch sets no key
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of keys set
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over keys and values in key order
    pub fn iter(&self) -> impl Iterator<Item = (RepositoryKey, &Value)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Converts into a JSON object with wire key names
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.entries
            .into_iter()
            .map(|(key, value)| (key.as_str().to_string(), value))
            .collect()
    }
}
