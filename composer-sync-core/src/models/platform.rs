//! Platform listings cached in the `user` namespace

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A platform project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Project id, `owner/project`
    pub id: String,
    /// Display name
    pub name: String,
    /// Remaining fields returned by the platform
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Project {
    /// Creates a project with only the required fields
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// A platform app (tool or workflow)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    /// App id, `owner/project/app[/revision]`
    pub id: String,
    /// Display name
    pub name: String,
    /// Id of the project the app lives in
    #[serde(default)]
    pub project: String,
    /// Remaining fields returned by the platform
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl App {
    /// Creates an app with only the required fields
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            project: project.into(),
            extra: Map::new(),
        }
    }
}

/// Query parameters for the private app listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppQuery {
    /// Restrict to one project
    pub project: Option<String>,
    /// Restrict to projects of one owner
    pub project_owner: Option<String>,
    /// `public` or `private`
    pub visibility: Option<String>,
    /// Field selector
    pub fields: Option<String>,
}

impl AppQuery {
    /// Returns the query as URL query pairs, skipping unset fields
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        [
            ("project", &self.project),
            ("project_owner", &self.project_owner),
            ("visibility", &self.visibility),
            ("fields", &self.fields),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| (name.to_string(), v.clone())))
        .collect()
    }
}
