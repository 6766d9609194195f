//! Small typed shapes stored under editor preference keys

use serde::{Deserialize, Serialize};

/// The tab that was active when the editor last closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTab {
    /// Id of the tab
    #[serde(rename = "tabID")]
    pub tab_id: String,
    /// When the tab was activated, ms since epoch
    #[serde(rename = "activationTime")]
    pub activation_time: f64,
}

/// Per-app run settings stored under `appMeta`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetaEntry {
    /// Working directory used when running the app locally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    /// Job file used when running the app locally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_file_path: Option<String>,
}

/// How public apps are grouped in the side panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PublicAppsGrouping {
    /// Group by toolkit
    #[default]
    Toolkit,
    /// Group by category
    Category,
}

/// Which app panel is selected in the side bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppPanel {
    /// The user's own apps
    #[default]
    MyApps,
    /// Public apps
    PublicApps,
}
