//! Storage namespaces

use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;

/// One of the two top-level scopes partitioning persisted state
///
/// `Local` holds machine-wide state (credentials, local folders); `User` holds
/// state derived from the active platform identity (project and app caches).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Machine-wide state
    Local,
    /// State scoped to the active platform user
    User,
}

impl Namespace {
    /// Both namespaces, in load order
    pub const ALL: [Self; 2] = [Self::Local, Self::User];

    /// Returns the wire name of the namespace
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::User => "user",
        }
    }

    /// Returns the file name of the persisted document for this namespace
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Local => "local.json",
            Self::User => "user.json",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Namespace {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "user" => Ok(Self::User),
            other => Err(RepositoryError::Validation(format!(
                "Unknown namespace \"{other}\", expected \"local\" or \"user\""
            ))),
        }
    }
}
