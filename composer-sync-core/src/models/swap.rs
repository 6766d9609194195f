//! Swap (unsaved edit) addressing
//!
//! A swap entry lives in the namespace that owns the underlying item: local
//! files in `local`, platform apps in `user`. Platform app ids are stored
//! without their revision so that every revision shares one pending edit.

use super::namespace::Namespace;

/// Where an editable item comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSource {
    /// A file on the local filesystem (absolute path)
    Local,
    /// A document fetched from a public URL
    Public,
    /// A platform app
    App,
}

impl FileSource {
    /// Classifies an item id
    #[must_use]
    pub fn of(item_id: &str) -> Self {
        if item_id.starts_with('/') {
            Self::Local
        } else if item_id.starts_with("https://") || item_id.starts_with("http://") {
            Self::Public
        } else {
            Self::App
        }
    }
}

/// Namespace and swap key for an editable item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTarget {
    /// Namespace holding the swap entry
    pub namespace: Namespace,
    /// Key inside the namespace's `swap` map
    pub swap_id: String,
}

impl SwapTarget {
    /// Derives the swap location for an item id
    #[must_use]
    pub fn for_item(item_id: &str) -> Self {
        if FileSource::of(item_id) == FileSource::Local {
            return Self {
                namespace: Namespace::Local,
                swap_id: item_id.to_string(),
            };
        }
        Self {
            namespace: Namespace::User,
            swap_id: strip_revision(item_id),
        }
    }

    /// Returns true if the entry lives in the `local` namespace
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.namespace == Namespace::Local
    }
}

/// Keeps the `owner/project/app` part of a platform app id
#[must_use]
pub fn strip_revision(app_id: &str) -> String {
    app_id.split('/').take(3).collect::<Vec<_>>().join("/")
}
