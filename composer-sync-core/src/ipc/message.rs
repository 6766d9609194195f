//! Wire envelopes and route payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorPayload, RepositoryError, RepositoryResult};
use crate::models::Namespace;

/// Named operation a request invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Route {
    /// Read a `local` key or the whole namespace
    GetLocalRepository,
    /// Stream a `local` key
    WatchLocalRepository,
    /// Merge a partial object into `local`
    PatchLocalRepository,
    /// Read a `user` key or the whole namespace
    GetUserRepository,
    /// Stream a `user` key
    WatchUserRepository,
    /// Merge a partial object into `user`
    PatchUserRepository,
    /// Make registered credentials active
    ActivateUser,
    /// Clear the active credentials
    DeactivateUser,
    /// Refresh platform caches
    FetchPlatformData,
    /// Look up the account a token belongs to
    GetUserByToken,
    /// Set or delete a pending edit
    PatchSwap,
    /// Read a local file, pending edit first
    GetLocalFileContent,
    /// Read a local file from disk
    ReadFileContent,
    /// Write a local file
    SaveFileContent,
    /// Create a new local file
    CreateFile,
    /// List a local directory
    ReadDirectory,
    /// Check whether a local path exists
    PathExists,
    /// Create a local directory
    CreateDirectory,
    /// Delete a local file or directory
    DeletePath,
}

impl Route {
    /// Wire name of the route
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetLocalRepository => "getLocalRepository",
            Self::WatchLocalRepository => "watchLocalRepository",
            Self::PatchLocalRepository => "patchLocalRepository",
            Self::GetUserRepository => "getUserRepository",
            Self::WatchUserRepository => "watchUserRepository",
            Self::PatchUserRepository => "patchUserRepository",
            Self::ActivateUser => "activateUser",
            Self::DeactivateUser => "deactivateUser",
            Self::FetchPlatformData => "fetchPlatformData",
            Self::GetUserByToken => "getUserByToken",
            Self::PatchSwap => "patchSwap",
            Self::GetLocalFileContent => "getLocalFileContent",
            Self::ReadFileContent => "readFileContent",
            Self::SaveFileContent => "saveFileContent",
            Self::CreateFile => "createFile",
            Self::ReadDirectory => "readDirectory",
            Self::PathExists => "pathExists",
            Self::CreateDirectory => "createDirectory",
            Self::DeletePath => "deletePath",
        }
    }

    /// Returns true for routes that answer with a stream of replies
    #[must_use]
    pub const fn is_stream(self) -> bool {
        matches!(self, Self::WatchLocalRepository | Self::WatchUserRepository)
    }

    /// Returns true for routes served off the connection's request loop
    ///
    /// Everything else is answered in arrival order, so patches from one
    /// client are applied in the order they were sent.
    #[must_use]
    pub const fn is_long_running(self) -> bool {
        matches!(self, Self::FetchPlatformData | Self::GetUserByToken)
    }

    /// Namespace a repository route addresses
    #[must_use]
    pub const fn namespace(self) -> Option<Namespace> {
        match self {
            Self::GetLocalRepository | Self::WatchLocalRepository | Self::PatchLocalRepository => {
                Some(Namespace::Local)
            }
            Self::GetUserRepository | Self::WatchUserRepository | Self::PatchUserRepository => {
                Some(Namespace::User)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id (UUID v4)
    pub id: String,
    /// Operation to invoke
    pub route: Route,
    /// Whether the caller expects a stream of replies
    #[serde(default)]
    pub watch: bool,
    /// Route-specific payload
    #[serde(default)]
    pub payload: Value,
}

/// Frame sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// A request
    Request(Request),
    /// Tear down the stream opened by the watch request `id`
    Unwatch {
        /// Correlation id of the watch
        id: String,
    },
}

/// Reply envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Correlation id of the request answered
    pub id: String,
    /// Result value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure, if the request failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Reply {
    /// Successful reply
    #[must_use]
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data: Some(data),
            error: None,
        }
    }

    /// Failed reply
    #[must_use]
    pub fn err(id: impl Into<String>, error: &RepositoryError) -> Self {
        Self {
            id: id.into(),
            data: None,
            error: Some(error.to_payload()),
        }
    }

    /// Converts into the caller-facing result; a missing `data` is `null`
    ///
    /// # Errors
    ///
    /// Returns the error carried by the reply.
    pub fn into_result(self) -> RepositoryResult<Value> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.data.unwrap_or(Value::Null)),
        }
    }
}

/// Payload of the get and watch repository routes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyQuery {
    /// Key to read; the whole namespace when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Payload of `patchSwap`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPayload {
    /// Whether the entry lives in `local` (otherwise `user`)
    pub local: bool,
    /// Swap key
    #[serde(rename = "swapID")]
    pub swap_id: String,
    /// New content; anything but a string deletes the entry
    #[serde(rename = "swapContent", default)]
    pub swap_content: Option<Value>,
}

impl SwapPayload {
    /// Content to store, `None` when the entry should be deleted
    #[must_use]
    pub fn content(&self) -> Option<String> {
        match &self.swap_content {
            Some(Value::String(content)) => Some(content.clone()),
            _ => None,
        }
    }
}

/// Payload of `getUserByToken`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Platform base URL
    pub url: String,
    /// Authentication token
    pub token: String,
}

impl std::fmt::Debug for TokenPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPayload")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Payload of `saveFileContent`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveFilePayload {
    /// Target path
    pub path: String,
    /// Content to write
    pub content: String,
}

/// Payload of `createFile`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFilePayload {
    /// Target path
    pub path: String,
    /// Initial content
    #[serde(default)]
    pub content: String,
}
