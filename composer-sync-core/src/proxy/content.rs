use serde_json::{Value, json};

use crate::error::{RepositoryError, RepositoryResult};
use crate::ipc::{IpcClient, Route, SwapPayload};
use crate::models::SwapTarget;

/// Pending edits and local file content
#[derive(Debug, Clone)]
pub struct ContentProxy {
    client: IpcClient,
}

impl ContentProxy {
    /// Creates a proxy over `client`
    #[must_use]
    pub const fn new(client: IpcClient) -> Self {
        Self { client }
    }

    /// Stores or discards the pending edit of a file or app
    ///
    /// Local paths are kept in `local`; app edits go to `user` under the
    /// app id without its revision.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error for the swap patch.
    pub async fn update_swap(&self, file_id: &str, content: Option<String>) -> RepositoryResult<()> {
        let target = SwapTarget::for_item(file_id);
        let payload = SwapPayload {
            local: target.is_local(),
            swap_id: target.swap_id,
            swap_content: content.map(Value::String),
        };
        self.client
            .request(Route::PatchSwap, serde_json::to_value(payload)?)
            .await
            .map(|_| ())
    }

    /// Content of a local file, its pending edit taking precedence
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is neither an edit nor a file.
    pub async fn fetch_local_file_content(&self, path: &str) -> RepositoryResult<String> {
        let value = self
            .client
            .request(Route::GetLocalFileContent, json!(path))
            .await?;
        match value {
            Value::String(content) => Ok(content),
            other => Err(RepositoryError::Protocol(format!(
                "Expected file content, got {other}"
            ))),
        }
    }
}
