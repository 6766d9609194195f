//! Serve command.

use std::path::Path;

use composer_sync_core::{IpcServer, ServerTransport};
use tracing::info;

use crate::error::CliError;
use crate::util::{block_on, open_session};

/// Serve command handler
///
/// Answers JSON-lines frames from stdin on stdout until stdin closes.
pub fn cmd_serve(config_path: Option<&Path>) -> Result<(), CliError> {
    block_on(async {
        let session = open_session(config_path).await?;
        info!(
            data_dir = %session.data_dir.display(),
            fetch_policy = ?session.settings.platform.fetch_policy,
            "Gateway ready"
        );

        let (transport, writer) =
            ServerTransport::from_stream_with_writer(tokio::io::stdin(), tokio::io::stdout());
        IpcServer::new(session.gateway.clone()).serve(transport).await;

        // In-flight fetches still hold reply senders; wait for their replies.
        if let Err(e) = writer.await {
            return Err(CliError::Repository(format!("Reply writer failed: {e}")));
        }
        info!("Gateway stopped");
        Ok(())
    })?
}
