//! Get command.

use std::path::Path;

use composer_sync_core::Namespace;

use crate::error::CliError;
use crate::util::{block_on, open_session, print_json};

/// Get command handler
pub fn cmd_get(
    config_path: Option<&Path>,
    namespace: Namespace,
    key: Option<&str>,
) -> Result<(), CliError> {
    let value = block_on(async {
        let session = open_session(config_path).await?;
        Ok::<_, CliError>(session.gateway.get(namespace, key).await?)
    })??;
    print_json(&value)
}
