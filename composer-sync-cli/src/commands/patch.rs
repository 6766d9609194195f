//! Patch command.

use std::path::Path;

use composer_sync_core::{Namespace, RepositoryPatch};
use serde_json::{Map, Value};

use crate::error::CliError;
use crate::util::{block_on, open_session};

/// Patch command handler
pub fn cmd_patch(
    config_path: Option<&Path>,
    namespace: Namespace,
    entries: Vec<(String, Value)>,
) -> Result<(), CliError> {
    let partial: Map<String, Value> = entries.into_iter().collect();
    let keys: Vec<String> = partial.keys().cloned().collect();
    let patch = RepositoryPatch::from_json(&Value::Object(partial))?;

    block_on(async {
        let session = open_session(config_path).await?;
        session.gateway.patch(namespace, patch).await?;
        Ok::<_, CliError>(())
    })??;

    println!("Updated {namespace}: {}", keys.join(", "));
    Ok(())
}
