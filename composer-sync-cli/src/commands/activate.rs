//! Activate and deactivate commands.

use std::path::Path;

use crate::error::CliError;
use crate::util::{block_on, open_session};

/// Activate command handler
pub fn cmd_activate(config_path: Option<&Path>, id: &str) -> Result<(), CliError> {
    block_on(async {
        let session = open_session(config_path).await?;
        session.gateway.activate_user(id).await?;
        Ok::<_, CliError>(())
    })??;

    println!("Activated '{id}'");
    Ok(())
}

/// Deactivate command handler
pub fn cmd_deactivate(config_path: Option<&Path>) -> Result<(), CliError> {
    block_on(async {
        let session = open_session(config_path).await?;
        session.gateway.deactivate_user().await?;
        Ok::<_, CliError>(())
    })??;

    println!("No active identity");
    Ok(())
}
