//! Credentials command.

use std::path::Path;

use composer_sync_core::{CredentialsEntry, PlatformUser};

use crate::cli::CredentialsCommands;
use crate::error::CliError;
use crate::util::{block_on, open_session};

/// Credentials command handler
pub fn cmd_credentials(
    config_path: Option<&Path>,
    subcmd: CredentialsCommands,
) -> Result<(), CliError> {
    match subcmd {
        CredentialsCommands::List => cmd_list(config_path),
        CredentialsCommands::Add {
            url,
            token,
            username,
            activate,
        } => cmd_add(config_path, &url, &token, username.as_deref(), activate),
        CredentialsCommands::Remove { id } => cmd_remove(config_path, &id),
    }
}

fn cmd_list(config_path: Option<&Path>) -> Result<(), CliError> {
    let (credentials, active) = block_on(async {
        let session = open_session(config_path).await?;
        let credentials = session.gateway.credentials().await?;
        let active = session.gateway.active_credentials().await?;
        Ok::<_, CliError>((credentials, active))
    })??;

    if credentials.is_empty() {
        println!("No credentials registered.");
        return Ok(());
    }

    let id_width = credentials
        .iter()
        .map(|entry| entry.id.len())
        .max()
        .unwrap_or(2)
        .max(2);
    println!("  {:<id_width$}  URL", "ID");
    for entry in &credentials {
        let marker = if active.as_ref().is_some_and(|a| a.equals(entry)) {
            '*'
        } else {
            ' '
        };
        println!("{marker} {:<id_width$}  {}", entry.id, entry.url);
    }
    Ok(())
}

fn cmd_add(
    config_path: Option<&Path>,
    url: &str,
    token: &str,
    username: Option<&str>,
    activate: bool,
) -> Result<(), CliError> {
    let offline = username
        .map(|username| CredentialsEntry::new(url, token, PlatformUser::new(username)))
        .transpose()
        .map_err(|e| CliError::InvalidArgument(e.to_string()))?;

    let stored = block_on(async {
        let session = open_session(config_path).await?;
        let entry = match offline {
            Some(entry) => entry,
            None => {
                let user = session.gateway.get_user_by_token(url, token).await?;
                CredentialsEntry::new(url, token, user)
                    .map_err(|e| CliError::InvalidArgument(e.to_string()))?
            }
        };
        let stored = session.gateway.add_credentials(entry).await?;
        if activate {
            session.gateway.activate_user(&stored.id).await?;
        }
        Ok::<_, CliError>(stored)
    })??;

    if activate {
        println!("Registered and activated '{}'", stored.id);
    } else {
        println!("Registered '{}'", stored.id);
    }
    Ok(())
}

fn cmd_remove(config_path: Option<&Path>, id: &str) -> Result<(), CliError> {
    block_on(async {
        let session = open_session(config_path).await?;
        session.gateway.remove_credentials(id).await?;
        Ok::<_, CliError>(())
    })??;

    println!("Removed '{id}'");
    Ok(())
}
