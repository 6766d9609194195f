//! Command handler modules for the CLI.

mod activate;
mod content;
mod credentials;
mod fetch;
mod get;
mod patch;
mod serve;
mod swap;

use std::path::Path;

use crate::cli::Commands;
use crate::error::CliError;

/// Dispatch a CLI command to the appropriate handler.
pub fn dispatch(config_path: Option<&Path>, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Serve => serve::cmd_serve(config_path),
        Commands::Get { namespace, key } => {
            get::cmd_get(config_path, namespace.into(), key.as_deref())
        }
        Commands::Patch { namespace, entries } => {
            patch::cmd_patch(config_path, namespace.into(), entries)
        }
        Commands::Activate { id } => activate::cmd_activate(config_path, &id),
        Commands::Deactivate => activate::cmd_deactivate(config_path),
        Commands::Credentials(subcmd) => credentials::cmd_credentials(config_path, subcmd),
        Commands::Swap(subcmd) => swap::cmd_swap(config_path, subcmd),
        Commands::Fetch { if_stale } => fetch::cmd_fetch(config_path, if_stale),
        Commands::Content { path } => content::cmd_content(config_path, &path),
    }
}
