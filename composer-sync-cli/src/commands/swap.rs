//! Swap command.

use std::path::{Path, PathBuf};

use composer_sync_core::SwapTarget;

use crate::cli::SwapCommands;
use crate::error::CliError;
use crate::util::{block_on, open_session};

/// Swap command handler
pub fn cmd_swap(config_path: Option<&Path>, subcmd: SwapCommands) -> Result<(), CliError> {
    match subcmd {
        SwapCommands::Set {
            item,
            content,
            file,
        } => {
            let content = read_content(content, file)?;
            update(config_path, &item, Some(content))?;
            println!("Stored unsaved edit for '{item}'");
            Ok(())
        }
        SwapCommands::Discard { item } => {
            update(config_path, &item, None)?;
            println!("Discarded unsaved edit for '{item}'");
            Ok(())
        }
    }
}

fn read_content(content: Option<String>, file: Option<PathBuf>) -> Result<String, CliError> {
    match (content, file) {
        (Some(content), _) => Ok(content),
        (None, Some(file)) => Ok(std::fs::read_to_string(file)?),
        (None, None) => Err(CliError::InvalidArgument(
            "provide the content or --file".to_string(),
        )),
    }
}

fn update(config_path: Option<&Path>, item: &str, content: Option<String>) -> Result<(), CliError> {
    let target = SwapTarget::for_item(item);
    block_on(async {
        let session = open_session(config_path).await?;
        session
            .gateway
            .patch_swap(target.namespace, &target.swap_id, content)
            .await?;
        Ok::<_, CliError>(())
    })?
}
