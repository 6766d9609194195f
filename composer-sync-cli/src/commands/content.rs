//! Content command.

use std::path::Path;

use crate::error::CliError;
use crate::util::{block_on, open_session};

/// Content command handler
pub fn cmd_content(config_path: Option<&Path>, path: &str) -> Result<(), CliError> {
    let content = block_on(async {
        let session = open_session(config_path).await?;
        Ok::<_, CliError>(session.gateway.get_file_content(path).await?)
    })??;

    print!("{content}");
    Ok(())
}
