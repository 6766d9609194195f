//! Fetch command.

use std::path::Path;

use composer_sync_core::{Namespace, RepositoryKey};

use crate::error::CliError;
use crate::util::{block_on, open_session};

const LISTINGS: [(RepositoryKey, &str); 3] = [
    (RepositoryKey::Projects, "project(s)"),
    (RepositoryKey::Apps, "app(s)"),
    (RepositoryKey::PublicApps, "public app(s)"),
];

/// Fetch command handler
pub fn cmd_fetch(config_path: Option<&Path>, if_stale: bool) -> Result<(), CliError> {
    let counts = block_on(async {
        let session = open_session(config_path).await?;
        let gateway = &session.gateway;
        if if_stale {
            let max_age = session.settings.platform.max_cache_age();
            if !gateway.fetch_platform_data_if_stale(max_age).await? {
                return Ok(None);
            }
        } else {
            gateway.fetch_platform_data().await?;
        }

        let mut counts = Vec::with_capacity(LISTINGS.len());
        for (key, _) in LISTINGS {
            let listing = gateway.get(Namespace::User, Some(key.as_str())).await?;
            counts.push(listing.as_array().map_or(0, Vec::len));
        }
        Ok::<_, CliError>(Some(counts))
    })??;

    let Some(counts) = counts else {
        println!("Platform data is up to date");
        return Ok(());
    };

    let summary: Vec<String> = LISTINGS
        .iter()
        .zip(counts)
        .map(|((_, label), count)| format!("{count} {label}"))
        .collect();
    println!("Fetched {}", summary.join(", "));
    Ok(())
}
