use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::config::FetchPolicy;
use crate::error::{RepositoryError, RepositoryResult};
use crate::models::{
    App, AppQuery, CredentialsEntry, CredentialsError, Namespace, PlatformUser, Project,
    RepositoryKey, RepositoryPatch,
};
use crate::platform::{PlatformError, PlatformResult};

use super::RepositoryGateway;

/// Result value of a completed platform refresh on the wire
pub const FETCH_SUCCESS: &str = "success";

#[derive(Default)]
struct Listings {
    projects: Option<Vec<Project>>,
    apps: Option<Vec<App>>,
    public_apps: Option<Vec<App>>,
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

impl RepositoryGateway {
    /// Refreshes the platform caches of the `user` namespace
    ///
    /// Projects, private apps and public apps are listed in parallel for the
    /// active credentials. The results and their fetch timestamps land in one
    /// patch. With [`FetchPolicy::AllOrNothing`] any failed listing fails the
    /// refresh; with [`FetchPolicy::BestEffort`] successful listings are kept.
    ///
    /// # Errors
    ///
    /// Returns `Precondition` if no credentials are active or the active
    /// identity changed while listing, and `Upstream` if the platform failed.
    #[instrument(
        name = "gateway.fetch_platform_data",
        skip(self),
        fields(policy = ?self.fetch_policy)
    )]
    pub async fn fetch_platform_data(&self) -> RepositoryResult<()> {
        let credentials = self.active_credentials().await?.ok_or_else(|| {
            RepositoryError::Precondition(
                "No active credentials; activate a user before fetching platform data".to_string(),
            )
        })?;
        let api = self.platform.connect(&credentials)?;
        let query = AppQuery::default();

        let listings = match self.fetch_policy {
            FetchPolicy::AllOrNothing => {
                let (projects, apps, public_apps) = tokio::try_join!(
                    api.projects_all(),
                    api.apps_private(&query),
                    api.apps_public()
                )?;
                Listings {
                    projects: Some(projects),
                    apps: Some(apps),
                    public_apps: Some(public_apps),
                }
            }
            FetchPolicy::BestEffort => {
                let (projects, apps, public_apps) = tokio::join!(
                    api.projects_all(),
                    api.apps_private(&query),
                    api.apps_public()
                );
                best_effort(projects, apps, public_apps)?
            }
        };

        let completed = now_ms();
        let mut patch = RepositoryPatch::new();
        if let Some(projects) = &listings.projects {
            patch = patch
                .with_typed(RepositoryKey::Projects, projects)?
                .with_typed(RepositoryKey::ProjectFetchTimestamp, &completed)?;
        }
        if let Some(apps) = &listings.apps {
            patch = patch.with_typed(RepositoryKey::Apps, apps)?;
        }
        if let Some(public_apps) = &listings.public_apps {
            patch = patch.with_typed(RepositoryKey::PublicApps, public_apps)?;
        }
        if listings.apps.is_some() || listings.public_apps.is_some() {
            patch = patch.with_typed(RepositoryKey::AppFetchTimestamp, &completed)?;
        }

        let _gate = self.write_gate.lock().await;
        let still_active = self
            .active_credentials()
            .await?
            .is_some_and(|active| active.equals(&credentials));
        if !still_active {
            warn!(
                id = %credentials.id,
                "Active credentials changed during fetch, discarding results"
            );
            return Err(RepositoryError::Precondition(
                "Active credentials changed while fetching platform data".to_string(),
            ));
        }
        self.commit(Namespace::User, patch).await?;

        info!(
            projects = listings.projects.as_ref().map_or(0, Vec::len),
            apps = listings.apps.as_ref().map_or(0, Vec::len),
            public_apps = listings.public_apps.as_ref().map_or(0, Vec::len),
            "Platform data refreshed"
        );
        Ok(())
    }

    /// Refreshes the platform caches only when [`Self::is_cache_stale`] says so
    ///
    /// Returns whether a refresh ran.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::fetch_platform_data`].
    pub async fn fetch_platform_data_if_stale(&self, max_age: Duration) -> RepositoryResult<bool> {
        if !self.is_cache_stale(max_age).await? {
            info!(max_age_secs = max_age.as_secs(), "Platform data is fresh, skipping fetch");
            return Ok(false);
        }
        self.fetch_platform_data().await?;
        Ok(true)
    }

    /// Looks up the account a token belongs to
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the URL or token is malformed and `Upstream`
    /// if the platform rejects the token.
    #[instrument(name = "gateway.get_user_by_token", skip(self, token))]
    pub async fn get_user_by_token(&self, url: &str, token: &str) -> RepositoryResult<PlatformUser> {
        if CredentialsEntry::subdomain(url).is_none() {
            return Err(CredentialsError::InvalidUrl(url.to_string()).into());
        }
        if !CredentialsEntry::is_valid_token(token) {
            return Err(CredentialsError::InvalidToken.into());
        }
        let api = self.platform.connect_token(url, token)?;
        let user = api.current_user().await?;
        if user.username.is_empty() {
            return Err(CredentialsError::MissingUsername.into());
        }
        Ok(user)
    }

    /// Returns true if either platform cache is older than `max_age`
    ///
    /// A cache that was never fetched is stale.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a stored timestamp is malformed.
    pub async fn is_cache_stale(&self, max_age: Duration) -> RepositoryResult<bool> {
        let now = now_ms();
        let max_age = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
        for key in [
            RepositoryKey::ProjectFetchTimestamp,
            RepositoryKey::AppFetchTimestamp,
        ] {
            let fetched: u64 = self.read(Namespace::User, key).await?;
            if fetched == 0 || now.saturating_sub(fetched) > max_age {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn best_effort(
    projects: PlatformResult<Vec<Project>>,
    apps: PlatformResult<Vec<App>>,
    public_apps: PlatformResult<Vec<App>>,
) -> RepositoryResult<Listings> {
    let mut first_error = None;
    let mut keep = |name: &str, error: PlatformError| {
        warn!(listing = name, error = %error, "Platform listing failed");
        first_error.get_or_insert(error);
    };

    let listings = Listings {
        projects: projects.map_err(|e| keep("projects", e)).ok(),
        apps: apps.map_err(|e| keep("apps", e)).ok(),
        public_apps: public_apps.map_err(|e| keep("publicApps", e)).ok(),
    };

    match first_error {
        Some(error)
            if listings.projects.is_none()
                && listings.apps.is_none()
                && listings.public_apps.is_none() =>
        {
            Err(error.into())
        }
        _ => Ok(listings),
    }
}
