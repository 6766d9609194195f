//! Platform REST collaborator
//!
//! The gateway talks to the platform through [`PlatformApi`]. A
//! [`PlatformConnector`] builds an API handle for the active credentials, so
//! tests can inject canned listings without any network.

mod client;
pub mod pagination;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::RepositoryError;
use crate::models::{App, AppQuery, CredentialsEntry, PlatformUser, Project};

pub use client::{
    AUTH_HEADER, DEFAULT_TIMEOUT, MAX_QUERY_LIMIT, SbgClient, SbgConnector, TOTAL_HEADER,
};
pub use pagination::{Page, PageSource, fetch_all};

/// Errors raised by platform calls
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// Transport failure (connection, timeout, TLS)
    #[error("Platform request failed: {0}")]
    Http(String),
    /// Non-success HTTP status
    #[error("Platform returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or context
        message: String,
    },
    /// Response body did not have the expected shape
    #[error("Unexpected platform response: {0}")]
    Decode(String),
}

/// Result type for platform calls
pub type PlatformResult<T> = Result<T, PlatformError>;

impl From<PlatformError> for RepositoryError {
    fn from(err: PlatformError) -> Self {
        Self::Upstream(err.to_string())
    }
}

/// Platform listings used to refresh the `user` namespace
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Returns the account the token belongs to
    ///
    /// # Errors
    ///
    /// Returns the platform error of the request.
    async fn current_user(&self) -> PlatformResult<PlatformUser>;

    /// Lists every project visible to the account
    ///
    /// # Errors
    ///
    /// Returns the platform error of the first failed page.
    async fn projects_all(&self) -> PlatformResult<Vec<Project>>;

    /// Lists private apps matching `query`
    ///
    /// # Errors
    ///
    /// Returns the platform error of the first failed page.
    async fn apps_private(&self, query: &AppQuery) -> PlatformResult<Vec<App>>;

    /// Lists public apps
    ///
    /// # Errors
    ///
    /// Returns the platform error of the first failed page.
    async fn apps_public(&self) -> PlatformResult<Vec<App>>;
}

/// Builds API handles for credentials
pub trait PlatformConnector: Send + Sync {
    /// Creates an API handle for a bare URL and token
    ///
    /// # Errors
    ///
    /// Returns `Http` if the client cannot be built.
    fn connect_token(&self, url: &str, token: &str) -> PlatformResult<Arc<dyn PlatformApi>>;

    /// Creates an API handle authenticated as `credentials`
    ///
    /// # Errors
    ///
    /// Returns `Http` if the client cannot be built.
    fn connect(&self, credentials: &CredentialsEntry) -> PlatformResult<Arc<dyn PlatformApi>> {
        self.connect_token(&credentials.url, &credentials.token)
    }
}
