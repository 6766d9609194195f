//! REST client for Seven Bridges platforms

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::models::{App, AppQuery, PlatformUser, Project};

use super::pagination::{Page, PageSource, fetch_all};
use super::{PlatformApi, PlatformConnector, PlatformError, PlatformResult};

/// Header carrying the authentication token (`X-SBG-Auth-Token`)
pub const AUTH_HEADER: &str = "x-sbg-auth-token";

/// Header carrying the number of items matching a listing query
pub const TOTAL_HEADER: &str = "x-total-matching-query";

/// Default REST timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default (and maximum) page size accepted by the platform
pub const MAX_QUERY_LIMIT: usize = 100;

/// Client for one platform account
#[derive(Debug, Clone)]
pub struct SbgClient {
    http: reqwest::Client,
    base_url: String,
    page_limit: usize,
}

impl SbgClient {
    /// Creates a client for `<url>/v2/` authenticated with `token`
    ///
    /// # Errors
    ///
    /// Returns `Http` if the token is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(url: &str, token: &str, timeout: Duration) -> PlatformResult<Self> {
        let mut auth = HeaderValue::from_str(token)
            .map_err(|e| PlatformError::Http(format!("Invalid token header: {e}")))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(AUTH_HEADER), auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: format!("{}/v2/", url.trim_end_matches('/')),
            page_limit: MAX_QUERY_LIMIT,
        })
    }

    /// Sets the page size, clamped to `1..=MAX_QUERY_LIMIT`
    #[must_use]
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.clamp(1, MAX_QUERY_LIMIT);
        self
    }

    /// Returns the API base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(
        &self,
        endpoint: &str,
        query: &[(String, String)],
    ) -> PlatformResult<reqwest::Response> {
        let url = format!("{}{endpoint}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| PlatformError::Http(format!("GET {endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PlatformError::Status {
                status: status.as_u16(),
                message: format!("GET {endpoint}: {message}"),
            });
        }
        Ok(response)
    }

    async fn get_json(
        &self,
        endpoint: &str,
        query: &[(String, String)],
    ) -> PlatformResult<(Value, Option<usize>)> {
        let response = self.get(endpoint, query).await?;
        let total = response
            .headers()
            .get(TOTAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlatformError::Http(format!("GET {endpoint}: {e}")))?;
        let body = serde_json::from_slice(&bytes)
            .map_err(|e| PlatformError::Decode(format!("GET {endpoint}: {e}")))?;
        Ok((body, total))
    }

    async fn list<T>(
        &self,
        endpoint: &'static str,
        query: Vec<(String, String)>,
    ) -> PlatformResult<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let listing = Listing {
            client: self,
            endpoint,
            query,
        };
        let items = fetch_all::<T, _>(&listing, self.page_limit).await?;
        debug!(endpoint, count = items.len(), "Fetched listing");
        Ok(items)
    }
}

struct Listing<'a> {
    client: &'a SbgClient,
    endpoint: &'static str,
    query: Vec<(String, String)>,
}

#[async_trait]
impl<T> PageSource<T> for Listing<'_>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(&self, offset: usize, limit: usize) -> PlatformResult<Page<T>> {
        let mut query = self.query.clone();
        query.push(("offset".to_string(), offset.to_string()));
        query.push(("limit".to_string(), limit.to_string()));

        let (mut body, total) = self.client.get_json(self.endpoint, &query).await?;
        let items = body
            .get_mut("items")
            .map(Value::take)
            .ok_or_else(|| PlatformError::Decode(format!("{}: missing items", self.endpoint)))?;
        let items = serde_json::from_value(items)
            .map_err(|e| PlatformError::Decode(format!("{}: {e}", self.endpoint)))?;
        Ok(Page { items, total })
    }
}

#[async_trait]
impl PlatformApi for SbgClient {
    #[instrument(name = "platform.user", skip(self))]
    async fn current_user(&self) -> PlatformResult<PlatformUser> {
        let (body, _) = self.get_json("user", &[]).await?;
        serde_json::from_value(body).map_err(|e| PlatformError::Decode(format!("user: {e}")))
    }

    #[instrument(name = "platform.list", skip(self), fields(endpoint = "projects"))]
    async fn projects_all(&self) -> PlatformResult<Vec<Project>> {
        self.list("projects", vec![("fields".to_string(), "_all".to_string())])
            .await
    }

    #[instrument(name = "platform.list", skip(self, query), fields(endpoint = "apps"))]
    async fn apps_private(&self, query: &AppQuery) -> PlatformResult<Vec<App>> {
        self.list("apps", query.to_pairs()).await
    }

    #[instrument(
        name = "platform.list",
        skip(self),
        fields(endpoint = "apps", visibility = "public")
    )]
    async fn apps_public(&self) -> PlatformResult<Vec<App>> {
        self.list("apps", vec![("visibility".to_string(), "public".to_string())])
            .await
    }
}

/// Builds [`SbgClient`]s for credentials
#[derive(Debug, Clone)]
pub struct SbgConnector {
    timeout: Duration,
    page_limit: usize,
}

impl Default for SbgConnector {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            page_limit: MAX_QUERY_LIMIT,
        }
    }
}

impl SbgConnector {
    /// Creates a connector with the default timeout and page size
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the REST timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the page size
    #[must_use]
    pub const fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }
}

impl PlatformConnector for SbgConnector {
    fn connect_token(&self, url: &str, token: &str) -> PlatformResult<Arc<dyn PlatformApi>> {
        let client = SbgClient::new(url, token, self.timeout)?.with_page_limit(self.page_limit);
        Ok(Arc::new(client))
    }
}
