//! Platform credentials
//!
//! A [`CredentialsEntry`] identifies one platform account. Its `id` is derived
//! from the platform subdomain and the username, so two entries for the same
//! account on the same platform are equivalent regardless of token.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::RepositoryError;

/// Accepted platform URL shape; the capture is the subdomain
pub const URL_VALIDATION_PATTERN: &str = r"^https://(.+)\.sbgenomics\.com$";

/// Accepted token shape: 32 lowercase hex characters
pub const TOKEN_VALIDATION_PATTERN: &str = r"^[0-9a-f]{32}$";

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(URL_VALIDATION_PATTERN).expect("valid URL pattern"));

static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TOKEN_VALIDATION_PATTERN).expect("valid token pattern"));

/// Errors raised while building or checking credentials
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    /// The URL does not point to a supported platform
    #[error("Invalid platform URL: {0}")]
    InvalidUrl(String),

    /// The token does not have the expected shape
    #[error("Invalid authentication token")]
    InvalidToken,

    /// The username is empty
    #[error("Platform user has no username")]
    MissingUsername,

    /// The stored id does not match the one derived from url and username
    #[error("Credentials id \"{found}\" does not match derived id \"{expected}\"")]
    IdMismatch {
        /// Id derived from url and username
        expected: String,
        /// Id carried by the entry
        found: String,
    },
}

impl From<CredentialsError> for RepositoryError {
    fn from(err: CredentialsError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Platform user record
///
/// Only `username` is interpreted; every other field returned by the platform
/// is preserved verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformUser {
    /// Platform username
    pub username: String,
    /// Remaining user fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlatformUser {
    /// Creates a user record with only a username
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            extra: Map::new(),
        }
    }
}

/// Credentials for one platform account
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialsEntry {
    /// Deterministic id: `"{subdomain}_{username}"`
    #[serde(default)]
    pub id: String,
    /// Platform base URL, e.g. `https://api.sbgenomics.com`
    pub url: String,
    /// Authentication token
    pub token: String,
    /// Account the token belongs to
    pub user: PlatformUser,
}

impl std::fmt::Debug for CredentialsEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsEntry")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("user", &self.user.username)
            .finish()
    }
}

impl CredentialsEntry {
    /// Creates validated credentials and derives their id
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or token is malformed or the username is empty.
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        user: PlatformUser,
    ) -> Result<Self, CredentialsError> {
        let url = url.into();
        let token = token.into();

        if !Self::is_valid_token(&token) {
            return Err(CredentialsError::InvalidToken);
        }
        let id = Self::derive_id(&url, &user.username)?;

        Ok(Self {
            id,
            url,
            token,
            user,
        })
    }

    /// Returns true if `url` points to a supported platform
    #[must_use]
    pub fn is_valid_url(url: &str) -> bool {
        URL_REGEX.is_match(url)
    }

    /// Returns true if `token` has the expected shape
    #[must_use]
    pub fn is_valid_token(token: &str) -> bool {
        TOKEN_REGEX.is_match(token)
    }

    /// Extracts the platform subdomain from a platform URL
    #[must_use]
    pub fn subdomain(url: &str) -> Option<&str> {
        URL_REGEX
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Derives the credentials id from a platform URL and a username
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a platform URL or the username is empty.
    pub fn derive_id(url: &str, username: &str) -> Result<String, CredentialsError> {
        let subdomain =
            Self::subdomain(url).ok_or_else(|| CredentialsError::InvalidUrl(url.to_string()))?;
        if username.is_empty() {
            return Err(CredentialsError::MissingUsername);
        }
        Ok(format!("{subdomain}_{username}"))
    }

    /// Fills in a missing id, or checks that a present one matches the derived id
    ///
    /// # Errors
    ///
    /// Returns an error if the id cannot be derived or does not match.
    pub fn normalize(&mut self) -> Result<(), CredentialsError> {
        let expected = Self::derive_id(&self.url, &self.user.username)?;
        if self.id.is_empty() {
            self.id = expected;
            return Ok(());
        }
        if self.id != expected {
            return Err(CredentialsError::IdMismatch {
                expected,
                found: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Returns true if both entries refer to the same platform account
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self.id == other.id
    }

    /// Copies url, token and user from an equivalent entry
    pub fn update_to_match(&mut self, other: &Self) {
        self.url.clone_from(&other.url);
        self.token.clone_from(&other.token);
        self.user = other.user.clone();
    }
}
