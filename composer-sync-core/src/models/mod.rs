//! Data model for persisted repository state

mod credentials;
mod keys;
mod namespace;
mod platform;
mod preferences;
mod swap;

pub use credentials::{
    CredentialsEntry, CredentialsError, PlatformUser, TOKEN_VALIDATION_PATTERN,
    URL_VALIDATION_PATTERN,
};
pub use keys::{
    IDENTITY_SCOPED_KEYS, RepositoryKey, RepositoryPatch, default_record, default_records,
};
pub use namespace::Namespace;
pub use platform::{App, AppQuery, Project};
pub use preferences::{ActiveTab, AppMetaEntry, AppPanel, PublicAppsGrouping};
pub use swap::{FileSource, SwapTarget, strip_revision};
