//! Composer Sync Core Library
//!
//! State synchronization for the Composer workflow editor: durable key-value
//! repositories shared between a gateway process and any number of UI
//! clients, with live change notification over a request/reply channel.
//!
//! # Crate Structure
//!
//! - [`models`] - Namespaces, repository keys, credentials and platform records
//! - [`store`] - Durable per-namespace key-value store with per-key notifications
//! - [`gateway`] - Repository operations with credentials and swap semantics
//! - [`ipc`] - Request/reply/watch channel, client and server
//! - [`proxy`] - Client-side mirrors and typed repository views
//! - [`fs`] / [`platform`] - Filesystem and platform REST collaborators
//! - [`config`] - Settings persistence
//! - [`tracing`] - Structured logging setup

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod fs;
pub mod gateway;
pub mod ipc;
pub mod models;
pub mod platform;
pub mod proxy;
pub mod store;
pub mod testing;
pub mod tracing;

// =============================================================================
// Convenience re-exports
//
// Flat re-exports used by the CLI and the integration tests. Library code
// imports through the module paths.
// =============================================================================

pub use config::{
    ConfigError, ConfigResult, FetchPolicy, SettingsManager, SyncSettings,
};
pub use error::{ErrorKind, ErrorPayload, RepositoryError, RepositoryResult};
pub use fs::{DirectoryEntry, FileSystem, FsError, FsResult, LocalFileSystem};
pub use gateway::{FETCH_SUCCESS, KeyWatch, RepositoryGateway};
pub use ipc::{
    CancellationToken, ClientTransport, IpcClient, IpcServer, IpcWatch, RequestOptions, Route,
    ServerTransport, in_process_pair,
};
pub use models::{
    App, AppQuery, CredentialsEntry, CredentialsError, FileSource, Namespace, PlatformUser,
    Project, RepositoryKey, RepositoryPatch, SwapTarget,
};
pub use platform::{
    PlatformApi, PlatformConnector, PlatformError, PlatformResult, SbgClient, SbgConnector,
};
pub use proxy::{
    ContentProxy, LocalRepositoryProxy, MirrorReader, RepositoryMirror, UserRepositoryProxy,
};
pub use store::{JsonFileBackend, KeyStore, LoadReport, StorageBackend, StoreLock, StoreLockError};
pub use tracing::{TracingConfig, TracingError, TracingLevel, TracingOutput, init_tracing};
