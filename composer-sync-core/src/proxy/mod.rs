//! Client-side repository proxies
//!
//! Proxies run on the UI side of the IPC channel. Reads are served from a
//! [`RepositoryMirror`] fed by one watch per key; writes are sent as patches
//! and show up in the mirror only once the gateway has committed them.

mod content;
mod local;
mod mirror;
mod user;

pub use content::ContentProxy;
pub use local::LocalRepositoryProxy;
pub use mirror::{MirrorReader, RepositoryMirror};
pub use user::UserRepositoryProxy;
