//! Request/reply channel between the UI side and the gateway
//!
//! The client issues requests tagged with a UUID and a route; the server
//! answers each one with a reply carrying the same id. Watch requests stay
//! open and receive one reply per change until the client sends `unwatch`.

mod cancel;
mod client;
mod message;
mod server;
mod transport;

pub use cancel::CancellationToken;
pub use client::{DEFAULT_REQUEST_TIMEOUT, IpcClient, IpcWatch, RequestOptions};
pub use message::{
    ClientFrame, CreateFilePayload, KeyQuery, Reply, Request, Route, SaveFilePayload, SwapPayload,
    TokenPayload,
};
pub use server::IpcServer;
pub use transport::{ClientTransport, ServerTransport, in_process_pair};
