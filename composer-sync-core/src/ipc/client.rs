//! Request/reply client with watch streams
//!
//! Every request gets a fresh UUID. A single dispatch task routes replies
//! to their pending entry: a oneshot for plain requests, an mpsc for
//! watches. Entries are removed on reply, timeout, cancellation, unwatch
//! and channel closure, so nothing is left behind once a caller gives up.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, warn};
use uuid::Uuid;

use super::cancel::CancellationToken;
use super::message::{ClientFrame, Reply, Request, Route};
use super::transport::ClientTransport;
use crate::error::{RepositoryError, RepositoryResult};
use crate::tracing::span_names;

/// Timeout applied to requests that do not set their own
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the client's default timeout
    pub timeout: Option<Duration>,
    /// Abandons the request when cancelled
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    /// Creates empty options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the cancellation token
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

enum Pending {
    Once(oneshot::Sender<Reply>),
    Watch(mpsc::UnboundedSender<Reply>),
}

#[derive(Default)]
struct PendingTable {
    closed: bool,
    entries: HashMap<String, Pending>,
}

type SharedTable = Arc<Mutex<PendingTable>>;

fn lock(table: &Mutex<PendingTable>) -> MutexGuard<'_, PendingTable> {
    table
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

struct ClientInner {
    tx: mpsc::UnboundedSender<ClientFrame>,
    pending: SharedTable,
    default_timeout: Duration,
    dispatcher: JoinHandle<()>,
}

impl ClientInner {
    fn register(&self, id: &str, entry: Pending) -> RepositoryResult<()> {
        let mut table = lock(&self.pending);
        if table.closed {
            return Err(RepositoryError::ChannelClosed);
        }
        table.entries.insert(id.to_string(), entry);
        Ok(())
    }

    fn forget(&self, id: &str) -> bool {
        lock(&self.pending).entries.remove(id).is_some()
    }

    fn send(&self, frame: ClientFrame) -> RepositoryResult<()> {
        self.tx
            .send(frame)
            .map_err(|_| RepositoryError::ChannelClosed)
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

/// Client end of the IPC channel
///
/// Cheap to clone; clones share the connection and the pending table.
#[derive(Clone)]
pub struct IpcClient {
    inner: Arc<ClientInner>,
}

impl IpcClient {
    /// Starts a client on `transport` with the default timeout
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(transport: ClientTransport) -> Self {
        Self::with_request_timeout(transport, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Starts a client with a custom default timeout
    #[must_use]
    pub fn with_request_timeout(transport: ClientTransport, timeout: Duration) -> Self {
        let ClientTransport { tx, rx } = transport;
        let pending = SharedTable::default();
        let dispatcher = tokio::spawn(dispatch_replies(rx, Arc::clone(&pending)));
        Self {
            inner: Arc::new(ClientInner {
                tx,
                pending,
                default_timeout: timeout,
                dispatcher,
            }),
        }
    }

    /// Sends a request and waits for its reply
    ///
    /// # Errors
    ///
    /// Returns the error carried by the reply, `Timeout` after the default
    /// timeout, and `ChannelClosed` if the channel goes away.
    pub async fn request(&self, route: Route, payload: Value) -> RepositoryResult<Value> {
        self.request_with(route, payload, RequestOptions::default())
            .await
    }

    /// Sends a request with explicit timeout and cancellation
    ///
    /// # Errors
    ///
    /// Same as [`IpcClient::request`], plus `Cancelled` when the token
    /// fires first.
    pub async fn request_with(
        &self,
        route: Route,
        payload: Value,
        options: RequestOptions,
    ) -> RepositoryResult<Value> {
        let id = Uuid::new_v4().to_string();
        let span = crate::trace_operation!(span_names::IPC_REQUEST, route = %route, id = %id);
        async {
            let (tx, rx) = oneshot::channel();
            self.inner.register(&id, Pending::Once(tx))?;
            let frame = ClientFrame::Request(Request {
                id: id.clone(),
                route,
                watch: false,
                payload,
            });
            if let Err(e) = self.inner.send(frame) {
                self.inner.forget(&id);
                return Err(e);
            }

            let timeout = options.timeout.unwrap_or(self.inner.default_timeout);
            let outcome = tokio::select! {
                reply = tokio::time::timeout(timeout, rx) => match reply {
                    Ok(Ok(reply)) => reply.into_result(),
                    Ok(Err(_)) => Err(RepositoryError::ChannelClosed),
                    Err(_) => Err(RepositoryError::Timeout(format!(
                        "{route} did not answer within {}ms",
                        timeout.as_millis()
                    ))),
                },
                () = wait_cancelled(options.cancel.as_ref()) => Err(RepositoryError::Cancelled),
            };
            if self.inner.forget(&id) {
                debug!("Dropped pending request without reply");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Opens a watch stream
    ///
    /// The first item is the current value; later items follow every
    /// change. Dropping the returned [`IpcWatch`] unsubscribes.
    ///
    /// # Errors
    ///
    /// Returns `ChannelClosed` if the channel is gone.
    pub fn watch(&self, route: Route, payload: Value) -> RepositoryResult<IpcWatch> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.register(&id, Pending::Watch(tx))?;
        let frame = ClientFrame::Request(Request {
            id: id.clone(),
            route,
            watch: true,
            payload,
        });
        if let Err(e) = self.inner.send(frame) {
            self.inner.forget(&id);
            return Err(e);
        }
        debug!(%route, %id, "Watch opened");
        Ok(IpcWatch {
            id,
            rx,
            client: Arc::clone(&self.inner),
        })
    }

    /// Number of requests and watches awaiting replies
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).entries.len()
    }

    /// Returns true once the reply side of the channel has closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.inner.pending).closed
    }
}

impl std::fmt::Debug for IpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcClient")
            .field("pending", &self.pending_count())
            .field("default_timeout", &self.inner.default_timeout)
            .finish_non_exhaustive()
    }
}

async fn wait_cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn dispatch_replies(mut rx: mpsc::UnboundedReceiver<Reply>, pending: SharedTable) {
    while let Some(reply) = rx.recv().await {
        let mut table = lock(&pending);
        match table.entries.remove(&reply.id) {
            Some(Pending::Once(tx)) => {
                // Receiver gone means the caller timed out or cancelled
                let _ = tx.send(reply);
            }
            Some(Pending::Watch(tx)) => {
                let id = reply.id.clone();
                if tx.send(reply).is_ok() {
                    table.entries.insert(id, Pending::Watch(tx));
                }
            }
            None => debug!(id = %reply.id, "Ignoring reply for unknown request"),
        }
    }

    let mut table = lock(&pending);
    table.closed = true;
    let abandoned = table.entries.len();
    table.entries.clear();
    if abandoned > 0 {
        warn!(abandoned, "IPC channel closed with requests in flight");
    } else {
        debug!("IPC channel closed");
    }
}

/// Stream of values for one watched key
pub struct IpcWatch {
    id: String,
    rx: mpsc::UnboundedReceiver<Reply>,
    client: Arc<ClientInner>,
}

impl IpcWatch {
    /// Correlation id of the watch
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the next value; `None` once the channel closes
    pub async fn next(&mut self) -> Option<RepositoryResult<Value>> {
        self.rx.recv().await.map(Reply::into_result)
    }
}

impl Stream for IpcWatch {
    type Item = RepositoryResult<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|reply| reply.map(Reply::into_result))
    }
}

impl Drop for IpcWatch {
    fn drop(&mut self) {
        if self.client.forget(&self.id) {
            let _ = self.client.send(ClientFrame::Unwatch {
                id: self.id.clone(),
            });
            debug!(id = %self.id, "Watch closed");
        }
    }
}

impl std::fmt::Debug for IpcWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcWatch").field("id", &self.id).finish()
    }
}
