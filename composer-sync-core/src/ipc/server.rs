//! Gateway side of the IPC channel
//!
//! One [`IpcServer::serve`] call handles one connection. Plain requests are
//! answered in arrival order; `fetchPlatformData` runs on its own task so a
//! slow platform does not hold up the connection. Each watch gets a
//! forwarder task that lives until the client unwatches or disconnects.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use super::message::{
    ClientFrame, CreateFilePayload, KeyQuery, Reply, Request, Route, SaveFilePayload, SwapPayload,
    TokenPayload,
};
use super::transport::ServerTransport;
use crate::error::{RepositoryError, RepositoryResult};
use crate::gateway::{FETCH_SUCCESS, RepositoryGateway};
use crate::models::{Namespace, RepositoryPatch};
use crate::tracing::span_names;

/// Serves gateway routes over a [`ServerTransport`]
#[derive(Clone)]
pub struct IpcServer {
    gateway: Arc<RepositoryGateway>,
}

impl IpcServer {
    /// Creates a server for `gateway`
    #[must_use]
    pub const fn new(gateway: Arc<RepositoryGateway>) -> Self {
        Self { gateway }
    }

    /// Returns the gateway behind this server
    #[must_use]
    pub const fn gateway(&self) -> &Arc<RepositoryGateway> {
        &self.gateway
    }

    /// Serves one connection until the client side closes
    ///
    /// Watches still open at disconnect, or when this future is dropped, are
    /// torn down.
    pub async fn serve(&self, transport: ServerTransport) {
        let ServerTransport { mut rx, tx } = transport;
        let mut watches = WatchSet::default();
        info!("IPC client connected");

        while let Some(frame) = rx.recv().await {
            watches.prune();
            match frame {
                ClientFrame::Unwatch { id } => {
                    if watches.remove(&id) {
                        debug!(%id, "Watch removed");
                    }
                }
                ClientFrame::Request(request) if request.route.is_stream() => {
                    let id = request.id.clone();
                    match self.start_watch(request, tx.clone()).await {
                        Ok(handle) => watches.insert(id, handle),
                        Err(e) => {
                            let _ = tx.send(Reply::err(id, &e));
                        }
                    }
                }
                ClientFrame::Request(request) if request.route.is_long_running() => {
                    let server = self.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(server.dispatch(request).await);
                    });
                }
                ClientFrame::Request(request) => {
                    let _ = tx.send(self.dispatch(request).await);
                }
            }
        }

        info!(watches = watches.len(), "IPC client disconnected");
    }

    /// Answers one request
    pub async fn dispatch(&self, request: Request) -> Reply {
        let Request {
            id, route, payload, ..
        } = request;
        let span = crate::trace_operation!(span_names::IPC_DISPATCH, route = %route, id = %id);
        match self.handle(route, payload).instrument(span).await {
            Ok(data) => Reply::ok(id, data),
            Err(e) => {
                warn!(%route, %id, error = %e, "Request failed");
                Reply::err(id, &e)
            }
        }
    }

    async fn handle(&self, route: Route, payload: Value) -> RepositoryResult<Value> {
        let gateway = &self.gateway;
        match route {
            Route::GetLocalRepository | Route::GetUserRepository => {
                let query = key_query(route, payload)?;
                gateway.get(namespace_of(route)?, query.key.as_deref()).await
            }
            Route::PatchLocalRepository | Route::PatchUserRepository => {
                let patch = RepositoryPatch::from_json(&payload)?;
                gateway.patch(namespace_of(route)?, patch).await?;
                Ok(Value::Null)
            }
            Route::WatchLocalRepository | Route::WatchUserRepository => {
                Err(RepositoryError::Protocol(format!(
                    "{route} must be sent as a watch request"
                )))
            }
            Route::ActivateUser => {
                let id: String = decode(route, payload)?;
                gateway.activate_user(&id).await?;
                Ok(Value::Null)
            }
            Route::DeactivateUser => {
                gateway.deactivate_user().await?;
                Ok(Value::Null)
            }
            Route::FetchPlatformData => {
                gateway.fetch_platform_data().await?;
                Ok(Value::from(FETCH_SUCCESS))
            }
            Route::GetUserByToken => {
                let lookup: TokenPayload = decode(route, payload)?;
                let user = gateway.get_user_by_token(&lookup.url, &lookup.token).await?;
                Ok(serde_json::to_value(user)?)
            }
            Route::PatchSwap => {
                let swap: SwapPayload = decode(route, payload)?;
                let namespace = if swap.local {
                    Namespace::Local
                } else {
                    Namespace::User
                };
                gateway
                    .patch_swap(namespace, &swap.swap_id, swap.content())
                    .await?;
                Ok(Value::Null)
            }
            Route::GetLocalFileContent => {
                let path: String = decode(route, payload)?;
                Ok(Value::from(gateway.get_file_content(&path).await?))
            }
            Route::ReadFileContent => {
                let path: String = decode(route, payload)?;
                Ok(Value::from(gateway.file_system().read_file(&path).await?))
            }
            Route::SaveFileContent => {
                let save: SaveFilePayload = decode(route, payload)?;
                gateway.save_file_content(&save.path, &save.content).await?;
                Ok(Value::Null)
            }
            Route::CreateFile => {
                let create: CreateFilePayload = decode(route, payload)?;
                gateway
                    .file_system()
                    .create_file(&create.path, &create.content)
                    .await?;
                Ok(Value::Null)
            }
            Route::ReadDirectory => {
                let path: String = decode(route, payload)?;
                let entries = gateway.file_system().read_directory(&path).await?;
                Ok(serde_json::to_value(entries)?)
            }
            Route::PathExists => {
                let path: String = decode(route, payload)?;
                Ok(Value::from(gateway.file_system().path_exists(&path).await))
            }
            Route::CreateDirectory => {
                let path: String = decode(route, payload)?;
                gateway.file_system().create_directory(&path).await?;
                Ok(Value::Null)
            }
            Route::DeletePath => {
                let path: String = decode(route, payload)?;
                gateway.file_system().delete_path(&path).await?;
                Ok(Value::Null)
            }
        }
    }

    async fn start_watch(
        &self,
        request: Request,
        tx: mpsc::UnboundedSender<Reply>,
    ) -> RepositoryResult<JoinHandle<()>> {
        let Request {
            id, route, payload, ..
        } = request;
        let key = key_query(route, payload)?.key.ok_or_else(|| {
            RepositoryError::Validation(format!("{route} requires a key"))
        })?;
        let mut watch = self.gateway.watch(namespace_of(route)?, &key).await?;
        debug!(%route, %id, key = %key, "Watch started");

        Ok(tokio::spawn(async move {
            while let Some(value) = watch.next().await {
                if tx.send(Reply::ok(id.as_str(), value)).is_err() {
                    break;
                }
            }
            debug!(%id, "Watch forwarder finished");
        }))
    }
}

/// Forwarder tasks of one connection, aborted when the set is dropped
#[derive(Default)]
struct WatchSet {
    tasks: HashMap<String, JoinHandle<()>>,
}

impl WatchSet {
    fn insert(&mut self, id: String, handle: JoinHandle<()>) {
        if let Some(previous) = self.tasks.insert(id, handle) {
            previous.abort();
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(handle) = self.tasks.remove(id) else {
            return false;
        };
        handle.abort();
        true
    }

    fn prune(&mut self) {
        self.tasks.retain(|_, handle| !handle.is_finished());
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for WatchSet {
    fn drop(&mut self) {
        for handle in self.tasks.values() {
            handle.abort();
        }
    }
}

fn namespace_of(route: Route) -> RepositoryResult<Namespace> {
    route
        .namespace()
        .ok_or_else(|| RepositoryError::Protocol(format!("{route} has no namespace")))
}

fn key_query(route: Route, payload: Value) -> RepositoryResult<KeyQuery> {
    if payload.is_null() {
        return Ok(KeyQuery::default());
    }
    decode(route, payload)
}

fn decode<T: DeserializeOwned>(route: Route, payload: Value) -> RepositoryResult<T> {
    serde_json::from_value(payload)
        .map_err(|e| RepositoryError::Validation(format!("Invalid {route} payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ipc::transport::in_process_pair;
    use crate::store::KeyStore;
    use crate::testing::{MemoryBackend, MemoryFileSystem, StaticPlatform};
    use serde_json::json;

    async fn server() -> IpcServer {
        let store = KeyStore::open(Arc::new(MemoryBackend::new())).await;
        let fs = MemoryFileSystem::new().with_file("/w/tool.cwl", "class: Workflow");
        let gateway = RepositoryGateway::new(
            store,
            Arc::new(fs),
            Arc::new(StaticPlatform::new()),
        );
        IpcServer::new(Arc::new(gateway))
    }

    fn request(route: Route, payload: Value) -> Request {
        Request {
            id: "r1".into(),
            route,
            watch: false,
            payload,
        }
    }

    #[tokio::test]
    async fn patch_then_get() {
        let server = server().await;
        let reply = server
            .dispatch(request(
                Route::PatchLocalRepository,
                json!({"localFolders": ["/w"]}),
            ))
            .await;
        assert_eq!(reply.error, None);

        let reply = server
            .dispatch(request(Route::GetLocalRepository, json!({"key": "localFolders"})))
            .await;
        assert_eq!(reply.into_result().unwrap(), json!(["/w"]));
    }

    #[tokio::test]
    async fn unknown_key_is_rejected() {
        let server = server().await;
        let reply = server
            .dispatch(request(Route::PatchUserRepository, json!({"bogus": 1})))
            .await;
        assert_eq!(reply.error.unwrap().kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn file_routes_use_swap_first() {
        let server = server().await;
        let reply = server
            .dispatch(request(Route::GetLocalFileContent, json!("/w/tool.cwl")))
            .await;
        assert_eq!(reply.into_result().unwrap(), json!("class: Workflow"));

        server
            .dispatch(request(
                Route::PatchSwap,
                json!({"local": true, "swapID": "/w/tool.cwl", "swapContent": "draft"}),
            ))
            .await;
        let reply = server
            .dispatch(request(Route::GetLocalFileContent, json!("/w/tool.cwl")))
            .await;
        assert_eq!(reply.into_result().unwrap(), json!("draft"));

        let reply = server
            .dispatch(request(Route::ReadFileContent, json!("/w/tool.cwl")))
            .await;
        assert_eq!(reply.into_result().unwrap(), json!("class: Workflow"));
    }

    #[tokio::test]
    async fn user_by_token_answers_with_the_account() {
        let store = KeyStore::open(Arc::new(MemoryBackend::new())).await;
        let platform = StaticPlatform::new().with_user(crate::models::PlatformUser::new("jdoe"));
        let server = IpcServer::new(Arc::new(RepositoryGateway::new(
            store,
            Arc::new(MemoryFileSystem::new()),
            Arc::new(platform),
        )));

        let reply = server
            .dispatch(request(
                Route::GetUserByToken,
                json!({"url": "https://api.sbgenomics.com", "token": "0123456789abcdef0123456789abcdef"}),
            ))
            .await;
        assert_eq!(reply.into_result().unwrap()["username"], json!("jdoe"));

        let reply = server
            .dispatch(request(
                Route::GetUserByToken,
                json!({"url": "https://api.sbgenomics.com", "token": "short"}),
            ))
            .await;
        assert_eq!(reply.error.unwrap().kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn non_string_swap_content_deletes_the_entry() {
        let server = server().await;
        for content in [json!(false), json!(1)] {
            let reply = server
                .dispatch(request(
                    Route::PatchSwap,
                    json!({"local": true, "swapID": "/a", "swapContent": "x"}),
                ))
                .await;
            assert_eq!(reply.error, None);

            let reply = server
                .dispatch(request(
                    Route::PatchSwap,
                    json!({"local": true, "swapID": "/a", "swapContent": content}),
                ))
                .await;
            assert_eq!(reply.error, None);

            let reply = server
                .dispatch(request(Route::GetLocalRepository, json!({"key": "swap"})))
                .await;
            assert_eq!(reply.into_result().unwrap(), json!({}));
        }
    }

    #[tokio::test]
    async fn watch_without_key_fails_and_disconnect_stops_forwarders() {
        let server = server().await;
        let (client, transport) = in_process_pair();
        let serving = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(transport).await })
        };
        let mut client = client;

        client
            .tx
            .send(ClientFrame::Request(Request {
                id: "w0".into(),
                route: Route::WatchLocalRepository,
                watch: true,
                payload: Value::Null,
            }))
            .unwrap();
        let reply = client.rx.recv().await.unwrap();
        assert_eq!(reply.id, "w0");
        assert_eq!(reply.error.unwrap().kind, ErrorKind::Validation);

        client
            .tx
            .send(ClientFrame::Request(Request {
                id: "w1".into(),
                route: Route::WatchLocalRepository,
                watch: true,
                payload: json!({"key": "expandedNodes"}),
            }))
            .unwrap();
        let first = client.rx.recv().await.unwrap();
        assert_eq!(first.into_result().unwrap(), json!([]));

        drop(client.tx);
        serving.await.unwrap();
        let store = server.gateway().store();
        for _ in 0..50 {
            if store.subscriber_count(Namespace::Local, "expandedNodes").await == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(store.subscriber_count(Namespace::Local, "expandedNodes").await, 0);
    }
}
