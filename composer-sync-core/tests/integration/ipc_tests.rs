//! Channel behaviour: ordering, timeouts, unwatch and stream transports

use std::sync::Arc;
use std::time::Duration;

use composer_sync_core::testing::{MemoryBackend, MemoryFileSystem};
use composer_sync_core::{
    CancellationToken, ClientTransport, ErrorKind, IpcClient, IpcServer, KeyStore, Namespace,
    RepositoryError, RepositoryGateway, RequestOptions, Route, ServerTransport,
};
use serde_json::{Map, Value, json};

use super::{Harness, eventually, sample_platform};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[tokio::test]
async fn concurrent_patches_both_land() {
    let store = KeyStore::open(Arc::new(MemoryBackend::new())).await;

    let first = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.patch(Namespace::Local, object(json!({"a": 1}))).await })
    };
    let second = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.patch(Namespace::Local, object(json!({"b": 2}))).await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(store.get(Namespace::Local, "a").await, Some(json!(1)));
    assert_eq!(store.get(Namespace::Local, "b").await, Some(json!(2)));
}

#[tokio::test]
async fn patches_from_one_client_apply_in_order() {
    let harness = Harness::with_platform(sample_platform()).await;
    let calls: Vec<_> = (0..20)
        .map(|i| {
            let client = harness.client.clone();
            async move {
                client
                    .request(
                        Route::PatchLocalRepository,
                        json!({"localFolders": [format!("/w/{i}")]}),
                    )
                    .await
            }
        })
        .collect();
    for result in futures::future::join_all(calls).await {
        result.unwrap();
    }

    let folders = harness
        .gateway
        .get(Namespace::Local, Some("localFolders"))
        .await
        .unwrap();
    assert_eq!(folders, json!(["/w/19"]));
}

#[tokio::test]
async fn slow_request_times_out_and_late_reply_is_dropped() {
    let platform = sample_platform().with_delay(Duration::from_millis(100));
    let harness = Harness::with_platform(platform).await;
    harness.sign_in("u").await;

    let options = RequestOptions::new().with_timeout(Duration::from_millis(10));
    let err = harness
        .client
        .request_with(Route::FetchPlatformData, Value::Null, options)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(harness.client.pending_count(), 0);

    // The fetch still completes on the gateway; its reply finds no caller.
    let gateway = Arc::clone(&harness.gateway);
    eventually(|| {
        let gateway = Arc::clone(&gateway);
        async move {
            gateway
                .get(Namespace::User, Some("projects"))
                .await
                .is_ok_and(|projects| projects != json!([]))
        }
    })
    .await;

    let alive = harness
        .client
        .request(Route::PathExists, json!("/nowhere"))
        .await
        .unwrap();
    assert_eq!(alive, json!(false));
    assert_eq!(harness.client.pending_count(), 0);
}

#[tokio::test]
async fn cancelled_request_reports_cancelled() {
    let platform = sample_platform().with_delay(Duration::from_millis(200));
    let harness = Harness::with_platform(platform).await;
    harness.sign_in("u").await;

    let token = CancellationToken::new();
    let call = {
        let client = harness.client.clone();
        let options = RequestOptions::new().with_cancel(token.clone());
        tokio::spawn(async move {
            client
                .request_with(Route::FetchPlatformData, Value::Null, options)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    assert_eq!(call.await.unwrap().unwrap_err(), RepositoryError::Cancelled);
    assert_eq!(harness.client.pending_count(), 0);
}

#[tokio::test]
async fn dropping_a_watch_unsubscribes_on_the_gateway() {
    let harness = Harness::with_platform(sample_platform()).await;
    let store = Arc::clone(harness.gateway.store());

    let mut watch = harness
        .client
        .watch(Route::WatchLocalRepository, json!({"key": "localFolders"}))
        .unwrap();
    assert_eq!(watch.next().await.unwrap().unwrap(), json!([]));
    assert_eq!(store.subscriber_count(Namespace::Local, "localFolders").await, 1);

    drop(watch);
    eventually(|| {
        let store = Arc::clone(&store);
        async move { store.subscriber_count(Namespace::Local, "localFolders").await == 0 }
    })
    .await;
    assert_eq!(harness.client.pending_count(), 0);
}

#[tokio::test]
async fn watch_delivers_each_change_in_order() {
    let harness = Harness::with_platform(sample_platform()).await;
    let mut watch = harness
        .client
        .watch(Route::WatchLocalRepository, json!({"key": "sidebarHidden"}))
        .unwrap();
    assert_eq!(watch.next().await.unwrap().unwrap(), json!(false));

    for hidden in [true, false, true] {
        harness
            .client
            .request(Route::PatchLocalRepository, json!({"sidebarHidden": hidden}))
            .await
            .unwrap();
    }
    for expected in [true, false, true] {
        assert_eq!(watch.next().await.unwrap().unwrap(), json!(expected));
    }
}

#[tokio::test]
async fn server_disconnect_ends_client_watches() {
    let harness = Harness::with_platform(sample_platform()).await;
    let mut watch = harness
        .client
        .watch(Route::WatchUserRepository, json!({"key": "openProjects"}))
        .unwrap();
    assert_eq!(watch.next().await.unwrap().unwrap(), json!([]));

    harness.server.abort();

    assert!(watch.next().await.is_none());
    let err = harness
        .client
        .request(Route::GetUserRepository, Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err, RepositoryError::ChannelClosed);
}

#[tokio::test]
async fn json_lines_transport_serves_requests() {
    let store = KeyStore::open(Arc::new(MemoryBackend::new())).await;
    let gateway = Arc::new(RepositoryGateway::new(
        store,
        Arc::new(MemoryFileSystem::new().with_file("/w/a.cwl", "a")),
        Arc::new(sample_platform()),
    ));

    let (client_io, server_io) = tokio::io::duplex(8192);
    let (client_read, client_write) = tokio::io::split(client_io);
    let (server_read, server_write) = tokio::io::split(server_io);
    let server = IpcServer::new(gateway);
    tokio::spawn(async move {
        server
            .serve(ServerTransport::from_stream(server_read, server_write))
            .await;
    });
    let client = IpcClient::new(ClientTransport::from_stream(client_read, client_write));

    let content = client
        .request(Route::GetLocalFileContent, json!("/w/a.cwl"))
        .await
        .unwrap();
    assert_eq!(content, json!("a"));

    let mut watch = client
        .watch(Route::WatchLocalRepository, json!({"key": "expandedNodes"}))
        .unwrap();
    assert_eq!(watch.next().await.unwrap().unwrap(), json!([]));
    client
        .request(Route::PatchLocalRepository, json!({"expandedNodes": ["/w"]}))
        .await
        .unwrap();
    assert_eq!(watch.next().await.unwrap().unwrap(), json!(["/w"]));
}
