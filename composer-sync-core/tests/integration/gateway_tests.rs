//! Gateway behaviour observed through the IPC client

use std::sync::Arc;

use composer_sync_core::testing::MemoryFileSystem;
use composer_sync_core::{
    ErrorKind, FETCH_SUCCESS, JsonFileBackend, KeyStore, Namespace, RepositoryGateway, Route,
};
use serde_json::{Value, json};

use super::{Harness, credentials, sample_platform};

#[tokio::test]
async fn removing_active_credentials_clears_active() {
    let harness = Harness::with_platform(sample_platform()).await;
    let a = harness.gateway.add_credentials(credentials("a")).await.unwrap();
    let b = harness.gateway.add_credentials(credentials("b")).await.unwrap();

    harness
        .client
        .request(Route::ActivateUser, json!(a.id))
        .await
        .unwrap();
    let active = harness
        .client
        .request(Route::GetLocalRepository, json!({"key": "activeCredentials"}))
        .await
        .unwrap();
    assert_eq!(active["id"], json!("api_a"));

    harness
        .client
        .request(
            Route::PatchLocalRepository,
            json!({ "credentials": [serde_json::to_value(&b).unwrap()] }),
        )
        .await
        .unwrap();

    let active = harness
        .client
        .request(Route::GetLocalRepository, json!({"key": "activeCredentials"}))
        .await
        .unwrap();
    assert_eq!(active, Value::Null);
}

#[tokio::test]
async fn activating_unknown_credentials_is_not_found() {
    let harness = Harness::with_platform(sample_platform()).await;
    let err = harness
        .client
        .request(Route::ActivateUser, json!("api_nobody"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let active = harness
        .client
        .request(Route::GetLocalRepository, json!({"key": "activeCredentials"}))
        .await
        .unwrap();
    assert_eq!(active, Value::Null);
}

#[tokio::test]
async fn key_of_other_namespace_is_not_found() {
    let harness = Harness::with_platform(sample_platform()).await;
    let err = harness
        .client
        .request(Route::GetUserRepository, json!({"key": "credentials"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let whole = harness
        .client
        .request(Route::GetUserRepository, Value::Null)
        .await
        .unwrap();
    assert_eq!(whole["projects"], json!([]));
    assert_eq!(whole["openProjects"], json!([]));
}

#[tokio::test]
async fn watch_sees_fetched_projects() {
    let harness = Harness::with_platform(sample_platform()).await;
    harness.sign_in("u").await;

    let mut projects = harness
        .client
        .watch(Route::WatchUserRepository, json!({"key": "projects"}))
        .unwrap();
    assert_eq!(projects.next().await.unwrap().unwrap(), json!([]));

    let reply = harness
        .client
        .request(Route::FetchPlatformData, Value::Null)
        .await
        .unwrap();
    assert_eq!(reply, json!(FETCH_SUCCESS));

    let fetched = projects.next().await.unwrap().unwrap();
    let names: Vec<&str> = fetched
        .as_array()
        .unwrap()
        .iter()
        .map(|project| project["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["P1", "P2"]);
}

#[tokio::test]
async fn fetch_without_active_credentials_is_precondition() {
    let harness = Harness::with_platform(sample_platform()).await;
    let err = harness
        .client
        .request(Route::FetchPlatformData, Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(harness.platform.call_count(), 0);
}

#[tokio::test]
async fn switching_identity_resets_platform_caches() {
    let harness = Harness::with_platform(sample_platform()).await;
    harness.sign_in("u").await;
    harness
        .client
        .request(Route::FetchPlatformData, Value::Null)
        .await
        .unwrap();
    harness
        .client
        .request(Route::PatchUserRepository, json!({"openProjects": ["u/p1"]}))
        .await
        .unwrap();

    harness.sign_in("other").await;

    let user = harness.gateway.get(Namespace::User, None).await.unwrap();
    assert_eq!(user["projects"], json!([]));
    assert_eq!(user["openProjects"], json!([]));
    assert_eq!(user["projectFetchTimestamp"], json!(0));
}

#[tokio::test]
async fn swap_takes_precedence_until_saved() {
    let fs = MemoryFileSystem::new().with_file("/w/main.cwl", "cwlVersion: v1.0");
    let harness = Harness::start(sample_platform(), fs).await;

    harness
        .client
        .request(
            Route::PatchSwap,
            json!({"local": true, "swapID": "/w/main.cwl", "swapContent": "draft"}),
        )
        .await
        .unwrap();
    let content = harness
        .client
        .request(Route::GetLocalFileContent, json!("/w/main.cwl"))
        .await
        .unwrap();
    assert_eq!(content, json!("draft"));

    harness
        .client
        .request(
            Route::SaveFileContent,
            json!({"path": "/w/main.cwl", "content": "draft"}),
        )
        .await
        .unwrap();
    assert_eq!(harness.fs.file("/w/main.cwl").as_deref(), Some("draft"));
    let swap = harness
        .client
        .request(Route::GetLocalRepository, json!({"key": "swap"}))
        .await
        .unwrap();
    assert_eq!(swap, json!({}));
}

#[tokio::test]
async fn deleting_swap_falls_back_to_disk() {
    let fs = MemoryFileSystem::new().with_file("/w/main.cwl", "on disk");
    let harness = Harness::start(sample_platform(), fs).await;

    for content in [json!("edited"), Value::Null] {
        harness
            .client
            .request(
                Route::PatchSwap,
                json!({"local": true, "swapID": "/w/main.cwl", "swapContent": content}),
            )
            .await
            .unwrap();
    }

    let content = harness
        .client
        .request(Route::GetLocalFileContent, json!("/w/main.cwl"))
        .await
        .unwrap();
    assert_eq!(content, json!("on disk"));

    let err = harness
        .client
        .request(Route::GetLocalFileContent, json!("/w/missing.cwl"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn file_routes_manage_the_filesystem() {
    let harness = Harness::with_platform(sample_platform()).await;
    let client = &harness.client;

    client
        .request(Route::CreateDirectory, json!("/w/tools"))
        .await
        .unwrap();
    client
        .request(
            Route::CreateFile,
            json!({"path": "/w/tools/a.cwl", "content": "a"}),
        )
        .await
        .unwrap();
    let err = client
        .request(Route::CreateFile, json!({"path": "/w/tools/a.cwl"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let listing = client
        .request(Route::ReadDirectory, json!("/w/tools"))
        .await
        .unwrap();
    assert_eq!(listing[0]["name"], json!("a.cwl"));
    assert_eq!(listing[0]["isFile"], json!(true));

    client
        .request(Route::DeletePath, json!("/w/tools/a.cwl"))
        .await
        .unwrap();
    let exists = client
        .request(Route::PathExists, json!("/w/tools/a.cwl"))
        .await
        .unwrap();
    assert_eq!(exists, json!(false));
}

#[tokio::test]
async fn state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = KeyStore::open(Arc::new(JsonFileBackend::new(dir.path()))).await;
        let gateway = RepositoryGateway::new(
            store,
            Arc::new(MemoryFileSystem::new()),
            Arc::new(sample_platform()),
        );
        gateway.add_credentials(credentials("a")).await.unwrap();
        gateway.activate_user("api_a").await.unwrap();
    }

    let store = KeyStore::new(Arc::new(JsonFileBackend::new(dir.path())));
    assert!(store.load().await.is_clean());
    let active = store
        .get(Namespace::Local, "activeCredentials")
        .await
        .unwrap();
    assert_eq!(active["id"], json!("api_a"));
}

#[tokio::test]
async fn corrupt_document_degrades_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let backend = JsonFileBackend::new(dir.path());
    std::fs::write(backend.path_for(Namespace::Local), "{ not json").unwrap();

    let store = KeyStore::new(Arc::new(backend));
    let report = store.load().await;

    assert_eq!(report.degraded.len(), 1);
    assert_eq!(report.degraded[0].0, Namespace::Local);
    assert_eq!(
        store.get(Namespace::Local, "localFolders").await,
        Some(json!([]))
    );
}
