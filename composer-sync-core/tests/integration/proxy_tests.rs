//! Repository proxies driving a live gateway

use std::time::Duration;

use composer_sync_core::testing::MemoryFileSystem;
use composer_sync_core::{
    ContentProxy, CredentialsEntry, ErrorKind, LocalRepositoryProxy, MirrorReader, Namespace,
    PlatformUser, Project, RepositoryKey, RequestOptions, UserRepositoryProxy,
};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{Harness, PLATFORM_URL, TOKEN, credentials, sample_platform};

/// Reads from `reader` until a value satisfies `accept`
async fn next_matching<T, F>(reader: &mut MirrorReader, accept: F) -> T
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let value: T = reader.next_as().await.unwrap();
            if accept(&value) {
                return value;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn readers_share_one_watch_per_key() {
    let harness = Harness::with_platform(sample_platform()).await;
    let local = LocalRepositoryProxy::new(harness.client.clone());

    let mut first = local.watch(RepositoryKey::LocalFolders).unwrap();
    let mut second = local.watch(RepositoryKey::LocalFolders).unwrap();
    assert_eq!(first.next().await, Some(Ok(json!([]))));
    assert_eq!(second.next().await, Some(Ok(json!([]))));
    assert_eq!(local.local_folders().await.unwrap(), Vec::<String>::new());

    assert_eq!(local.mirror().watched_keys(), 1);
    assert_eq!(harness.client.pending_count(), 1);

    local.expanded_nodes().await.unwrap();
    assert_eq!(local.mirror().watched_keys(), 2);
}

#[tokio::test]
async fn late_reader_replays_the_last_value() {
    let harness = Harness::with_platform(sample_platform()).await;
    let local = LocalRepositoryProxy::new(harness.client.clone());
    let mut early = local.watch(RepositoryKey::SidebarHidden).unwrap();
    assert_eq!(early.next().await, Some(Ok(json!(false))));

    local.set_sidebar_hidden(true).await.unwrap();
    let hidden: bool = next_matching(&mut early, |hidden: &bool| *hidden).await;
    assert!(hidden);

    let mut late = local.watch(RepositoryKey::SidebarHidden).unwrap();
    assert_eq!(late.current(), Some(json!(true)));
    assert_eq!(late.next().await, Some(Ok(json!(true))));
}

#[tokio::test]
async fn token_lookup_registers_the_platform_account() {
    let platform = sample_platform().with_user(PlatformUser::new("jdoe"));
    let harness = Harness::with_platform(platform).await;
    let local = LocalRepositoryProxy::new(harness.client.clone());

    let user = local.get_user_by_token(PLATFORM_URL, TOKEN).await.unwrap();
    assert_eq!(user.username, "jdoe");

    let entry = CredentialsEntry::new(PLATFORM_URL, TOKEN, user).unwrap();
    let stored = harness.gateway.add_credentials(entry).await.unwrap();
    assert_eq!(stored.id, "api_jdoe");

    let err = local
        .get_user_by_token("https://example.com", TOKEN)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn add_local_folders_dedups_and_keeps_order() {
    let harness = Harness::with_platform(sample_platform()).await;
    let local = LocalRepositoryProxy::new(harness.client.clone());
    let mut reader = local.watch(RepositoryKey::LocalFolders).unwrap();

    local.add_local_folders(["/a"]).await.unwrap();
    next_matching(&mut reader, |folders: &Vec<String>| folders.len() == 1).await;

    local.add_local_folders(["/b", "/a", "/c", "/b"]).await.unwrap();
    let folders: Vec<String> =
        next_matching(&mut reader, |folders: &Vec<String>| folders.len() == 3).await;
    assert_eq!(folders, ["/a", "/b", "/c"]);
}

#[tokio::test]
async fn set_credentials_drops_missing_active_entry() {
    let harness = Harness::with_platform(sample_platform()).await;
    let local = LocalRepositoryProxy::new(harness.client.clone());
    let a = harness.gateway.add_credentials(credentials("a")).await.unwrap();
    let b = harness.gateway.add_credentials(credentials("b")).await.unwrap();

    local.activate_user(&a.id).await.unwrap();
    let mut active = local.watch(RepositoryKey::ActiveCredentials).unwrap();
    next_matching(&mut active, |entry: &Option<CredentialsEntry>| entry.is_some()).await;

    local.set_credentials(vec![b.clone()]).await.unwrap();
    next_matching(&mut active, |entry: &Option<CredentialsEntry>| entry.is_none()).await;

    let stored = harness
        .gateway
        .get(Namespace::Local, Some("credentials"))
        .await
        .unwrap();
    assert_eq!(stored[0]["id"], json!(b.id));
    assert_eq!(stored.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn activation_errors_reach_the_proxy() {
    let harness = Harness::with_platform(sample_platform()).await;
    let local = LocalRepositoryProxy::new(harness.client.clone());
    let err = local.activate_user("api_ghost").await.unwrap_err();
    assert_eq!(err.kind(), composer_sync_core::ErrorKind::NotFound);

    let stranger = credentials("stranger");
    let err = local.set_active_credentials(Some(stranger)).await.unwrap_err();
    assert_eq!(err.kind(), composer_sync_core::ErrorKind::NotFound);
}

#[tokio::test]
async fn user_proxy_resolves_projects_and_apps() {
    let harness = Harness::with_platform(sample_platform()).await;
    harness.sign_in("u").await;
    let user = UserRepositoryProxy::new(harness.client.clone());
    let mut projects = user.watch(RepositoryKey::Projects).unwrap();

    user.fetch(RequestOptions::default()).await.unwrap();
    next_matching(&mut projects, |projects: &Vec<Project>| projects.len() == 2).await;

    let mut open = user.watch(RepositoryKey::OpenProjects).unwrap();
    let ids = vec!["u/p2".to_string(), "u/gone".to_string(), "u/p1".to_string()];
    user.add_open_projects(&ids).await.unwrap();
    next_matching(&mut open, |open: &Vec<String>| open.len() == 3).await;

    let entries = user.open_project_entries().await.unwrap();
    let names: Vec<&str> = entries.iter().map(|project| project.name.as_str()).collect();
    assert_eq!(names, ["P2", "P1"]);

    user.remove_open_projects(&["u/gone".to_string()]).await.unwrap();
    next_matching(&mut open, |open: &Vec<String>| open.len() == 2).await;

    let apps = user.apps_for_project("u/p1").await.unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].id, "u/p1/bwa");
}

#[tokio::test]
async fn node_expansion_toggles() {
    let harness = Harness::with_platform(sample_platform()).await;
    let user = UserRepositoryProxy::new(harness.client.clone());
    let mut nodes = user.watch(RepositoryKey::ExpandedNodes).unwrap();

    user.set_node_expansion("u/p1", true).await.unwrap();
    next_matching(&mut nodes, |nodes: &Vec<String>| nodes.len() == 1).await;
    user.set_node_expansion("u/p1", true).await.unwrap();
    user.set_node_expansion("u/p1", false).await.unwrap();
    let nodes: Vec<String> = next_matching(&mut nodes, Vec::is_empty).await;
    assert!(nodes.is_empty());
}

#[tokio::test]
async fn user_proxy_rejects_local_keys() {
    let harness = Harness::with_platform(sample_platform()).await;
    let user = UserRepositoryProxy::new(harness.client.clone());
    let err = user.watch(RepositoryKey::Credentials).unwrap_err();
    assert_eq!(err.kind(), composer_sync_core::ErrorKind::Validation);
    assert_eq!(harness.client.pending_count(), 0);
}

#[tokio::test]
async fn content_proxy_routes_swap_by_item_kind() {
    let fs = MemoryFileSystem::new().with_file("/w/main.cwl", "disk");
    let harness = Harness::start(sample_platform(), fs).await;
    let content = ContentProxy::new(harness.client.clone());

    content
        .update_swap("/w/main.cwl", Some("local edit".into()))
        .await
        .unwrap();
    content
        .update_swap("u/p1/bwa/3", Some("app edit".into()))
        .await
        .unwrap();

    assert_eq!(
        content.fetch_local_file_content("/w/main.cwl").await.unwrap(),
        "local edit"
    );
    let user_swap = harness
        .gateway
        .get(Namespace::User, Some("swap"))
        .await
        .unwrap();
    assert_eq!(user_swap, json!({"u/p1/bwa": "app edit"}));

    content.update_swap("/w/main.cwl", None).await.unwrap();
    assert_eq!(
        content.fetch_local_file_content("/w/main.cwl").await.unwrap(),
        "disk"
    );
}
