//! Shared harness for the integration tests

mod gateway_tests;
mod ipc_tests;
mod proxy_tests;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use composer_sync_core::testing::{MemoryBackend, MemoryFileSystem, StaticPlatform};
use composer_sync_core::{
    App, CredentialsEntry, IpcClient, IpcServer, KeyStore, PlatformUser, Project,
    RepositoryGateway, in_process_pair,
};
use tokio::task::JoinHandle;

pub const TOKEN: &str = "0123456789abcdef0123456789abcdef";
pub const PLATFORM_URL: &str = "https://api.sbgenomics.com";

/// Credentials on the default platform; the id is `api_<username>`
pub fn credentials(username: &str) -> CredentialsEntry {
    CredentialsEntry::new(PLATFORM_URL, TOKEN, PlatformUser::new(username)).unwrap()
}

/// Platform with two projects, one private app per project and a public app
pub fn sample_platform() -> StaticPlatform {
    StaticPlatform::new()
        .with_projects(vec![Project::new("u/p1", "P1"), Project::new("u/p2", "P2")])
        .with_apps(vec![
            App::new("u/p1/bwa", "BWA", "u/p1"),
            App::new("u/p2/gatk", "GATK", "u/p2"),
        ])
        .with_public_apps(vec![App::new("admin/public/star", "STAR", "admin/public")])
}

/// Gateway served over an in-process IPC pair
#[allow(dead_code)]
pub struct Harness {
    pub gateway: Arc<RepositoryGateway>,
    pub client: IpcClient,
    pub platform: StaticPlatform,
    pub fs: Arc<MemoryFileSystem>,
    pub server: JoinHandle<()>,
}

impl Harness {
    pub async fn start(platform: StaticPlatform, fs: MemoryFileSystem) -> Self {
        let store = KeyStore::open(Arc::new(MemoryBackend::new())).await;
        let fs = Arc::new(fs);
        let gateway = Arc::new(RepositoryGateway::new(
            store,
            fs.clone(),
            Arc::new(platform.clone()),
        ));
        let (client_end, server_end) = in_process_pair();
        let server = IpcServer::new(Arc::clone(&gateway));
        let server = tokio::spawn(async move { server.serve(server_end).await });
        Self {
            gateway,
            client: IpcClient::new(client_end),
            platform,
            fs,
            server,
        }
    }

    pub async fn with_platform(platform: StaticPlatform) -> Self {
        Self::start(platform, MemoryFileSystem::new()).await
    }

    /// Registers and activates credentials for `username`
    pub async fn sign_in(&self, username: &str) -> CredentialsEntry {
        let entry = self
            .gateway
            .add_credentials(credentials(username))
            .await
            .unwrap();
        self.gateway.activate_user(&entry.id).await.unwrap();
        entry
    }
}

/// Polls `check` until it holds, failing after about a second
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
