//! Property-based tests for the key store and gateway patches

use std::collections::BTreeMap;
use std::sync::Arc;

use composer_sync_core::testing::{MemoryBackend, MemoryFileSystem, StaticPlatform};
use composer_sync_core::{KeyStore, Namespace, RepositoryGateway, RepositoryPatch};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

use super::runtime;

// ========== Strategies ==========

fn arb_namespace() -> impl Strategy<Value = Namespace> {
    prop_oneof![Just(Namespace::Local), Just(Namespace::User)]
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9 ]{0,12}".prop_map(Value::from),
        prop::collection::vec("[a-z]{1,6}", 0..4).prop_map(|items| json!(items)),
    ]
}

fn arb_partial() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map("[a-e]{1,2}", arb_value(), 0..6)
}

fn to_map(partial: &BTreeMap<String, Value>) -> Map<String, Value> {
    partial
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn arb_folders() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("/[a-z]{1,8}(/[a-z]{1,8}){0,2}", 0..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every key of a patch reads back as the patched value
    #[test]
    fn patch_then_get_returns_patched_values(
        namespace in arb_namespace(),
        partial in arb_partial(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = KeyStore::open(Arc::new(MemoryBackend::new())).await;
            store.patch(namespace, to_map(&partial)).await.unwrap();
            for (key, value) in &partial {
                assert_eq!(store.get(namespace, key).await.as_ref(), Some(value));
            }
        });
    }

    /// Sequential patches fold like shallow map merges, last write winning
    #[test]
    fn patches_fold_in_issue_order(patches in prop::collection::vec(arb_partial(), 1..6)) {
        let rt = runtime();
        rt.block_on(async {
            let store = KeyStore::with_defaults(Arc::new(MemoryBackend::new()), Default::default());
            store.load().await;

            let mut expected = Map::new();
            for partial in &patches {
                store.patch(Namespace::Local, to_map(partial)).await.unwrap();
                expected.extend(to_map(partial));
            }
            assert_eq!(store.get_namespace(Namespace::Local).await, expected);
        });
    }

    /// A failed write leaves every key as it was
    #[test]
    fn failed_write_changes_nothing(before in arb_partial(), after in arb_partial()) {
        let rt = runtime();
        rt.block_on(async {
            let backend = Arc::new(MemoryBackend::new());
            let store = KeyStore::open(backend.clone()).await;
            store.patch(Namespace::User, to_map(&before)).await.unwrap();
            let snapshot = store.get_namespace(Namespace::User).await;

            backend.set_fail_writes(true);
            let result = store.patch(Namespace::User, to_map(&after)).await;
            if !after.is_empty() {
                assert!(result.is_err());
            }
            assert_eq!(store.get_namespace(Namespace::User).await, snapshot);
        });
    }

    /// Typed gateway patches round-trip through `get`
    #[test]
    fn gateway_local_folders_round_trip(folders in arb_folders(), hidden in any::<bool>()) {
        let rt = runtime();
        rt.block_on(async {
            let store = KeyStore::open(Arc::new(MemoryBackend::new())).await;
            let gateway = RepositoryGateway::new(
                store,
                Arc::new(MemoryFileSystem::new()),
                Arc::new(StaticPlatform::new()),
            );
            let patch = RepositoryPatch::from_json(&json!({
                "localFolders": folders,
                "sidebarHidden": hidden,
            }))
            .unwrap();
            gateway.patch(Namespace::Local, patch).await.unwrap();

            assert_eq!(
                gateway.get(Namespace::Local, Some("localFolders")).await.unwrap(),
                json!(folders)
            );
            assert_eq!(
                gateway.get(Namespace::Local, Some("sidebarHidden")).await.unwrap(),
                json!(hidden)
            );
        });
    }

    /// Values of the wrong shape never reach the store
    #[test]
    fn mistyped_patch_is_rejected(text in "[a-z]{1,10}") {
        let rt = runtime();
        rt.block_on(async {
            let backend = Arc::new(MemoryBackend::new());
            let store = KeyStore::open(backend.clone()).await;
            let gateway = RepositoryGateway::new(
                store,
                Arc::new(MemoryFileSystem::new()),
                Arc::new(StaticPlatform::new()),
            );
            let patch = RepositoryPatch::from_json(&json!({ "localFolders": text })).unwrap();
            assert!(gateway.patch(Namespace::Local, patch).await.is_err());
            assert_eq!(backend.write_count(), 0);
        });
    }
}
