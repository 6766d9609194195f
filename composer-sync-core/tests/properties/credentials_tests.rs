//! Property-based tests for credentials ids and validation

use composer_sync_core::models::SwapTarget;
use composer_sync_core::{CredentialsEntry, Namespace, PlatformUser};
use proptest::prelude::*;

// ========== Strategies ==========

fn arb_subdomain() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,10}"
}

fn arb_username() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.]{0,15}"
}

fn arb_token() -> impl Strategy<Value = String> {
    "[0-9a-f]{32}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The id is `<subdomain>_<username>`
    #[test]
    fn id_joins_subdomain_and_username(
        subdomain in arb_subdomain(),
        username in arb_username(),
        token in arb_token(),
    ) {
        let url = format!("https://{subdomain}.sbgenomics.com");
        let entry = CredentialsEntry::new(&url, &token, PlatformUser::new(&username)).unwrap();
        prop_assert_eq!(entry.id, format!("{subdomain}_{username}"));
    }

    /// Normalizing fills a missing id and accepts the derived one
    #[test]
    fn normalize_is_idempotent(
        subdomain in arb_subdomain(),
        username in arb_username(),
        token in arb_token(),
    ) {
        let url = format!("https://{subdomain}.sbgenomics.com");
        let mut entry = CredentialsEntry::new(&url, &token, PlatformUser::new(&username)).unwrap();
        let id = entry.id.clone();

        entry.id.clear();
        entry.normalize().unwrap();
        prop_assert_eq!(&entry.id, &id);
        entry.normalize().unwrap();
        prop_assert_eq!(&entry.id, &id);
    }

    /// An id that does not match the URL and username is rejected
    #[test]
    fn foreign_id_is_rejected(
        subdomain in arb_subdomain(),
        username in arb_username(),
        token in arb_token(),
    ) {
        let url = format!("https://{subdomain}.sbgenomics.com");
        let mut entry = CredentialsEntry::new(&url, &token, PlatformUser::new(&username)).unwrap();
        entry.id = format!("{}x", entry.id);
        prop_assert!(entry.normalize().is_err());
    }

    /// Tokens must be exactly 32 lowercase hex digits
    #[test]
    fn token_shape_is_enforced(token in "[0-9a-zA-Z]{0,40}") {
        let valid = token.len() == 32
            && token.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        prop_assert_eq!(CredentialsEntry::is_valid_token(&token), valid);
    }

    /// Non-platform hosts never validate
    #[test]
    fn foreign_hosts_are_rejected(host in "[a-z]{1,10}\\.(org|com|io)") {
        let url = format!("https://{host}");
        prop_assert!(!CredentialsEntry::is_valid_url(&url));
        prop_assert!(CredentialsEntry::derive_id(&url, "someone").is_err());
    }

    /// App edits share one swap entry across revisions
    #[test]
    fn app_swap_ignores_revision(
        owner in "[a-z]{1,8}",
        project in "[a-z]{1,8}",
        app in "[a-z]{1,8}",
        revision in 0u32..50,
    ) {
        let target = SwapTarget::for_item(&format!("{owner}/{project}/{app}/{revision}"));
        prop_assert_eq!(target.namespace, Namespace::User);
        prop_assert_eq!(target.swap_id, format!("{owner}/{project}/{app}"));
    }

    /// Absolute paths stay in `local` unchanged
    #[test]
    fn local_swap_keeps_path(path in "/[a-z]{1,8}(/[a-z]{1,8}){0,3}\\.cwl") {
        let target = SwapTarget::for_item(&path);
        prop_assert!(target.is_local());
        prop_assert_eq!(target.swap_id, path);
    }
}
