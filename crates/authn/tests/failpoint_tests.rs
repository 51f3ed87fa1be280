#![cfg(feature = "failpoints")]
#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection in the authn crate.
//!
//! These tests require both `failpoints` and `testutil` features:
//! ```bash
//! cargo test -p openid-authn --features failpoints,testutil --test failpoint_tests
//! ```

use std::sync::Arc;

use openid_authn::{
    SigningKeyCache, assert_auth_error,
    testutil::{MockKeySetResolver, TestKeyPair},
};

const ISSUER: &str = "https://idp.example";

fn setup_cache_with_key() -> (Arc<SigningKeyCache>, Arc<MockKeySetResolver>) {
    let resolver = Arc::new(MockKeySetResolver::new());
    resolver.set_keys(ISSUER, vec![TestKeyPair::ed25519("fp-test-key").signing_key()]);
    let cache = SigningKeyCache::new(Arc::clone(&resolver) as Arc<dyn openid_authn::SigningKeySetResolver>);
    (Arc::new(cache), resolver)
}

#[tokio::test]
async fn cache_resolve_failpoint_returns_error() {
    let scenario = fail::FailScenario::setup();
    let (cache, resolver) = setup_cache_with_key();

    // Enable fail point: resolution should fail before reaching the resolver
    fail::cfg("cache-before-resolve", "return").expect("failed to configure fail point");

    let result = cache.get_key(ISSUER, "fp-test-key").await;
    assert_auth_error!(result, KeySetFetchFailure);
    assert_eq!(resolver.calls(), 0);
    assert_eq!(cache.entry_count(), 0, "injected failures must not be cached");

    scenario.teardown();
}

#[tokio::test]
async fn cache_recovers_after_failpoint_is_removed() {
    let scenario = fail::FailScenario::setup();
    let (cache, resolver) = setup_cache_with_key();

    fail::cfg("cache-before-resolve", "return").expect("failed to configure fail point");
    assert!(cache.get_key(ISSUER, "fp-test-key").await.is_err());

    fail::remove("cache-before-resolve");
    let key = cache.get_key(ISSUER, "fp-test-key").await.expect("resolution should succeed");
    assert_eq!(key.key_id, "fp-test-key");
    assert_eq!(resolver.calls(), 1);

    scenario.teardown();
}

#[tokio::test]
async fn cache_resolve_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();
    let (cache, _) = setup_cache_with_key();

    // No fail point configured, so resolution should succeed
    let result = cache.get_key(ISSUER, "fp-test-key").await;
    assert!(result.is_ok(), "resolution should succeed without fail point");

    scenario.teardown();
}
