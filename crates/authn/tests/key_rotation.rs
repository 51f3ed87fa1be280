//! Integration tests for signing key rotation and cache sharing.
//!
//! These tests drive [`TokenValidator`] against an in-memory provider whose
//! published keys change underneath a warm cache, and check the retry
//! protocol: a valid token never retries, a stale key retries exactly once,
//! and a second mismatch is final.
#![allow(clippy::expect_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use openid_authn::{
    AudienceCondition, DiscoveryKeySetResolver, Provider, ProviderRegistry, SigningKeyCache,
    TokenValidator, assert_auth_error,
    error::AuthError,
    testutil::{MemoryHttpGetter, TestKeyPair, standard_claims},
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const ISSUER: &str = "https://idp.example";
const CLIENT: &str = "client-1";

fn keys_url() -> String {
    format!("{ISSUER}/keys")
}

fn setup(pairs: &[&TestKeyPair]) -> (TokenValidator, Arc<MemoryHttpGetter>) {
    let getter = Arc::new(MemoryHttpGetter::new());
    getter.publish_keys(ISSUER, pairs);
    let cache = SigningKeyCache::new(Arc::new(DiscoveryKeySetResolver::new(getter.clone())));
    let providers = ProviderRegistry::new(vec![
        Provider::new(ISSUER, AudienceCondition::list([CLIENT])).expect("valid provider"),
    ]);
    (TokenValidator::new(Arc::new(providers), Arc::new(cache)), getter)
}

// ===========================================================================
// Worked examples
// ===========================================================================

#[tokio::test]
async fn test_correctly_signed_token_is_accepted() {
    let pair = TestKeyPair::ed25519("k1");
    let (validator, _) = setup(&[&pair]);

    let identity = validator
        .validate(&pair.sign(&standard_claims(ISSUER, CLIENT, "user-42")))
        .await
        .expect("token should validate");

    assert_eq!(identity.issuer, ISSUER);
    assert_eq!(identity.subject, "user-42");
}

#[tokio::test]
async fn test_unknown_issuer_makes_no_network_calls() {
    let pair = TestKeyPair::ed25519("k1");
    let (validator, getter) = setup(&[&pair]);

    let token = pair.sign(&standard_claims("https://other.example", CLIENT, "user-42"));
    assert_auth_error!(validator.validate(&token).await, IssuerNotRegistered);
    assert_eq!(getter.calls(), 0);
}

#[tokio::test]
async fn test_provider_with_zero_keys() {
    let pair = TestKeyPair::ed25519("k1");
    let (validator, _) = setup(&[]);

    for subject in ["user-1", "user-2"] {
        let token = pair.sign(&standard_claims(ISSUER, CLIENT, subject));
        assert_auth_error!(validator.validate(&token).await, EmptyKeySet);
    }
    assert_eq!(validator.cache().entry_count(), 0);
}

#[tokio::test]
async fn test_rsa_signed_token_is_accepted() {
    let pair = TestKeyPair::rsa("rsa-1");
    let (validator, getter) = setup(&[&pair]);

    let identity = validator
        .validate(&pair.sign(&standard_claims(ISSUER, CLIENT, "user-42")))
        .await
        .expect("RS256 token should validate");

    assert_eq!(identity.subject, "user-42");
    assert_eq!(getter.calls_for(&keys_url()), 1);
}

#[tokio::test]
async fn test_mixed_key_families_all_encode() {
    // A P-384 key published next to the working keys must not break the set.
    let ed = TestKeyPair::ed25519("k1");
    let ec384 = TestKeyPair::p384("k2");
    let (validator, _) = setup(&[&ed, &ec384]);

    for pair in [&ed, &ec384] {
        let identity = validator
            .validate(&pair.sign(&standard_claims(ISSUER, CLIENT, "user-1")))
            .await
            .unwrap_or_else(|e| panic!("{:?} token should validate: {e:?}", pair.algorithm()));
        assert_eq!(identity.subject, "user-1");
    }
    assert_eq!(
        validator.cache().cached_key_ids(ISSUER),
        Some(vec!["k1".to_owned(), "k2".to_owned()])
    );
}

// ===========================================================================
// Retry protocol
// ===========================================================================

#[tokio::test]
async fn test_valid_token_does_not_retry() {
    let pair = TestKeyPair::ed25519("k1");
    let (validator, getter) = setup(&[&pair]);

    for _ in 0..3 {
        validator
            .validate(&pair.sign(&standard_claims(ISSUER, CLIENT, "user-1")))
            .await
            .expect("token should validate");
    }

    assert_eq!(getter.calls_for(&keys_url()), 1, "warm cache must serve later validations");
    assert_eq!(validator.cache().metrics().flushes, 0);
}

#[tokio::test]
async fn test_rotated_key_with_reused_kid_retries_once() {
    let old = TestKeyPair::ed25519("k1");
    let (validator, getter) = setup(&[&old]);
    validator
        .validate(&old.sign(&standard_claims(ISSUER, CLIENT, "user-1")))
        .await
        .expect("warm-up should validate");

    // Provider rotates to a new key under the same identifier.
    let new = TestKeyPair::ed25519("k1");
    getter.publish_keys(ISSUER, &[&new]);

    let identity = validator
        .validate(&new.sign(&standard_claims(ISSUER, CLIENT, "user-2")))
        .await
        .expect("rotated key should validate after one refresh");

    assert_eq!(identity.subject, "user-2");
    assert_eq!(getter.calls_for(&keys_url()), 2);
    assert_eq!(validator.cache().metrics().flushes, 1);

    // The refreshed entry now serves the new key without further fetches.
    validator
        .validate(&new.sign(&standard_claims(ISSUER, CLIENT, "user-3")))
        .await
        .expect("refreshed cache should validate");
    assert_eq!(getter.calls_for(&keys_url()), 2);
}

#[tokio::test]
async fn test_rotated_rsa_key_with_reused_kid_retries_once() {
    let old = TestKeyPair::rsa("rsa-1");
    let (validator, getter) = setup(&[&old]);
    validator
        .validate(&old.sign(&standard_claims(ISSUER, CLIENT, "user-1")))
        .await
        .expect("warm-up should validate");

    let new = TestKeyPair::rsa("rsa-1");
    getter.publish_keys(ISSUER, &[&new]);

    let identity = validator
        .validate(&new.sign(&standard_claims(ISSUER, CLIENT, "user-2")))
        .await
        .expect("rotated RSA key should validate after one refresh");

    assert_eq!(identity.subject, "user-2");
    assert_eq!(getter.calls_for(&keys_url()), 2);
    assert_eq!(validator.cache().metrics().flushes, 1);

    // Tokens signed by the retired key now fail after a single refresh.
    let result = validator.validate(&old.sign(&standard_claims(ISSUER, CLIENT, "user-3"))).await;
    assert_auth_error!(result, SignatureInvalid);
    assert_eq!(getter.calls_for(&keys_url()), 3);
}

#[tokio::test]
async fn test_new_kid_is_fetched_without_flush() {
    let old = TestKeyPair::ed25519("k1");
    let (validator, getter) = setup(&[&old]);
    validator
        .validate(&old.sign(&standard_claims(ISSUER, CLIENT, "user-1")))
        .await
        .expect("warm-up should validate");

    let new = TestKeyPair::p256("k2");
    getter.publish_keys(ISSUER, &[&old, &new]);

    validator
        .validate(&new.sign(&standard_claims(ISSUER, CLIENT, "user-2")))
        .await
        .expect("new kid should be resolved on demand");

    assert_eq!(getter.calls_for(&keys_url()), 2);
    assert_eq!(validator.cache().metrics().flushes, 0);
    assert_eq!(
        validator.cache().cached_key_ids(ISSUER),
        Some(vec!["k1".to_owned(), "k2".to_owned()])
    );
}

#[tokio::test]
async fn test_second_signature_failure_is_final() {
    let published = TestKeyPair::ed25519("k1");
    let forger = TestKeyPair::ed25519("k1");
    let (validator, getter) = setup(&[&published]);

    let result = validator.validate(&forger.sign(&standard_claims(ISSUER, CLIENT, "user-1"))).await;

    assert_auth_error!(result, SignatureInvalid);
    assert_eq!(getter.calls_for(&keys_url()), 2, "exactly one refresh, no third attempt");
    assert_eq!(validator.cache().metrics().flushes, 1);
}

#[tokio::test]
async fn test_kid_missing_after_refresh() {
    let pair = TestKeyPair::ed25519("k1");
    let (validator, _) = setup(&[&pair]);

    let token = pair.sign_with_kid(Some("retired"), &standard_claims(ISSUER, CLIENT, "user-1"));
    match validator.validate(&token).await {
        Err(AuthError::KeyIdentifierNotFound { issuer, kid }) => {
            assert_eq!(issuer, ISSUER);
            assert_eq!(kid, "retired");
        },
        other => panic!("expected KeyIdentifierNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_token_without_kid_uses_first_key() {
    let first = TestKeyPair::ed25519("k1");
    let second = TestKeyPair::ed25519("k2");
    let (validator, _) = setup(&[&first, &second]);

    let token = first.sign_with_kid(None, &standard_claims(ISSUER, CLIENT, "user-1"));
    assert!(validator.validate(&token).await.is_ok());
}

#[tokio::test]
async fn test_discovery_outage_surfaces_fetch_failure() {
    let pair = TestKeyPair::ed25519("k1");
    let (validator, getter) = setup(&[&pair]);
    getter.fail(format!("{ISSUER}/.well-known/openid-configuration"), "connection refused");

    let err = validator
        .validate(&pair.sign(&standard_claims(ISSUER, CLIENT, "user-1")))
        .await
        .expect_err("outage should fail validation");

    assert!(matches!(err, AuthError::ConfigurationFetchFailure { .. }), "{err:?}");
    assert!(err.is_fetch_failure());
    assert_eq!(err.http_status(), 401);
}

// ===========================================================================
// Concurrency
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_validations_share_one_resolution() {
    let pair = TestKeyPair::ed25519("k1");
    let (validator, getter) = setup(&[&pair]);
    getter.set_delay(Duration::from_millis(50));

    let mut tasks = JoinSet::new();
    for n in 0..24 {
        let validator = validator.clone();
        let token = pair.sign(&standard_claims(ISSUER, CLIENT, &format!("user-{n}")));
        tasks.spawn(async move { validator.validate(&token).await });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.expect("task should not panic").expect("validation should succeed");
    }
    assert_eq!(getter.calls_for(&keys_url()), 1);
    assert_eq!(validator.cache().metrics().resolutions, 1);
}

#[tokio::test]
async fn test_cancelled_validation_does_not_fail_others() {
    let pair = TestKeyPair::ed25519("k1");
    let (validator, getter) = setup(&[&pair]);
    getter.set_delay(Duration::from_millis(80));

    let cancel = CancellationToken::new();
    let cancelled = {
        let validator = validator.clone();
        let cancel = cancel.clone();
        let token = pair.sign(&standard_claims(ISSUER, CLIENT, "user-1"));
        tokio::spawn(async move { validator.validate_with_cancel(&token, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let patient = {
        let validator = validator.clone();
        let token = pair.sign(&standard_claims(ISSUER, CLIENT, "user-2"));
        tokio::spawn(async move { validator.validate(&token).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let cancelled = cancelled.await.expect("task should not panic");
    assert_auth_error!(cancelled, FetchCancelled);

    let identity = patient.await.expect("task should not panic").expect("other waiter should succeed");
    assert_eq!(identity.subject, "user-2");
    assert_eq!(validator.cache().entry_count(), 1);
}
