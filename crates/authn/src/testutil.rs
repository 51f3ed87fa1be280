//! Shared test utilities for authentication testing.
//!
//! This module provides helpers for generating RSA, Ed25519, P-256 and P-384
//! key pairs,
//! publishing them as JWKs, signing ID tokens, crafting raw JWT strings (for
//! attack testing), and in-memory stand-ins for the network and resolver
//! capabilities. It is feature-gated behind `testutil` to prevent leaking
//! into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! openid-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use openid_authn::testutil::{MemoryHttpGetter, TestKeyPair, standard_claims};
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p256::{
    elliptic_curve::sec1::ToEncodedPoint,
    pkcs8::{EncodePrivateKey, LineEnding},
};
use parking_lot::Mutex;
use rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use zeroize::Zeroizing;

use crate::discovery::configuration_url;
use crate::encoder::{KeyEncoder, PemKeyEncoder};
use crate::error::{AuthError, BoxError, Result};
use crate::http::HttpGetter;
use crate::jwks::KeySetEntry;
use crate::key_set::{SigningKey, SigningKeySetResolver};

/// A freshly generated signing key pair with its published JWK.
///
/// The private key is kept as PKCS#8 wrapped in [`Zeroizing`] so it is
/// scrubbed from memory on drop, even in test code. RSA keys are held as PEM,
/// every other family as DER.
pub struct TestKeyPair {
    kid: String,
    algorithm: Algorithm,
    pkcs8: Zeroizing<Vec<u8>>,
    jwk: KeySetEntry,
}

impl TestKeyPair {
    /// Generates an Ed25519 key pair published under `kid`.
    pub fn ed25519(kid: &str) -> Self {
        let signing_key = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let public_key = signing_key.verifying_key().to_bytes();

        let private_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());
        let mut pkcs8_der = Zeroizing::new(vec![
            0x30, 0x2e, // SEQUENCE, 46 bytes
            0x02, 0x01, 0x00, // INTEGER version 0
            0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
            0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
            0x04, 0x22, // OCTET STRING, 34 bytes
            0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
        ]);
        pkcs8_der.extend_from_slice(&*private_bytes);

        let jwk = KeySetEntry {
            kty: "OKP".to_owned(),
            kid: Some(kid.to_owned()),
            alg: Some("EdDSA".to_owned()),
            key_use: Some("sig".to_owned()),
            crv: Some("Ed25519".to_owned()),
            x: Some(URL_SAFE_NO_PAD.encode(public_key)),
            ..KeySetEntry::default()
        };

        Self { kid: kid.to_owned(), algorithm: Algorithm::EdDSA, pkcs8: pkcs8_der, jwk }
    }

    /// Generates a 2048-bit RSA key pair published under `kid` for `RS256`.
    ///
    /// # Panics
    ///
    /// Panics if key generation or PKCS#8 encoding fails.
    pub fn rsa(kid: &str) -> Self {
        let private_key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).expect("Failed to generate RSA key");
        let pem = private_key.to_pkcs8_pem(LineEnding::LF).expect("Failed to encode RSA key");
        let pkcs8 = Zeroizing::new(pem.as_bytes().to_vec());

        let jwk = KeySetEntry {
            kty: "RSA".to_owned(),
            kid: Some(kid.to_owned()),
            alg: Some("RS256".to_owned()),
            key_use: Some("sig".to_owned()),
            n: Some(URL_SAFE_NO_PAD.encode(private_key.n().to_bytes_be())),
            e: Some(URL_SAFE_NO_PAD.encode(private_key.e().to_bytes_be())),
            ..KeySetEntry::default()
        };

        Self { kid: kid.to_owned(), algorithm: Algorithm::RS256, pkcs8, jwk }
    }

    /// Generates a P-256 key pair published under `kid`.
    ///
    /// # Panics
    ///
    /// Panics if PKCS#8 encoding of the generated key fails.
    pub fn p256(kid: &str) -> Self {
        let secret = p256::SecretKey::random(&mut OsRng);
        let pkcs8 =
            Zeroizing::new(secret.to_pkcs8_der().expect("Failed to encode P-256 key").as_bytes().to_vec());
        let point = secret.public_key().to_encoded_point(false);
        let jwk = ec_entry(kid, "ES256", "P-256", point.x(), point.y());

        Self { kid: kid.to_owned(), algorithm: Algorithm::ES256, pkcs8, jwk }
    }

    /// Generates a P-384 key pair published under `kid`.
    ///
    /// # Panics
    ///
    /// Panics if PKCS#8 encoding of the generated key fails.
    pub fn p384(kid: &str) -> Self {
        let secret = p384::SecretKey::random(&mut OsRng);
        let pkcs8 =
            Zeroizing::new(secret.to_pkcs8_der().expect("Failed to encode P-384 key").as_bytes().to_vec());
        let point = secret.public_key().to_encoded_point(false);
        let jwk = ec_entry(kid, "ES384", "P-384", point.x(), point.y());

        Self { kid: kid.to_owned(), algorithm: Algorithm::ES384, pkcs8, jwk }
    }

    /// Returns the key identifier.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Returns the signing algorithm for this key family.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Returns the public half as a JWK.
    pub fn jwk(&self) -> KeySetEntry {
        self.jwk.clone()
    }

    /// Returns the public half as the cache stores it.
    ///
    /// # Panics
    ///
    /// Panics if the JWK cannot be encoded.
    pub fn signing_key(&self) -> SigningKey {
        let encoded = PemKeyEncoder.encode(&self.jwk).expect("Failed to encode test JWK");
        SigningKey { key_id: self.kid.clone(), key_type: encoded.key_type, encoded: encoded.bytes }
    }

    /// Signs `claims` with the `kid` header set to this pair's identifier.
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_kid(Some(&self.kid), claims)
    }

    /// Signs `claims` with an explicit `kid` header, or none.
    ///
    /// # Panics
    ///
    /// Panics if JWT encoding fails (should not happen with valid inputs).
    pub fn sign_with_kid(&self, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = kid.map(str::to_owned);

        let encoding_key = match self.algorithm {
            Algorithm::RS256 => EncodingKey::from_rsa_pem(&self.pkcs8).expect("Failed to load RSA key"),
            Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_der(&self.pkcs8),
            _ => EncodingKey::from_ed_der(&self.pkcs8),
        };
        jsonwebtoken::encode(&header, claims, &encoding_key).expect("Failed to encode test JWT")
    }
}

impl std::fmt::Debug for TestKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Returns the JWK of an Ed25519 pair.
pub fn ed25519_jwk(pair: &TestKeyPair) -> KeySetEntry {
    pair.jwk()
}

/// Returns the JWK of a P-256 or P-384 pair.
pub fn ec_jwk(pair: &TestKeyPair) -> KeySetEntry {
    pair.jwk()
}

fn ec_entry<B: AsRef<[u8]>>(kid: &str, alg: &str, crv: &str, x: Option<&B>, y: Option<&B>) -> KeySetEntry {
    let coordinate =
        |bytes: Option<&B>| URL_SAFE_NO_PAD.encode(bytes.expect("uncompressed point has both coordinates"));
    KeySetEntry {
        kty: "EC".to_owned(),
        kid: Some(kid.to_owned()),
        alg: Some(alg.to_owned()),
        key_use: Some("sig".to_owned()),
        crv: Some(crv.to_owned()),
        x: Some(coordinate(x)),
        y: Some(coordinate(y)),
        ..KeySetEntry::default()
    }
}

/// ID token claims with `iss`, `aud` and `sub`, issued now and expiring in
/// one hour.
pub fn standard_claims(issuer: &str, audience: &str, subject: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": issuer,
        "aud": audience,
        "sub": subject,
        "iat": now,
        "exp": now + 3600,
    })
}

/// A discovery document advertising `jwks_uri`.
pub fn discovery_document(issuer: &str, jwks_uri: &str) -> Value {
    json!({
        "issuer": issuer,
        "jwks_uri": jwks_uri,
        "id_token_signing_alg_values_supported": ["RS256", "ES256", "ES384", "EdDSA"],
    })
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The resulting JWT has the structure `{header_b64}.{payload_b64}.`
/// with an empty signature. This is useful for testing rejection of
/// malformed or attack JWTs (e.g., `alg: "none"`, algorithm confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &Value, payload_json: &Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

enum Route {
    Body(Vec<u8>),
    Fail(String),
}

/// In-memory [`HttpGetter`] serving canned bodies by URL.
///
/// Unknown URLs fail with a "no route" error. Every request is recorded.
#[derive(Default)]
pub struct MemoryHttpGetter {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

impl MemoryHttpGetter {
    /// Creates a getter with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` at `url`.
    pub fn insert(&self, url: impl Into<String>, body: Vec<u8>) {
        self.routes.lock().insert(url.into(), Route::Body(body));
    }

    /// Serves `value` serialized as JSON at `url`.
    ///
    /// # Panics
    ///
    /// Panics if JSON serialization fails.
    pub fn insert_json(&self, url: impl Into<String>, value: &Value) {
        self.insert(url, serde_json::to_vec(value).expect("route json"));
    }

    /// Fails requests to `url` with `message`.
    pub fn fail(&self, url: impl Into<String>, message: &str) {
        self.routes.lock().insert(url.into(), Route::Fail(message.to_owned()));
    }

    /// Serves a discovery document for `issuer` and a key set at
    /// `{issuer}/keys` containing `pairs`, replacing any previous routes.
    pub fn publish_keys(&self, issuer: &str, pairs: &[&TestKeyPair]) {
        let jwks_uri = format!("{}/keys", issuer.trim_end_matches('/'));
        let keys: Vec<KeySetEntry> = pairs.iter().map(|pair| pair.jwk()).collect();
        self.insert_json(configuration_url(issuer), &discovery_document(issuer, &jwks_uri));
        self.insert_json(jwks_uri, &json!({ "keys": keys }));
    }

    /// Delays every subsequent response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Returns the total number of requests.
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns the number of requests for `url`.
    pub fn calls_for(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|requested| requested.as_str() == url).count()
    }
}

#[async_trait]
impl HttpGetter for MemoryHttpGetter {
    async fn get(&self, url: &str) -> std::result::Result<Vec<u8>, BoxError> {
        self.requests.lock().push(url.to_owned());
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.routes.lock().get(url) {
            Some(Route::Body(body)) => Ok(body.clone()),
            Some(Route::Fail(message)) => Err(Arc::new(std::io::Error::other(message.clone()))),
            None => Err(Arc::new(std::io::Error::other(format!("no route for {url}")))),
        }
    }
}

/// [`SigningKeySetResolver`] returning preconfigured keys or errors per
/// issuer, with call counting and an optional delay.
///
/// Unknown issuers resolve to [`AuthError::EmptyKeySet`].
#[derive(Default)]
pub struct MockKeySetResolver {
    outcomes: Mutex<HashMap<String, Result<Vec<SigningKey>>>>,
    requests: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
    resolve_count: AtomicUsize,
}

impl MockKeySetResolver {
    /// Creates a resolver that knows no issuers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `issuer` to `keys` from now on.
    pub fn set_keys(&self, issuer: &str, keys: Vec<SigningKey>) {
        self.outcomes.lock().insert(issuer.to_owned(), Ok(keys));
    }

    /// Fails resolution of `issuer` with `error` from now on.
    pub fn set_error(&self, issuer: &str, error: AuthError) {
        self.outcomes.lock().insert(issuer.to_owned(), Err(error));
    }

    /// Delays every subsequent resolution by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Returns the total number of resolutions started.
    pub fn calls(&self) -> usize {
        self.resolve_count.load(Ordering::SeqCst)
    }

    /// Returns the number of resolutions started for `issuer`.
    pub fn calls_for(&self, issuer: &str) -> usize {
        self.requests.lock().iter().filter(|requested| requested.as_str() == issuer).count()
    }
}

#[async_trait]
impl SigningKeySetResolver for MockKeySetResolver {
    async fn resolve(&self, issuer: &str) -> Result<Vec<SigningKey>> {
        self.resolve_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(issuer.to_owned());
        let delay = *self.delay.lock();
        let outcome = self
            .outcomes
            .lock()
            .get(issuer)
            .cloned()
            .unwrap_or_else(|| Err(AuthError::empty_key_set(issuer)));

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

/// Asserts that a [`Result<T, AuthError>`] is an `Err` matching the given [`AuthError`] variant.
///
/// Works with any `AuthError` variant. On failure, prints the expected variant
/// and the actual result for debugging.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use openid_authn::assert_auth_error;
/// use openid_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::TokenExpired);
/// assert_auth_error!(result, TokenExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ed25519_pair_produces_valid_material() {
        let pair = TestKeyPair::ed25519("kid-001");
        // PKCS#8 DER for Ed25519 is 48 bytes (16 header + 32 key)
        assert_eq!(pair.pkcs8.len(), 48);
        // Base64url of 32 bytes = 43 characters (no padding)
        assert_eq!(pair.jwk().x.unwrap().len(), 43);
        assert_eq!(pair.jwk().key_id(), "kid-001");
    }

    #[test]
    fn test_p256_pair_has_both_coordinates() {
        let pair = TestKeyPair::p256("ec");
        let jwk = pair.jwk();
        assert_eq!(jwk.crv.as_deref(), Some("P-256"));
        assert_eq!(jwk.x.unwrap().len(), 43);
        assert_eq!(jwk.y.unwrap().len(), 43);
        assert_eq!(pair.algorithm(), Algorithm::ES256);
    }

    #[test]
    fn test_p384_pair_has_full_length_coordinates() {
        let pair = TestKeyPair::p384("ec");
        let jwk = pair.jwk();
        assert_eq!(jwk.crv.as_deref(), Some("P-384"));
        // Base64url of 48 bytes = 64 characters
        assert_eq!(jwk.x.unwrap().len(), 64);
        assert_eq!(jwk.y.unwrap().len(), 64);
        assert_eq!(pair.algorithm(), Algorithm::ES384);
    }

    #[test]
    fn test_rsa_pair_publishes_modulus_and_exponent() {
        let pair = TestKeyPair::rsa("rsa");
        let jwk = pair.jwk();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
        // 2048-bit modulus, 256 bytes, 342 base64url characters
        assert_eq!(jwk.n.unwrap().len(), 342);

        let header = jsonwebtoken::decode_header(&pair.sign(&json!({"sub": "user"}))).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
    }

    #[test]
    fn test_pairs_are_unique() {
        let a = TestKeyPair::ed25519("k");
        let b = TestKeyPair::ed25519("k");
        assert_ne!(a.jwk().x, b.jwk().x, "each call should produce a unique key pair");
    }

    #[test]
    fn test_sign_produces_three_part_token_with_kid() {
        let pair = TestKeyPair::ed25519("kid-001");
        let jwt = pair.sign(&standard_claims("https://idp.example", "client", "user"));
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3, "JWT should have header.payload.signature");
        assert!(!parts[2].is_empty(), "signature should not be empty");

        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.kid.as_deref(), Some("kid-001"));
    }

    #[test]
    fn test_sign_without_kid() {
        let pair = TestKeyPair::p256("kid-001");
        let jwt = pair.sign_with_kid(None, &json!({"sub": "user"}));
        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert!(header.kid.is_none());
        assert_eq!(header.alg, Algorithm::ES256);
    }

    #[test]
    fn test_craft_raw_jwt_format() {
        let header = json!({"alg": "none", "typ": "JWT"});
        let payload = json!({"sub": "test"});
        let jwt = craft_raw_jwt(&header, &payload);
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].is_empty(), "signature should be empty for raw JWTs");
    }

    #[tokio::test]
    async fn test_memory_getter_routes_and_counts() {
        let getter = MemoryHttpGetter::new();
        getter.insert("https://a.example", b"hello".to_vec());
        getter.fail("https://b.example", "connection reset");

        assert_eq!(getter.get("https://a.example").await.unwrap(), b"hello");
        let err = getter.get("https://b.example").await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert!(getter.get("https://c.example").await.is_err());

        assert_eq!(getter.calls(), 3);
        assert_eq!(getter.calls_for("https://a.example"), 1);
    }

    #[tokio::test]
    async fn test_mock_resolver_unknown_issuer() {
        let resolver = MockKeySetResolver::new();
        let result = resolver.resolve("https://unknown.example").await;
        assert_auth_error!(result, EmptyKeySet);
        assert_eq!(resolver.calls_for("https://unknown.example"), 1);
    }

    #[test]
    fn test_assert_auth_error_with_message() {
        let result: Result<()> = Err(AuthError::TokenExpired);
        assert_auth_error!(result, TokenExpired, "token should be expired");
    }
}
