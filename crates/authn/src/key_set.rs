//! Issuer to signing key list resolution.
//!
//! [`DiscoveryKeySetResolver`] composes discovery, key set retrieval and key
//! encoding: `issuer` → discovery document → `jwks_uri` → encoded keys.

use std::sync::Arc;

use async_trait::async_trait;

use crate::discovery::ConfigurationResolver;
use crate::encoder::{KeyEncoder, KeyType, PemKeyEncoder};
use crate::error::{AuthError, Result};
use crate::http::HttpGetter;
use crate::jwks::KeySetResolver;

/// A verification key ready for use, as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    /// Key identifier; empty when the provider published none.
    pub key_id: String,
    /// Verifier family.
    pub key_type: KeyType,
    /// PEM-armoured SubjectPublicKeyInfo.
    pub encoded: Vec<u8>,
}

/// Resolves the current signing keys of an issuer.
#[async_trait]
pub trait SigningKeySetResolver: Send + Sync {
    /// Returns the issuer's keys in published order.
    ///
    /// # Errors
    ///
    /// Returns the fetch, decode or encoding failure that stopped resolution,
    /// or [`AuthError::EmptyKeySet`] when the provider published no keys.
    async fn resolve(&self, issuer: &str) -> Result<Vec<SigningKey>>;
}

/// [`SigningKeySetResolver`] backed by OpenID discovery.
pub struct DiscoveryKeySetResolver {
    configuration: ConfigurationResolver,
    key_set: KeySetResolver,
    encoder: Arc<dyn KeyEncoder>,
}

impl DiscoveryKeySetResolver {
    /// Creates a resolver using JSON decoding and PEM key encoding.
    #[must_use]
    pub fn new(getter: Arc<dyn HttpGetter>) -> Self {
        Self::from_parts(
            ConfigurationResolver::new(Arc::clone(&getter)),
            KeySetResolver::new(getter),
            Arc::new(PemKeyEncoder),
        )
    }

    /// Creates a resolver from individually configured stages.
    #[must_use]
    pub fn from_parts(
        configuration: ConfigurationResolver,
        key_set: KeySetResolver,
        encoder: Arc<dyn KeyEncoder>,
    ) -> Self {
        Self { configuration, key_set, encoder }
    }
}

#[async_trait]
impl SigningKeySetResolver for DiscoveryKeySetResolver {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, issuer: &str) -> Result<Vec<SigningKey>> {
        let configuration = self.configuration.resolve(issuer).await?;
        let entries = self.key_set.resolve(&configuration.jwks_uri).await?;
        if entries.is_empty() {
            return Err(AuthError::empty_key_set(issuer));
        }

        entries
            .iter()
            .map(|entry| {
                let encoded = self.encoder.encode(entry)?;
                Ok(SigningKey {
                    key_id: entry.key_id().to_owned(),
                    key_type: encoded.key_type,
                    encoded: encoded.bytes,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for DiscoveryKeySetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryKeySetResolver").finish_non_exhaustive()
    }
}
