//! Provider key set (JWKS) resolution.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, Result};
use crate::http::{HttpGetter, JsonDecoder, ResponseDecoder};

/// A published JSON Web Key Set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    /// Keys in published order.
    #[serde(default)]
    pub keys: Vec<KeySetEntry>,
}

/// One JSON Web Key.
///
/// Only public parameters are modelled. An absent or empty `kid` marks the
/// provider's default key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySetEntry {
    /// Key type (`RSA`, `EC` or `OKP`).
    pub kty: String,
    /// Key identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Intended algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Intended use (`sig` or `enc`).
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA public exponent (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// Curve name for `EC` and `OKP` keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// X coordinate (`EC`) or public key (`OKP`), base64url.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// Y coordinate (`EC`), base64url.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl KeySetEntry {
    /// Returns the key identifier, or `""` when none was published.
    #[must_use]
    pub fn key_id(&self) -> &str {
        self.kid.as_deref().unwrap_or_default()
    }
}

/// Fetches and decodes key sets.
#[derive(Clone)]
pub struct KeySetResolver {
    getter: Arc<dyn HttpGetter>,
    decoder: Arc<dyn ResponseDecoder<KeySet>>,
}

impl KeySetResolver {
    /// Creates a resolver that decodes key sets as JSON.
    #[must_use]
    pub fn new(getter: Arc<dyn HttpGetter>) -> Self {
        Self::with_decoder(getter, Arc::new(JsonDecoder::new()))
    }

    /// Creates a resolver with a custom decoder.
    #[must_use]
    pub fn with_decoder(getter: Arc<dyn HttpGetter>, decoder: Arc<dyn ResponseDecoder<KeySet>>) -> Self {
        Self { getter, decoder }
    }

    /// Resolves the key set published at `jwks_uri`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::KeySetFetchFailure`] if the key set cannot be fetched
    /// - [`AuthError::KeySetDecodeFailure`] if it cannot be decoded
    #[tracing::instrument(skip(self, jwks_uri), fields(jwks_uri = %jwks_uri))]
    pub async fn resolve(&self, jwks_uri: &Url) -> Result<Vec<KeySetEntry>> {
        let url = jwks_uri.as_str();
        let body = self
            .getter
            .get(url)
            .await
            .map_err(|source| AuthError::key_set_fetch_failure(url, source))?;
        let key_set =
            self.decoder.decode(&body).map_err(|source| AuthError::key_set_decode_failure(url, source))?;
        tracing::debug!(keys = key_set.keys.len(), "Decoded key set");
        Ok(key_set.keys)
    }
}

impl std::fmt::Debug for KeySetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetResolver").finish_non_exhaustive()
    }
}
