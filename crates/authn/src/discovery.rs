//! Provider discovery document resolution.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, Result};
use crate::http::{HttpGetter, JsonDecoder, ResponseDecoder};

/// Path appended to an issuer to locate its discovery document.
pub const WELL_KNOWN_OPENID_CONFIGURATION: &str = "/.well-known/openid-configuration";

/// Issuer value Google places in some tokens without a scheme.
const GOOGLE_BARE_ISSUER: &str = "accounts.google.com";

/// The subset of a discovery document needed to locate signing keys.
///
/// Unknown fields in the document are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfiguration {
    /// Issuer identifier published by the provider.
    pub issuer: String,
    /// Location of the provider's key set.
    pub jwks_uri: Url,
}

/// Returns the discovery document URL for `issuer`.
///
/// A bare `accounts.google.com` issuer is treated as
/// `https://accounts.google.com`, and a trailing `/` is not doubled.
#[must_use]
pub fn configuration_url(issuer: &str) -> String {
    let base = if issuer == GOOGLE_BARE_ISSUER {
        format!("https://{issuer}")
    } else {
        issuer.trim_end_matches('/').to_owned()
    };
    format!("{base}{WELL_KNOWN_OPENID_CONFIGURATION}")
}

/// Fetches and decodes a provider's discovery document.
#[derive(Clone)]
pub struct ConfigurationResolver {
    getter: Arc<dyn HttpGetter>,
    decoder: Arc<dyn ResponseDecoder<ProviderConfiguration>>,
}

impl ConfigurationResolver {
    /// Creates a resolver that decodes documents as JSON.
    #[must_use]
    pub fn new(getter: Arc<dyn HttpGetter>) -> Self {
        Self::with_decoder(getter, Arc::new(JsonDecoder::new()))
    }

    /// Creates a resolver with a custom decoder.
    #[must_use]
    pub fn with_decoder(
        getter: Arc<dyn HttpGetter>,
        decoder: Arc<dyn ResponseDecoder<ProviderConfiguration>>,
    ) -> Self {
        Self { getter, decoder }
    }

    /// Resolves the discovery document for `issuer`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::ConfigurationFetchFailure`] if the document cannot be fetched
    /// - [`AuthError::ConfigurationDecodeFailure`] if it cannot be decoded
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, issuer: &str) -> Result<ProviderConfiguration> {
        let url = configuration_url(issuer);
        let body = self
            .getter
            .get(&url)
            .await
            .map_err(|source| AuthError::configuration_fetch_failure(url.clone(), source))?;
        self.decoder
            .decode(&body)
            .map_err(|source| AuthError::configuration_decode_failure(url, source))
    }
}

impl std::fmt::Debug for ConfigurationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationResolver").finish_non_exhaustive()
    }
}
