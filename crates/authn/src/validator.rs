//! ID token validation with retry on signing key rotation.
//!
//! [`TokenValidator`] runs the full pipeline for one token:
//!
//! ```text
//! header (alg, kid) → claims (iss → aud → sub) vs. provider registry
//!   → SigningKeyCache::get_key(iss, kid) → verify signature
//!       → mismatch on first attempt: flush iss, fetch again, verify once more
//! ```
//!
//! Claims are validated before any key lookup, so tokens for unknown issuers
//! or audiences never cause network traffic. A signature mismatch is the only
//! failure that is retried, and only once: the issuer may have rotated its
//! keys since they were cached, and a flush forces the next lookup to fetch
//! the current set.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::bearer::extract_bearer_token;
use crate::config::HttpFetchConfig;
use crate::error::{AuthError, Result};
use crate::http::ReqwestGetter;
use crate::jwt::{ClaimMap, Claims, decode_claims, decode_header, validate_claims, verify_signature};
use crate::key_set::DiscoveryKeySetResolver;
use crate::provider::ProviderSource;
use crate::signing_key_cache::SigningKeyCache;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// The `iss` claim of the accepted token.
    pub issuer: String,
    /// The `sub` claim of the accepted token.
    pub subject: String,
    /// Every claim of the accepted token, including unregistered ones.
    pub claims: ClaimMap,
}

impl Identity {
    /// Returns the claim `name`, if present.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

/// Position in the verification state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    FirstAttempt,
    RetryAfterFlush,
}

/// Validates ID tokens against a provider source and a shared key cache.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct TokenValidator {
    providers: Arc<dyn ProviderSource>,
    cache: Arc<SigningKeyCache>,
}

impl TokenValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new(providers: Arc<dyn ProviderSource>, cache: Arc<SigningKeyCache>) -> Self {
        Self { providers, cache }
    }

    /// Creates a validator that resolves keys over HTTP using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if `config` is invalid or the
    /// HTTP client cannot be built.
    pub fn from_http_config(providers: Arc<dyn ProviderSource>, config: &HttpFetchConfig) -> Result<Self> {
        let getter = Arc::new(ReqwestGetter::new(config)?);
        let cache = SigningKeyCache::new(Arc::new(DiscoveryKeySetResolver::new(getter)));
        Ok(Self::new(providers, Arc::new(cache)))
    }

    /// Returns the shared signing key cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<SigningKeyCache> {
        &self.cache
    }

    /// Validates `token` and returns the caller's identity.
    ///
    /// # Errors
    ///
    /// See [`validate_with_cancel`](Self::validate_with_cancel).
    pub async fn validate(&self, token: &str) -> Result<Identity> {
        self.validate_with_cancel(token, &CancellationToken::new()).await
    }

    /// Extracts the bearer token from an `Authorization` header value and
    /// validates it.
    ///
    /// # Errors
    ///
    /// Returns the header errors of [`extract_bearer_token`], then those of
    /// [`validate`](Self::validate).
    pub async fn validate_bearer(&self, authorization: Option<&str>) -> Result<Identity> {
        let token = extract_bearer_token(authorization)?;
        self.validate(token).await
    }

    /// Validates `token`, abandoning key resolution if `cancel` fires.
    ///
    /// Cancelling only stops this caller from waiting. A resolution shared
    /// with other validations keeps running for them.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenEmpty`] for an empty token
    /// - [`AuthError::TokenMalformed`] / [`AuthError::UnsupportedAlgorithm`] for header problems
    /// - setup errors from the provider source or registry
    /// - claim errors, in issuer → audience → subject order
    /// - key resolution errors from the cache, unmodified
    /// - [`AuthError::FetchCancelled`] if `cancel` fires while waiting for keys
    /// - [`AuthError::SignatureInvalid`] if the signature fails to verify after a refresh
    /// - [`AuthError::TokenExpired`] / [`AuthError::TokenNotYetValid`]
    #[tracing::instrument(skip_all)]
    pub async fn validate_with_cancel(&self, token: &str, cancel: &CancellationToken) -> Result<Identity> {
        if token.is_empty() {
            return Err(AuthError::TokenEmpty);
        }

        let header = decode_header(token)?;
        let claim_map = decode_claims(token)?;

        let registry = self.providers.providers()?;
        registry.validate()?;
        let Claims { issuer, subject, .. } = validate_claims(&claim_map, &registry)?;
        let kid = header.kid.unwrap_or_default();

        let mut attempt = Attempt::FirstAttempt;
        loop {
            let key = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(%issuer, "validation cancelled while resolving signing keys");
                    return Err(AuthError::fetch_cancelled(&issuer));
                },
                key = self.cache.get_key(&issuer, &kid) => key?,
            };

            match verify_signature(token, &key, header.alg) {
                Ok(claims) => {
                    tracing::debug!(%issuer, %kid, ?attempt, "token verified");
                    return Ok(Identity { issuer, subject, claims });
                },
                Err(AuthError::SignatureInvalid) if attempt == Attempt::FirstAttempt => {
                    tracing::warn!(
                        %issuer,
                        %kid,
                        "signature mismatch with cached key, refreshing signing keys"
                    );
                    self.cache.flush(&issuer);
                    attempt = Attempt::RetryAfterFlush;
                },
                Err(err) => return Err(err),
            }
        }
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator").field("cache", &self.cache).finish_non_exhaustive()
    }
}
