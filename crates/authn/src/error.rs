//! Authentication error types.
//!
//! Every failure that can leave the validation core is one [`AuthError`]
//! variant. Variants fall into two families:
//!
//! - **Setup errors** describe a misconfigured provider registry or HTTP client and are detected
//!   before a token is looked at ([`AuthError::is_setup_error`]).
//! - **Validation errors** are produced per request.
//!
//! Each variant carries a default [`Severity`] that an HTTP layer can turn
//! into a status code via [`AuthError::http_status`].
//!
//! `AuthError` is `Clone` so that a single failed key-set resolution can be
//! handed to every request waiting on it. Underlying causes are therefore
//! held behind an [`Arc`] ([`BoxError`]).

use std::sync::Arc;

use thiserror::Error;

/// A shared error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Default HTTP severity attached to an [`AuthError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The request itself is malformed (HTTP 400).
    BadRequest,
    /// The caller could not be authenticated (HTTP 401).
    Unauthorized,
    /// The server failed while authenticating (HTTP 500).
    Internal,
}

impl Severity {
    /// Returns the HTTP status code for this severity.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Internal => 500,
        }
    }
}

/// Authentication errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`; new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    // ========== Setup errors ==========
    /// No providers were registered.
    #[error("The collection of providers must contain at least one element")]
    EmptyProviderCollection,

    /// A provider was registered with an invalid issuer.
    #[error("Invalid provider issuer: {message}")]
    InvalidIssuer {
        /// Why the issuer was rejected.
        message: String,
    },

    /// The dynamic provider source failed to produce a registry.
    #[error("Provider source failed: {source}")]
    ProviderSourceFailed {
        /// The error reported by the provider source.
        #[source]
        source: BoxError,
    },

    /// Invalid HTTP fetch configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration problem.
        message: String,
    },

    // ========== Authorization header ==========
    /// The `Authorization` header was absent or empty.
    #[error("The 'Authorization' header was not found or was empty")]
    AuthHeaderMissing,

    /// The `Authorization` header was not `<scheme> <token>`.
    #[error("The 'Authorization' header did not have the correct format")]
    AuthHeaderMalformed,

    /// The `Authorization` header scheme was not `Bearer`.
    #[error("The 'Authorization' header scheme was '{scheme}', expected 'Bearer'")]
    AuthSchemeWrong {
        /// The scheme that was presented.
        scheme: String,
    },

    // ========== Key resolution ==========
    /// The discovery document could not be fetched.
    #[error("Failure while contacting the configuration endpoint {url}: {source}")]
    ConfigurationFetchFailure {
        /// Discovery document URL.
        url: String,
        /// The underlying transport error.
        #[source]
        source: BoxError,
    },

    /// The discovery document could not be decoded.
    #[error("Failure while decoding the configuration retrieved from {url}: {source}")]
    ConfigurationDecodeFailure {
        /// Discovery document URL.
        url: String,
        /// The underlying decode error.
        #[source]
        source: BoxError,
    },

    /// The key set could not be fetched.
    #[error("Failure while contacting the key set endpoint {url}: {source}")]
    KeySetFetchFailure {
        /// Key set URL.
        url: String,
        /// The underlying transport error.
        #[source]
        source: BoxError,
    },

    /// The key set could not be decoded.
    #[error("Failure while decoding the key set retrieved from {url}: {source}")]
    KeySetDecodeFailure {
        /// Key set URL.
        url: String,
        /// The underlying decode error.
        #[source]
        source: BoxError,
    },

    /// The caller cancelled the request while keys were being fetched.
    #[error("Key fetch for issuer {issuer} was cancelled")]
    FetchCancelled {
        /// Issuer whose keys were being fetched.
        issuer: String,
    },

    /// The provider published an empty key set.
    #[error("The key set retrieved for issuer {issuer} does not contain any key")]
    EmptyKeySet {
        /// Issuer that published no keys.
        issuer: String,
    },

    /// No key with the requested identifier exists, even after a refresh.
    #[error("The key set retrieved for issuer {issuer} does not contain key identifier '{kid}'")]
    KeyIdentifierNotFound {
        /// Issuer that was searched.
        issuer: String,
        /// Key identifier from the token header.
        kid: String,
    },

    /// A published key could not be converted to a verification key.
    #[error("The key '{kid}' could not be encoded: {message}")]
    KeyEncodingFailure {
        /// Identifier of the key that failed.
        kid: String,
        /// Description of the failure.
        message: String,
    },

    // ========== Claims ==========
    /// The `iss` claim is not a string.
    #[error("The token 'iss' claim is not a string")]
    IssuerTypeInvalid,

    /// The `iss` claim is missing or empty.
    #[error("The token 'iss' claim is missing or empty")]
    IssuerInvalid,

    /// The `iss` claim does not name a registered provider.
    #[error("The token issuer {issuer} is not registered")]
    IssuerNotRegistered {
        /// Issuer from the token.
        issuer: String,
    },

    /// The `aud` claim is neither a string nor an array of strings.
    #[error("The token 'aud' claim is not a string or an array of strings")]
    AudienceTypeInvalid,

    /// The `aud` claim is missing or empty.
    #[error("The token 'aud' claim is missing or empty")]
    AudienceInvalid,

    /// None of the token audiences is accepted by the issuer's provider.
    #[error("The token audience is not registered for issuer {issuer}")]
    AudienceNotRegistered {
        /// Issuer whose provider rejected the audience.
        issuer: String,
    },

    /// The `sub` claim is not a string.
    #[error("The token 'sub' claim is not a string")]
    SubjectTypeInvalid,

    /// The `sub` claim is missing or empty.
    #[error("The token 'sub' claim is missing or empty")]
    SubjectMissing,

    // ========== Token verification ==========
    /// Signature verification failed.
    #[error("Invalid signature")]
    SignatureInvalid,

    /// Token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Token not yet valid (nbf claim in future).
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// Malformed token - cannot be decoded.
    #[error("Invalid token format: {message}")]
    TokenMalformed {
        /// Description of the format error.
        message: String,
    },

    /// Algorithm not in the accepted list.
    #[error("Unsupported algorithm: {message}")]
    UnsupportedAlgorithm {
        /// Description of the rejection.
        message: String,
    },

    /// The presented token was empty.
    #[error("The ID token was empty")]
    TokenEmpty,

    /// Verification failed for a reason the verifier did not classify.
    #[error("Token validation failed: {message}")]
    TokenValidationFailed {
        /// Description reported by the verifier.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidIssuer` setup error.
    #[must_use]
    pub fn invalid_issuer(message: impl Into<String>) -> Self {
        Self::InvalidIssuer { message: message.into() }
    }

    /// Creates a new `ProviderSourceFailed` error.
    #[must_use]
    pub fn provider_source_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::ProviderSourceFailed { source: Arc::new(source) }
    }

    /// Creates a new `InvalidConfig` error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Creates a new `AuthSchemeWrong` error.
    #[must_use]
    pub fn auth_scheme_wrong(scheme: impl Into<String>) -> Self {
        Self::AuthSchemeWrong { scheme: scheme.into() }
    }

    /// Creates a new `ConfigurationFetchFailure` error.
    #[must_use]
    pub fn configuration_fetch_failure(url: impl Into<String>, source: BoxError) -> Self {
        Self::ConfigurationFetchFailure { url: url.into(), source }
    }

    /// Creates a new `ConfigurationDecodeFailure` error.
    #[must_use]
    pub fn configuration_decode_failure(url: impl Into<String>, source: BoxError) -> Self {
        Self::ConfigurationDecodeFailure { url: url.into(), source }
    }

    /// Creates a new `KeySetFetchFailure` error.
    #[must_use]
    pub fn key_set_fetch_failure(url: impl Into<String>, source: BoxError) -> Self {
        Self::KeySetFetchFailure { url: url.into(), source }
    }

    /// Creates a new `KeySetDecodeFailure` error.
    #[must_use]
    pub fn key_set_decode_failure(url: impl Into<String>, source: BoxError) -> Self {
        Self::KeySetDecodeFailure { url: url.into(), source }
    }

    /// Creates a new `FetchCancelled` error.
    #[must_use]
    pub fn fetch_cancelled(issuer: impl Into<String>) -> Self {
        Self::FetchCancelled { issuer: issuer.into() }
    }

    /// Creates a new `EmptyKeySet` error.
    #[must_use]
    pub fn empty_key_set(issuer: impl Into<String>) -> Self {
        Self::EmptyKeySet { issuer: issuer.into() }
    }

    /// Creates a new `KeyIdentifierNotFound` error.
    #[must_use]
    pub fn key_identifier_not_found(issuer: impl Into<String>, kid: impl Into<String>) -> Self {
        Self::KeyIdentifierNotFound { issuer: issuer.into(), kid: kid.into() }
    }

    /// Creates a new `KeyEncodingFailure` error.
    #[must_use]
    pub fn key_encoding_failure(kid: impl Into<String>, message: impl Into<String>) -> Self {
        Self::KeyEncodingFailure { kid: kid.into(), message: message.into() }
    }

    /// Creates a new `IssuerNotRegistered` error.
    #[must_use]
    pub fn issuer_not_registered(issuer: impl Into<String>) -> Self {
        Self::IssuerNotRegistered { issuer: issuer.into() }
    }

    /// Creates a new `AudienceNotRegistered` error.
    #[must_use]
    pub fn audience_not_registered(issuer: impl Into<String>) -> Self {
        Self::AudienceNotRegistered { issuer: issuer.into() }
    }

    /// Creates a new `TokenMalformed` error.
    #[must_use]
    pub fn token_malformed(message: impl Into<String>) -> Self {
        Self::TokenMalformed { message: message.into() }
    }

    /// Creates a new `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm { message: message.into() }
    }

    /// Creates a new `TokenValidationFailed` error.
    #[must_use]
    pub fn token_validation_failed(message: impl Into<String>) -> Self {
        Self::TokenValidationFailed { message: message.into() }
    }

    /// Returns the default severity of this error.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::AuthHeaderMissing
            | Self::AuthHeaderMalformed
            | Self::AuthSchemeWrong { .. }
            | Self::TokenMalformed { .. } => Severity::BadRequest,
            Self::KeyEncodingFailure { .. }
            | Self::TokenValidationFailed { .. }
            | Self::EmptyProviderCollection
            | Self::InvalidIssuer { .. }
            | Self::ProviderSourceFailed { .. }
            | Self::InvalidConfig { .. } => Severity::Internal,
            _ => Severity::Unauthorized,
        }
    }

    /// Returns the default HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.severity().http_status()
    }

    /// Returns `true` for errors detected while checking configuration rather
    /// than while validating a token.
    #[must_use]
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyProviderCollection
                | Self::InvalidIssuer { .. }
                | Self::ProviderSourceFailed { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// Returns `true` when keys could not be fetched from the provider.
    #[must_use]
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationFetchFailure { .. }
                | Self::KeySetFetchFailure { .. }
                | Self::FetchCancelled { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::MissingAlgorithm
            | ErrorKind::InvalidAlgorithmName => {
                AuthError::token_malformed(format!("JWT error: {err}"))
            },
            ErrorKind::InvalidAlgorithm => {
                AuthError::unsupported_algorithm("Algorithm not supported")
            },
            _ => AuthError::token_validation_failed(err.to_string()),
        }
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::*;

    fn io_source(message: &str) -> BoxError {
        Arc::new(io::Error::new(io::ErrorKind::ConnectionRefused, message.to_owned()))
    }

    #[test]
    fn test_error_display() {
        let err = AuthError::token_malformed("test");
        assert_eq!(err.to_string(), "Invalid token format: test");

        let err = AuthError::TokenExpired;
        assert_eq!(err.to_string(), "Token expired");

        let err = AuthError::key_identifier_not_found("https://idp.example", "k9");
        assert_eq!(
            err.to_string(),
            "The key set retrieved for issuer https://idp.example does not contain key identifier 'k9'"
        );
    }

    #[rstest]
    #[case::header_missing(AuthError::AuthHeaderMissing, 400)]
    #[case::header_malformed(AuthError::AuthHeaderMalformed, 400)]
    #[case::scheme_wrong(AuthError::auth_scheme_wrong("Basic"), 400)]
    #[case::malformed(AuthError::token_malformed("bad"), 400)]
    #[case::empty_key_set(AuthError::empty_key_set("iss"), 401)]
    #[case::kid_not_found(AuthError::key_identifier_not_found("iss", "kid"), 401)]
    #[case::issuer_type(AuthError::IssuerTypeInvalid, 401)]
    #[case::issuer_not_registered(AuthError::issuer_not_registered("iss"), 401)]
    #[case::audience(AuthError::AudienceInvalid, 401)]
    #[case::subject(AuthError::SubjectMissing, 401)]
    #[case::signature(AuthError::SignatureInvalid, 401)]
    #[case::token_empty(AuthError::TokenEmpty, 401)]
    #[case::cancelled(AuthError::fetch_cancelled("iss"), 401)]
    #[case::encoding(AuthError::key_encoding_failure("kid", "bad curve"), 500)]
    #[case::unknown(AuthError::token_validation_failed("?"), 500)]
    fn test_http_status(#[case] err: AuthError, #[case] status: u16) {
        assert_eq!(err.http_status(), status);
    }

    #[test]
    fn test_fetch_failures_are_unauthorized() {
        let errors = [
            AuthError::configuration_fetch_failure("u", io_source("down")),
            AuthError::configuration_decode_failure("u", io_source("junk")),
            AuthError::key_set_fetch_failure("u", io_source("down")),
            AuthError::key_set_decode_failure("u", io_source("junk")),
        ];
        for err in errors {
            assert_eq!(err.severity(), Severity::Unauthorized, "{err}");
        }
    }

    #[test]
    fn test_setup_errors() {
        assert!(AuthError::EmptyProviderCollection.is_setup_error());
        assert!(AuthError::invalid_issuer("empty").is_setup_error());
        assert!(AuthError::invalid_config("zero timeout").is_setup_error());
        assert!(!AuthError::IssuerInvalid.is_setup_error());
        assert!(!AuthError::SignatureInvalid.is_setup_error());
    }

    #[test]
    fn test_fetch_failure_family() {
        assert!(AuthError::fetch_cancelled("iss").is_fetch_failure());
        assert!(AuthError::key_set_fetch_failure("u", io_source("x")).is_fetch_failure());
        assert!(!AuthError::key_set_decode_failure("u", io_source("x")).is_fetch_failure());
    }

    #[test]
    fn test_fetch_failure_preserves_source_chain() {
        use std::error::Error;

        let err = AuthError::configuration_fetch_failure(
            "https://idp.example/.well-known/openid-configuration",
            io_source("connection refused"),
        );

        let source = err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "connection refused");
    }

    #[test]
    fn test_clone_shares_source() {
        let err = AuthError::key_set_fetch_failure("u", io_source("timeout"));
        let cloned = err.clone();
        match (err, cloned) {
            (
                AuthError::KeySetFetchFailure { source: a, .. },
                AuthError::KeySetFetchFailure { source: b, .. },
            ) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("unexpected variants: {other:?}"),
        }
    }

    #[rstest]
    #[case::signature(jsonwebtoken::errors::ErrorKind::InvalidSignature, "SignatureInvalid")]
    #[case::expired(jsonwebtoken::errors::ErrorKind::ExpiredSignature, "TokenExpired")]
    #[case::immature(jsonwebtoken::errors::ErrorKind::ImmatureSignature, "TokenNotYetValid")]
    #[case::invalid_token(jsonwebtoken::errors::ErrorKind::InvalidToken, "TokenMalformed")]
    #[case::algorithm(jsonwebtoken::errors::ErrorKind::InvalidAlgorithm, "UnsupportedAlgorithm")]
    #[case::key_format(jsonwebtoken::errors::ErrorKind::InvalidKeyFormat, "TokenValidationFailed")]
    fn test_error_from_jsonwebtoken(
        #[case] kind: jsonwebtoken::errors::ErrorKind,
        #[case] expected_variant: &str,
    ) {
        let auth_err: AuthError = jsonwebtoken::errors::Error::from(kind).into();
        let debug = format!("{auth_err:?}");
        assert!(debug.starts_with(expected_variant), "expected {expected_variant}, got {debug}");
    }
}
