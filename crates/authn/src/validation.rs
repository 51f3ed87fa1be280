//! JWT algorithm and header validation.
//!
//! This module provides security checks applied to a token header before any
//! key lookup, ensuring only approved asymmetric algorithms are accepted.
//!
//! # Security
//!
//! - Strict algorithm checks to prevent algorithm substitution attacks
//! - Only asymmetric algorithms with a supported key family are allowed
//! - Symmetric algorithms and "none" are always rejected

use crate::error::AuthError;

/// Forbidden JWT algorithms that are never accepted for security reasons.
///
/// These algorithms are blocked because:
/// - `none`: No signature verification (trivially bypassable)
/// - `HS256`, `HS384`, `HS512`: Symmetric algorithms (shared secret vulnerability)
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted JWT algorithms.
///
/// Each entry has a key family the encoder can produce: RSA for `RS*` and
/// `PS*`, P-256 for `ES256`, P-384 for `ES384` and Ed25519 for `EdDSA`.
pub const ACCEPTED_ALGORITHMS: &[&str] =
    &["RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384", "EdDSA"];

/// Maximum accepted length of a `kid` header value.
pub const MAX_KID_LENGTH: usize = 256;

/// Validate JWT algorithm against security policies.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if:
/// - Algorithm is symmetric (HS256, HS384, HS512)
/// - Algorithm is "none"
/// - Algorithm is not in [`ACCEPTED_ALGORITHMS`]
///
/// # Examples
///
/// ```
/// use openid_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("EdDSA").is_ok());
/// assert!(validate_algorithm("HS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.iter().any(|forbidden| forbidden.eq_ignore_ascii_case(alg)) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in accepted list"
        )));
    }

    Ok(())
}

/// Validate a `kid` header value before it reaches the cache or logs.
///
/// An empty `kid` is allowed and selects the provider's first key.
///
/// # Errors
///
/// Returns [`AuthError::TokenMalformed`] if the value is longer than
/// [`MAX_KID_LENGTH`] or contains control characters.
pub fn validate_kid(kid: &str) -> Result<(), AuthError> {
    if kid.len() > MAX_KID_LENGTH {
        return Err(AuthError::token_malformed(format!(
            "kid exceeds {MAX_KID_LENGTH} bytes ({} bytes)",
            kid.len()
        )));
    }
    if kid.chars().any(char::is_control) {
        return Err(AuthError::token_malformed("kid contains control characters"));
    }
    Ok(())
}
