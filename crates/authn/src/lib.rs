//! # OpenID Connect Authentication
//!
//! ID token validation for services that accept tokens from one or more
//! OpenID Connect providers.
//!
//! This crate provides:
//! - **Token validation**: header policy, typed claim checks against a provider registry, signature
//!   and time-window verification
//! - **Signing key cache**: per-issuer key lists resolved through OpenID discovery, with
//!   single-flight refresh
//! - **Rotation handling**: a signature mismatch flushes the issuer's keys and retries once
//!
//! ## Features
//!
//! - Only asymmetric algorithms (RSA, ECDSA P-256, EdDSA) are supported
//! - Symmetric algorithms (HS256, etc.) and `none` are explicitly rejected
//! - Claims are validated before any key lookup, so unknown issuers cost no network traffic
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use openid_authn::{AudienceCondition, Provider, ProviderRegistry, TokenValidator};
//! use openid_authn::config::HttpFetchConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let providers = ProviderRegistry::new(vec![Provider::new(
//!     "https://accounts.google.com",
//!     AudienceCondition::list(["my-client-id"]),
//! )?]);
//! let validator = TokenValidator::from_http_config(Arc::new(providers), &HttpFetchConfig::default())?;
//!
//! let identity = validator.validate_bearer(Some("Bearer eyJhbGciOiJSUzI1NiIsImtpZCI6Ii4uLiJ9...")).await?;
//! println!("Authenticated {} from {}", identity.subject, identity.issuer);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// `Authorization` header parsing.
pub mod bearer;
/// HTTP fetch configuration.
pub mod config;
/// OpenID discovery documents.
pub mod discovery;
/// JWK to verification key encoding.
pub mod encoder;
/// Authentication error types.
pub mod error;
/// Network and decoding capabilities.
pub mod http;
/// JSON Web Key Sets.
pub mod jwks;
/// JWT decoding, claims and signature verification.
pub mod jwt;
/// Issuer to signing key resolution.
pub mod key_set;
/// Trusted providers.
pub mod provider;
/// Issuer-keyed signing key cache.
pub mod signing_key_cache;
/// Algorithm and header validation.
pub mod validation;
/// Token validation pipeline.
pub mod validator;

/// Shared test utilities (key pairs, token signing, in-memory fakes).
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export key types for convenience
pub use bearer::extract_bearer_token;
pub use error::{AuthError, Result, Severity};
pub use key_set::{DiscoveryKeySetResolver, SigningKey, SigningKeySetResolver};
pub use provider::{AudienceCondition, DynamicProviders, Provider, ProviderRegistry, ProviderSource};
pub use signing_key_cache::{CacheMetrics, SigningKeyCache};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
pub use validator::{Identity, TokenValidator};
