//! ID token decoding, claim extraction and signature verification.
//!
//! Claims are decoded into an untyped map first so that absence and a wrong
//! JSON type can be reported as distinct failures. The typed
//! [`Claims`] are then checked against the provider registry in a fixed
//! order: issuer, then audience, then subject.
//!
//! # Example
//!
//! ```no_run
//! use openid_authn::jwt::{decode_claims, decode_header};
//!
//! # fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let header = decode_header(token)?;
//! let claims = decode_claims(token)?;
//!
//! println!("Algorithm: {:?}", header.alg);
//! println!("Issuer: {:?}", claims.get("iss"));
//! # Ok(())
//! # }
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde_json::{Map, Value};

use crate::encoder::KeyType;
use crate::error::{AuthError, Result};
use crate::key_set::SigningKey;
use crate::provider::ProviderRegistry;
use crate::validation::{validate_algorithm, validate_kid};

/// Untyped claim set of a token.
pub type ClaimMap = Map<String, Value>;

/// Allowed clock skew, in seconds, when checking `exp` and `nbf`.
pub const CLOCK_SKEW_LEEWAY_SECS: u64 = 60;

/// The `aud` claim, which may be a single string or an array of strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Audience {
    /// A single audience.
    One(String),
    /// Several audiences; the token is accepted if any of them is.
    Many(Vec<String>),
}

impl Audience {
    /// Iterates over every audience value.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::One(value) => value.is_empty(),
            Self::Many(values) => values.is_empty(),
        }
    }
}

/// The claims every accepted token must carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claims {
    /// The `iss` claim.
    pub issuer: String,
    /// The `aud` claim.
    pub audience: Audience,
    /// The `sub` claim.
    pub subject: String,
}

/// Decode the token header without verification.
///
/// The raw `alg` value is checked against the algorithm policy before the
/// header is parsed, so `none` and HMAC tokens are reported as
/// [`AuthError::UnsupportedAlgorithm`] rather than as malformed. The `kid`
/// value, when present, is checked with [`validate_kid`].
///
/// # Errors
///
/// - [`AuthError::TokenMalformed`] if the header cannot be decoded or lacks `alg`
/// - [`AuthError::UnsupportedAlgorithm`] if `alg` is not accepted
pub fn decode_header(token: &str) -> Result<Header> {
    let alg = raw_header_algorithm(token)?;
    validate_algorithm(&alg)?;

    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| AuthError::token_malformed(format!("Failed to decode JWT header: {e}")))?;
    if let Some(kid) = header.kid.as_deref() {
        validate_kid(kid)?;
    }
    Ok(header)
}

fn decode_segment(segment: &str, name: &str) -> Result<ClaimMap> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::token_malformed(format!("Failed to decode JWT {name}: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::token_malformed(format!("JWT {name} is not a JSON object: {e}")))
}

fn split_token(token: &str) -> Result<[&str; 3]> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok([header, payload, signature]),
        _ => Err(AuthError::token_malformed("JWT must have 3 parts separated by dots")),
    }
}

fn raw_header_algorithm(token: &str) -> Result<String> {
    let [header, _, _] = split_token(token)?;
    match decode_segment(header, "header")?.remove("alg") {
        Some(Value::String(alg)) => Ok(alg),
        Some(_) => Err(AuthError::token_malformed("JWT header 'alg' is not a string")),
        None => Err(AuthError::token_malformed("JWT header missing 'alg' field")),
    }
}

/// Decode the token claims without verification.
///
/// # Errors
///
/// Returns [`AuthError::TokenMalformed`] if the token does not have three
/// parts or the payload is not a base64url-encoded JSON object.
pub fn decode_claims(token: &str) -> Result<ClaimMap> {
    let [_, payload, _] = split_token(token)?;
    decode_segment(payload, "payload")
}

/// Returns the claim, treating JSON `null` as absent.
fn claim<'a>(claims: &'a ClaimMap, name: &str) -> Option<&'a Value> {
    claims.get(name).filter(|value| !value.is_null())
}

/// Extract the `iss` claim.
///
/// # Errors
///
/// - [`AuthError::IssuerTypeInvalid`] if the claim is not a string
/// - [`AuthError::IssuerInvalid`] if it is absent or empty
pub fn issuer_claim(claims: &ClaimMap) -> Result<&str> {
    match claim(claims, "iss") {
        None => Err(AuthError::IssuerInvalid),
        Some(Value::String(issuer)) if issuer.is_empty() => Err(AuthError::IssuerInvalid),
        Some(Value::String(issuer)) => Ok(issuer),
        Some(_) => Err(AuthError::IssuerTypeInvalid),
    }
}

/// Extract the `aud` claim.
///
/// # Errors
///
/// - [`AuthError::AudienceTypeInvalid`] if the claim is neither a string nor an array of strings
/// - [`AuthError::AudienceInvalid`] if it is absent, an empty string or an empty array
pub fn audience_claim(claims: &ClaimMap) -> Result<Audience> {
    let audience = match claim(claims, "aud") {
        None => return Err(AuthError::AudienceInvalid),
        Some(Value::String(value)) => Audience::One(value.clone()),
        Some(Value::Array(values)) => Audience::Many(
            values
                .iter()
                .map(|value| value.as_str().map(str::to_owned).ok_or(AuthError::AudienceTypeInvalid))
                .collect::<Result<_>>()?,
        ),
        Some(_) => return Err(AuthError::AudienceTypeInvalid),
    };
    if audience.is_empty() {
        return Err(AuthError::AudienceInvalid);
    }
    Ok(audience)
}

/// Extract the `sub` claim.
///
/// # Errors
///
/// - [`AuthError::SubjectTypeInvalid`] if the claim is not a string
/// - [`AuthError::SubjectMissing`] if it is absent or empty
pub fn subject_claim(claims: &ClaimMap) -> Result<&str> {
    match claim(claims, "sub") {
        None => Err(AuthError::SubjectMissing),
        Some(Value::String(subject)) if subject.is_empty() => Err(AuthError::SubjectMissing),
        Some(Value::String(subject)) => Ok(subject),
        Some(_) => Err(AuthError::SubjectTypeInvalid),
    }
}

/// Validate the identity claims against the registry.
///
/// Checks run in order and stop at the first failure: issuer type, issuer
/// presence, issuer registration, audience type, audience presence, audience
/// acceptance, subject type, subject presence.
///
/// # Errors
///
/// Returns the claim error of the first failed check, including
/// [`AuthError::IssuerNotRegistered`] and [`AuthError::AudienceNotRegistered`].
pub fn validate_claims(claims: &ClaimMap, registry: &ProviderRegistry) -> Result<Claims> {
    let issuer = issuer_claim(claims)?;
    let provider = registry.find(issuer).ok_or_else(|| AuthError::issuer_not_registered(issuer))?;

    let audience = audience_claim(claims)?;
    if !audience.iter().any(|aud| provider.accepts_audience(aud)) {
        return Err(AuthError::audience_not_registered(issuer));
    }

    let subject = subject_claim(claims)?;

    Ok(Claims { issuer: issuer.to_owned(), audience, subject: subject.to_owned() })
}

/// Verify the token signature with `key` and check `exp`/`nbf` when present.
///
/// # Errors
///
/// - [`AuthError::UnsupportedAlgorithm`] if `algorithm` cannot be verified with the key's family
/// - [`AuthError::KeyEncodingFailure`] if the encoded key is unusable
/// - [`AuthError::SignatureInvalid`] if the signature does not match
/// - [`AuthError::TokenExpired`] / [`AuthError::TokenNotYetValid`] for time-window failures
pub fn verify_signature(token: &str, key: &SigningKey, algorithm: Algorithm) -> Result<ClaimMap> {
    if KeyType::for_algorithm(algorithm) != Some(key.key_type) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{algorithm:?}' cannot be verified with a {} key",
            key.key_type
        )));
    }

    let decoding_key = match key.key_type {
        KeyType::Rsa => DecodingKey::from_rsa_pem(&key.encoded),
        KeyType::EcP256 | KeyType::EcP384 | KeyType::EcP521 => DecodingKey::from_ec_pem(&key.encoded),
        KeyType::Ed25519 => DecodingKey::from_ed_pem(&key.encoded),
    }
    .map_err(|e| AuthError::key_encoding_failure(&key.key_id, e.to_string()))?;

    let mut validation = Validation::new(algorithm);
    validation.validate_aud = false;
    validation.validate_nbf = true;
    validation.required_spec_claims.clear();
    validation.leeway = CLOCK_SKEW_LEEWAY_SECS;

    let token_data = jsonwebtoken::decode::<ClaimMap>(token, &decoding_key, &validation)?;
    Ok(token_data.claims)
}
