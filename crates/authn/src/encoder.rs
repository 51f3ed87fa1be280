//! Conversion of published key material into verification keys.
//!
//! Every supported key is re-encoded as a PEM `PUBLIC KEY` block
//! (SubjectPublicKeyInfo), which is what the signature verifier consumes.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::Algorithm;
use rsa::BigUint;
use rsa::pkcs8::{EncodePublicKey, LineEnding};

use crate::error::{AuthError, Result};
use crate::jwks::KeySetEntry;

/// Coordinate lengths in bytes per NIST curve.
const P256_COORDINATE_LEN: usize = 32;
const P384_COORDINATE_LEN: usize = 48;
const P521_COORDINATE_LEN: usize = 66;

/// Ed25519 public key length in bytes.
const ED25519_KEY_LEN: usize = 32;

/// Verifier family a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// RSA (`RS*` and `PS*` algorithms).
    Rsa,
    /// ECDSA over P-256 (`ES256`).
    EcP256,
    /// ECDSA over P-384 (`ES384`).
    EcP384,
    /// ECDSA over P-521. Encoded so it can be published alongside other
    /// keys; no accepted algorithm verifies with it.
    EcP521,
    /// Ed25519 (`EdDSA`).
    Ed25519,
}

impl KeyType {
    /// Returns the key family required to verify `alg`, or `None` if no
    /// supported key can verify it.
    #[must_use]
    pub fn for_algorithm(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(Self::Rsa),
            Algorithm::ES256 => Some(Self::EcP256),
            Algorithm::ES384 => Some(Self::EcP384),
            Algorithm::EdDSA => Some(Self::Ed25519),
            _ => None,
        }
    }

    /// Returns the JWK `kty` value for this family.
    #[must_use]
    pub fn kty(self) -> &'static str {
        match self {
            Self::Rsa => "RSA",
            Self::EcP256 | Self::EcP384 | Self::EcP521 => "EC",
            Self::Ed25519 => "OKP",
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa => f.write_str("RSA"),
            Self::EcP256 => f.write_str("EC P-256"),
            Self::EcP384 => f.write_str("EC P-384"),
            Self::EcP521 => f.write_str("EC P-521"),
            Self::Ed25519 => f.write_str("OKP Ed25519"),
        }
    }
}

/// A verification key in canonical encoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedKey {
    /// Verifier family.
    pub key_type: KeyType,
    /// PEM-armoured SubjectPublicKeyInfo.
    pub bytes: Vec<u8>,
}

/// Converts a published key into an [`EncodedKey`].
pub trait KeyEncoder: Send + Sync {
    /// Encodes `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyEncodingFailure`] when the key type is not
    /// supported or its parameters are invalid.
    fn encode(&self, entry: &KeySetEntry) -> Result<EncodedKey>;
}

/// [`KeyEncoder`] producing PEM `PUBLIC KEY` blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PemKeyEncoder;

impl KeyEncoder for PemKeyEncoder {
    fn encode(&self, entry: &KeySetEntry) -> Result<EncodedKey> {
        let kid = entry.key_id();
        let encoded = match entry.kty.as_str() {
            "RSA" => encode_rsa(entry).map(|pem| (KeyType::Rsa, pem)),
            "EC" => encode_ec(entry),
            "OKP" => encode_okp(entry).map(|pem| (KeyType::Ed25519, pem)),
            other => {
                return Err(AuthError::key_encoding_failure(
                    kid,
                    format!("unsupported key type '{other}'"),
                ));
            },
        };
        let (key_type, pem) = encoded.map_err(|message| AuthError::key_encoding_failure(kid, message))?;
        Ok(EncodedKey { key_type, bytes: pem.into_bytes() })
    }
}

type EncodeResult = std::result::Result<String, String>;

fn required<'a>(value: Option<&'a str>, name: &str) -> std::result::Result<&'a str, String> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| format!("missing '{name}' parameter"))
}

fn decode_param(value: Option<&str>, name: &str) -> std::result::Result<Vec<u8>, String> {
    let value = required(value, name)?;
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| format!("invalid base64url in '{name}': {e}"))
}

fn encode_rsa(entry: &KeySetEntry) -> EncodeResult {
    let n = decode_param(entry.n.as_deref(), "n")?;
    let e = decode_param(entry.e.as_deref(), "e")?;
    let key = rsa::RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
        .map_err(|e| format!("invalid RSA key: {e}"))?;
    key.to_public_key_pem(LineEnding::LF).map_err(|e| format!("RSA key could not be serialized: {e}"))
}

/// Left-pads a coordinate that was published without leading zero bytes.
fn pad_coordinate(bytes: &[u8], len: usize, name: &str) -> std::result::Result<Vec<u8>, String> {
    if bytes.is_empty() || bytes.len() > len {
        return Err(format!("'{name}' must be at most {len} bytes, got {}", bytes.len()));
    }
    let mut padded = vec![0u8; len];
    padded[len - bytes.len()..].copy_from_slice(bytes);
    Ok(padded)
}

/// Assembles an uncompressed SEC1 point from the `x` and `y` parameters.
fn sec1_point(entry: &KeySetEntry, coordinate_len: usize) -> std::result::Result<Vec<u8>, String> {
    let x = pad_coordinate(&decode_param(entry.x.as_deref(), "x")?, coordinate_len, "x")?;
    let y = pad_coordinate(&decode_param(entry.y.as_deref(), "y")?, coordinate_len, "y")?;

    let mut sec1 = Vec::with_capacity(1 + 2 * coordinate_len);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);
    Ok(sec1)
}

fn encode_ec(entry: &KeySetEntry) -> std::result::Result<(KeyType, String), String> {
    let crv = required(entry.crv.as_deref(), "crv")?;
    let (key_type, pem) = match crv {
        "P-256" => {
            let sec1 = sec1_point(entry, P256_COORDINATE_LEN)?;
            let key = p256::PublicKey::from_sec1_bytes(&sec1)
                .map_err(|_| "point is not on curve P-256".to_owned())?;
            (KeyType::EcP256, key.to_public_key_pem(LineEnding::LF))
        },
        "P-384" => {
            let sec1 = sec1_point(entry, P384_COORDINATE_LEN)?;
            let key = p384::PublicKey::from_sec1_bytes(&sec1)
                .map_err(|_| "point is not on curve P-384".to_owned())?;
            (KeyType::EcP384, key.to_public_key_pem(LineEnding::LF))
        },
        "P-521" => {
            let sec1 = sec1_point(entry, P521_COORDINATE_LEN)?;
            let key = p521::PublicKey::from_sec1_bytes(&sec1)
                .map_err(|_| "point is not on curve P-521".to_owned())?;
            (KeyType::EcP521, key.to_public_key_pem(LineEnding::LF))
        },
        other => return Err(format!("unsupported curve '{other}'")),
    };
    let pem = pem.map_err(|e| format!("EC key could not be serialized: {e}"))?;
    Ok((key_type, pem))
}

fn encode_okp(entry: &KeySetEntry) -> EncodeResult {
    let crv = required(entry.crv.as_deref(), "crv")?;
    if crv != "Ed25519" {
        return Err(format!("unsupported curve '{crv}'"));
    }
    let x = decode_param(entry.x.as_deref(), "x")?;
    let bytes: [u8; ED25519_KEY_LEN] = x
        .as_slice()
        .try_into()
        .map_err(|_| format!("'x' must be {ED25519_KEY_LEN} bytes, got {}", x.len()))?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
        .map_err(|e| format!("invalid Ed25519 key: {e}"))?;
    key.to_public_key_pem(LineEnding::LF).map_err(|e| format!("Ed25519 key could not be serialized: {e}"))
}
