#![forbid(unsafe_code)]

//! Compact signed tokens: `b64(alg).b64(payload).b64(signature)`.
//!
//! The signature is `HMAC(key, b64(alg) + "." + b64(payload) + ".")`, taken
//! over the encoded text exactly as it appears in the token. The payload is
//! JSON and is only signed, not encrypted; anything secret must be sealed
//! before it is placed in the claims.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use ring::hmac;
use serde::{Serialize, de::DeserializeOwned};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors from issuing or verifying a token.
#[derive(Error, Debug)]
pub enum TokenError {
    /// The token does not have the `alg.payload.signature` shape, or a
    /// segment is not valid base64.
    #[error("Malformed token: {reason}")]
    Malformed { reason: String },

    /// The algorithm segment names an algorithm this codec does not use.
    #[error("Unsupported token algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    /// The signature does not match the signed text.
    ///
    /// **[INTEGRITY VIOLATION]** The token was altered or signed with a
    /// different key.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// A codec cannot be built from an empty signing key.
    #[error("Empty signing key")]
    EmptyKey,

    /// The claims could not be serialized, or an authentic payload does not
    /// deserialize into the requested type.
    #[error("Token payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

fn malformed(reason: impl Into<String>) -> TokenError {
    TokenError::Malformed {
        reason: reason.into(),
    }
}

/// Signature algorithms a token may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// HMAC-SHA256.
    #[default]
    Sha256,
}

impl Algorithm {
    /// The tag written into the first token segment.
    pub fn tag(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "sha256" => Some(Algorithm::Sha256),
            _ => None,
        }
    }

    fn hmac_algorithm(self) -> hmac::Algorithm {
        match self {
            Algorithm::Sha256 => hmac::HMAC_SHA256,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The three raw segments of a token.
struct Segments<'a> {
    alg: &'a str,
    payload: &'a str,
    signature: &'a str,
}

impl<'a> Segments<'a> {
    fn split(token: &'a str) -> Result<Self, TokenError> {
        let mut parts = token.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(alg), Some(payload), Some(signature), None) => Ok(Self {
                alg,
                payload,
                signature,
            }),
            _ => Err(malformed(format!(
                "expected 3 dot-separated parts, found {}",
                token.split('.').count()
            ))),
        }
    }

    fn payload_json(&self) -> Result<Vec<u8>, TokenError> {
        STANDARD
            .decode(self.payload)
            .map_err(|e| malformed(format!("payload is not valid base64: {e}")))
    }
}

/// Issues and verifies tokens under one signing key.
///
/// The codec holds no state besides its key; issuing and verifying are pure
/// functions of the key and the input. The key never appears in `Debug`.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    key: hmac::Key,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// A codec signing with HMAC-SHA256 under `key`.
    pub fn new(key: &[u8]) -> Result<Self, TokenError> {
        Self::with_algorithm(Algorithm::default(), key)
    }

    pub fn with_algorithm(algorithm: Algorithm, key: &[u8]) -> Result<Self, TokenError> {
        if key.is_empty() {
            return Err(TokenError::EmptyKey);
        }
        Ok(Self {
            algorithm,
            key: hmac::Key::new(algorithm.hmac_algorithm(), key),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn sign(&self, alg: &str, payload: &str) -> hmac::Tag {
        let mut ctx = hmac::Context::with_key(&self.key);
        ctx.update(alg.as_bytes());
        ctx.update(b".");
        ctx.update(payload.as_bytes());
        ctx.update(b".");
        ctx.sign()
    }

    /// Serialize `claims` to JSON and sign them.
    pub fn issue<T: Serialize + ?Sized>(&self, claims: &T) -> Result<String, TokenError> {
        let payload = serde_json::to_vec(claims)?;
        let alg = STANDARD.encode(self.algorithm.tag());
        let payload = STANDARD.encode(payload);
        let signature = STANDARD.encode(self.sign(&alg, &payload));

        trace!(len = alg.len() + payload.len() + signature.len() + 2, "issued token");
        Ok(format!("{alg}.{payload}.{signature}"))
    }

    /// Check the token's signature and return its claims.
    ///
    /// The signature is verified, in constant time, before the payload is
    /// decoded, so any change to the payload segment is reported as
    /// `InvalidSignature`.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let segments = Segments::split(token)?;

        let alg = STANDARD
            .decode(segments.alg)
            .map_err(|e| malformed(format!("algorithm is not valid base64: {e}")))?;
        let alg = String::from_utf8_lossy(&alg);
        if Algorithm::from_tag(&alg) != Some(self.algorithm) {
            return Err(TokenError::UnsupportedAlgorithm(alg.into_owned()));
        }

        let signature = STANDARD
            .decode(segments.signature)
            .map_err(|_| TokenError::InvalidSignature)?;
        let expected = self.sign(segments.alg, segments.payload);
        if !bool::from(expected.as_ref().ct_eq(signature.as_slice())) {
            debug!("token signature mismatch");
            return Err(TokenError::InvalidSignature);
        }

        Ok(serde_json::from_slice(&segments.payload_json()?)?)
    }

    /// Decode the payload without checking the signature.
    ///
    /// For inspecting tokens while debugging. The result must not be
    /// trusted.
    pub fn decode_unverified(token: &str) -> Result<serde_json::Value, TokenError> {
        let segments = Segments::split(token.trim_end())?;
        Ok(serde_json::from_slice(&segments.payload_json()?)?)
    }
}
