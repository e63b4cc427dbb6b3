//! Signature envelope wire format.
//!
//! An envelope is a detached-payload JWS ("b64": false): the header is
//! base64url-encoded, the payload stays a plain JSON object, and the bytes
//! that get signed are `base64url(header) + "." + canonical_json(payload)`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::canonical::{sort_keys, to_canonical_string};
use crate::digest::DigestMap;
use crate::{ISSUER_SELF, PAYLOAD_VERSION};

/// Errors raised while building or decoding an envelope.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// The `alg` value is not one of the supported schemes.
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A base64url field could not be decoded.
    #[error("Invalid base64url in {field}: {source}")]
    Base64 {
        /// Which envelope field was malformed.
        field: &'static str,
        /// Underlying decode error.
        source: base64::DecodeError,
    },

    /// JSON (de)serialization failed.
    #[error("Invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The header does not describe a detached, unencoded payload.
    #[error("Unsupported header: {0}")]
    Header(String),
}

/// Signature scheme named by the header's `alg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Raw secp256k1 ECDSA over SHA-256 of the signing input.
    ///
    /// Signatures are 64 bytes: `r || s` with the recovery parity folded
    /// into the top bit of `s` (EIP-2098 compact form).
    #[serde(rename = "ES256K")]
    Es256k,
    /// Ethereum personal-message signature (`\x19Ethereum Signed Message:\n`
    /// prefix, Keccak-256). Signatures are 65 bytes: `r || s || v`.
    #[serde(rename = "ETH")]
    Eth,
}

impl Algorithm {
    /// The `alg` header value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Es256k => "ES256K",
            Self::Eth => "ETH",
        }
    }

    /// Exact raw signature length the scheme produces.
    pub fn signature_len(self) -> usize {
        match self {
            Self::Es256k => 64,
            Self::Eth => 65,
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ES256K" => Ok(Self::Es256k),
            "ETH" => Ok(Self::Eth),
            other => Err(EnvelopeError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Protected header: `{"alg": ..., "b64": false, "crit": ["b64"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Signature scheme.
    pub alg: Algorithm,
    /// Always `false`: the payload is not base64url-encoded.
    pub b64: bool,
    /// Always `["b64"]`.
    pub crit: Vec<String>,
}

impl Header {
    /// Header for `alg` with the detached-payload parameters set.
    pub fn new(alg: Algorithm) -> Self {
        Self {
            alg,
            b64: false,
            crit: vec!["b64".to_string()],
        }
    }

    /// `base64url(canonical_json(header))`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be serialized.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        Ok(URL_SAFE_NO_PAD.encode(to_canonical_string(self)?))
    }

    /// Decode a `protected` field.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed base64url or JSON, an unknown `alg`, or
    /// a header that does not declare `b64: false`.
    pub fn decode(protected: &str) -> Result<Self, EnvelopeError> {
        let raw = URL_SAFE_NO_PAD
            .decode(protected)
            .map_err(|source| EnvelopeError::Base64 {
                field: "protected",
                source,
            })?;
        let value: Value = serde_json::from_slice(&raw)?;
        if let Some(alg) = value.get("alg").and_then(Value::as_str) {
            // Surface the unsupported name rather than a generic serde error.
            alg.parse::<Algorithm>()?;
        }
        let header: Self = serde_json::from_value(value)?;
        if header.b64 || !header.crit.iter().any(|c| c == "b64") {
            return Err(EnvelopeError::Header(
                "expected b64=false with crit [\"b64\"]".to_string(),
            ));
        }
        Ok(header)
    }
}

/// Signed claims: who issued it, when it expires, and what it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Payload format version.
    pub version: u32,
    /// Issuer claim, always `"self"`.
    pub iss: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiration, unix seconds.
    pub exp: i64,
    /// Digests of every covered file.
    pub data: DigestMap,
}

impl Payload {
    /// A self-issued payload covering `data`.
    pub fn new(data: DigestMap, iat: i64, exp: i64) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            iss: ISSUER_SELF.to_string(),
            iat,
            exp,
            data,
        }
    }

    /// Whether `now` (unix seconds) is past the expiration.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.exp
    }
}

/// Stored signature: `{"protected", "payload", "signature"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// `base64url(canonical_json(header))`.
    pub protected: String,
    /// Canonical payload object, kept as plain JSON.
    pub payload: Value,
    /// `base64url(raw signature bytes)`.
    pub signature: String,
}

impl Envelope {
    /// Assemble an envelope from its encoded parts.
    pub fn new(protected: String, payload: Value, signature: &[u8]) -> Self {
        Self {
            protected,
            payload: sort_keys(payload),
            signature: URL_SAFE_NO_PAD.encode(signature),
        }
    }

    /// Parse an envelope from the bytes of a signature file.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a JSON envelope.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Pretty JSON for storage inside a package.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_vec_pretty(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decode the protected header.
    ///
    /// # Errors
    ///
    /// See [`Header::decode`].
    pub fn header(&self) -> Result<Header, EnvelopeError> {
        Header::decode(&self.protected)
    }

    /// Decode the payload claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload object does not match [`Payload`].
    pub fn claims(&self) -> Result<Payload, EnvelopeError> {
        Ok(Payload::deserialize(&self.payload)?)
    }

    /// Raw signature bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is not valid base64url.
    pub fn signature_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        URL_SAFE_NO_PAD
            .decode(&self.signature)
            .map_err(|source| EnvelopeError::Base64 {
                field: "signature",
                source,
            })
    }

    /// The exact bytes covered by the signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be re-serialized.
    pub fn signing_input(&self) -> Result<Vec<u8>, EnvelopeError> {
        signing_input(&self.protected, &self.payload)
    }
}

/// `protected + "." + canonical_json(payload)` as ASCII bytes.
///
/// # Errors
///
/// Returns an error if `payload` cannot be serialized.
pub fn signing_input<T: Serialize + ?Sized>(
    protected: &str,
    payload: &T,
) -> Result<Vec<u8>, EnvelopeError> {
    let payload = to_canonical_string(payload)?;
    let mut input = Vec::with_capacity(protected.len() + 1 + payload.len());
    input.extend_from_slice(protected.as_bytes());
    input.push(b'.');
    input.extend_from_slice(payload.as_bytes());
    Ok(input)
}
