//! Signers
//!
//! A [`Signer`] produces raw secp256k1 signatures for one account. There are
//! two non-interchangeable schemes:
//!
//! - `ES256K`: ECDSA over `sha256(input)`, 64-byte compact signature with
//!   the recovery parity folded into `s` (EIP-2098).
//! - `ETH`: personal-message signature over
//!   `keccak256("\x19Ethereum Signed Message:\n" + len + input)`, 65 bytes
//!   `r || s || v`.
//!
//! Recovery of the signing address from either form lives here as well so
//! that verification does not need a signer instance.

mod key;
mod rpc;

use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use thiserror::Error;

use ethpkg_schema::{Address, Algorithm};

pub use key::PrivateKeySigner;
pub use rpc::RpcSigner;

/// Prefix of an Ethereum personal message, before the decimal length.
pub const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// JSON-RPC error code wallets use for "user rejected the request".
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Signing request was rejected by the user")]
    Rejected,

    #[error("Signer '{signer}' does not support {alg}")]
    Unsupported { signer: String, alg: Algorithm },

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    Crypto(String),

    #[error("Signer request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Signer returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid signer response: {0}")]
    InvalidResponse(String),
}

/// A signing capability bound to one address.
///
/// Both schemes are required methods; a signer that cannot produce one of
/// them reports it through [`Signer::supports`] and returns
/// [`SignerError::Unsupported`] from the method.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Registry key, e.g. `"privatekey"` or `"rpc"`.
    fn name(&self) -> &str;

    /// Address whose key produces the signatures.
    fn address(&self) -> Address;

    /// Whether this signer can produce signatures for `alg`.
    fn supports(&self, _alg: Algorithm) -> bool {
        true
    }

    /// Raw ECDSA signature over `sha256(data)` in 64-byte compact form.
    async fn ec_sign(&self, data: &[u8]) -> Result<Vec<u8>, SignerError>;

    /// Personal-message signature over `data`, 65 bytes `r || s || v`.
    async fn eth_sign(&self, data: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// `keccak256("\x19Ethereum Signed Message:\n" + len(data) + data)`.
pub fn personal_message_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX.as_bytes());
    hasher.update(data.len().to_string().as_bytes());
    hasher.update(data);
    hasher.finalize().into()
}

/// The prehash each scheme signs.
pub fn message_hash(alg: Algorithm, data: &[u8]) -> [u8; 32] {
    match alg {
        Algorithm::Es256k => Sha256::digest(data).into(),
        Algorithm::Eth => personal_message_hash(data),
    }
}

/// Address of a public key: last 20 bytes of `keccak256(x || y)`.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash: [u8; 32] = Keccak256::digest(&point.as_bytes()[1..]).into();
    Address::from_key_hash(&hash)
}

/// Recover the address that produced `signature` over `data` under `alg`.
pub fn recover_address(alg: Algorithm, data: &[u8], signature: &[u8]) -> Result<Address, SignerError> {
    if signature.len() != alg.signature_len() {
        return Err(SignerError::Crypto(format!(
            "{alg} signature must be {} bytes, got {}",
            alg.signature_len(),
            signature.len()
        )));
    }

    let (signature, recovery_id) = match alg {
        Algorithm::Es256k => decode_compact(signature)?,
        Algorithm::Eth => decode_rsv(signature)?,
    };

    let prehash = message_hash(alg, data);
    let key = VerifyingKey::recover_from_prehash(&prehash, &signature, recovery_id)
        .map_err(|e| SignerError::Crypto(format!("public key recovery failed: {e}")))?;
    Ok(address_of(&key))
}

/// `r || s` with the y-parity in the top bit of `s`.
pub(crate) fn encode_compact(signature: &Signature, recovery_id: RecoveryId) -> Vec<u8> {
    let mut out = signature.to_bytes().to_vec();
    if recovery_id.is_y_odd() {
        out[32] |= 0x80;
    }
    out
}

/// `r || s || v` with `v` in `{27, 28}`.
pub(crate) fn encode_rsv(signature: &Signature, recovery_id: RecoveryId) -> Vec<u8> {
    let mut out = signature.to_bytes().to_vec();
    out.push(27 + u8::from(recovery_id.is_y_odd()));
    out
}

fn decode_compact(bytes: &[u8]) -> Result<(Signature, RecoveryId), SignerError> {
    let mut raw = [0u8; 64];
    raw.copy_from_slice(bytes);
    let y_odd = raw[32] & 0x80 != 0;
    raw[32] &= 0x7f;
    let signature = Signature::from_slice(&raw)
        .map_err(|e| SignerError::Crypto(format!("malformed signature: {e}")))?;
    Ok((signature, RecoveryId::new(y_odd, false)))
}

fn decode_rsv(bytes: &[u8]) -> Result<(Signature, RecoveryId), SignerError> {
    let signature = Signature::from_slice(&bytes[..64])
        .map_err(|e| SignerError::Crypto(format!("malformed signature: {e}")))?;
    // Wallets emit v as 27/28; some return the bare parity.
    let parity = match bytes[64] {
        0 | 27 => false,
        1 | 28 => true,
        v => {
            return Err(SignerError::Crypto(format!("invalid recovery byte {v}")));
        }
    };
    Ok((signature, RecoveryId::new(parity, false)))
}
