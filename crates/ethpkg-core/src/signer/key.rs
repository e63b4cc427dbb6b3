use async_trait::async_trait;
use k256::ecdsa::SigningKey;

use ethpkg_schema::{Address, Algorithm};

use super::{Signer, SignerError, address_of, encode_compact, encode_rsv, message_hash};
use crate::settings::Settings;

/// Signs in-process with a raw secp256k1 private key.
///
/// Signatures are deterministic (RFC 6979), so signing the same input twice
/// yields identical bytes.
#[derive(Clone)]
pub struct PrivateKeySigner {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for PrivateKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeySigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl PrivateKeySigner {
    pub const NAME: &'static str = "privatekey";

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        let key = SigningKey::from_slice(bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let address = address_of(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Parse a 32-byte hex key, with or without `0x`.
    pub fn from_hex(hex_key: &str) -> Result<Self, SignerError> {
        let trimmed = hex_key.trim();
        let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(raw).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(SignerError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        Self::from_bytes(&bytes)
    }

    /// A fresh random key.
    pub fn random() -> Self {
        loop {
            let bytes: [u8; 32] = rand::random();
            // Out-of-range scalars are astronomically rare; draw again.
            if let Ok(signer) = Self::from_bytes(&bytes) {
                return signer;
            }
        }
    }

    /// The signer configured through `ETHPKG_SIGNING_KEY`, if any.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>, SignerError> {
        settings
            .signing_key
            .as_deref()
            .map(Self::from_hex)
            .transpose()
    }

    /// Private key as `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.key.to_bytes()))
    }

    fn sign_recoverable(
        &self,
        alg: Algorithm,
        data: &[u8],
    ) -> Result<(k256::ecdsa::Signature, k256::ecdsa::RecoveryId), SignerError> {
        self.key
            .sign_prehash_recoverable(&message_hash(alg, data))
            .map_err(|e| SignerError::Crypto(e.to_string()))
    }
}

#[async_trait]
impl Signer for PrivateKeySigner {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn address(&self) -> Address {
        self.address
    }

    async fn ec_sign(&self, data: &[u8]) -> Result<Vec<u8>, SignerError> {
        let (signature, recovery_id) = self.sign_recoverable(Algorithm::Es256k, data)?;
        Ok(encode_compact(&signature, recovery_id))
    }

    async fn eth_sign(&self, data: &[u8]) -> Result<Vec<u8>, SignerError> {
        let (signature, recovery_id) = self.sign_recoverable(Algorithm::Eth, data)?;
        Ok(encode_rsv(&signature, recovery_id))
    }
}
