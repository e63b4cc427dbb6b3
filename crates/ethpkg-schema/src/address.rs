//! Ethereum-style account addresses.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced while parsing an [`Address`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The input did not contain exactly 40 hex characters.
    #[error("Invalid address: expected 40 hex characters, got {len} in '{input}'")]
    Length {
        /// Original input.
        input: String,
        /// Number of characters after stripping the `0x` prefix.
        len: usize,
    },

    /// The input contained non-hex characters.
    #[error("Invalid address: contains non-hex characters in '{0}'")]
    NotHex(String),
}

/// A 20-byte account address.
///
/// Parsing accepts mixed case with or without a `0x` prefix. Display and
/// serialization always produce lowercase `0x`-prefixed hex, which is also
/// the form used in signature file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    /// Wrap raw address bytes.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Build an address from the last 20 bytes of a 32-byte public key hash.
    pub fn from_key_hash(hash: &[u8; 32]) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&hash[12..]);
        Self(out)
    }

    /// Parse an address string.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not 40 hex characters (after an optional
    /// `0x` prefix).
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex_part.len() != 40 {
            return Err(AddressError::Length {
                input: s.to_string(),
                len: hex_part.len(),
            });
        }

        let mut out = [0u8; 20];
        hex::decode_to_slice(hex_part, &mut out).map_err(|_| AddressError::NotHex(s.to_string()))?;
        Ok(Self(out))
    }

    /// Whether `s` looks like an address rather than a human-readable name.
    pub fn is_address(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex without the `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "0xAbC0000000000000000000000000000000000dEf";

    #[test]
    fn parse_normalizes_case() {
        let addr = Address::parse(MIXED).unwrap();
        assert_eq!(
            addr.to_string(),
            "0xabc0000000000000000000000000000000000def"
        );
    }

    #[test]
    fn parse_accepts_missing_prefix() {
        let a = Address::parse(MIXED).unwrap();
        let b = Address::parse(&MIXED[2..]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parse_rejects_names() {
        assert!(!Address::is_address("alice.eth"));
        assert!(matches!(
            Address::parse("0x1234"),
            Err(AddressError::Length { len: 4, .. })
        ));
        assert!(matches!(
            Address::parse("0xzz00000000000000000000000000000000000000"),
            Err(AddressError::NotHex(_))
        ));
    }

    #[test]
    fn serde_uses_lowercase_string() {
        let addr = Address::parse(MIXED).unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0xabc0000000000000000000000000000000000def\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
