//! Verification outcomes returned to callers.

use serde::{Deserialize, Serialize};

use crate::address::Address;

/// Why a package failed verification as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The package carries no signatures.
    Unsigned,
    /// The package carries no signature from the requested address.
    UnsignedBy,
    /// At least one signature does not verify against the contents.
    BadPackage,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unsigned => "UNSIGNED",
            Self::UnsignedBy => "UNSIGNED_BY",
            Self::BadPackage => "BAD_PACKAGE",
        })
    }
}

/// Error carried inside a [`VerificationResult`] instead of being raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationError {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable explanation.
    pub message: String,
}

impl VerificationError {
    /// Build an error from a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Outcome for one signature found in a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerInfo {
    /// Recovered signer address, or the address claimed by the signature
    /// file name when recovery failed.
    pub address: Address,
    /// Payload expiration (unix seconds), `0` if the payload was unreadable.
    pub exp: i64,
    /// Certificate chain. Always empty; trust is an address match.
    pub certificates: Vec<String>,
    /// Whether this signature verified on its own.
    pub is_valid: bool,
    /// Reason this signature was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated result of verifying every signature in a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// One entry per signature checked.
    pub signers: Vec<SignerInfo>,
    /// At least one signature, and every signature valid.
    pub is_valid: bool,
    /// Valid and signed by the explicitly requested identity.
    pub is_trusted: bool,
    /// Package-level failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<VerificationError>,
}

impl VerificationResult {
    /// Result for a package with nothing to check.
    pub fn unsigned(error: VerificationError) -> Self {
        Self {
            signers: Vec::new(),
            is_valid: false,
            is_trusted: false,
            error: Some(error),
        }
    }

    /// Addresses of signers whose signature verified.
    pub fn valid_signers(&self) -> impl Iterator<Item = &Address> {
        self.signers.iter().filter(|s| s.is_valid).map(|s| &s.address)
    }

    /// The error code, if verification failed at package level.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_wire_names() {
        let json = serde_json::to_string(&ErrorCode::UnsignedBy).unwrap();
        assert_eq!(json, "\"UNSIGNED_BY\"");
        assert_eq!(ErrorCode::BadPackage.to_string(), "BAD_PACKAGE");
    }

    #[test]
    fn result_uses_camel_case() {
        let result = VerificationResult::unsigned(VerificationError::new(
            ErrorCode::Unsigned,
            "package is not signed",
        ));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["isValid"], false);
        assert_eq!(value["isTrusted"], false);
        assert_eq!(value["error"]["code"], "UNSIGNED");
        assert_eq!(result.error_code(), Some(ErrorCode::Unsigned));
    }
}
