//! Shared types and wire format for ethpkg.
//!
//! Everything that is persisted inside a signed package (envelopes, digest
//! maps, checksum snapshots) or returned to callers (verification results)
//! lives here so that producers and consumers agree on one encoding.

pub mod address;
pub mod canonical;
pub mod digest;
pub mod envelope;
pub mod verification;

// Re-exports
pub use address::{Address, AddressError};
pub use digest::{DigestMap, HashAlgorithm};
pub use envelope::{Algorithm, Envelope, EnvelopeError, Header, Payload};
pub use verification::{ErrorCode, SignerInfo, VerificationError, VerificationResult};

/// Reserved metadata directory. Files below it never take part in digests.
pub const META_DIR: &str = "_META_";

/// File name prefix of a signature envelope inside [`META_DIR`].
pub const SIGNATURE_PREFIX: &str = "_sig_";

/// Plain digest snapshot written next to the signatures.
pub const CHECKSUMS_FILE: &str = "_checksums.json";

/// Manifest whose presence in a nested folder marks an npm-style layout.
pub const NESTED_MANIFEST: &str = "package.json";

/// Validity window applied when the signer does not pick an expiration.
pub const DEFAULT_EXPIRATION_DAYS: i64 = 180;

/// Payload format version written by this implementation.
pub const PAYLOAD_VERSION: u32 = 1;

/// Issuer claim. Packages are always self-issued.
pub const ISSUER_SELF: &str = "self";
