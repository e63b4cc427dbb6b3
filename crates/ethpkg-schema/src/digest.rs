//! Per-file digest maps keyed by hash algorithm.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Hash algorithms that may appear in a [`DigestMap`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256 (32-byte digests).
    Sha256,
    /// SHA-512 (64-byte digests). The default.
    #[default]
    Sha512,
}

impl HashAlgorithm {
    /// Name used as the key in serialized digest maps.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(format!("Unsupported hash algorithm: {other}")),
        }
    }
}

/// Per-algorithm mapping from normalized file path to lowercase hex digest.
///
/// Serializes as `{"sha512": {"path": "hex", ...}}`. Both levels are ordered
/// maps so iteration (and therefore error reporting) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestMap(BTreeMap<HashAlgorithm, BTreeMap<String, String>>);

impl DigestMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the digest of `path` under `algorithm`, replacing any earlier value.
    pub fn insert(&mut self, algorithm: HashAlgorithm, path: impl Into<String>, hex: impl Into<String>) {
        self.0
            .entry(algorithm)
            .or_default()
            .insert(path.into(), hex.into());
    }

    /// Make sure `algorithm` is present even if no files were hashed.
    pub fn ensure_algorithm(&mut self, algorithm: HashAlgorithm) {
        self.0.entry(algorithm).or_default();
    }

    /// Look up one digest.
    pub fn get(&self, algorithm: HashAlgorithm, path: &str) -> Option<&str> {
        self.0
            .get(&algorithm)
            .and_then(|files| files.get(path))
            .map(String::as_str)
    }

    /// All digests recorded for `algorithm`.
    pub fn files(&self, algorithm: HashAlgorithm) -> Option<&BTreeMap<String, String>> {
        self.0.get(&algorithm)
    }

    /// The set of paths recorded for `algorithm`.
    pub fn paths(&self, algorithm: HashAlgorithm) -> BTreeSet<&str> {
        self.0
            .get(&algorithm)
            .map(|files| files.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Algorithms present in this map.
    pub fn algorithms(&self) -> impl Iterator<Item = HashAlgorithm> + '_ {
        self.0.keys().copied()
    }

    /// Whether the map contains no algorithms at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(algorithm, files)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (HashAlgorithm, &BTreeMap<String, String>)> {
        self.0.iter().map(|(alg, files)| (*alg, files))
    }
}
