//! Content digests over a container.
//!
//! Every non-directory entry outside the reserved metadata directory is
//! hashed and keyed by its normalized path. Signatures cover the resulting
//! [`DigestMap`], so verification recomputes it and demands an exact match.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use tracing::debug;

use ethpkg_schema::{DigestMap, HashAlgorithm};

use crate::container::{Container, ContainerError, is_metadata_path, metadata_root};

/// Integrity violations found when comparing two digest maps.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// The two maps do not cover the same files.
    #[error(
        "Integrity violation: file set differs ({algorithm}), missing from package: {missing:?}, not covered by signature: {unexpected:?}"
    )]
    FileSetMismatch {
        algorithm: HashAlgorithm,
        /// Paths in the reference but not in the package.
        missing: Vec<String>,
        /// Paths in the package but not in the reference.
        unexpected: Vec<String>,
    },

    /// A file is covered by both maps with different digests.
    #[error("Integrity violation: digest mismatch for '{path}' ({algorithm})")]
    DigestMismatch {
        algorithm: HashAlgorithm,
        path: String,
    },

    /// The reference uses an algorithm the computed map does not have.
    #[error("Integrity violation: no {0} digests to compare against")]
    MissingAlgorithm(HashAlgorithm),

    /// The reference has no digests at all.
    #[error("Integrity violation: reference digest map is empty")]
    Empty,
}

/// Hash one buffer, returning lowercase hex.
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
    }
}

/// Digests of every covered file using sha512.
pub fn calculate_digests<C: Container + ?Sized>(container: &C) -> Result<DigestMap, ContainerError> {
    calculate_digests_with(container, &[HashAlgorithm::default()])
}

/// Digests of every covered file, one map per algorithm, in a single pass
/// over the entries.
///
/// Only the metadata directory of the package's own layout is skipped; a
/// `_META_` folder anywhere else is covered like any other content.
pub fn calculate_digests_with<C: Container + ?Sized>(
    container: &C,
    algorithms: &[HashAlgorithm],
) -> Result<DigestMap, ContainerError> {
    let mut map = DigestMap::new();
    for algorithm in algorithms {
        map.ensure_algorithm(*algorithm);
    }

    let entries = container.entries()?;
    let root = metadata_root(&entries);
    for entry in &entries {
        if entry.is_directory {
            continue;
        }
        let path = entry.normalized_path();
        if path.is_empty() || is_metadata_path(&path, &root) {
            continue;
        }
        for algorithm in algorithms {
            map.insert(*algorithm, path.clone(), hash_bytes(*algorithm, entry.content()));
        }
    }

    debug!(
        files = map.paths(algorithms.first().copied().unwrap_or_default()).len(),
        "calculated digests"
    );
    Ok(map)
}

/// Check that `computed` matches `reference` exactly for every algorithm in
/// `reference`.
///
/// File-set differences are reported before value mismatches so that an
/// added or removed file is never described as a modification.
pub fn compare_digests(reference: &DigestMap, computed: &DigestMap) -> Result<(), IntegrityError> {
    if reference.is_empty() {
        return Err(IntegrityError::Empty);
    }

    for (algorithm, expected) in reference.iter() {
        let actual = computed
            .files(algorithm)
            .ok_or(IntegrityError::MissingAlgorithm(algorithm))?;

        let expected_keys: BTreeSet<&String> = expected.keys().collect();
        let actual_keys: BTreeSet<&String> = actual.keys().collect();
        if expected_keys != actual_keys {
            return Err(IntegrityError::FileSetMismatch {
                algorithm,
                missing: expected_keys
                    .difference(&actual_keys)
                    .map(|p| (*p).clone())
                    .collect(),
                unexpected: actual_keys
                    .difference(&expected_keys)
                    .map(|p| (*p).clone())
                    .collect(),
            });
        }

        if let Some((path, _)) = expected
            .iter()
            .find(|(path, hex)| actual.get(*path).is_none_or(|a| !a.eq_ignore_ascii_case(hex)))
        {
            return Err(IntegrityError::DigestMismatch {
                algorithm,
                path: path.clone(),
            });
        }
    }

    Ok(())
}
