//! Multi-signature verification
//!
//! Each signature in a package is checked on its own against one shared
//! digest map of the current contents. A package is valid only when it has
//! at least one signature and every signature checks out; it is trusted
//! when it is valid and one of the signers is the identity the caller asked
//! for. Invalid signatures are reported in the result, never raised.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use ethpkg_schema::{
    Address, DigestMap, Envelope, EnvelopeError, ErrorCode, HashAlgorithm, SignerInfo, VerificationError,
    VerificationResult,
};

use crate::container::{Container, ContainerError};
use crate::digest::{IntegrityError, calculate_digests_with, compare_digests};
use crate::listener::{Event, Listener};
use crate::protocol::{SignatureEntry, signature_entries};
use crate::resolver::{IdentityResolver, ResolverError, resolve_identity};
use crate::signer::{SignerError, recover_address};

/// Structural failures. A package that merely fails verification is an
/// `Ok` result with `is_valid == false`.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Address or resolvable name whose signature makes the package trusted.
    pub trusted: Option<String>,
    /// Check only the signature of `trusted` instead of every signature.
    pub only_trusted: bool,
    /// Evaluate expiry at this instant instead of now.
    pub at: Option<DateTime<Utc>>,
}

/// Why a single signature was rejected.
#[derive(Error, Debug)]
enum CheckError {
    #[error("malformed envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("signature does not verify: {0}")]
    Recovery(#[from] SignerError),

    #[error("signature was made by {recovered} but the file claims {claimed}")]
    AddressMismatch { claimed: Address, recovered: Address },

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("signature expired at {0}")]
    Expired(i64),
}

/// Verify every signature in `container`.
pub async fn verify<C>(
    container: &C,
    options: &VerifyOptions,
    resolver: Option<&dyn IdentityResolver>,
    listener: &dyn Listener,
) -> Result<VerificationResult, VerifyError>
where
    C: Container + ?Sized,
{
    let trusted = match options.trusted.as_deref() {
        Some(identity) => {
            let address = resolve_identity(resolver, identity).await?;
            if !Address::is_address(identity) {
                listener.on_event(&Event::Resolved {
                    name: identity.to_string(),
                    address: address.to_string(),
                });
            }
            Some(address)
        }
        None => None,
    };
    let narrow = trusted.as_ref().filter(|_| options.only_trusted);

    let found = signature_entries(container, narrow)?;
    if found.is_empty() {
        let error = match narrow {
            Some(address) => VerificationError::new(
                ErrorCode::UnsignedBy,
                format!("package is not signed by {address}"),
            ),
            None => VerificationError::new(ErrorCode::Unsigned, "package is not signed"),
        };
        info!(code = %error.code, "package has no signatures to verify");
        let result = VerificationResult::unsigned(error);
        listener.on_event(&Event::Verified {
            is_valid: false,
            is_trusted: false,
        });
        return Ok(result);
    }

    listener.on_event(&Event::Verifying {
        signatures: found.len(),
    });

    let digests = Arc::new(calculate_digests_with(container, &digest_algorithms(&found))?);
    let now = options.at.unwrap_or_else(Utc::now).timestamp();

    let claimed: Vec<Address> = found.iter().map(|s| s.claimed).collect();
    let checks = found.into_iter().map(|signature| {
        let digests = Arc::clone(&digests);
        tokio::task::spawn_blocking(move || check_signature(&signature, &digests, now))
    });
    let signers: Vec<SignerInfo> = join_all(checks)
        .await
        .into_iter()
        .zip(claimed)
        .map(|(outcome, claimed)| {
            outcome.unwrap_or_else(|e| rejected(claimed, 0, format!("verification task failed: {e}")))
        })
        .collect();

    let is_valid = !signers.is_empty() && signers.iter().all(|s| s.is_valid);
    let is_trusted = is_valid && trusted.is_some_and(|t| signers.iter().any(|s| s.address == t));
    let error = (!is_valid).then(|| {
        let invalid = signers.iter().filter(|s| !s.is_valid).count();
        VerificationError::new(
            ErrorCode::BadPackage,
            format!("{invalid} of {} signatures are invalid", signers.len()),
        )
    });

    info!(signers = signers.len(), is_valid, is_trusted, "verified package");
    listener.on_event(&Event::Verified {
        is_valid,
        is_trusted,
    });

    Ok(VerificationResult {
        signers,
        is_valid,
        is_trusted,
        error,
    })
}

/// Digest algorithms used by any readable envelope, so the package is
/// hashed once for all of them.
fn digest_algorithms(found: &[SignatureEntry]) -> Vec<HashAlgorithm> {
    let algorithms: BTreeSet<HashAlgorithm> = found
        .iter()
        .filter_map(|s| Envelope::from_slice(s.entry.content()).ok())
        .filter_map(|e| e.claims().ok())
        .flat_map(|p| p.data.algorithms().collect::<Vec<_>>())
        .collect();

    if algorithms.is_empty() {
        vec![HashAlgorithm::default()]
    } else {
        algorithms.into_iter().collect()
    }
}

fn check_signature(signature: &SignatureEntry, digests: &DigestMap, now: i64) -> SignerInfo {
    let mut exp = 0;
    match check_envelope(signature, digests, now, &mut exp) {
        Ok(recovered) => {
            debug!(address = %recovered, "signature valid");
            SignerInfo {
                address: recovered,
                exp,
                certificates: Vec::new(),
                is_valid: true,
                error: None,
            }
        }
        Err((address, reason)) => {
            warn!(%address, path = %signature.entry.relative_path, %reason, "signature invalid");
            rejected(address, exp, reason.to_string())
        }
    }
}

/// Returns the recovered address, or the best known address and the reason
/// the signature was rejected.
fn check_envelope(
    signature: &SignatureEntry,
    digests: &DigestMap,
    now: i64,
    exp: &mut i64,
) -> Result<Address, (Address, CheckError)> {
    let claimed = signature.claimed;
    let fail = |e: CheckError| (claimed, e);

    let envelope = Envelope::from_slice(signature.entry.content()).map_err(|e| fail(e.into()))?;
    let header = envelope.header().map_err(|e| fail(e.into()))?;
    let payload = envelope.claims().map_err(|e| fail(e.into()))?;
    *exp = payload.exp;

    let raw = envelope.signature_bytes().map_err(|e| fail(e.into()))?;
    let input = envelope.signing_input().map_err(|e| fail(e.into()))?;
    let recovered = recover_address(header.alg, &input, &raw).map_err(|e| fail(e.into()))?;

    if recovered != claimed {
        return Err((recovered, CheckError::AddressMismatch { claimed, recovered }));
    }
    compare_digests(&payload.data, digests).map_err(|e| (recovered, e.into()))?;
    if payload.is_expired(now) {
        return Err((recovered, CheckError::Expired(payload.exp)));
    }
    Ok(recovered)
}

fn rejected(address: Address, exp: i64, reason: String) -> SignerInfo {
    SignerInfo {
        address,
        exp,
        certificates: Vec::new(),
        is_valid: false,
        error: Some(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ArchiveFormat, EntryFile, Package};
    use crate::listener::NullListener;
    use crate::listener::tests::RecordingListener;
    use crate::protocol::{SignOptions, sign_package};
    use crate::resolver::StaticResolver;
    use crate::signer::{PrivateKeySigner, Signer};

    fn package() -> Package {
        let mut package = Package::empty(ArchiveFormat::Zip);
        package
            .add_entries(vec![
                ("foo.txt".to_string(), EntryFile::from("foo")),
                ("bar.txt".to_string(), EntryFile::from("bar")),
            ])
            .unwrap();
        package
    }

    async fn signed(signer: &PrivateKeySigner) -> Package {
        let mut pkg = package();
        sign_package(&mut pkg, signer, &SignOptions::default(), &NullListener)
            .await
            .unwrap();
        pkg
    }

    #[tokio::test]
    async fn meta_folder_below_content_is_not_a_hiding_place() {
        let signer = PrivateKeySigner::random();
        let mut pkg = Package::empty(ArchiveFormat::TarGz);
        pkg.add_entries(vec![
            ("foo.txt".to_string(), EntryFile::from("foo")),
            ("lib/a.js".to_string(), EntryFile::from("a")),
        ])
        .unwrap();
        sign_package(&mut pkg, &signer, &SignOptions::default(), &NullListener)
            .await
            .unwrap();

        pkg.add_entry("lib/_META_/evil.js", "evil".into()).unwrap();
        let result = verify(&pkg, &VerifyOptions::default(), None, &NullListener)
            .await
            .unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.error_code(), Some(ErrorCode::BadPackage));
    }

    #[tokio::test]
    async fn unsigned_package_skips_digests() {
        let listener = RecordingListener::default();
        let result = verify(&package(), &VerifyOptions::default(), None, &listener)
            .await
            .unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.error_code(), Some(ErrorCode::Unsigned));
        let events = listener.events.lock().unwrap();
        assert!(!events.iter().any(|e| matches!(e, Event::Verifying { .. })));
    }

    #[tokio::test]
    async fn narrowing_to_absent_signer_is_unsigned_by() {
        let alice = PrivateKeySigner::random();
        let pkg = signed(&alice).await;
        let options = VerifyOptions {
            trusted: Some(PrivateKeySigner::random().address().to_string()),
            only_trusted: true,
            at: None,
        };
        let result = verify(&pkg, &options, None, &NullListener).await.unwrap();
        assert_eq!(result.error_code(), Some(ErrorCode::UnsignedBy));
        assert!(result.signers.is_empty());
    }

    #[tokio::test]
    async fn renamed_signature_file_is_rejected() {
        let alice = PrivateKeySigner::random();
        let mallory = Address::new([0x11; 20]);
        let mut pkg = signed(&alice).await;

        let path = format!("_META_/_sig_{}.json", alice.address());
        let content = pkg.content(&path).unwrap();
        pkg.remove_entry(&path).unwrap();
        pkg.add_entry(&format!("_META_/_sig_{mallory}.json"), content.into())
            .unwrap();

        let result = verify(&pkg, &VerifyOptions::default(), None, &NullListener)
            .await
            .unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.signers[0].address, alice.address());
        assert!(result.signers[0].error.as_deref().unwrap().contains("claims"));
    }

    #[tokio::test]
    async fn garbage_envelope_is_invalid_not_an_error() {
        let mut pkg = package();
        let addr = Address::new([0x22; 20]);
        pkg.add_entry(&format!("_META_/_sig_{addr}.json"), "not json".into())
            .unwrap();
        let result = verify(&pkg, &VerifyOptions::default(), None, &NullListener)
            .await
            .unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.error_code(), Some(ErrorCode::BadPackage));
        assert_eq!(result.signers[0].address, addr);
        assert_eq!(result.signers[0].exp, 0);
    }

    #[tokio::test]
    async fn names_resolve_before_trust_check() {
        let alice = PrivateKeySigner::random();
        let pkg = signed(&alice).await;
        let resolver = StaticResolver::new().with("alice.eth", alice.address());
        let listener = RecordingListener::default();

        let options = VerifyOptions {
            trusted: Some("alice.eth".to_string()),
            ..VerifyOptions::default()
        };
        let result = verify(&pkg, &options, Some(&resolver), &listener)
            .await
            .unwrap();
        assert!(result.is_valid);
        assert!(result.is_trusted);
        assert!(
            listener
                .events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, Event::Resolved { .. }))
        );

        let unknown = VerifyOptions {
            trusted: Some("bob.eth".to_string()),
            ..VerifyOptions::default()
        };
        assert!(matches!(
            verify(&pkg, &unknown, Some(&resolver), &NullListener).await,
            Err(VerifyError::Resolver(ResolverError::Unresolved(_)))
        ));
    }

    #[tokio::test]
    async fn sha256_payloads_are_checked_with_sha256() {
        let alice = PrivateKeySigner::random();
        let mut pkg = package();
        let options = SignOptions {
            digests: vec![HashAlgorithm::Sha256],
            ..SignOptions::default()
        };
        sign_package(&mut pkg, &alice, &options, &NullListener)
            .await
            .unwrap();
        let result = verify(&pkg, &VerifyOptions::default(), None, &NullListener)
            .await
            .unwrap();
        assert!(result.is_valid);
    }
}
