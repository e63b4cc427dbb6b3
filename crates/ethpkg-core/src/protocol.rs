//! Signature protocol
//!
//! Builds the canonical header and payload, delegates raw signing to a
//! [`Signer`], and stores the resulting envelope inside the package at
//! `_META_/_sig_<address>.json` next to a plain `_META_/_checksums.json`
//! snapshot. Packages laid out npm-style (everything below one folder that
//! holds a `package.json`) keep their metadata inside that folder.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use ethpkg_schema::envelope::signing_input;
use ethpkg_schema::{
    Address, Algorithm, CHECKSUMS_FILE, DEFAULT_EXPIRATION_DAYS, DigestMap, Envelope, EnvelopeError,
    HashAlgorithm, Header, META_DIR, Payload, SIGNATURE_PREFIX,
};

use crate::container::{Container, ContainerError, Entry, EntryFile, is_metadata_path, metadata_root};
use crate::digest::calculate_digests_with;
use crate::listener::{Event, Listener};
use crate::signer::{Signer, SignerError};

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signer '{signer}' cannot produce {alg} signatures")]
    MissingCapability { signer: String, alg: Algorithm },

    #[error("{alg} signature must be {expected} bytes, signer returned {actual}")]
    SignatureLength {
        alg: Algorithm,
        expected: usize,
        actual: usize,
    },

    #[error("Signing was cancelled by the user")]
    Cancelled,

    #[error(transparent)]
    Signer(SignerError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SignerError> for SignatureError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::Rejected => Self::Cancelled,
            SignerError::Unsupported { signer, alg } => Self::MissingCapability { signer, alg },
            other => Self::Signer(other),
        }
    }
}

/// Options for [`sign_package`].
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Signature scheme. `None` picks `ES256K` when the signer supports it,
    /// otherwise `ETH`.
    pub alg: Option<Algorithm>,
    /// Digest algorithms recorded in the payload.
    pub digests: Vec<HashAlgorithm>,
    /// How long the signature stays valid.
    pub validity: Duration,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            alg: None,
            digests: vec![HashAlgorithm::default()],
            validity: Duration::days(DEFAULT_EXPIRATION_DAYS),
        }
    }
}

/// Result of [`sign_package`]. A user declining to sign is not an error.
#[derive(Debug, Clone)]
pub enum SignOutcome {
    Signed {
        /// Where the envelope was stored.
        path: String,
        envelope: Envelope,
    },
    Cancelled,
}

impl SignOutcome {
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed { .. })
    }
}

/// Header for an `alg` name, rejecting unknown schemes immediately.
pub fn create_header(alg: &str) -> Result<Header, SignatureError> {
    let alg = alg
        .parse::<Algorithm>()
        .map_err(|_| SignatureError::UnsupportedAlgorithm(alg.to_string()))?;
    Ok(Header::new(alg))
}

/// Payload covering `digests`, issued at `issued_at`.
pub fn create_payload(digests: DigestMap, issued_at: DateTime<Utc>, validity: Duration) -> Payload {
    let expires_at = issued_at + validity;
    Payload::new(digests, issued_at.timestamp(), expires_at.timestamp())
}

/// Sign `payload` and assemble the envelope.
///
/// The algorithm named by `header` selects which signer capability is used;
/// the returned signature must have that scheme's exact length.
pub async fn sign(payload: &Payload, signer: &dyn Signer, header: &Header) -> Result<Envelope, SignatureError> {
    if !signer.supports(header.alg) {
        return Err(SignatureError::MissingCapability {
            signer: signer.name().to_string(),
            alg: header.alg,
        });
    }

    let protected = header.encode()?;
    let input = signing_input(&protected, payload)?;

    let signature = match header.alg {
        Algorithm::Es256k => signer.ec_sign(&input).await?,
        Algorithm::Eth => signer.eth_sign(&input).await?,
    };

    let expected = header.alg.signature_len();
    if signature.len() != expected {
        return Err(SignatureError::SignatureLength {
            alg: header.alg,
            expected,
            actual: signature.len(),
        });
    }

    Ok(Envelope::new(
        protected,
        serde_json::to_value(payload)?,
        &signature,
    ))
}

/// Sign the current contents of `container` and store the envelope.
///
/// Re-signing with the same address replaces that address's envelope;
/// envelopes of other signers are kept.
pub async fn sign_package<C>(
    container: &mut C,
    signer: &dyn Signer,
    options: &SignOptions,
    listener: &dyn Listener,
) -> Result<SignOutcome, SignatureError>
where
    C: Container + ?Sized,
{
    let alg = match options.alg {
        Some(alg) => alg,
        None if signer.supports(Algorithm::Es256k) => Algorithm::Es256k,
        None => Algorithm::Eth,
    };
    let header = Header::new(alg);
    let address = signer.address();

    let entries = container.entries()?;
    let root = metadata_root(&entries);
    let algorithms = if options.digests.is_empty() {
        vec![HashAlgorithm::default()]
    } else {
        options.digests.clone()
    };
    let digests = calculate_digests_with(&*container, &algorithms)?;
    let payload = create_payload(digests.clone(), Utc::now(), options.validity);

    listener.on_event(&Event::Signing {
        address: address.to_string(),
    });
    let envelope = match sign(&payload, signer, &header).await {
        Ok(envelope) => envelope,
        Err(SignatureError::Cancelled) => {
            info!(%address, "signing cancelled by user");
            return Ok(SignOutcome::Cancelled);
        }
        Err(e) => return Err(e),
    };

    let signature_path = format!("{root}{META_DIR}/{SIGNATURE_PREFIX}{address}.json");
    let checksums_path = format!("{root}{META_DIR}/{CHECKSUMS_FILE}");
    let stored = container.add_entries(vec![
        (
            signature_path.clone(),
            EntryFile::new(envelope.to_vec_pretty()?),
        ),
        (
            checksums_path,
            EntryFile::new(serde_json::to_vec_pretty(&digests)?),
        ),
    ])?;
    let path = stored.into_iter().next().unwrap_or(signature_path);

    info!(%address, %alg, path = %path, "package signed");
    listener.on_event(&Event::Signed { path: path.clone() });

    Ok(SignOutcome::Signed { path, envelope })
}

/// A signature file found in a package.
#[derive(Debug, Clone)]
pub struct SignatureEntry {
    /// Address named by the file name.
    pub claimed: Address,
    pub entry: Entry,
}

/// Address encoded in a signature file name, if `normalized` is one inside
/// the metadata directory for `root`.
pub fn signature_address(normalized: &str, root: &str) -> Option<Address> {
    if !is_metadata_path(normalized, root) {
        return None;
    }
    let file = normalized.rsplit('/').next()?;
    let address = file.strip_prefix(SIGNATURE_PREFIX)?.strip_suffix(".json")?;
    Address::parse(address).ok()
}

/// Every signature in `container`, optionally only the one from `address`.
pub fn signature_entries<C>(container: &C, address: Option<&Address>) -> Result<Vec<SignatureEntry>, ContainerError>
where
    C: Container + ?Sized,
{
    let entries = container.entries()?;
    let root = metadata_root(&entries);
    let found: Vec<SignatureEntry> = entries
        .into_iter()
        .filter(|e| !e.is_directory)
        .filter_map(|entry| {
            let claimed = signature_address(&entry.normalized_path(), &root)?;
            Some(SignatureEntry { claimed, entry })
        })
        .filter(|s| address.is_none_or(|a| *a == s.claimed))
        .collect();
    debug!(count = found.len(), "located signature entries");
    Ok(found)
}

/// Whether `container` carries at least one signature.
pub fn is_signed<C: Container + ?Sized>(container: &C) -> Result<bool, ContainerError> {
    Ok(!signature_entries(container, None)?.is_empty())
}

/// The decoded envelope stored for `address`, if any.
pub fn signature<C>(container: &C, address: &Address) -> Result<Option<Envelope>, SignatureError>
where
    C: Container + ?Sized,
{
    signature_entries(container, Some(address))?
        .first()
        .map(|s| Envelope::from_slice(s.entry.content()).map_err(SignatureError::from))
        .transpose()
}

/// The `_checksums.json` snapshot written at signing time, if present.
pub fn checksums<C>(container: &C) -> Result<Option<DigestMap>, SignatureError>
where
    C: Container + ?Sized,
{
    let entries = container.entries()?;
    let path = format!("{}{META_DIR}/{CHECKSUMS_FILE}", metadata_root(&entries));
    entries
        .iter()
        .find(|e| !e.is_directory && e.normalized_path() == path)
        .map(|e| serde_json::from_slice::<DigestMap>(e.content()).map_err(SignatureError::from))
        .transpose()
}
