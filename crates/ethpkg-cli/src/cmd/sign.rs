//! Sign command

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use crossterm::style::Stylize;
use tracing::debug;

use ethpkg_core::{
    ArchiveFormat, Container, PackageManager, PrivateKeySigner, Settings, SignOutcome, WriteOptions,
};

use crate::{AlgArg, DigestArg};

#[derive(Debug)]
pub struct SignArgs<'a> {
    pub package: &'a Path,
    pub alg: Option<AlgArg>,
    pub signer: &'a str,
    pub key: Option<&'a str>,
    pub digests: &'a [DigestArg],
    pub output: Option<&'a Path>,
    pub quiet: bool,
}

/// Sign a package file and write it back.
pub async fn sign(args: SignArgs<'_>) -> Result<()> {
    let mut manager = PackageManager::from_settings(Settings::from_env())
        .context("Failed to configure signers")?
        .with_listener(super::listener(args.quiet));

    if let Some(key) = args.key {
        let signer = PrivateKeySigner::from_hex(key).context("Invalid --key")?;
        manager.signers_mut().register(Arc::new(signer));
    }
    if manager.signers().get(args.signer).is_none() {
        let available: Vec<&str> = manager.signers().names().collect();
        if available.is_empty() {
            bail!("No signer configured: set ETHPKG_SIGNING_KEY or pass --key");
        }
        bail!(
            "Signer '{}' is not configured (available: {})",
            args.signer,
            available.join(", ")
        );
    }

    let mut package = super::load_package(args.package)?;
    debug!(package = %args.package.display(), signer = args.signer, "signing package");
    let mut options = manager.sign_options();
    options.alg = args.alg.map(Into::into);
    if !args.digests.is_empty() {
        options.digests = args.digests.iter().map(|d| (*d).into()).collect();
    }

    match manager.sign_package(&mut package, args.signer, &options).await? {
        SignOutcome::Cancelled => println!("{}", "signing cancelled".yellow()),
        SignOutcome::Signed { path, .. } => {
            let target = args.output.unwrap_or(args.package);
            package
                .write_package(target, write_options(target, package.format()))
                .with_context(|| format!("Failed to write {}", target.display()))?;
            println!("{} {} ({path})", "signed".green(), target.display());
        }
    }
    Ok(())
}

/// Keep the extension check when the target names a format; otherwise the
/// package keeps the compression it was loaded with.
fn write_options(target: &Path, format: ArchiveFormat) -> WriteOptions {
    WriteOptions {
        overwrite: true,
        compression: ArchiveFormat::from_path(&target.to_string_lossy())
            .is_none()
            .then_some(format.is_gzip()),
    }
}
