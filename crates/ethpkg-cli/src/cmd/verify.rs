//! Verify command

use std::path::Path;

use anyhow::{Result, bail};
use crossterm::style::Stylize;
use tracing::debug;

use ethpkg_core::{PackageManager, Settings, VerifyOptions};

/// Verify a package file. Fails when the package is not valid, or not
/// trusted when `trusted` was given.
pub async fn verify(package: &Path, trusted: Option<String>, only: bool, json: bool, quiet: bool) -> Result<()> {
    let manager = PackageManager::new(Settings::from_env()).with_listener(super::listener(quiet));
    let package = super::load_package(package)?;

    let wants_trust = trusted.is_some();
    let options = VerifyOptions {
        trusted,
        only_trusted: only,
        at: None,
    };
    let result = manager.verify_package(&package, &options).await?;
    debug!(is_valid = result.is_valid, is_trusted = result.is_trusted, "verification finished");

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for signer in &result.signers {
            let expires = format_date(signer.exp);
            if signer.is_valid {
                println!("  {} {} (expires {expires})", "✓".green(), signer.address);
            } else {
                println!(
                    "  {} {} {}",
                    "✗".red(),
                    signer.address,
                    signer.error.as_deref().unwrap_or("invalid").dark_grey()
                );
            }
        }
        let verdict = match (result.is_valid, result.is_trusted) {
            (true, true) => "valid, trusted".green(),
            (true, false) => "valid, untrusted".yellow(),
            (false, _) => "invalid".red(),
        };
        println!("{verdict}");
    }

    if let Some(error) = &result.error {
        bail!("{}: {}", error.code, error.message);
    }
    if wants_trust && !result.is_trusted {
        bail!("package is not signed by the trusted identity");
    }
    Ok(())
}

fn format_date(exp: i64) -> String {
    chrono::DateTime::from_timestamp(exp, 0)
        .map_or_else(|| exp.to_string(), |d| d.format("%Y-%m-%d").to_string())
}
