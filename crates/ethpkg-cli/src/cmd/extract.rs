//! Extract command

use std::path::Path;

use anyhow::{Context, Result};
use crossterm::style::Stylize;

/// Extract every entry of a package below `dest`.
pub fn extract(package: &Path, dest: &Path, quiet: bool) -> Result<()> {
    let package = super::load_package(package)?;
    let listener = super::listener(quiet);
    let files = package
        .extract(dest, listener.as_ref())
        .with_context(|| format!("Failed to extract into {}", dest.display()))?;
    println!("{} {} files into {}", "extracted".green(), files.len(), dest.display());
    Ok(())
}
