//! Pack command

use std::path::Path;

use anyhow::{Context, Result, bail};
use crossterm::style::Stylize;

use ethpkg_core::{ArchiveFormat, Container, Package, WriteOptions};

use crate::FormatArg;
use crate::ui::format_size;

/// Bundle `dir` into a package at `output`.
pub fn pack(dir: &Path, output: &Path, format: Option<FormatArg>, overwrite: bool) -> Result<()> {
    let format = match format {
        Some(f) => ArchiveFormat::from(f),
        None => match ArchiveFormat::from_path(&output.to_string_lossy()) {
            Some(f) => f,
            None => bail!(
                "Cannot tell the archive format from '{}'; use .tar, .tar.gz, .tgz or .zip, or pass --format",
                output.display()
            ),
        },
    };

    let package = Package::create_with_format(dir, format)
        .with_context(|| format!("Failed to bundle {}", dir.display()))?;
    let files = package.entries()?.len();

    package
        .write_package(
            output,
            WriteOptions {
                overwrite,
                compression: Some(format.is_gzip()),
            },
        )
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let size = std::fs::metadata(output).map_or(0, |m| m.len());
    println!(
        "{} {} ({files} files, {format}, {})",
        "packed".green(),
        output.display(),
        format_size(size)
    );
    Ok(())
}
