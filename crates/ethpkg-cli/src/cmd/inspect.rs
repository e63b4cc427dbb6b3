//! Inspect command

use std::path::Path;

use anyhow::Result;
use crossterm::style::Stylize;

use ethpkg_core::container::{is_metadata_path, metadata_root};
use ethpkg_core::schema::Envelope;
use ethpkg_core::{Container, signature_entries};

use crate::ui::format_size;

/// Print the entries and signatures of a package.
pub fn inspect(path: &Path) -> Result<()> {
    let package = super::load_package(path)?;
    let entries = package.entries()?;
    let root = metadata_root(&entries);

    println!();
    println!("  {} {}", path.display().to_string().white().bold(), package.format().to_string().dark_grey());
    println!();

    for entry in &entries {
        let name = if entry.is_directory {
            format!("{}/", entry.normalized_path())
        } else {
            entry.normalized_path()
        };
        let size = if entry.is_directory {
            String::new()
        } else {
            format_size(entry.size)
        };
        if is_metadata_path(&entry.normalized_path(), &root) {
            println!("  {}", format!("{name:<48} {size:>10}").dark_grey());
        } else {
            println!("  {name:<48} {size:>10}");
        }
    }

    let signatures = signature_entries(&package, None)?;
    println!();
    if signatures.is_empty() {
        println!("  {}", "unsigned".yellow());
        return Ok(());
    }
    for signature in &signatures {
        let detail = Envelope::from_slice(signature.entry.content())
            .ok()
            .and_then(|e| Some((e.header().ok()?.alg, e.claims().ok()?.exp)));
        match detail {
            Some((alg, exp)) => {
                let expires = chrono::DateTime::from_timestamp(exp, 0)
                    .map_or_else(|| exp.to_string(), |d| d.format("%Y-%m-%d").to_string());
                println!("  {} {} {alg}, expires {expires}", "signed by".green(), signature.claimed);
            }
            None => println!("  {} {} (unreadable envelope)", "signed by".red(), signature.claimed),
        }
    }
    Ok(())
}
