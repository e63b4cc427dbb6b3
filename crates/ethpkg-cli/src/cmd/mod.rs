pub mod extract;
pub mod inspect;
pub mod keygen;
pub mod pack;
pub mod sign;
pub mod verify;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use ethpkg_core::{Listener, Package, TracingListener};

use crate::ui::TerminalListener;

/// Read and parse a package file.
pub(crate) fn load_package(path: &Path) -> Result<Package> {
    Package::from_file(path).with_context(|| format!("Failed to load package {}", path.display()))
}

/// Terminal progress, or only `RUST_LOG`-gated log lines with `--quiet`.
pub(crate) fn listener(quiet: bool) -> Arc<dyn Listener> {
    if quiet {
        Arc::new(TracingListener)
    } else {
        Arc::new(TerminalListener)
    }
}
