//! ethpkg - pack, sign and verify packages
//!
//! Thin command layer over `ethpkg-core`. Every command reads its
//! configuration from the environment (see [`ethpkg_core::Settings`]) and
//! reports progress on stderr, leaving stdout for results.
//!
//! # Signed package layout
//!
//! ```text
//! package.tar.gz
//! ├── ...            # payload files, covered by every signature
//! └── _META_/
//!     ├── _checksums.json
//!     └── _sig_0x<address>.json
//! ```
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]

pub mod cmd;
pub mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use ethpkg_core::ArchiveFormat;
use ethpkg_schema::{Algorithm, HashAlgorithm};

#[derive(Debug, Parser)]
#[command(name = "ethpkg")]
#[command(author, version, about = "ethpkg - pack, sign and verify packages")]
pub struct Cli {
    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Bundle a directory into a package
    Pack {
        /// Directory to bundle
        dir: PathBuf,
        /// Output file; the extension picks the format unless --format is given
        #[arg(short, long)]
        output: PathBuf,
        /// Archive format
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,
    },
    /// Sign a package in place (or into --output)
    Sign {
        /// Package file
        package: PathBuf,
        /// Signature scheme
        #[arg(long, value_enum)]
        alg: Option<AlgArg>,
        /// Registered signer to use
        #[arg(long, default_value = "privatekey")]
        signer: String,
        /// Hex private key for the in-process signer
        #[arg(long, env = "ETHPKG_SIGNING_KEY", hide_env_values = true)]
        key: Option<String>,
        /// Digest algorithms to record (repeatable)
        #[arg(long = "digest", value_enum)]
        digests: Vec<DigestArg>,
        /// Write the signed package here instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Verify every signature in a package
    Verify {
        /// Package file
        package: PathBuf,
        /// Address whose signature makes the package trusted
        #[arg(long)]
        trusted: Option<String>,
        /// Only check the signature of --trusted
        #[arg(long, requires = "trusted")]
        only: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List entries and signatures of a package
    Inspect {
        /// Package file
        package: PathBuf,
    },
    /// Extract a package into a directory
    Extract {
        /// Package file
        package: PathBuf,
        /// Destination directory
        dest: PathBuf,
    },
    /// Generate a new signing key
    Keygen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Tar,
    #[value(name = "tar.gz", alias = "tgz")]
    TarGz,
    Zip,
}

impl From<FormatArg> for ArchiveFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Tar => Self::Tar,
            FormatArg::TarGz => Self::TarGz,
            FormatArg::Zip => Self::Zip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgArg {
    #[value(name = "ES256K", alias = "es256k")]
    Es256k,
    #[value(name = "ETH", alias = "eth")]
    Eth,
}

impl From<AlgArg> for Algorithm {
    fn from(a: AlgArg) -> Self {
        match a {
            AlgArg::Es256k => Self::Es256k,
            AlgArg::Eth => Self::Eth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DigestArg {
    Sha256,
    Sha512,
}

impl From<DigestArg> for HashAlgorithm {
    fn from(d: DigestArg) -> Self {
        match d {
            DigestArg::Sha256 => Self::Sha256,
            DigestArg::Sha512 => Self::Sha512,
        }
    }
}
