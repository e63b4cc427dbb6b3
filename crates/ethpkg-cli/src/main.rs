//! ethpkg - pack, sign and verify packages

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ethpkg_cli::cmd;
use ethpkg_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let quiet = cli.quiet;

    match cli.command {
        Commands::Pack {
            dir,
            output,
            format,
            overwrite,
        } => cmd::pack::pack(&dir, &output, format, overwrite),
        Commands::Sign {
            package,
            alg,
            signer,
            key,
            digests,
            output,
        } => {
            cmd::sign::sign(cmd::sign::SignArgs {
                package: &package,
                alg,
                signer: &signer,
                key: key.as_deref(),
                digests: &digests,
                output: output.as_deref(),
                quiet,
            })
            .await
        }
        Commands::Verify {
            package,
            trusted,
            only,
            json,
        } => cmd::verify::verify(&package, trusted, only, json, quiet).await,
        Commands::Inspect { package } => cmd::inspect::inspect(&package),
        Commands::Extract { package, dest } => cmd::extract::extract(&package, &dest, quiet),
        Commands::Keygen => {
            cmd::keygen::keygen();
            Ok(())
        }
    }
}
