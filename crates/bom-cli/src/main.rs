//! bom-mgmt - Bill of Materials mirroring CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bom_cli::cmd;
use bom_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            cmd::version::version();
            Ok(())
        }
        Commands::DownloadBits { manifest, bits_dir } => {
            cmd::download::download_bits(&manifest.bom, &bits_dir).await
        }
        Commands::UploadBits {
            manifest,
            bits_dir,
            store,
        } => cmd::upload::upload_bits(&manifest.bom, &bits_dir, &store).await,
        Commands::GenerateResources { manifest, store } => {
            cmd::resources::generate_resources(&manifest.bom, &store)
        }
    }
}
