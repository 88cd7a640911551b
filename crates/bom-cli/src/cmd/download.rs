//! download-bits command

use std::path::Path;

use anyhow::{Context, Result};
use bom_core::pivnet::PivnetConfig;
use bom_core::{Dispatcher, ProviderRegistry, TracingReporter};
use bom_schema::Validation;

/// Acquire and package every artifact of the manifest under `bits_dir`.
pub async fn download_bits(bom_path: &Path, bits_dir: &Path) -> Result<()> {
    let bom = super::load_bom(bom_path, Validation::Full)?;

    let client = reqwest::Client::builder()
        .user_agent(bom_core::USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;
    let registry = ProviderRegistry::standard(client, PivnetConfig::from_env());

    let summary = Dispatcher::new(&registry, bits_dir, TracingReporter)
        .run(&bom)
        .await?;
    tracing::info!(
        "{} artifacts ready under {}",
        summary.archives.len(),
        bits_dir.display()
    );
    if !summary.pending.is_empty() {
        tracing::warn!(
            "{} downloads still finishing in background",
            summary.pending.len()
        );
    }
    Ok(())
}
