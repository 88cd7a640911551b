//! generate-resources command

use std::path::Path;

use anyhow::{Context, Result};
use bom_core::concourse;
use bom_schema::Validation;

use crate::StoreArgs;

/// Print a Concourse `resources:` block for the manifest.
pub fn generate_resources(bom_path: &Path, store: &StoreArgs) -> Result<()> {
    let bom = super::load_bom(bom_path, Validation::Layout)?;
    let yaml = concourse::render(&bom, &store.config())
        .context("Failed to render resources block")?;
    print!("{yaml}");
    Ok(())
}
