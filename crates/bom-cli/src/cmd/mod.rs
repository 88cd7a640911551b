//! Subcommand implementations

pub mod download;
pub mod resources;
pub mod upload;
pub mod version;

use std::path::Path;

use anyhow::{Context, Result};
use bom_schema::{BillOfMaterials, Validation};

/// Load the manifest at `path`, checking it to the given level.
pub fn load_bom(path: &Path, validation: Validation) -> Result<BillOfMaterials> {
    BillOfMaterials::from_file_with(path, validation)
        .with_context(|| format!("invalid bom {}", path.display()))
}
