//! Companion stemcell resolution for tiles.
//!
//! A tile declares the stemcell it was built against under
//! `stemcell_criteria` in its `metadata/*.yml` product descriptor. The exact
//! version is often unpublished by the time the tile is mirrored, so the
//! resolver walks patch versions downward (`{v}.99` .. `{v}.0`) and takes the
//! first one the portal can serve. Any fetch failure during the walk counts
//! as "not this version"; only running out of candidates is an error.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::pivnet::{ReleaseRequest, ReleaseSource};

/// Highest patch number tried below the declared version.
pub const MAX_PATCH: u32 = 99;

const WINDOWS_OS: &str = "windows2016";
const WINDOWS_STEMCELL_SLUG: &str = "stemcells-windows-server";
const LINUX_STEMCELL_SLUG: &str = "stemcells-ubuntu-xenial";

#[derive(Error, Debug)]
pub enum StemcellError {
    #[error("no .pivotal file among the downloaded tile files")]
    MissingTile,

    #[error("unable to read product descriptor from {}: {reason}", path.display())]
    Descriptor { path: PathBuf, reason: String },

    #[error(
        "stemcell resolution exhausted: no {product_slug} release matching '{glob}' at {version} or {version}.99..{version}.0"
    )]
    ResolutionExhausted {
        product_slug: String,
        version: String,
        glob: String,
    },
}

/// The `stemcell_criteria` block of a product descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StemcellCriteria {
    pub os: String,
    #[serde(deserialize_with = "version_string")]
    pub version: String,
}

#[derive(Deserialize)]
struct ProductDescriptor {
    stemcell_criteria: StemcellCriteria,
}

/// Descriptors write versions both quoted and bare (`'170.15'` / `170.15`).
fn version_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a version, found {other:?}"
        ))),
    }
}

impl StemcellCriteria {
    /// Portal slug publishing stemcells for this OS.
    pub fn product_slug(&self) -> &'static str {
        if self.os == WINDOWS_OS {
            WINDOWS_STEMCELL_SLUG
        } else {
            LINUX_STEMCELL_SLUG
        }
    }
}

/// Read `stemcell_criteria` from the product descriptor inside a tile.
pub fn read_criteria(tile: &Path) -> Result<StemcellCriteria, StemcellError> {
    let descriptor_error = |reason: String| StemcellError::Descriptor {
        path: tile.to_path_buf(),
        reason,
    };

    let file = File::open(tile).map_err(|e| descriptor_error(e.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| descriptor_error(e.to_string()))?;

    let name = archive
        .file_names()
        .filter(|n| is_descriptor(n))
        .min()
        .map(str::to_owned)
        .ok_or_else(|| descriptor_error("no metadata/*.yml entry".to_string()))?;

    let mut content = String::new();
    archive
        .by_name(&name)
        .map_err(|e| descriptor_error(e.to_string()))?
        .read_to_string(&mut content)
        .map_err(|e| descriptor_error(e.to_string()))?;

    let descriptor: ProductDescriptor =
        serde_yaml::from_str(&content).map_err(|e| descriptor_error(format!("{name}: {e}")))?;
    debug!(
        os = %descriptor.stemcell_criteria.os,
        version = %descriptor.stemcell_criteria.version,
        "read stemcell criteria from {name}"
    );
    Ok(descriptor.stemcell_criteria)
}

fn is_descriptor(name: &str) -> bool {
    name.strip_prefix("metadata/")
        .is_some_and(|rest| !rest.contains('/') && (rest.ends_with(".yml") || rest.ends_with(".yaml")))
}

/// Versions tried, in order: the declared one, then `.99` down to `.0`.
pub fn candidate_versions(declared: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(declared.to_string())
        .chain((0..=MAX_PATCH).rev().map(move |patch| format!("{declared}.{patch}")))
}

/// A stemcell that was found and downloaded.
#[derive(Debug, Clone)]
pub struct ResolvedStemcell {
    pub product_slug: &'static str,
    pub version: String,
    pub files: Vec<PathBuf>,
    pub attempts: usize,
}

/// Find and download the stemcell matching `criteria` for `iaas` into `dest`.
pub async fn resolve(
    source: &dyn ReleaseSource,
    criteria: &StemcellCriteria,
    iaas: &str,
    dest: &Path,
) -> Result<ResolvedStemcell, StemcellError> {
    let product_slug = criteria.product_slug();
    let glob = format!("*{iaas}*");
    let globs = vec![glob.clone()];
    let mut attempts = 0;

    for version in candidate_versions(&criteria.version) {
        attempts += 1;
        let request = ReleaseRequest {
            product_slug,
            version: &version,
            globs: &globs,
        };
        match source.download(&request, dest).await {
            Ok(files) => {
                info!("found stemcell {product_slug} {version} after {attempts} attempts");
                return Ok(ResolvedStemcell {
                    product_slug,
                    version,
                    files,
                    attempts,
                });
            }
            Err(e) => debug!("stemcell {product_slug} {version} unavailable: {e}"),
        }
    }

    Err(StemcellError::ResolutionExhausted {
        product_slug: product_slug.to_string(),
        version: criteria.version.clone(),
        glob,
    })
}
