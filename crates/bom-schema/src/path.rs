//! Deterministic local and remote locations for an artifact.
//!
//! The packaging stage writes to the path returned here and the upload stage
//! reads from it and uploads under the same relative key, so both stages must
//! go through these functions rather than building paths themselves.
//!
//! ```text
//! resources/{resourceType}/{name}
//! resources/pivnet-tile/{productSlug}-tarball/{name}
//! ```

use std::path::{Path, PathBuf};

use crate::types::{ArtifactDescriptor, ResourceType};

/// Top-level directory (and key prefix) holding every artifact.
pub const RESOURCES_DIR: &str = "resources";

/// Relative directory of an artifact, `/`-separated.
pub fn relative_dir(descriptor: &ArtifactDescriptor) -> String {
    let rt = descriptor.resource_type;
    match rt {
        ResourceType::PivnetTile => format!(
            "{RESOURCES_DIR}/{rt}/{}-tarball",
            descriptor.product_slug.as_deref().unwrap_or_default()
        ),
        ResourceType::File
        | ResourceType::PivnetNonTile
        | ResourceType::Docker
        | ResourceType::Git
        | ResourceType::Vmware => format!("{RESOURCES_DIR}/{rt}"),
    }
}

/// Relative path of an artifact's archive, `/`-separated. This is also its
/// object key in the bucket.
pub fn relative_path(descriptor: &ArtifactDescriptor) -> String {
    format!("{}/{}", relative_dir(descriptor), descriptor.name)
}

/// Where an artifact lives on disk and in the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    /// Directory the artifact's archive is written into.
    pub local_dir: PathBuf,
    /// Full path of the archive.
    pub local_archive: PathBuf,
    /// Object key the archive is uploaded under.
    pub remote_key: String,
}

/// Resolve an artifact's locations under the bits root directory.
pub fn locate(descriptor: &ArtifactDescriptor, root: &Path) -> ResolvedLocation {
    let local_dir = relative_dir(descriptor)
        .split('/')
        .fold(root.to_path_buf(), |acc, part| acc.join(part));
    let local_archive = local_dir.join(&descriptor.name);
    ResolvedLocation {
        local_dir,
        local_archive,
        remote_key: relative_path(descriptor),
    }
}
