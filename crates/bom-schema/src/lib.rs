//! Shared types for bom: the Bill of Materials manifest and the path
//! mapping that both the download and upload stages rely on.

pub mod manifest;
pub mod path;
pub mod types;

// Re-exports
pub use manifest::{BillOfMaterials, ManifestError, Secret, Validation};
pub use path::{ResolvedLocation, locate, relative_dir, relative_path};
pub use types::{ArtifactDescriptor, MissingField, ResourceType, UnknownResourceType};

/// Media type applied to uploads whose descriptor declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
