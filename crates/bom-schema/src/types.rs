//! Artifact descriptors and the closed set of resource types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of source an artifact is acquired from.
///
/// The set is closed: adding a source means adding a variant here, and every
/// exhaustive `match` in the workspace then points at the code that needs to
/// learn about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    /// A single file fetched over HTTP(S).
    File,
    /// A vendor-portal release that is not a tile (CLIs, buildpacks, ...).
    PivnetNonTile,
    /// A vendor-portal tile, bundled with its matching stemcell.
    PivnetTile,
    /// A container image flattened into a root filesystem.
    Docker,
    /// A snapshot of a source-control branch.
    Git,
    /// A file pulled with the VMware download tool.
    Vmware,
}

impl ResourceType {
    /// Every resource type, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::File,
        Self::PivnetNonTile,
        Self::PivnetTile,
        Self::Docker,
        Self::Git,
        Self::Vmware,
    ];

    /// Manifest tag for this type (e.g. `pivnet-tile`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::PivnetNonTile => "pivnet-non-tile",
            Self::PivnetTile => "pivnet-tile",
            Self::Docker => "docker",
            Self::Git => "git",
            Self::Vmware => "vmware",
        }
    }

    /// Whether acquisition yields a directory tree that must be packed into
    /// the final archive, as opposed to the final file itself.
    pub const fn produces_tree(self) -> bool {
        match self {
            Self::PivnetTile | Self::Docker | Self::Git => true,
            Self::File | Self::PivnetNonTile | Self::Vmware => false,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown resource type tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported resource type '{0}'")]
pub struct UnknownResourceType(
    /// The rejected tag.
    pub String,
);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rt| rt.as_str() == s)
            .ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

/// One entry of the manifest's `bits` list.
///
/// Only the fields relevant to `resource_type` are meaningful; which ones are
/// required is checked by [`ArtifactDescriptor::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArtifactDescriptor {
    /// Final archive file name, also the artifact's identity.
    pub name: String,

    /// Media type sent with the upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Which provider acquires this artifact.
    pub resource_type: ResourceType,

    /// Download URL (`file`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Vendor-portal product slug (`pivnet-*`, optionally `vmware`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_slug: Option<String>,

    /// Vendor product family (`vmware`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_family: Option<String>,

    /// Release version (`pivnet-*`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Glob patterns selecting release files (`pivnet-*`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub globs: Vec<String>,

    /// Image repository (`docker`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,

    /// Image tag (`docker`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Repository base URL (`git`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,

    /// Branch or ref to snapshot (`git`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Basic-auth user (`git`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_user: Option<String>,

    /// Basic-auth password (`git`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_password: Option<String>,
}

/// A field required by an artifact's resource type is absent or blank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("artifact '{artifact}' ({resource_type}) is missing required field '{field}'")]
pub struct MissingField {
    /// Name of the offending artifact.
    pub artifact: String,
    /// Its resource type.
    pub resource_type: ResourceType,
    /// The manifest key that is missing.
    pub field: &'static str,
}

fn present(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

impl ArtifactDescriptor {
    /// Minimal descriptor with only the always-required fields set.
    pub fn new(name: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            resource_type,
            url: None,
            product_slug: None,
            product_family: None,
            version: None,
            globs: Vec::new(),
            image_name: None,
            tag: None,
            git_repo: None,
            branch: None,
            git_user: None,
            git_password: None,
        }
    }

    /// Check that every field required by `resource_type` is set.
    ///
    /// # Errors
    ///
    /// Returns [`MissingField`] for the first blank required field.
    pub fn validate(&self) -> Result<(), MissingField> {
        let missing = |field| MissingField {
            artifact: self.name.clone(),
            resource_type: self.resource_type,
            field,
        };

        if self.name.trim().is_empty() {
            return Err(missing("name"));
        }

        let required: Vec<(&'static str, Option<&str>)> = match self.resource_type {
            ResourceType::File => vec![("url", self.url.as_deref())],
            ResourceType::PivnetNonTile | ResourceType::PivnetTile => vec![
                ("productSlug", self.product_slug.as_deref()),
                ("version", self.version.as_deref()),
            ],
            ResourceType::Docker => vec![("imageName", self.image_name.as_deref())],
            ResourceType::Git => vec![
                ("gitRepo", self.git_repo.as_deref()),
                ("branch", self.branch.as_deref()),
            ],
            ResourceType::Vmware => Vec::new(),
        };

        match required.into_iter().find(|(_, value)| !present(*value)) {
            Some((field, _)) => Err(missing(field)),
            None => Ok(()),
        }
    }

    /// Glob patterns used to pick release files, with per-type defaults.
    pub fn glob_patterns(&self) -> Vec<String> {
        if !self.globs.is_empty() {
            return self.globs.clone();
        }
        match self.resource_type {
            ResourceType::PivnetTile => vec!["*.pivotal".to_string()],
            _ => vec!["*".to_string()],
        }
    }

    /// Full image reference, `imageName[:tag]`.
    pub fn image_reference(&self) -> Option<String> {
        let image = self.image_name.as_deref().filter(|s| !s.is_empty())?;
        Some(match self.tag.as_deref().filter(|t| !t.is_empty()) {
            Some(tag) => format!("{image}:{tag}"),
            None => image.to_string(),
        })
    }

    /// Declared content type, or [`crate::DEFAULT_CONTENT_TYPE`].
    pub fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(crate::DEFAULT_CONTENT_TYPE)
    }
}
