//! The Bill of Materials: the ordered artifact list plus run-wide secrets.
//!
//! Parsing is strict and all-or-nothing. Unknown keys anywhere in the
//! document reject it, and a structurally valid document is still rejected
//! if any artifact lacks a field its resource type needs. The run-wide
//! secrets are only checked under [`Validation::Full`], since publishing
//! and rendering resources never use them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::{ArtifactDescriptor, MissingField, ResourceType};

/// Errors produced while loading a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("unable to read bom {path}: {source}")]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The document is not valid YAML or does not match the schema.
    #[error("unable to parse bom: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An artifact lacks a field its resource type requires.
    #[error(transparent)]
    MissingField(#[from] MissingField),

    /// A run-wide setting needed by at least one artifact is absent.
    #[error("bom setting '{setting}' is required by {resource_type} artifact '{artifact}'")]
    MissingSetting {
        /// Manifest key of the setting.
        setting: &'static str,
        /// First artifact needing it.
        artifact: String,
        /// That artifact's resource type.
        resource_type: ResourceType,
    },
}

/// How much of a parsed manifest is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    /// Artifact fields plus every run-wide setting acquisition needs.
    #[default]
    Full,
    /// Artifact fields only. Enough to map artifacts to paths and keys.
    Layout,
}

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a raw credential.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw credential, for handing to the system that needs it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the credential is blank.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Root of the manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillOfMaterials {
    /// Artifacts, in the order they are acquired and uploaded.
    #[serde(default)]
    pub bits: Vec<ArtifactDescriptor>,

    /// Vendor-portal API token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivnet_token: Option<Secret>,

    /// VMware download tool user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub myvmware_user: Option<Secret>,

    /// VMware download tool password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub myvmware_password: Option<Secret>,

    /// Infrastructure tag selecting the stemcell variant (e.g. `vsphere`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iaas: Option<String>,
}

impl BillOfMaterials {
    /// Parse and validate a YAML manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] for malformed documents or unknown
    /// keys, and the validation errors of [`BillOfMaterials::validate`].
    pub fn parse(yaml: &str) -> Result<Self, ManifestError> {
        Self::parse_with(yaml, Validation::Full)
    }

    /// Parse a YAML manifest and apply the given level of validation.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] for malformed documents or unknown
    /// keys, then the errors of [`BillOfMaterials::validate_artifacts`] or
    /// [`BillOfMaterials::validate`] depending on `validation`.
    pub fn parse_with(yaml: &str, validation: Validation) -> Result<Self, ManifestError> {
        let bom: Self = serde_yaml::from_str(yaml)?;
        match validation {
            Validation::Full => bom.validate()?,
            Validation::Layout => bom.validate_artifacts()?,
        }
        Ok(bom)
    }

    /// Read, parse, and validate a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] if the file cannot be read, otherwise
    /// the errors of [`BillOfMaterials::parse`].
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        Self::from_file_with(path, Validation::Full)
    }

    /// Read and parse a manifest file with the given level of validation.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] if the file cannot be read, otherwise
    /// the errors of [`BillOfMaterials::parse_with`].
    pub fn from_file_with(path: &Path, validation: Validation) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_with(&content, validation)
    }

    /// Check only the fields each artifact's resource type requires.
    ///
    /// # Errors
    ///
    /// Returns the first [`ManifestError::MissingField`], in manifest order.
    pub fn validate_artifacts(&self) -> Result<(), ManifestError> {
        for bit in &self.bits {
            bit.validate()?;
        }
        Ok(())
    }

    /// Check per-artifact required fields and the run-wide settings the
    /// artifacts depend on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ManifestError::MissingField`] or
    /// [`ManifestError::MissingSetting`] found, in manifest order.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let missing_secret =
            |secret: Option<&Secret>| secret.is_none_or(Secret::is_empty);

        for bit in &self.bits {
            bit.validate()?;

            let missing_setting = match bit.resource_type {
                ResourceType::PivnetNonTile if missing_secret(self.pivnet_token.as_ref()) => {
                    Some("pivnet_token")
                }
                ResourceType::PivnetTile if missing_secret(self.pivnet_token.as_ref()) => {
                    Some("pivnet_token")
                }
                ResourceType::PivnetTile if self.iaas().is_none() => Some("iaas"),
                ResourceType::Vmware if missing_secret(self.myvmware_user.as_ref()) => {
                    Some("myvmware_user")
                }
                ResourceType::Vmware if missing_secret(self.myvmware_password.as_ref()) => {
                    Some("myvmware_password")
                }
                _ => None,
            };

            if let Some(setting) = missing_setting {
                return Err(ManifestError::MissingSetting {
                    setting,
                    artifact: bit.name.clone(),
                    resource_type: bit.resource_type,
                });
            }
        }
        Ok(())
    }

    /// The infrastructure tag, if set and non-blank.
    pub fn iaas(&self) -> Option<&str> {
        self.iaas.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
pivnet_token: abc123
myvmware_user: ops@example.com
myvmware_password: hunter2
iaas: vsphere
bits:
  - name: jq-linux64
    contentType: application/octet-stream
    resourceType: file
    url: https://github.com/jqlang/jq/releases/download/jq-1.7/jq-linux64
  - name: om
    resourceType: pivnet-non-tile
    productSlug: om
    version: 7.9.0
    globs:
      - om-linux-*
  - name: p-rabbitmq.tgz
    resourceType: pivnet-tile
    productSlug: p-rabbitmq
    version: 1.15.3
  - name: nginx.tgz
    resourceType: docker
    imageName: nginx
    tag: '1.25'
  - name: concourse-pipelines.tgz
    resourceType: git
    gitRepo: https://github.com/pivotalservices/concourse-pipelines
    branch: master
  - name: VMware-ovftool.bundle
    resourceType: vmware
    productFamily: vmware_ovftool
";

    #[test]
    fn test_parse_full_manifest() {
        let bom = BillOfMaterials::parse(SAMPLE).unwrap();
        assert_eq!(bom.bits.len(), 6);
        assert_eq!(bom.iaas(), Some("vsphere"));
        assert_eq!(bom.pivnet_token.as_ref().unwrap().expose(), "abc123");

        let types: Vec<_> = bom.bits.iter().map(|b| b.resource_type).collect();
        assert_eq!(types, ResourceType::ALL.to_vec());
        assert_eq!(bom.bits[1].globs, vec!["om-linux-*"]);
        assert_eq!(bom.bits[3].tag.as_deref(), Some("1.25"));
    }

    #[test]
    fn test_unknown_top_level_key_rejects_manifest() {
        let yaml = "bits: []\npivnet_tokn: oops\n";
        assert!(matches!(
            BillOfMaterials::parse(yaml),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_descriptor_key_rejects_manifest() {
        let yaml = r"
bits:
  - name: a.zip
    resourceType: file
    url: http://example.com/a.zip
    checksum: deadbeef
";
        assert!(matches!(
            BillOfMaterials::parse(yaml),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_resource_type_is_named() {
        let yaml = "bits:\n  - name: chart.tgz\n    resourceType: helm\n";
        let err = BillOfMaterials::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("helm"), "{err}");
    }

    #[test]
    fn test_missing_required_field() {
        let yaml = "bits:\n  - name: a.zip\n    resourceType: file\n";
        let err = BillOfMaterials::parse(yaml).unwrap_err();
        match err {
            ManifestError::MissingField(m) => {
                assert_eq!(m.field, "url");
                assert_eq!(m.artifact, "a.zip");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_tile_requires_token_and_iaas() {
        let yaml = r"
pivnet_token: abc
bits:
  - name: p.tgz
    resourceType: pivnet-tile
    productSlug: p
    version: '1.0'
";
        let err = BillOfMaterials::parse(yaml).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingSetting { setting: "iaas", .. }
        ));

        let yaml = yaml.replace("pivnet_token: abc", "iaas: gcp");
        let err = BillOfMaterials::parse(&yaml).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingSetting {
                setting: "pivnet_token",
                ..
            }
        ));
    }

    #[test]
    fn test_layout_validation_skips_run_wide_settings() {
        let yaml = r"
bits:
  - name: p.tgz
    resourceType: pivnet-tile
    productSlug: p
    version: '1.0'
  - name: VMware-ovftool.bundle
    resourceType: vmware
";
        assert!(matches!(
            BillOfMaterials::parse(yaml),
            Err(ManifestError::MissingSetting { .. })
        ));
        let bom = BillOfMaterials::parse_with(yaml, Validation::Layout).unwrap();
        assert_eq!(bom.bits.len(), 2);

        let missing = "bits:\n  - name: a.zip\n    resourceType: file\n";
        assert!(matches!(
            BillOfMaterials::parse_with(missing, Validation::Layout),
            Err(ManifestError::MissingField(_))
        ));
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let bom = BillOfMaterials::parse(SAMPLE).unwrap();
        let rendered = format!("{bom:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("abc123"));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = BillOfMaterials::from_file(&dir.path().join("bom.yml")).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }

    #[test]
    fn test_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bom.yml");
        std::fs::write(&path, SAMPLE).unwrap();
        let bom = BillOfMaterials::from_file(&path).unwrap();
        assert_eq!(bom.bits[0].name, "jq-linux64");
    }
}
