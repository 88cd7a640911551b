//! Acquisition providers, one per resource type.
//!
//! A provider materializes exactly one artifact into a destination
//! directory. Providers for single-file types write `dest/{name}` directly;
//! providers for tree-producing types fill `dest` with the tree and leave
//! packing to the dispatcher.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bom_schema::{ArtifactDescriptor, BillOfMaterials, MissingField, ResourceType, Secret};
use reqwest::Client;
use thiserror::Error;

use crate::io::archive::PackError;
use crate::io::download::DownloadError;
use crate::io::process::ProcessError;
use crate::pivnet::{Pivnet, PivnetConfig, VendorPortal};
use crate::stemcell::StemcellError;

pub mod docker;
pub mod file;
pub mod git;
pub mod pivnet;
pub mod vmware;

pub use docker::DockerProvider;
pub use file::FileProvider;
pub use git::GitProvider;
pub use pivnet::{PivnetReleaseProvider, PivnetTileProvider};
pub use vmware::VmwareProvider;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Archive(#[from] PackError),

    #[error(transparent)]
    Stemcell(#[from] StemcellError),

    #[error(transparent)]
    MissingField(#[from] MissingField),

    #[error("bom setting '{0}' is not set")]
    MissingSetting(&'static str),

    #[error("vendor portal rejected the token: {0}")]
    Authentication(String),

    #[error("no release {version} of {product_slug}")]
    ReleaseNotFound {
        product_slug: String,
        version: String,
    },

    #[error("no files of {product_slug} {version} match {globs:?}")]
    NoMatchingFiles {
        product_slug: String,
        version: String,
        globs: Vec<String>,
    },

    #[error("globs matched {count} files, expected exactly one: {files:?}")]
    AmbiguousMatch { count: usize, files: Vec<String> },

    #[error("invalid glob '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Run-wide settings from the manifest that providers may need.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pivnet_token: Option<Secret>,
    vmware_user: Option<Secret>,
    vmware_password: Option<Secret>,
    iaas: Option<String>,
}

impl RunContext {
    pub fn from_bom(bom: &BillOfMaterials) -> Self {
        Self {
            pivnet_token: bom.pivnet_token.clone(),
            vmware_user: bom.myvmware_user.clone(),
            vmware_password: bom.myvmware_password.clone(),
            iaas: bom.iaas().map(str::to_owned),
        }
    }

    fn secret<'a>(
        value: Option<&'a Secret>,
        setting: &'static str,
    ) -> Result<&'a Secret, AcquisitionError> {
        value
            .filter(|s| !s.is_empty())
            .ok_or(AcquisitionError::MissingSetting(setting))
    }

    pub fn pivnet_token(&self) -> Result<&Secret, AcquisitionError> {
        Self::secret(self.pivnet_token.as_ref(), "pivnet_token")
    }

    pub fn vmware_credentials(&self) -> Result<(&Secret, &Secret), AcquisitionError> {
        Ok((
            Self::secret(self.vmware_user.as_ref(), "myvmware_user")?,
            Self::secret(self.vmware_password.as_ref(), "myvmware_password")?,
        ))
    }

    pub fn iaas(&self) -> Result<&str, AcquisitionError> {
        self.iaas
            .as_deref()
            .ok_or(AcquisitionError::MissingSetting("iaas"))
    }
}

/// How far an acquisition got before the provider returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The artifact is fully written to its destination.
    Complete,
    /// A download outlived its soft timeout and is still writing in the
    /// background. The output may not exist yet.
    Pending,
}

/// Materializes one artifact of a given resource type.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Acquire `descriptor` into `dest`, which already exists.
    async fn acquire(
        &self,
        ctx: &RunContext,
        descriptor: &ArtifactDescriptor,
        dest: &Path,
    ) -> Result<Acquired, AcquisitionError>;
}

/// Resource type to provider lookup used by the dispatcher.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<ResourceType, Box<dyn Provider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.providers.keys().map(|rt| rt.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("types", &types)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the production provider for every resource type.
    pub fn standard(client: Client, pivnet: PivnetConfig) -> Self {
        let portal: Arc<dyn VendorPortal> = Arc::new(Pivnet::new(client.clone(), pivnet));
        let mut registry = Self::new();
        for resource_type in ResourceType::ALL {
            let provider: Box<dyn Provider> = match resource_type {
                ResourceType::File => Box::new(FileProvider::new(client.clone())),
                ResourceType::PivnetNonTile => {
                    Box::new(PivnetReleaseProvider::new(Arc::clone(&portal)))
                }
                ResourceType::PivnetTile => Box::new(PivnetTileProvider::new(Arc::clone(&portal))),
                ResourceType::Docker => Box::new(DockerProvider::default()),
                ResourceType::Git => Box::new(GitProvider::new(client.clone())),
                ResourceType::Vmware => Box::new(VmwareProvider::default()),
            };
            registry.providers.insert(resource_type, provider);
        }
        registry
    }

    pub fn register(&mut self, resource_type: ResourceType, provider: impl Provider + 'static) {
        self.providers.insert(resource_type, Box::new(provider));
    }

    pub fn get(&self, resource_type: ResourceType) -> Option<&dyn Provider> {
        self.providers.get(&resource_type).map(|p| &**p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_every_type() {
        let registry = ProviderRegistry::standard(Client::new(), PivnetConfig::default());
        for rt in ResourceType::ALL {
            assert!(registry.get(rt).is_some(), "no provider for {rt}");
        }
    }

    #[test]
    fn test_registry_debug_lists_sorted_types() {
        let mut registry = ProviderRegistry::new();
        registry.register(ResourceType::Git, GitProvider::new(Client::new()));
        registry.register(ResourceType::File, FileProvider::new(Client::new()));
        assert_eq!(
            format!("{registry:?}"),
            r#"ProviderRegistry { types: ["file", "git"] }"#
        );
    }

    #[test]
    fn test_context_requires_settings() {
        let ctx = RunContext::default();
        assert!(matches!(
            ctx.pivnet_token(),
            Err(AcquisitionError::MissingSetting("pivnet_token"))
        ));
        assert!(matches!(
            ctx.iaas(),
            Err(AcquisitionError::MissingSetting("iaas"))
        ));

        let bom = BillOfMaterials {
            myvmware_user: Some(Secret::new("ops")),
            myvmware_password: Some(Secret::new(" ")),
            ..BillOfMaterials::default()
        };
        assert!(matches!(
            RunContext::from_bom(&bom).vmware_credentials(),
            Err(AcquisitionError::MissingSetting("myvmware_password"))
        ));
    }
}
