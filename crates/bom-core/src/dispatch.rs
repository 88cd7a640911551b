//! Ordered acquisition of every artifact in a manifest.
//!
//! Artifacts are processed one at a time in manifest order and the first
//! failure ends the run. Tree-producing types are acquired into a scratch
//! directory beside their archive, packed, and the scratch directory is
//! removed, so after a successful run each artifact directory holds exactly
//! its archive. A single-file download that outlives its soft timeout is
//! recorded as pending and the run moves on without waiting for it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use bom_schema::{ArtifactDescriptor, BillOfMaterials, ResourceType, locate};
use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

use crate::io::archive::{self, PackError};
use crate::providers::{Acquired, AcquisitionError, ProviderRegistry, RunContext};
use crate::reporter::Reporter;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unsupported resource type '{resource_type}' for artifact '{artifact}'")]
    UnsupportedResourceType {
        artifact: String,
        resource_type: ResourceType,
    },

    #[error("failed to acquire '{artifact}': {source}")]
    Acquisition {
        artifact: String,
        #[source]
        source: AcquisitionError,
    },

    #[error("failed to pack '{artifact}': {source}")]
    Pack {
        artifact: String,
        #[source]
        source: PackError,
    },

    #[error("'{artifact}' produced no file at {}", path.display())]
    MissingOutput { artifact: String, path: PathBuf },

    #[error("'{artifact}' was still downloading when its tree had to be packed")]
    Incomplete { artifact: String },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub archives: Vec<PathBuf>,
    /// Archives whose download is still running in the background.
    pub pending: Vec<PathBuf>,
}

/// Directory whose contents become the archive for a tree-producing type.
pub fn package_root(descriptor: &ArtifactDescriptor, staging: &Path) -> PathBuf {
    match (descriptor.resource_type, descriptor.image_name.as_deref()) {
        (ResourceType::Docker, Some(image)) => staging.join(image),
        _ => staging.to_path_buf(),
    }
}

pub struct Dispatcher<'a, R: Reporter> {
    registry: &'a ProviderRegistry,
    root: PathBuf,
    reporter: R,
}

impl<'a, R: Reporter> Dispatcher<'a, R> {
    pub fn new(registry: &'a ProviderRegistry, root: impl Into<PathBuf>, reporter: R) -> Self {
        Self {
            registry,
            root: root.into(),
            reporter,
        }
    }

    /// Acquire and package every artifact of `bom` under the root directory.
    pub async fn run(&self, bom: &BillOfMaterials) -> Result<DispatchSummary, DispatchError> {
        let start = Instant::now();
        let ctx = RunContext::from_bom(bom);
        let mut summary = DispatchSummary::default();

        self.reporter.section("Downloading");
        for descriptor in &bom.bits {
            match self.materialize(&ctx, descriptor).await {
                Ok((archive, Acquired::Complete)) => {
                    self.reporter.done(descriptor);
                    summary.archives.push(archive);
                }
                Ok((archive, Acquired::Pending)) => {
                    self.reporter.pending(descriptor, &archive);
                    summary.pending.push(archive);
                }
                Err(e) => {
                    self.reporter.failed(descriptor, &e.to_string());
                    return Err(e);
                }
            }
        }

        self.log_tree();
        self.reporter.summary(
            summary.archives.len(),
            "Downloaded",
            start.elapsed().as_secs_f64(),
        );
        Ok(summary)
    }

    async fn materialize(
        &self,
        ctx: &RunContext,
        descriptor: &ArtifactDescriptor,
    ) -> Result<(PathBuf, Acquired), DispatchError> {
        let location = locate(descriptor, &self.root);
        let provider = self.registry.get(descriptor.resource_type).ok_or_else(|| {
            DispatchError::UnsupportedResourceType {
                artifact: descriptor.name.clone(),
                resource_type: descriptor.resource_type,
            }
        })?;

        std::fs::create_dir_all(&location.local_dir).map_err(|source| DispatchError::Io {
            path: location.local_dir.clone(),
            source,
        })?;

        let acquisition_failed = |source| DispatchError::Acquisition {
            artifact: descriptor.name.clone(),
            source,
        };

        self.reporter.acquiring(descriptor);
        if !descriptor.resource_type.produces_tree() {
            let acquired = provider
                .acquire(ctx, descriptor, &location.local_dir)
                .await
                .map_err(acquisition_failed)?;
            if acquired == Acquired::Complete && !location.local_archive.is_file() {
                return Err(DispatchError::MissingOutput {
                    artifact: descriptor.name.clone(),
                    path: location.local_archive,
                });
            }
            return Ok((location.local_archive, acquired));
        }

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&location.local_dir)
            .map_err(|source| DispatchError::Io {
                path: location.local_dir.clone(),
                source,
            })?;
        let acquired = provider
            .acquire(ctx, descriptor, staging.path())
            .await
            .map_err(acquisition_failed)?;
        if acquired == Acquired::Pending {
            return Err(DispatchError::Incomplete {
                artifact: descriptor.name.clone(),
            });
        }

        let source_dir = package_root(descriptor, staging.path());
        let archive_path = location.local_archive.clone();
        let packed = tokio::task::spawn_blocking(move || archive::pack(&source_dir, &archive_path))
            .await
            .map_err(|e| DispatchError::Io {
                path: location.local_archive.clone(),
                source: std::io::Error::other(e),
            })?;
        let entries = packed.map_err(|source| DispatchError::Pack {
            artifact: descriptor.name.clone(),
            source,
        })?;
        self.reporter
            .packed(descriptor, &location.local_archive, entries);

        staging.close().map_err(|source| DispatchError::Io {
            path: location.local_dir.clone(),
            source,
        })?;
        Ok((location.local_archive, Acquired::Complete))
    }

    fn log_tree(&self) {
        for entry in WalkDir::new(&self.root).sort_by_file_name().into_iter().flatten() {
            info!("{}", entry.path().display());
        }
    }
}
