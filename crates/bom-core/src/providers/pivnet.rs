//! Vendor-portal artifacts: plain releases and tiles.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bom_schema::{ArtifactDescriptor, MissingField};
use tracing::info;
use walkdir::WalkDir;

use super::{Acquired, AcquisitionError, Provider, RunContext};
use crate::pivnet::{ReleaseRequest, VendorPortal};
use crate::stemcell::{self, StemcellError};

fn release_fields(descriptor: &ArtifactDescriptor) -> Result<(&str, &str), MissingField> {
    let missing = |field| MissingField {
        artifact: descriptor.name.clone(),
        resource_type: descriptor.resource_type,
        field,
    };
    Ok((
        descriptor
            .product_slug
            .as_deref()
            .ok_or_else(|| missing("productSlug"))?,
        descriptor.version.as_deref().ok_or_else(|| missing("version"))?,
    ))
}

/// A non-tile release whose globs must select exactly one file. That file is
/// stored as `dest/{name}`.
pub struct PivnetReleaseProvider {
    portal: Arc<dyn VendorPortal>,
}

impl PivnetReleaseProvider {
    pub fn new(portal: Arc<dyn VendorPortal>) -> Self {
        Self { portal }
    }
}

#[async_trait]
impl Provider for PivnetReleaseProvider {
    async fn acquire(
        &self,
        ctx: &RunContext,
        descriptor: &ArtifactDescriptor,
        dest: &Path,
    ) -> Result<Acquired, AcquisitionError> {
        let (product_slug, version) = release_fields(descriptor)?;
        let globs = descriptor.glob_patterns();
        let session = self.portal.login(ctx.pivnet_token()?).await?;

        // Download beside the final name so the rename stays on one filesystem.
        let scratch = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(dest)?;
        let files = session
            .download(
                &ReleaseRequest {
                    product_slug,
                    version,
                    globs: &globs,
                },
                scratch.path(),
            )
            .await?;

        match files.as_slice() {
            [file] => {
                let target = dest.join(&descriptor.name);
                std::fs::rename(file, &target)?;
                info!("Stored {} as {}", file.display(), target.display());
                Ok(Acquired::Complete)
            }
            [] => Err(AcquisitionError::NoMatchingFiles {
                product_slug: product_slug.to_string(),
                version: version.to_string(),
                globs,
            }),
            many => Err(AcquisitionError::AmbiguousMatch {
                count: many.len(),
                files: many
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect(),
            }),
        }
    }
}

/// A tile plus its companion stemcell, left side by side in `dest` for the
/// dispatcher to pack.
pub struct PivnetTileProvider {
    portal: Arc<dyn VendorPortal>,
}

impl PivnetTileProvider {
    pub fn new(portal: Arc<dyn VendorPortal>) -> Self {
        Self { portal }
    }
}

#[async_trait]
impl Provider for PivnetTileProvider {
    async fn acquire(
        &self,
        ctx: &RunContext,
        descriptor: &ArtifactDescriptor,
        dest: &Path,
    ) -> Result<Acquired, AcquisitionError> {
        let (product_slug, version) = release_fields(descriptor)?;
        let iaas = ctx.iaas()?;
        let globs = descriptor.glob_patterns();
        let session = self.portal.login(ctx.pivnet_token()?).await?;

        let files = session
            .download(
                &ReleaseRequest {
                    product_slug,
                    version,
                    globs: &globs,
                },
                dest,
            )
            .await?;

        let tile = files
            .iter()
            .find(|p| p.extension().is_some_and(|e| e == "pivotal"))
            .cloned()
            .ok_or(StemcellError::MissingTile)?;
        let criteria = tokio::task::spawn_blocking(move || stemcell::read_criteria(&tile)).await??;

        let resolved = stemcell::resolve(session.as_ref(), &criteria, iaas, dest).await?;
        info!(
            "Bundled {product_slug} {version} with {} {}",
            resolved.product_slug, resolved.version
        );

        let removed = remove_empty_files(dest)?;
        if removed > 0 {
            info!("Removed {removed} empty files");
        }
        Ok(Acquired::Complete)
    }
}

/// Delete zero-byte regular files under `dir`, returning how many were removed.
pub fn remove_empty_files(dir: &Path) -> std::io::Result<usize> {
    let empty: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.metadata().is_ok_and(|m| m.len() == 0))
        .map(walkdir::DirEntry::into_path)
        .collect();
    for path in &empty {
        std::fs::remove_file(path)?;
    }
    Ok(empty.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivnet::ReleaseSource;
    use bom_schema::{BillOfMaterials, ResourceType, Secret};
    use std::io::Write;

    /// Serves a fixed file list for one slug and nothing else.
    struct FakePortal {
        slug: &'static str,
        files: Vec<(&'static str, Vec<u8>)>,
    }

    struct FakeSession {
        slug: &'static str,
        files: Vec<(&'static str, Vec<u8>)>,
    }

    #[async_trait]
    impl VendorPortal for FakePortal {
        async fn login(&self, token: &Secret) -> Result<Box<dyn ReleaseSource>, AcquisitionError> {
            assert_eq!(token.expose(), "refresh");
            Ok(Box::new(FakeSession {
                slug: self.slug,
                files: self.files.clone(),
            }))
        }
    }

    #[async_trait]
    impl ReleaseSource for FakeSession {
        async fn download(
            &self,
            request: &ReleaseRequest<'_>,
            dest: &Path,
        ) -> Result<Vec<PathBuf>, AcquisitionError> {
            if request.product_slug != self.slug {
                return Err(AcquisitionError::ReleaseNotFound {
                    product_slug: request.product_slug.to_string(),
                    version: request.version.to_string(),
                });
            }
            let patterns = crate::pivnet::compile_globs(request.globs)?;
            let mut written = Vec::new();
            for (name, body) in &self.files {
                if patterns.iter().any(|p| p.matches(name)) {
                    let path = dest.join(name);
                    std::fs::write(&path, body).unwrap();
                    written.push(path);
                }
            }
            Ok(written)
        }
    }

    fn ctx() -> RunContext {
        RunContext::from_bom(&BillOfMaterials {
            pivnet_token: Some(Secret::new("refresh")),
            iaas: Some("vsphere".to_string()),
            ..BillOfMaterials::default()
        })
    }

    fn release(name: &str, globs: &[&str]) -> ArtifactDescriptor {
        let mut d = ArtifactDescriptor::new(name, ResourceType::PivnetNonTile);
        d.product_slug = Some("om".to_string());
        d.version = Some("7.9.0".to_string());
        d.globs = globs.iter().map(ToString::to_string).collect();
        d
    }

    fn om_portal() -> Arc<dyn VendorPortal> {
        Arc::new(FakePortal {
            slug: "om",
            files: vec![
                ("om-linux-7.9.0", b"linux".to_vec()),
                ("om-darwin-7.9.0", b"darwin".to_vec()),
            ],
        })
    }

    #[tokio::test]
    async fn test_single_match_is_renamed_to_artifact_name() {
        let dir = tempfile::tempdir().unwrap();
        PivnetReleaseProvider::new(om_portal())
            .acquire(&ctx(), &release("om", &["om-linux-*"]), dir.path())
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("om")).unwrap(), b"linux");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_multiple_matches_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = PivnetReleaseProvider::new(om_portal())
            .acquire(&ctx(), &release("om", &["om-*"]), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::AmbiguousMatch { count: 2, .. }));
        assert!(!dir.path().join("om").exists());
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_login() {
        let dir = tempfile::tempdir().unwrap();
        let err = PivnetReleaseProvider::new(om_portal())
            .acquire(&RunContext::default(), &release("om", &[]), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::MissingSetting("pivnet_token")));
    }

    fn tile_bytes(descriptor: &str) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file(
            "metadata/p-rabbitmq.yml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        zip.write_all(descriptor.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    struct TilePortal;

    #[async_trait]
    impl VendorPortal for TilePortal {
        async fn login(&self, _: &Secret) -> Result<Box<dyn ReleaseSource>, AcquisitionError> {
            Ok(Box::new(TileSession))
        }
    }

    struct TileSession;

    #[async_trait]
    impl ReleaseSource for TileSession {
        async fn download(
            &self,
            request: &ReleaseRequest<'_>,
            dest: &Path,
        ) -> Result<Vec<PathBuf>, AcquisitionError> {
            let (name, body) = match (request.product_slug, request.version) {
                ("p-rabbitmq", "1.15.3") => (
                    "p-rabbitmq-1.15.3.pivotal".to_string(),
                    tile_bytes("stemcell_criteria:\n  os: ubuntu-xenial\n  version: '170'\n"),
                ),
                ("stemcells-ubuntu-xenial", "170.25") => {
                    assert_eq!(request.globs, ["*vsphere*"]);
                    (
                        "bosh-stemcell-170.25-vsphere-esxi-ubuntu-xenial-go_agent.tgz".to_string(),
                        b"stemcell".to_vec(),
                    )
                }
                (slug, version) => {
                    return Err(AcquisitionError::ReleaseNotFound {
                        product_slug: slug.to_string(),
                        version: version.to_string(),
                    });
                }
            };
            let path = dest.join(name);
            std::fs::write(&path, body).unwrap();
            // Portal downloads sometimes leave empty placeholder files.
            std::fs::write(dest.join("placeholder"), b"").unwrap();
            Ok(vec![path])
        }
    }

    #[tokio::test]
    async fn test_tile_bundles_stemcell_and_drops_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = ArtifactDescriptor::new("p-rabbitmq.tgz", ResourceType::PivnetTile);
        d.product_slug = Some("p-rabbitmq".to_string());
        d.version = Some("1.15.3".to_string());

        PivnetTileProvider::new(Arc::new(TilePortal))
            .acquire(&ctx(), &d, dir.path())
            .await
            .unwrap();

        assert!(dir.path().join("p-rabbitmq-1.15.3.pivotal").is_file());
        assert!(
            dir.path()
                .join("bosh-stemcell-170.25-vsphere-esxi-ubuntu-xenial-go_agent.tgz")
                .is_file()
        );
        assert!(!dir.path().join("placeholder").exists());
    }

    #[test]
    fn test_remove_empty_files_keeps_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/empty"), b"").unwrap();
        std::fs::write(dir.path().join("full"), b"x").unwrap();

        assert_eq!(remove_empty_files(dir.path()).unwrap(), 1);
        assert!(dir.path().join("sub").is_dir());
        assert!(dir.path().join("full").is_file());
    }
}
