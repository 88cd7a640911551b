//! Container images flattened to a root filesystem.
//!
//! Layout under the destination:
//!
//! ```text
//! {imageName}/metadata.json
//! {imageName}/rootfs/...
//! ```
//!
//! The image is pulled if the local engine lacks it, a stopped container is
//! created from it, and the container's exported filesystem is streamed
//! straight into `rootfs/`. The container is removed afterwards whether or
//! not the export succeeded.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bom_schema::{ArtifactDescriptor, MissingField};
use serde::Serialize;
use tracing::{info, warn};

use super::{Acquired, AcquisitionError, Provider, RunContext};
use crate::io::archive;
use crate::io::process::{self, Invocation};

const DEFAULT_PATH: &str = "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Runtime metadata written next to the flattened root filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageMetadata {
    pub user: String,
    pub env: Vec<String>,
}

impl Default for ImageMetadata {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            env: vec![
                DEFAULT_PATH.to_string(),
                "LANG=C".to_string(),
                "HOME=/root".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct DockerProvider {
    program: String,
}

impl Default for DockerProvider {
    fn default() -> Self {
        Self::with_program("docker")
    }
}

impl DockerProvider {
    /// Use `program` as the container engine CLI.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn docker(&self) -> Invocation {
        Invocation::new(&self.program)
    }

    fn ensure_image(&self, reference: &str) -> Result<(), AcquisitionError> {
        let inspect = self.docker().args(["image", "inspect", reference]);
        if process::succeeds(&inspect)? {
            info!("Image {reference} already present");
            return Ok(());
        }
        info!("Pulling {reference}");
        process::run(&self.docker().args(["pull", reference]))?;
        Ok(())
    }

    fn export_rootfs(&self, container: &str, rootfs: &Path) -> Result<usize, AcquisitionError> {
        let export = self.docker().args(["export", container]);
        let mut child = export.spawn_piped()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("export stdout was not captured"))?;

        let target = rootfs.to_path_buf();
        let copier = std::thread::spawn(move || archive::unpack_tar(stdout, &target, 0));
        let output = child.wait_with_output()?;
        let unpacked = copier
            .join()
            .map_err(|_| std::io::Error::other("rootfs unpack thread panicked"))?;

        if !output.status.success() {
            return Err(export.failure(&output).into());
        }
        Ok(unpacked?)
    }

    fn flatten(&self, reference: &str, image_dir: &Path) -> Result<usize, AcquisitionError> {
        self.ensure_image(reference)?;

        let created = process::run(&self.docker().args(["create", reference]))?;
        let container = String::from_utf8_lossy(&created.stdout).trim().to_string();

        let result = self.export_rootfs(&container, &image_dir.join("rootfs"));
        if let Err(e) = process::run(&self.docker().args(["rm", container.as_str()])) {
            warn!("failed to remove container {container}: {e}");
        }
        result
    }
}

/// Write `metadata.json` into `image_dir`.
pub fn write_metadata(image_dir: &Path) -> Result<PathBuf, AcquisitionError> {
    let path = image_dir.join("metadata.json");
    let json = serde_json::to_vec(&ImageMetadata::default())
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    fs::write(&path, json)?;
    Ok(path)
}

#[async_trait]
impl Provider for DockerProvider {
    async fn acquire(
        &self,
        _ctx: &RunContext,
        descriptor: &ArtifactDescriptor,
        dest: &Path,
    ) -> Result<Acquired, AcquisitionError> {
        let missing = || MissingField {
            artifact: descriptor.name.clone(),
            resource_type: descriptor.resource_type,
            field: "imageName",
        };
        let image_name = descriptor.image_name.as_deref().ok_or_else(missing)?;
        let reference = descriptor.image_reference().ok_or_else(missing)?;

        let image_dir = dest.join(image_name);
        fs::create_dir_all(image_dir.join("rootfs"))?;
        write_metadata(&image_dir)?;

        let provider = self.clone();
        let entries =
            tokio::task::spawn_blocking(move || provider.flatten(&reference, &image_dir)).await??;
        info!("Exported {entries} entries of {image_name}");
        Ok(Acquired::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_metadata(dir.path()).unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "user": "root",
                "env": [DEFAULT_PATH, "LANG=C", "HOME=/root"],
            })
        );
    }

    #[cfg(unix)]
    mod fake_engine {
        use super::*;
        use bom_schema::ResourceType;
        use std::os::unix::fs::PermissionsExt;

        fn rootfs_tar(path: &Path) {
            let mut builder = tar::Builder::new(fs::File::create(path).unwrap());
            let mut header = tar::Header::new_gnu();
            let body = b"NAME=alpine\n";
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "etc/os-release", &body[..])
                .unwrap();
            builder.finish().unwrap();
        }

        /// Writes a stand-in engine CLI that logs its arguments.
        fn engine(dir: &Path, export_tar: &Path, log: &Path) -> PathBuf {
            let script = format!(
                "#!/bin/sh\necho \"$@\" >> '{log}'\ncase \"$1\" in\n  image) exit 1 ;;\n  pull) exit 0 ;;\n  create) echo c0ffee ;;\n  export) cat '{tar}' ;;\n  rm) exit 0 ;;\n  *) exit 2 ;;\nesac\n",
                log = log.display(),
                tar = export_tar.display(),
            );
            let path = dir.join("engine");
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_flattens_image_into_rootfs() {
            let tools = tempfile::tempdir().unwrap();
            let export_tar = tools.path().join("export.tar");
            rootfs_tar(&export_tar);
            let log = tools.path().join("calls.log");
            let program = engine(tools.path(), &export_tar, &log);

            let mut d = ArtifactDescriptor::new("nginx.tgz", ResourceType::Docker);
            d.image_name = Some("nginx".to_string());
            d.tag = Some("1.25".to_string());

            let dest = tempfile::tempdir().unwrap();
            DockerProvider::with_program(program.display().to_string())
                .acquire(&RunContext::default(), &d, dest.path())
                .await
                .unwrap();

            let image_dir = dest.path().join("nginx");
            assert!(image_dir.join("metadata.json").is_file());
            assert_eq!(
                fs::read_to_string(image_dir.join("rootfs/etc/os-release")).unwrap(),
                "NAME=alpine\n"
            );

            let calls = fs::read_to_string(&log).unwrap();
            let calls: Vec<_> = calls.lines().collect();
            assert_eq!(
                calls,
                vec![
                    "image inspect nginx:1.25",
                    "pull nginx:1.25",
                    "create nginx:1.25",
                    "export c0ffee",
                    "rm c0ffee",
                ]
            );
        }
    }
}
