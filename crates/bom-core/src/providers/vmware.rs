//! Files pulled through the containerized VMware download tool.
//!
//! The tool runs as `{image} get {name}` with the destination bind-mounted at
//! `/vmwfiles`. Credentials reach the container through environment
//! variables, never the command line. Past the soft timeout the run is left
//! going in the background and acquisition reports [`Acquired::Pending`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bom_schema::ArtifactDescriptor;
use tracing::{info, warn};

use super::{Acquired, AcquisitionError, Provider, RunContext};
use crate::io::process::{self, Invocation, ProcessError, SoftWait};

pub const DEFAULT_TOOL_IMAGE: &str = "apnex/myvmw";
pub const DEFAULT_SOFT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const MOUNT_POINT: &str = "/vmwfiles";

#[derive(Debug, Clone)]
pub struct VmwareProvider {
    program: String,
    image: String,
    soft_timeout: Duration,
}

impl Default for VmwareProvider {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            image: DEFAULT_TOOL_IMAGE.to_string(),
            soft_timeout: DEFAULT_SOFT_TIMEOUT,
        }
    }
}

impl VmwareProvider {
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_soft_timeout(mut self, timeout: Duration) -> Self {
        self.soft_timeout = timeout;
        self
    }

    /// The engine invocation running the tool for `descriptor`.
    pub fn invocation(
        &self,
        ctx: &RunContext,
        descriptor: &ArtifactDescriptor,
        dest: &Path,
    ) -> Result<Invocation, AcquisitionError> {
        let (user, password) = ctx.vmware_credentials()?;
        let mut inv = Invocation::new(&self.program)
            .args(["run", "--rm", "-e", "VMWUSER", "-e", "VMWPASS"])
            .env("VMWUSER", user.expose())
            .env("VMWPASS", password.expose());

        if let Some(family) = descriptor.product_family.as_deref().filter(|s| !s.is_empty()) {
            inv = inv.args(["-e", "VMW_PRODUCT_FAMILY"]).env("VMW_PRODUCT_FAMILY", family);
        }
        if let Some(slug) = descriptor.product_slug.as_deref().filter(|s| !s.is_empty()) {
            inv = inv.args(["-e", "VMW_PRODUCT_SLUG"]).env("VMW_PRODUCT_SLUG", slug);
        }

        Ok(inv
            .arg("-v")
            .arg(format!("{}:{MOUNT_POINT}", dest.display()))
            .arg(&self.image)
            .args(["get", descriptor.name.as_str()]))
    }
}

#[async_trait]
impl Provider for VmwareProvider {
    async fn acquire(
        &self,
        ctx: &RunContext,
        descriptor: &ArtifactDescriptor,
        dest: &Path,
    ) -> Result<Acquired, AcquisitionError> {
        let inv = self.invocation(ctx, descriptor, dest)?;
        let timeout = self.soft_timeout;
        let name = descriptor.name.clone();

        info!("Downloading {name} with {}", self.image);
        let waiting = inv.clone();
        let outcome =
            tokio::task::spawn_blocking(move || process::run_with_soft_timeout(&waiting, timeout))
                .await??;

        match outcome {
            SoftWait::Finished(status) if status.success() => {
                info!("Downloaded {name}");
                Ok(Acquired::Complete)
            }
            SoftWait::Finished(status) => Err(ProcessError::Failed {
                command: inv.to_string(),
                status,
                stderr: String::new(),
            }
            .into()),
            SoftWait::StillRunning => {
                warn!(
                    "download of {name} exceeded {}s, still attempting to finish in background",
                    timeout.as_secs()
                );
                Ok(Acquired::Pending)
            }
        }
    }
}
