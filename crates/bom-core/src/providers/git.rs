//! Source-control branch snapshots.
//!
//! Fetches the host's `{gitRepo}/archive/{branch}.tar.gz` snapshot and
//! unpacks it with the wrapping `{repo}-{branch}/` directory stripped, so
//! the repository's files sit directly under the destination.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bom_schema::{ArtifactDescriptor, MissingField};
use reqwest::Client;
use tracing::info;

use super::{Acquired, AcquisitionError, Provider, RunContext};
use crate::io::archive;
use crate::io::download::DownloadRequest;

#[derive(Debug, Clone)]
pub struct GitProvider {
    client: Client,
}

impl GitProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Snapshot URL for a repository base URL and branch.
pub fn snapshot_url(git_repo: &str, branch: &str) -> String {
    let base = git_repo.trim_end_matches('/');
    let base = base.strip_suffix(".git").unwrap_or(base);
    format!("{base}/archive/{branch}.tar.gz")
}

#[async_trait]
impl Provider for GitProvider {
    async fn acquire(
        &self,
        _ctx: &RunContext,
        descriptor: &ArtifactDescriptor,
        dest: &Path,
    ) -> Result<Acquired, AcquisitionError> {
        let missing = |field| MissingField {
            artifact: descriptor.name.clone(),
            resource_type: descriptor.resource_type,
            field,
        };
        let repo = descriptor.git_repo.as_deref().ok_or_else(|| missing("gitRepo"))?;
        let branch = descriptor.branch.as_deref().ok_or_else(|| missing("branch"))?;
        let url = snapshot_url(repo, branch);

        let snapshot = tempfile::Builder::new()
            .prefix("bom-git-")
            .suffix(".tar.gz")
            .tempfile()?;
        let snapshot_path = snapshot.path().to_path_buf();

        info!("Fetching {branch} of {repo}");
        let mut request = DownloadRequest::new(&self.client, &url, &snapshot_path);
        if let Some(user) = descriptor.git_user.as_deref().filter(|u| !u.is_empty()) {
            request = request.with_basic_auth(user, descriptor.git_password.as_deref());
        }
        request.execute().await?;

        let dest: PathBuf = dest.to_path_buf();
        let files = tokio::task::spawn_blocking(move || archive::unpack(&snapshot_path, &dest, 1))
            .await??;
        drop(snapshot);
        info!("Unpacked {files} entries from {url}");
        Ok(Acquired::Complete)
    }
}
