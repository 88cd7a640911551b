//! Plain HTTP(S) file artifacts.

use std::path::Path;

use async_trait::async_trait;
use bom_schema::{ArtifactDescriptor, MissingField};
use reqwest::Client;
use tracing::info;

use super::{Acquired, AcquisitionError, Provider, RunContext};
use crate::io::download::DownloadRequest;

/// Streams `url` to `dest/{name}`.
#[derive(Debug, Clone)]
pub struct FileProvider {
    client: Client,
}

impl FileProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider for FileProvider {
    async fn acquire(
        &self,
        _ctx: &RunContext,
        descriptor: &ArtifactDescriptor,
        dest: &Path,
    ) -> Result<Acquired, AcquisitionError> {
        let url = descriptor.url.as_deref().ok_or_else(|| MissingField {
            artifact: descriptor.name.clone(),
            resource_type: descriptor.resource_type,
            field: "url",
        })?;
        let target = dest.join(&descriptor.name);

        info!("Downloading file from {url}");
        let bytes = DownloadRequest::new(&self.client, url, &target)
            .execute()
            .await?;
        info!("Wrote {bytes} bytes to {}", target.display());
        Ok(Acquired::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bom_schema::ResourceType;

    fn descriptor(url: String) -> ArtifactDescriptor {
        let mut d = ArtifactDescriptor::new("jq-linux64", ResourceType::File);
        d.url = Some(url);
        d
    }

    #[tokio::test]
    async fn test_writes_named_file() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/releases/jq")
            .with_body("ELF")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        FileProvider::new(Client::new())
            .acquire(
                &RunContext::default(),
                &descriptor(format!("{}/releases/jq", server.url())),
                dir.path(),
            )
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("jq-linux64")).unwrap(),
            "ELF"
        );
    }

    #[tokio::test]
    async fn test_server_error_fails_acquisition() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/broken")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = FileProvider::new(Client::new())
            .acquire(
                &RunContext::default(),
                &descriptor(format!("{}/broken", server.url())),
                dir.path(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Download(_)));
        assert!(!dir.path().join("jq-linux64").exists());
    }
}
