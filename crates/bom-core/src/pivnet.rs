//! Vendor-portal (Pivotal Network) client.
//!
//! A [`VendorPortal`] exchanges the manifest's refresh token for a
//! short-lived session. Each acquisition logs in again, so no session state
//! outlives the call that created it. A session ([`ReleaseSource`]) downloads
//! the files of one release that match a set of glob patterns.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bom_schema::Secret;
use glob::Pattern;
use reqwest::{Client, Method};
use serde::Deserialize;
use tracing::{debug, info};

use crate::io::download::DownloadRequest;
use crate::providers::AcquisitionError;

/// Portal used when `PIVNET_HOST` is unset.
pub const DEFAULT_PIVNET_HOST: &str = "https://network.pivotal.io";

/// Which portal to talk to.
#[derive(Debug, Clone)]
pub struct PivnetConfig {
    pub host: String,
}

impl Default for PivnetConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PIVNET_HOST.to_string(),
        }
    }
}

impl PivnetConfig {
    /// Reads `PIVNET_HOST`, falling back to the public portal.
    pub fn from_env() -> Self {
        match std::env::var("PIVNET_HOST") {
            Ok(host) if !host.trim().is_empty() => Self {
                host: host.trim().trim_end_matches('/').to_string(),
            },
            _ => Self::default(),
        }
    }
}

/// One release to fetch files from.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseRequest<'a> {
    pub product_slug: &'a str,
    pub version: &'a str,
    pub globs: &'a [String],
}

/// An authenticated session able to download release files.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Download every file of the release whose name matches one of the
    /// request's globs into `dest`, returning the written paths.
    async fn download(
        &self,
        request: &ReleaseRequest<'_>,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, AcquisitionError>;
}

/// Creates sessions from a refresh token.
#[async_trait]
pub trait VendorPortal: Send + Sync {
    async fn login(&self, token: &Secret) -> Result<Box<dyn ReleaseSource>, AcquisitionError>;
}

/// HTTP implementation of [`VendorPortal`].
#[derive(Debug, Clone)]
pub struct Pivnet {
    client: Client,
    config: PivnetConfig,
}

impl Pivnet {
    pub fn new(client: Client, config: PivnetConfig) -> Self {
        Self { client, config }
    }
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Releases {
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Debug, Deserialize)]
struct Release {
    id: u64,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ProductFiles {
    #[serde(default)]
    product_files: Vec<ProductFile>,
}

#[derive(Debug, Deserialize)]
struct ProductFile {
    id: u64,
    aws_object_key: String,
}

impl ProductFile {
    fn file_name(&self) -> &str {
        self.aws_object_key
            .rsplit('/')
            .next()
            .unwrap_or(&self.aws_object_key)
    }
}

#[async_trait]
impl VendorPortal for Pivnet {
    async fn login(&self, token: &Secret) -> Result<Box<dyn ReleaseSource>, AcquisitionError> {
        let url = format!("{}/api/v2/authentication/access_tokens", self.config.host);
        let response: AccessToken = self
            .client
            .post(&url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .json(&serde_json::json!({ "refresh_token": token.expose() }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AcquisitionError::Authentication(e.to_string()))?
            .json()
            .await?;

        debug!("authenticated against {}", self.config.host);
        Ok(Box::new(PivnetSession {
            client: self.client.clone(),
            host: self.config.host.clone(),
            access_token: response.access_token,
        }))
    }
}

/// A logged-in portal session.
pub struct PivnetSession {
    client: Client,
    host: String,
    access_token: String,
}

impl std::fmt::Debug for PivnetSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PivnetSession")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl PivnetSession {
    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AcquisitionError> {
        Ok(self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn find_release(&self, slug: &str, version: &str) -> Result<Release, AcquisitionError> {
        let url = format!("{}/api/v2/products/{slug}/releases", self.host);
        let releases: Releases = self.get(&url).await?;
        releases
            .releases
            .into_iter()
            .find(|r| r.version == version)
            .ok_or_else(|| AcquisitionError::ReleaseNotFound {
                product_slug: slug.to_string(),
                version: version.to_string(),
            })
    }

    async fn accept_eula(&self, slug: &str, release_id: u64) -> Result<(), AcquisitionError> {
        let url = format!(
            "{}/api/v2/products/{slug}/releases/{release_id}/pivnet_resource_eula_acceptance",
            self.host
        );
        self.client
            .post(&url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Compile glob patterns, rejecting the first invalid one.
pub fn compile_globs(globs: &[String]) -> Result<Vec<Pattern>, AcquisitionError> {
    globs
        .iter()
        .map(|g| {
            Pattern::new(g).map_err(|e| AcquisitionError::InvalidGlob {
                pattern: g.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl ReleaseSource for PivnetSession {
    async fn download(
        &self,
        request: &ReleaseRequest<'_>,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, AcquisitionError> {
        let slug = request.product_slug;
        let patterns = compile_globs(request.globs)?;
        let release = self.find_release(slug, request.version).await?;

        let url = format!(
            "{}/api/v2/products/{slug}/releases/{}/product_files",
            self.host, release.id
        );
        let files: ProductFiles = self.get(&url).await?;
        let selected: Vec<ProductFile> = files
            .product_files
            .into_iter()
            .filter(|f| patterns.iter().any(|p| p.matches(f.file_name())))
            .collect();

        if selected.is_empty() {
            return Err(AcquisitionError::NoMatchingFiles {
                product_slug: slug.to_string(),
                version: request.version.to_string(),
                globs: request.globs.to_vec(),
            });
        }

        self.accept_eula(slug, release.id).await?;

        let mut written = Vec::with_capacity(selected.len());
        for file in selected {
            let target = dest.join(file.file_name());
            let url = format!(
                "{}/api/v2/products/{slug}/releases/{}/product_files/{}/download",
                self.host, release.id, file.id
            );
            let bytes = DownloadRequest::new(&self.client, &url, &target)
                .with_method(Method::POST)
                .with_bearer(&self.access_token)
                .execute()
                .await?;
            info!("downloaded {} ({bytes} bytes)", file.file_name());
            written.push(target);
        }
        Ok(written)
    }
}
