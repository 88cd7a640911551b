//! Publishing the packaged tree to an S3-compatible object store.
//!
//! Upload is all-or-nothing up front: every artifact's directory and archive
//! must exist before the bucket is touched. Objects are then written one at
//! a time in manifest order under the same relative key the dispatcher used
//! on disk.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use bom_schema::{BillOfMaterials, ResolvedLocation, Secret, locate};
use thiserror::Error;
use tracing::info;

use crate::reporter::Reporter;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("bucket is already owned by you")]
    BucketAlreadyOwned,

    #[error("object store request failed: {0}")]
    Request(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("{} is not present", .0.display())]
    Precheck(PathBuf),

    #[error("unable to provision bucket {bucket}: {source}")]
    BucketProvision {
        bucket: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to upload {key}: {source}")]
    Object {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Connection settings for the object store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Host, `host:port`, or a full URL.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: Secret,
    pub bucket: String,
    pub region: String,
    /// Use HTTPS when `endpoint` carries no scheme.
    pub secure: bool,
}

impl StoreConfig {
    /// Endpoint as a URL, adding a scheme if the configured value has none.
    pub fn endpoint_url(&self) -> String {
        let endpoint = self.endpoint.trim_end_matches('/');
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if self.secure {
            format!("https://{endpoint}")
        } else {
            format!("http://{endpoint}")
        }
    }
}

/// The bucket operations upload needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create `bucket`. Fails with [`StoreError::BucketAlreadyOwned`] if the
    /// caller already owns it.
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError>;

    /// Store the file at `path` under `key`, returning its size.
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<u64, StoreError>;
}

/// [`ObjectStore`] backed by the AWS SDK, using path-style addressing so it
/// works against MinIO and other self-hosted stores.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: s3::Client,
    region: String,
}

impl S3Store {
    pub fn new(config: &StoreConfig) -> Self {
        let credentials = s3::config::Credentials::new(
            &config.access_key,
            config.secret_key.expose(),
            None,
            None,
            "bom-object-store",
        );

        let s3_config = s3::Config::builder()
            .behavior_version_latest()
            .endpoint_url(config.endpoint_url())
            .region(s3::config::Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(s3_config),
            region: config.region.clone(),
        }
    }
}

fn request_error<E>(err: &E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::Request(s3::error::DisplayErrorContext(err).to_string())
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != DEFAULT_REGION {
            let constraint = s3::types::BucketLocationConstraint::from(self.region.as_str());
            request = request.create_bucket_configuration(
                s3::types::CreateBucketConfiguration::builder()
                    .location_constraint(constraint)
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_bucket_already_owned_by_you()) => {
                Err(StoreError::BucketAlreadyOwned)
            }
            Err(e) => Err(request_error(&e)),
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(request_error(&e)),
        }
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<u64, StoreError> {
        let size = tokio::fs::metadata(path).await?.len();
        let body = s3::primitives::ByteStream::from_path(path)
            .await
            .map_err(|e| request_error(&e))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .content_length(size as i64)
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        Ok(size)
    }
}

/// Resolve every artifact and require its directory and archive to exist.
pub fn precheck(bom: &BillOfMaterials, root: &Path) -> Result<Vec<ResolvedLocation>, UploadError> {
    bom.bits
        .iter()
        .map(|descriptor| {
            let location = locate(descriptor, root);
            if !location.local_dir.is_dir() {
                return Err(UploadError::Precheck(location.local_dir));
            }
            if !location.local_archive.is_file() {
                return Err(UploadError::Precheck(location.local_archive));
            }
            Ok(location)
        })
        .collect()
}

/// Create `bucket`, or confirm it already exists.
pub async fn ensure_bucket<S: ObjectStore + ?Sized>(
    store: &S,
    bucket: &str,
) -> Result<(), UploadError> {
    match store.create_bucket(bucket).await {
        Ok(()) => {
            info!("Successfully created {bucket}");
            Ok(())
        }
        Err(StoreError::BucketAlreadyOwned) => {
            info!("We already own {bucket}");
            Ok(())
        }
        Err(source) => match store.bucket_exists(bucket).await {
            Ok(true) => {
                info!("We already own {bucket}");
                Ok(())
            }
            Ok(false) | Err(_) => Err(UploadError::BucketProvision {
                bucket: bucket.to_string(),
                source,
            }),
        },
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub objects: usize,
    pub bytes: u64,
}

pub struct Uploader<'a, S: ObjectStore + ?Sized, R: Reporter> {
    store: &'a S,
    reporter: R,
}

impl<'a, S: ObjectStore + ?Sized, R: Reporter> Uploader<'a, S, R> {
    pub fn new(store: &'a S, reporter: R) -> Self {
        Self { store, reporter }
    }

    /// Upload every archive of `bom` found under `root` into `bucket`.
    pub async fn upload(
        &self,
        bom: &BillOfMaterials,
        root: &Path,
        bucket: &str,
    ) -> Result<UploadSummary, UploadError> {
        let start = Instant::now();
        let locations = precheck(bom, root)?;
        ensure_bucket(self.store, bucket).await?;

        self.reporter.section("Uploading");
        let mut summary = UploadSummary::default();
        for (descriptor, location) in bom.bits.iter().zip(&locations) {
            let bytes = self
                .store
                .put_file(
                    bucket,
                    &location.remote_key,
                    &location.local_archive,
                    descriptor.content_type(),
                )
                .await
                .map_err(|source| UploadError::Object {
                    key: location.remote_key.clone(),
                    source,
                })?;
            self.reporter.uploaded(&location.remote_key, bytes);
            summary.objects += 1;
            summary.bytes += bytes;
        }

        self.reporter
            .summary(summary.objects, "Uploaded", start.elapsed().as_secs_f64());
        Ok(summary)
    }
}
