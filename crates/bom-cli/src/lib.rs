//! bom-mgmt - Bill of Materials mirroring
//!
//! Downloads every artifact a manifest lists, packages each one into a
//! single archive, and publishes the resulting tree to an S3-compatible
//! bucket for air-gapped installs.
//!
//! # Directory Layout
//!
//! ```text
//! {bits}/resources/
//! ├── file/{name}
//! ├── pivnet-non-tile/{name}
//! ├── pivnet-tile/{productSlug}-tarball/{name}   # tile + stemcell
//! ├── docker/{name}                              # metadata.json + rootfs/
//! ├── git/{name}
//! └── vmware/{name}
//! ```
//!
//! Object keys in the bucket are the same relative paths.
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod cmd;

pub use bom_core::USER_AGENT;

use bom_core::StoreConfig;
use bom_core::upload::DEFAULT_REGION;
use bom_schema::Secret;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "bom-mgmt")]
#[command(author, version, about = "Mirror a Bill of Materials into an S3-compatible bucket")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print version information and exit
    Version,
    /// Downloads bits defined in the BoM
    DownloadBits {
        #[command(flatten)]
        manifest: ManifestArgs,
        /// Directory the bits are written to
        #[arg(long = "bits", env = "MINIO_BITS_DIR")]
        bits_dir: PathBuf,
    },
    /// Uploads the downloaded bits to the object store
    UploadBits {
        #[command(flatten)]
        manifest: ManifestArgs,
        /// Directory the bits were written to
        #[arg(long = "bits", env = "MINIO_BITS_DIR")]
        bits_dir: PathBuf,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Generates a 'resources' block that can be used in a Concourse pipeline
    GenerateResources {
        #[command(flatten)]
        manifest: ManifestArgs,
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Debug, Args)]
pub struct ManifestArgs {
    /// YAML file containing information about all files to mirror
    #[arg(long, env = "MINIO_BOM")]
    pub bom: PathBuf,
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Object store host to connect to (host[:port] or URL)
    #[arg(long, env = "MINIO_HOST")]
    pub host: String,
    /// Access key used to connect to host
    #[arg(long, env = "MINIO_ACCESS_KEY")]
    pub key: String,
    /// Secret access key used to connect to host
    #[arg(long, env = "MINIO_SECRET", hide_env_values = true)]
    pub secret: String,
    /// Bucket the bits are uploaded to
    #[arg(long, env = "MINIO_BUCKET")]
    pub bucket: String,
    /// Use HTTPS when host has no scheme
    #[arg(long, env = "MINIO_SECURE")]
    pub secure: bool,
    /// Region sent with signed requests
    #[arg(long, env = "MINIO_REGION", default_value = DEFAULT_REGION)]
    pub region: String,
}

impl StoreArgs {
    pub fn config(&self) -> StoreConfig {
        StoreConfig {
            endpoint: self.host.clone(),
            access_key: self.key.clone(),
            secret_key: Secret::new(self.secret.clone()),
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            secure: self.secure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_upload_flags() {
        let cli = Cli::try_parse_from([
            "bom-mgmt",
            "upload-bits",
            "--bom",
            "bom.yml",
            "--bits",
            "/srv/bits",
            "--host",
            "minio:9000",
            "--key",
            "minio",
            "--secret",
            "minio123",
            "--bucket",
            "bits",
        ])
        .unwrap();

        match cli.command {
            Commands::UploadBits {
                manifest,
                bits_dir,
                store,
            } => {
                assert_eq!(manifest.bom, PathBuf::from("bom.yml"));
                assert_eq!(bits_dir, PathBuf::from("/srv/bits"));
                let config = store.config();
                assert_eq!(config.region, "us-east-1");
                assert_eq!(config.endpoint_url(), "http://minio:9000");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_generate_resources_secure_flag() {
        let cli = Cli::try_parse_from([
            "bom-mgmt",
            "generate-resources",
            "--bom",
            "bom.yml",
            "--host",
            "minio:9000",
            "--key",
            "minio",
            "--secret",
            "minio123",
            "--bucket",
            "bits",
            "--secure",
        ])
        .unwrap();

        let Commands::GenerateResources { store, .. } = cli.command else {
            panic!("unexpected command");
        };
        assert_eq!(store.config().endpoint_url(), "https://minio:9000");
    }
}
