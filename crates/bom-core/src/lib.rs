//! Core library for bom.
//!
//! Turns a [`BillOfMaterials`](bom_schema::BillOfMaterials) into a tree of
//! packaged archives on disk ([`dispatch`]) and publishes that tree to an
//! S3-compatible bucket ([`upload`]). Every path either stage touches comes
//! from [`bom_schema::path`].

pub mod concourse;
pub mod dispatch;
pub mod io;
pub mod pivnet;
pub mod providers;
pub mod reporter;
pub mod stemcell;
pub mod upload;

pub use dispatch::{DispatchError, Dispatcher};
pub use providers::{Acquired, AcquisitionError, Provider, ProviderRegistry, RunContext};
pub use reporter::{NullReporter, Reporter, TracingReporter};
pub use upload::{ObjectStore, S3Store, StoreConfig, UploadError, Uploader};

/// User Agent string for outbound HTTP requests
pub const USER_AGENT: &str = concat!("bom-mgmt/", env!("CARGO_PKG_VERSION"));
