//! Concourse `s3` resource definitions for every mirrored artifact.
//!
//! Pipelines consuming the mirror declare one resource per artifact; this
//! renders that `resources:` block so it can be pasted into a pipeline.

use bom_schema::{BillOfMaterials, relative_path};
use serde::Serialize;

use crate::upload::StoreConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourcesBlock {
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: S3Source,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct S3Source {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub endpoint: String,
    pub regexp: String,
}

/// Resource name for an artifact: its name up to the first `.`.
pub fn resource_name(artifact: &str) -> &str {
    artifact.split('.').next().unwrap_or(artifact)
}

pub fn resources(bom: &BillOfMaterials, store: &StoreConfig) -> ResourcesBlock {
    let resources = bom
        .bits
        .iter()
        .map(|bit| Resource {
            name: resource_name(&bit.name).to_string(),
            kind: "s3".to_string(),
            source: S3Source {
                access_key_id: store.access_key.clone(),
                secret_access_key: store.secret_key.expose().to_string(),
                bucket: store.bucket.clone(),
                endpoint: store.endpoint_url(),
                regexp: relative_path(bit),
            },
        })
        .collect();
    ResourcesBlock { resources }
}

/// Render the block as YAML.
pub fn render(bom: &BillOfMaterials, store: &StoreConfig) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&resources(bom, store))
}
