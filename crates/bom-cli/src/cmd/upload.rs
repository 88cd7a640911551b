//! upload-bits command

use std::path::Path;

use anyhow::Result;
use bom_core::{S3Store, TracingReporter, Uploader};
use bom_schema::Validation;

use crate::StoreArgs;

/// Publish every packaged archive under `bits_dir` to the configured bucket.
pub async fn upload_bits(bom_path: &Path, bits_dir: &Path, store: &StoreArgs) -> Result<()> {
    let bom = super::load_bom(bom_path, Validation::Layout)?;
    let config = store.config();
    let s3 = S3Store::new(&config);

    let summary = Uploader::new(&s3, TracingReporter)
        .upload(&bom, bits_dir, &config.bucket)
        .await?;
    tracing::info!(
        "uploaded {} objects ({} bytes) to {}",
        summary.objects,
        summary.bytes,
        config.bucket
    );
    Ok(())
}
