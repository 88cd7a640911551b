//! Reporter trait for dependency injection
//!
//! Lets the dispatcher and uploader report per-artifact progress without
//! being coupled to a particular output. The CLI plugs in
//! [`TracingReporter`]; tests use [`NullReporter`].

use std::path::Path;

use bom_schema::ArtifactDescriptor;
use tracing::{error, info, warn};

pub trait Reporter: Send + Sync {
    /// Indicates a new phase has started (e.g. "Downloading", "Uploading").
    fn section(&self, title: &str);

    /// An artifact is about to be handed to its provider.
    fn acquiring(&self, artifact: &ArtifactDescriptor);

    /// A provider's output tree was packed into its archive.
    fn packed(&self, artifact: &ArtifactDescriptor, archive: &Path, entries: usize);

    /// An archive was stored under `key`.
    fn uploaded(&self, key: &str, bytes: u64);

    /// Marks an artifact as fully materialized.
    fn done(&self, artifact: &ArtifactDescriptor);

    /// The artifact's download is still running in the background and
    /// `archive` may not exist yet.
    fn pending(&self, artifact: &ArtifactDescriptor, archive: &Path);

    /// Marks an artifact as failed with a specific reason.
    fn failed(&self, artifact: &ArtifactDescriptor, reason: &str);

    /// Display a final summary of multiple operations.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn acquiring(&self, artifact: &ArtifactDescriptor) {
        (**self).acquiring(artifact);
    }
    fn packed(&self, artifact: &ArtifactDescriptor, archive: &Path, entries: usize) {
        (**self).packed(artifact, archive, entries);
    }
    fn uploaded(&self, key: &str, bytes: u64) {
        (**self).uploaded(key, bytes);
    }
    fn done(&self, artifact: &ArtifactDescriptor) {
        (**self).done(artifact);
    }
    fn pending(&self, artifact: &ArtifactDescriptor, archive: &Path) {
        (**self).pending(artifact, archive);
    }
    fn failed(&self, artifact: &ArtifactDescriptor, reason: &str) {
        (**self).failed(artifact, reason);
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn acquiring(&self, _: &ArtifactDescriptor) {}
    fn packed(&self, _: &ArtifactDescriptor, _: &Path, _: usize) {}
    fn uploaded(&self, _: &str, _: u64) {}
    fn done(&self, _: &ArtifactDescriptor) {}
    fn pending(&self, _: &ArtifactDescriptor, _: &Path) {}
    fn failed(&self, _: &ArtifactDescriptor, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}

/// Forwards every event to `tracing` at `info` (pending at `warn`, failures at `error`).
#[derive(Debug, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn section(&self, title: &str) {
        info!("{title}");
    }

    fn acquiring(&self, artifact: &ArtifactDescriptor) {
        info!(
            artifact = %artifact.name,
            resource_type = %artifact.resource_type,
            "acquiring"
        );
    }

    fn packed(&self, artifact: &ArtifactDescriptor, archive: &Path, entries: usize) {
        info!(
            artifact = %artifact.name,
            entries,
            "packed {}",
            archive.display()
        );
    }

    fn uploaded(&self, key: &str, bytes: u64) {
        info!("Successfully uploaded {key} of size {bytes}");
    }

    fn done(&self, artifact: &ArtifactDescriptor) {
        info!(artifact = %artifact.name, "done");
    }

    fn pending(&self, artifact: &ArtifactDescriptor, archive: &Path) {
        warn!(
            artifact = %artifact.name,
            "still downloading in background, {} may not exist yet",
            archive.display()
        );
    }

    fn failed(&self, artifact: &ArtifactDescriptor, reason: &str) {
        error!(artifact = %artifact.name, "failed: {reason}");
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        info!("{action} {count} artifacts in {elapsed_secs:.1}s");
    }
}
