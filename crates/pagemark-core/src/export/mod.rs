//! Export of annotated documents.
//!
//! The exporter re-fetches the original, merges the overlay store into it,
//! uploads the result and records the artifact on the reviewed record.

mod compose;
mod filename;

pub use compose::{ComposeError, ComposeResult, Composited, composite};
pub use filename::{artifact_filename, sanitize_filename};

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::error::{AnnotateError, AnnotateResult};
use crate::overlay::OverlayStore;
use crate::source::{DocumentRef, DocumentSource};
use crate::storage::{ArtifactMetadata, Storage};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Produces annotated artifacts for one storage backend.
pub struct DocumentExporter<S: Storage> {
    source: DocumentSource,
    storage: Arc<S>,
    config: EngineConfig,
    /// Millisecond stamp of the previous export.
    last_stamp: Mutex<i64>,
}

impl<S: Storage> DocumentExporter<S> {
    pub fn new(source: DocumentSource, storage: Arc<S>, config: EngineConfig) -> Self {
        Self {
            source,
            storage,
            config,
            last_stamp: Mutex::new(i64::MIN),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Merge `store` into a fresh copy of `doc` and persist it under
    /// `record_id`.
    ///
    /// Either the artifact is uploaded and referenced, or nothing is
    /// recorded. The store is never modified.
    pub async fn export(
        &self,
        doc: &DocumentRef,
        store: &OverlayStore,
        record_id: &str,
    ) -> AnnotateResult<ArtifactMetadata> {
        let original = self.source.fetch(doc).await.map_err(|e| {
            log::error!("Export of {} aborted: {}", doc.filename, e);
            AnnotateError::ExportAborted(format!("could not re-fetch {}: {}", doc.filename, e))
        })?;

        let merged = composite(&original, store).map_err(|e| {
            log::error!("Export of {} aborted: {}", doc.filename, e);
            AnnotateError::ExportAborted(e.to_string())
        })?;

        let created_at = self.next_stamp()?;
        let filename = artifact_filename(created_at, &doc.filename);
        let path = format!("{}/{}/{}", self.config.artifact_prefix, record_id, filename);

        self.storage
            .upload(&merged.bytes, &path, PDF_CONTENT_TYPE)
            .await
            .map_err(|e| {
                log::error!("Upload of {} failed: {}", path, e);
                AnnotateError::PersistenceFailed(e)
            })?;

        let artifact = ArtifactMetadata {
            path,
            filename,
            content_type: PDF_CONTENT_TYPE.to_string(),
            created_at,
        };
        if let Err(e) = self.storage.append_artifact_ref(record_id, &artifact).await {
            log::error!("Recording {} on {} failed: {}", artifact.filename, record_id, e);
            if let Err(cleanup) = self.storage.delete(&artifact.path).await {
                log::warn!("Could not remove orphaned artifact {}: {}", artifact.path, cleanup);
            }
            return Err(AnnotateError::PersistenceFailed(e));
        }

        log::info!(
            "Exported {} ({} annotated pages, {} bytes) for record {}",
            artifact.filename,
            merged.stamped.len(),
            merged.bytes.len(),
            record_id
        );
        Ok(artifact)
    }

    /// Artifacts recorded for `record_id`, oldest first.
    pub async fn artifacts(&self, record_id: &str) -> AnnotateResult<Vec<ArtifactMetadata>> {
        self.storage
            .artifact_refs(record_id)
            .await
            .map_err(AnnotateError::PersistenceFailed)
    }

    /// Current time, bumped past the previous export when the clock has not
    /// advanced.
    fn next_stamp(&self) -> AnnotateResult<DateTime<Utc>> {
        let mut last = self
            .last_stamp
            .lock()
            .map_err(|e| AnnotateError::ExportAborted(format!("Lock error: {}", e)))?;
        let now = Utc::now();
        let millis = now.timestamp_millis().max(last.saturating_add(1));
        *last = millis;
        Ok(DateTime::from_timestamp_millis(millis).unwrap_or(now))
    }
}
