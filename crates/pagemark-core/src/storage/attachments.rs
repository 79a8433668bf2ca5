//! Batch upload of submission attachments.
//!
//! Oversized files are skipped with a warning; the rest of the batch still
//! uploads.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::{ArtifactMetadata, Storage, StorageResult};
use crate::config::EngineConfig;
use crate::export::sanitize_filename;

/// A file handed in with a submission.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A file left out of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUpload {
    pub filename: String,
    pub size: u64,
    pub limit: u64,
}

/// Outcome of [`upload_batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub uploaded: Vec<ArtifactMetadata>,
    pub skipped: Vec<SkippedUpload>,
}

/// Upload every attachment within the size limit under
/// `<attachment prefix>/<record id>/`.
///
/// Stored names are `<millis>_<sanitized name>`. When two files in the batch
/// sanitize to the same name, later ones get a `_<n>` counter after the
/// timestamp. A failed upload aborts the rest of the batch; files uploaded
/// before it stay in storage.
pub async fn upload_batch<S: Storage + ?Sized>(
    storage: &S,
    record_id: &str,
    files: Vec<Attachment>,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> StorageResult<BatchReport> {
    let mut report = BatchReport::default();
    let mut used = HashSet::new();
    let millis = now.timestamp_millis();

    for file in files {
        let size = file.bytes.len() as u64;
        if size > config.max_upload_bytes {
            log::warn!(
                "Skipping {}: {} bytes exceeds the {} byte limit",
                file.filename,
                size,
                config.max_upload_bytes
            );
            report.skipped.push(SkippedUpload {
                filename: file.filename,
                size,
                limit: config.max_upload_bytes,
            });
            continue;
        }

        let name = sanitize_filename(&file.filename);
        let mut filename = format!("{}_{}", millis, name);
        let mut n = 2;
        while !used.insert(filename.clone()) {
            filename = format!("{}_{}_{}", millis, n, name);
            n += 1;
        }
        let path = format!("{}/{}/{}", config.attachment_prefix, record_id, filename);
        storage.upload(&file.bytes, &path, &file.content_type).await?;
        log::info!("Uploaded attachment {} ({} bytes)", path, size);

        report.uploaded.push(ArtifactMetadata {
            path,
            filename,
            content_type: file.content_type,
            created_at: now,
        });
    }

    Ok(report)
}
