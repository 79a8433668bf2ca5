//! Storage abstraction for artifacts and the blobs behind them.

mod attachments;
mod file;
mod memory;

pub use attachments::{Attachment, BatchReport, SkippedUpload, upload_batch};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Reference to a stored artifact, as recorded on the reviewed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Key of the blob in storage.
    pub path: String,
    /// Generated file name.
    pub filename: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

/// Trait for blob and artifact-reference storage backends.
///
/// Implementations can keep data in memory, on the local filesystem, or in a
/// remote object store.
pub trait Storage: Send + Sync {
    /// Store `bytes` under `path`, replacing any previous blob.
    fn upload(&self, bytes: &[u8], path: &str, content_type: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// Fetch the blob stored under `path`.
    fn download(&self, path: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>>;

    /// Delete the blob under `path`. Deleting a missing blob is not an error.
    fn delete(&self, path: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// Append an artifact reference to the record's artifact list.
    fn append_artifact_ref(&self, record_id: &str, artifact: &ArtifactMetadata) -> BoxFuture<'_, StorageResult<()>>;

    /// List the record's artifacts, oldest first.
    fn artifact_refs(&self, record_id: &str) -> BoxFuture<'_, StorageResult<Vec<ArtifactMetadata>>>;
}
