//! In-memory storage implementation.

use super::{ArtifactMetadata, BoxFuture, Storage, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory storage for testing and ephemeral use.
#[derive(Default)]
pub struct MemoryStorage {
    blobs: RwLock<HashMap<String, (String, Vec<u8>)>>,
    records: RwLock<HashMap<String, Vec<ArtifactMetadata>>>,
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type recorded for the blob under `path`.
    pub fn content_type(&self, path: &str) -> Option<String> {
        self.blobs
            .read()
            .ok()
            .and_then(|blobs| blobs.get(path).map(|(ct, _)| ct.clone()))
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl Storage for MemoryStorage {
    fn upload(&self, bytes: &[u8], path: &str, content_type: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = path.to_string();
        let entry = (content_type.to_string(), bytes.to_vec());
        Box::pin(async move {
            let mut blobs = self.blobs.write().map_err(lock_error)?;
            blobs.insert(path, entry);
            Ok(())
        })
    }

    fn download(&self, path: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
        let path = path.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().map_err(lock_error)?;
            blobs
                .get(&path)
                .map(|(_, bytes)| bytes.clone())
                .ok_or(StorageError::NotFound(path))
        })
    }

    fn delete(&self, path: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = path.to_string();
        Box::pin(async move {
            let mut blobs = self.blobs.write().map_err(lock_error)?;
            blobs.remove(&path);
            Ok(())
        })
    }

    fn append_artifact_ref(&self, record_id: &str, artifact: &ArtifactMetadata) -> BoxFuture<'_, StorageResult<()>> {
        let record_id = record_id.to_string();
        let artifact = artifact.clone();
        Box::pin(async move {
            let mut records = self.records.write().map_err(lock_error)?;
            records.entry(record_id).or_default().push(artifact);
            Ok(())
        })
    }

    fn artifact_refs(&self, record_id: &str) -> BoxFuture<'_, StorageResult<Vec<ArtifactMetadata>>> {
        let record_id = record_id.to_string();
        Box::pin(async move {
            let records = self.records.read().map_err(lock_error)?;
            Ok(records.get(&record_id).cloned().unwrap_or_default())
        })
    }
}
