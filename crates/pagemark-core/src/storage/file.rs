//! File-based storage implementation.

use super::{ArtifactMetadata, BoxFuture, Storage, StorageError, StorageResult};
use std::fs;
use std::path::{Path, PathBuf};

/// File-based storage.
///
/// Blobs live under `<base>/blobs/<path>`, and each record's artifact list is a
/// JSON file under `<base>/records/`. Empty segments in a blob key are
/// ignored, so `a//b` and `a/b` name the same blob.
pub struct FileStorage {
    /// Base directory for storage.
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a new file storage with the given base directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    /// Create file storage in the default location.
    ///
    /// On Unix: `~/.local/share/pagemark/`
    /// On Windows: `%LOCALAPPDATA%\pagemark\`
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;

        Self::new(base.join("pagemark"))
    }

    /// Get the base path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Map a `/`-separated storage key to a file below `blobs/`.
    fn blob_path(&self, key: &str) -> StorageResult<PathBuf> {
        let mut path = self.base_path.join("blobs");
        let mut components = 0;
        for part in key.split('/').filter(|p| !p.is_empty()) {
            if part == "." || part == ".." {
                return Err(StorageError::InvalidPath(key.to_string()));
            }
            path.push(safe_component(part));
            components += 1;
        }
        if components == 0 {
            return Err(StorageError::InvalidPath(key.to_string()));
        }
        Ok(path)
    }

    fn record_path(&self, record_id: &str) -> PathBuf {
        self.base_path
            .join("records")
            .join(format!("{}.json", safe_component(record_id)))
    }

    fn read_refs(path: &Path) -> StorageResult<Vec<ArtifactMetadata>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(path).map_err(|e| {
            StorageError::Io(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

/// Percent-encode a path component so it is safe on every filesystem.
///
/// ASCII letters, digits, `-`, `_` and `.` are kept. Every other byte is
/// written as `%XX`, so distinct components never share a file name.
fn safe_component(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for byte in part.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            StorageError::Io(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }
    Ok(())
}

impl Storage for FileStorage {
    fn upload(&self, bytes: &[u8], path: &str, _content_type: &str) -> BoxFuture<'_, StorageResult<()>> {
        let target = self.blob_path(path);
        let bytes = bytes.to_vec();
        Box::pin(async move {
            let target = target?;
            ensure_parent(&target)?;
            fs::write(&target, bytes).map_err(|e| {
                StorageError::Io(format!("Failed to write {}: {}", target.display(), e))
            })
        })
    }

    fn download(&self, path: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
        let target = self.blob_path(path);
        let key = path.to_string();
        Box::pin(async move {
            let target = target?;
            if !target.exists() {
                return Err(StorageError::NotFound(key));
            }
            fs::read(&target).map_err(|e| {
                StorageError::Io(format!("Failed to read {}: {}", target.display(), e))
            })
        })
    }

    fn delete(&self, path: &str) -> BoxFuture<'_, StorageResult<()>> {
        let target = self.blob_path(path);
        Box::pin(async move {
            let target = target?;
            if target.exists() {
                fs::remove_file(&target).map_err(|e| {
                    StorageError::Io(format!("Failed to delete {}: {}", target.display(), e))
                })?;
            }
            Ok(())
        })
    }

    fn append_artifact_ref(&self, record_id: &str, artifact: &ArtifactMetadata) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.record_path(record_id);
        let artifact = artifact.clone();
        Box::pin(async move {
            let mut refs = Self::read_refs(&path)?;
            refs.push(artifact);
            let json = serde_json::to_string_pretty(&refs)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            ensure_parent(&path)?;
            fs::write(&path, json).map_err(|e| {
                StorageError::Io(format!("Failed to write {}: {}", path.display(), e))
            })
        })
    }

    fn artifact_refs(&self, record_id: &str) -> BoxFuture<'_, StorageResult<Vec<ArtifactMetadata>>> {
        let path = self.record_path(record_id);
        Box::pin(async move { Self::read_refs(&path) })
    }
}
