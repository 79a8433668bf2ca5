//! Document retrieval with a storage-path fallback.
//!
//! The primary URL may be short-lived (signed links) and may answer with an
//! HTML error page instead of the document. The declared content type is
//! checked before any parsing; anything that is not a document sends the
//! request to the fallback path in blob storage.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::EngineConfig;
use crate::storage::{BoxFuture, Storage};

/// Document source errors.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Transport error: {0}")]
    Transport(String),
    /// The source answered with something that is not a document.
    #[error("Expected a document from {url} but got content type {content_type}")]
    WrongContentType { url: String, content_type: String },
    #[error("Not a readable document: {0}")]
    Unparseable(String),
    /// Both paths failed.
    #[error("{primary}; fallback: {fallback}")]
    Exhausted {
        primary: Box<SourceError>,
        fallback: Box<SourceError>,
    },
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Bytes plus the content type the source declared for them.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Where a document can be retrieved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Primary retrieval URL.
    pub url: String,
    /// Blob storage key used when the URL fails.
    pub storage_path: Option<String>,
    /// Original file name, used to name exported artifacts.
    pub filename: String,
}

impl DocumentRef {
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            storage_path: None,
            filename: filename.into(),
        }
    }

    pub fn with_storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = Some(path.into());
        self
    }
}

/// Transport for the primary URL.
pub trait DocumentFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'_, SourceResult<FetchedDocument>>;
}

/// Resolves a [`DocumentRef`] to bytes, trying the URL first and blob storage
/// second.
#[derive(Clone)]
pub struct DocumentSource {
    primary: Arc<dyn DocumentFetcher>,
    fallback: Option<Arc<dyn Storage>>,
    accepted_content_types: Vec<String>,
}

impl DocumentSource {
    pub fn new(primary: Arc<dyn DocumentFetcher>) -> Self {
        Self {
            primary,
            fallback: None,
            accepted_content_types: EngineConfig::default().accepted_content_types,
        }
    }

    /// Use `storage` for the fallback retrieval path.
    pub fn with_fallback(mut self, storage: Arc<dyn Storage>) -> Self {
        self.fallback = Some(storage);
        self
    }

    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.accepted_content_types = config.accepted_content_types.clone();
        self
    }

    /// Fetch fresh document bytes.
    pub async fn fetch(&self, doc: &DocumentRef) -> SourceResult<Vec<u8>> {
        let primary_err = match self.fetch_primary(&doc.url).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => e,
        };

        let (Some(storage), Some(path)) = (&self.fallback, &doc.storage_path) else {
            log::error!("Failed to fetch {}: {}", doc.url, primary_err);
            return Err(primary_err);
        };

        log::warn!(
            "Primary fetch of {} failed ({}), falling back to storage path {}",
            doc.url,
            primary_err,
            path
        );
        match storage.download(path).await {
            Ok(bytes) => {
                log::info!("Fetched {} from storage ({} bytes)", path, bytes.len());
                Ok(bytes)
            }
            Err(e) => {
                log::error!("Fallback fetch of {} failed: {}", path, e);
                Err(SourceError::Exhausted {
                    primary: Box::new(primary_err),
                    fallback: Box::new(SourceError::Transport(e.to_string())),
                })
            }
        }
    }

    async fn fetch_primary(&self, url: &str) -> SourceResult<Vec<u8>> {
        let fetched = self.primary.fetch(url).await?;
        if let Some(declared) = &fetched.content_type {
            if !self.accepts(declared) {
                return Err(SourceError::WrongContentType {
                    url: url.to_string(),
                    content_type: declared.clone(),
                });
            }
        }
        Ok(fetched.bytes)
    }

    /// Compare the media type, ignoring parameters such as `charset`.
    fn accepts(&self, declared: &str) -> bool {
        let media_type = declared.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        self.accepted_content_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(&media_type))
    }
}

/// Fetcher serving canned responses; useful for tests and embedding.
#[derive(Default)]
pub struct MemoryFetcher {
    responses: RwLock<HashMap<String, FetchedDocument>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>, content_type: Option<&str>) {
        if let Ok(mut responses) = self.responses.write() {
            responses.insert(
                url.into(),
                FetchedDocument {
                    bytes,
                    content_type: content_type.map(str::to_string),
                },
            );
        }
    }
}

impl DocumentFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'_, SourceResult<FetchedDocument>> {
        let url = url.to_string();
        Box::pin(async move {
            let responses = self
                .responses
                .read()
                .map_err(|e| SourceError::Transport(format!("Lock error: {}", e)))?;
            responses.get(&url).cloned().ok_or(SourceError::NotFound(url))
        })
    }
}

/// Fetcher for `file://` URLs and plain filesystem paths.
///
/// The content type is inferred from the file extension.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        Self
    }

    fn resolve(url: &str) -> SourceResult<PathBuf> {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .map_err(|_| SourceError::NotFound(url.to_string())),
            Ok(parsed) => Err(SourceError::Transport(format!(
                "Unsupported scheme '{}' in {}",
                parsed.scheme(),
                url
            ))),
            Err(_) => Ok(PathBuf::from(url)),
        }
    }
}

fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "html" | "htm" => Some("text/html"),
        "png" => Some("image/png"),
        "json" => Some("application/json"),
        _ => None,
    }
}

impl DocumentFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'_, SourceResult<FetchedDocument>> {
        let path = Self::resolve(url);
        Box::pin(async move {
            let path = path?;
            if !path.exists() {
                return Err(SourceError::NotFound(path.display().to_string()));
            }
            let bytes = fs::read(&path).map_err(|e| {
                SourceError::Transport(format!("Failed to read {}: {}", path.display(), e))
            })?;
            Ok(FetchedDocument {
                bytes,
                content_type: content_type_for(&path).map(str::to_string),
            })
        })
    }
}
