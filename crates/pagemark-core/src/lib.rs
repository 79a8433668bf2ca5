//! Pagemark Core Library
//!
//! Freehand page annotation for paginated documents: one live raster overlay
//! for the page on screen, encoded snapshots for every other page, and an
//! exporter that merges the overlays back into a new document.

pub mod config;
pub mod error;
pub mod export;
pub mod overlay;
pub mod pdf;
pub mod raster;
pub mod session;
pub mod source;
pub mod storage;
pub mod surface;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_util;

pub use config::EngineConfig;
pub use error::{AnnotateError, AnnotateResult, Notification, NotificationLevel};
pub use export::{DocumentExporter, sanitize_filename};
pub use overlay::{OverlayStore, Snapshot, SnapshotError};
pub use raster::{BlankPageRasterizer, DISPLAY_SCALE, PageRasterizer, RasterError, RenderedPage};
pub use session::{CancelHandle, PageSession, SessionOptions};
pub use source::{DocumentFetcher, DocumentRef, DocumentSource, FetchedDocument, SourceError};
pub use storage::{ArtifactMetadata, MemoryStorage, Storage, StorageError};
pub use surface::{OverlaySurface, PixelSize};
pub use tools::{SerializableColor, StrokeCompositor, ToolMode, ToolState};

/// 1-based page number within a document.
pub type PageIndex = u32;
