//! Engine errors and their operator-facing notifications.

use thiserror::Error;

use crate::PageIndex;
use crate::overlay::SnapshotError;
use crate::raster::RasterError;
use crate::source::SourceError;
use crate::storage::StorageError;

/// Errors surfaced by sessions and exports.
#[derive(Debug, Error)]
pub enum AnnotateError {
    /// Neither the primary nor the fallback retrieval produced a readable
    /// document. Fatal to the session.
    #[error("Document unreadable: {0}")]
    DocumentUnreadable(#[from] SourceError),
    /// One page could not be rendered; the session stays on the last good page.
    #[error("Page {page} could not be rendered: {source}")]
    RasterizationFailed {
        page: PageIndex,
        #[source]
        source: RasterError,
    },
    #[error("Page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: PageIndex, page_count: u32 },
    /// Re-fetch or merge failed during export.
    #[error("Export aborted: {0}")]
    ExportAborted(String),
    /// The merged artifact could not be uploaded or recorded.
    #[error("Artifact could not be saved: {0}")]
    PersistenceFailed(#[source] StorageError),
    #[error("Overlay snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    /// The session was torn down while the operation was in flight; its
    /// result was discarded.
    #[error("Session closed")]
    Cancelled,
}

pub type AnnotateResult<T> = Result<T, AnnotateError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Human-readable message for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            title: title.into(),
            message: message.into(),
        }
    }
}

impl AnnotateError {
    /// Notification to show for this error, or `None` for discarded results.
    pub fn notification(&self) -> Option<Notification> {
        let message = self.to_string();
        match self {
            AnnotateError::DocumentUnreadable(_) => {
                Some(Notification::error("Could not open the document", message))
            }
            AnnotateError::RasterizationFailed { page, .. } => Some(Notification::warning(
                format!("Could not display page {}", page),
                message,
            )),
            AnnotateError::PageOutOfRange { .. } => {
                Some(Notification::warning("No such page", message))
            }
            AnnotateError::ExportAborted(_) => Some(Notification::error(
                "Export failed",
                format!("{}. Your annotations are kept; try exporting again.", message),
            )),
            AnnotateError::PersistenceFailed(_) => Some(Notification::error(
                "Could not save the annotated document",
                format!("{}. Your annotations are kept; try exporting again.", message),
            )),
            AnnotateError::Snapshot(_) => {
                Some(Notification::error("Annotation data is damaged", message))
            }
            AnnotateError::Cancelled => None,
        }
    }

    /// True when the session cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AnnotateError::DocumentUnreadable(_))
    }
}
