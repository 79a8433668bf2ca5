//! Page session controller.
//!
//! Keeps exactly one page live: its rendered base pixels and its overlay
//! surface. Navigation flushes the outgoing overlay into the store before the
//! next page is rasterized, then restores the incoming page's snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::RgbaImage;
use kurbo::Point;
use uuid::Uuid;

use crate::PageIndex;
use crate::error::{AnnotateError, AnnotateResult};
use crate::export::DocumentExporter;
use crate::overlay::OverlayStore;
use crate::raster::{DISPLAY_SCALE, PageRasterizer};
use crate::source::{DocumentRef, DocumentSource, SourceError};
use crate::storage::{ArtifactMetadata, Storage};
use crate::surface::{OverlaySurface, PixelSize};
use crate::tools::{SerializableColor, StrokeCompositor, ToolMode, ToolState};

/// Signals teardown to in-flight session work.
///
/// Clones share the same flag. Results of fetches or rasterizations that
/// complete after [`CancelHandle::cancel`] are discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for opening a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Overlays from an earlier review of the same document.
    pub store: OverlayStore,
    pub tool: ToolState,
    pub cancel: CancelHandle,
}

impl SessionOptions {
    pub fn with_store(mut self, store: OverlayStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_tool(mut self, tool: ToolState) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Immutable source document.
#[derive(Debug, Clone)]
struct SourceDocument {
    bytes: Arc<[u8]>,
    page_count: u32,
}

/// A single operator's annotation session over one document.
pub struct PageSession<R: PageRasterizer> {
    id: Uuid,
    rasterizer: Arc<R>,
    document: SourceDocument,
    current: PageIndex,
    base: RgbaImage,
    overlay: OverlaySurface,
    store: OverlayStore,
    compositor: StrokeCompositor,
    tool: ToolState,
    cancel: CancelHandle,
}

impl<R: PageRasterizer> PageSession<R> {
    /// Fetch the document and open a session on page 1.
    pub async fn load(
        source: &DocumentSource,
        doc: &DocumentRef,
        rasterizer: Arc<R>,
        options: SessionOptions,
    ) -> AnnotateResult<Self> {
        let bytes = source.fetch(doc).await?;
        if options.cancel.is_cancelled() {
            log::debug!("Discarding fetch of {}: session closed", doc.url);
            return Err(AnnotateError::Cancelled);
        }
        Self::open(bytes, rasterizer, options).await
    }

    /// Open a session over `bytes`, showing page 1.
    pub async fn open(bytes: Vec<u8>, rasterizer: Arc<R>, options: SessionOptions) -> AnnotateResult<Self> {
        let page_count = rasterizer
            .page_count(&bytes)
            .map_err(|e| SourceError::Unparseable(e.to_string()))?;
        if page_count == 0 {
            return Err(SourceError::Unparseable("document has no pages".to_string()).into());
        }

        let document = SourceDocument {
            bytes: bytes.into(),
            page_count,
        };
        let (base, overlay) = render_page(rasterizer.as_ref(), &document, &options.store, 1, &options.cancel).await?;

        let session = Self {
            id: Uuid::new_v4(),
            rasterizer,
            document,
            current: 1,
            base,
            overlay,
            store: options.store,
            compositor: StrokeCompositor::new(),
            tool: options.tool,
            cancel: options.cancel,
        };
        log::info!(
            "Session {} opened: {} pages, {} annotated",
            session.id,
            page_count,
            session.store.len()
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn current_page(&self) -> PageIndex {
        self.current
    }

    pub fn page_count(&self) -> u32 {
        self.document.page_count
    }

    /// "current / total" for the page navigator.
    pub fn page_indicator(&self) -> String {
        format!("{} / {}", self.current, self.document.page_count)
    }

    /// Rendered base pixels of the current page.
    pub fn base(&self) -> &RgbaImage {
        &self.base
    }

    /// Live overlay of the current page.
    pub fn overlay(&self) -> &OverlaySurface {
        &self.overlay
    }

    pub fn page_size(&self) -> PixelSize {
        self.overlay.size()
    }

    pub fn store(&self) -> &OverlayStore {
        &self.store
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn tool(&self) -> &ToolState {
        &self.tool
    }

    pub fn set_tool(&mut self, tool: ToolState) {
        self.tool = tool;
    }

    pub fn set_mode(&mut self, mode: ToolMode) {
        self.tool.mode = mode;
    }

    pub fn set_color(&mut self, color: SerializableColor) {
        self.tool.color = color;
    }

    pub fn set_stroke_width(&mut self, width: f64) {
        self.tool.stroke_width = width.max(0.0);
    }

    /// Snapshot the live overlay into the store under the current page.
    pub fn flush(&mut self) -> AnnotateResult<()> {
        self.store.flush(self.current, &self.overlay)?;
        Ok(())
    }

    /// Navigate to page `page`.
    ///
    /// On failure the session stays on the current page with its overlay
    /// intact.
    pub async fn show_page(&mut self, page: PageIndex) -> AnnotateResult<()> {
        self.ensure_open()?;
        if page == 0 || page > self.document.page_count {
            return Err(AnnotateError::PageOutOfRange {
                page,
                page_count: self.document.page_count,
            });
        }

        self.compositor.pointer_cancel();
        self.flush()?;

        let (base, overlay) =
            render_page(self.rasterizer.as_ref(), &self.document, &self.store, page, &self.cancel).await?;

        log::debug!("Session {}: page {} -> {}", self.id, self.current, page);
        self.current = page;
        self.base = base;
        self.overlay = overlay;
        Ok(())
    }

    /// Go to the next page; no-op on the last page.
    pub async fn next_page(&mut self) -> AnnotateResult<()> {
        if self.current < self.document.page_count {
            self.show_page(self.current + 1).await
        } else {
            Ok(())
        }
    }

    /// Go to the previous page; no-op on the first page.
    pub async fn prev_page(&mut self) -> AnnotateResult<()> {
        if self.current > 1 {
            self.show_page(self.current - 1).await
        } else {
            Ok(())
        }
    }

    pub fn pointer_down(&mut self, point: Point) {
        self.compositor.pointer_down(point);
    }

    /// Extend the current stroke. Returns false when no stroke is active.
    pub fn pointer_move(&mut self, point: Point) -> bool {
        self.compositor.pointer_move(point, &self.tool, &mut self.overlay)
    }

    /// Finish the stroke and snapshot the page immediately.
    pub fn pointer_up(&mut self) -> AnnotateResult<()> {
        if self.compositor.pointer_up() {
            self.flush()?;
        }
        Ok(())
    }

    /// Abort the stroke; segments already drawn are kept and snapshotted.
    pub fn pointer_cancel(&mut self) -> AnnotateResult<()> {
        if self.compositor.pointer_cancel() {
            self.flush()?;
        }
        Ok(())
    }

    /// Erase every mark on the current page.
    pub fn clear_current_page(&mut self) {
        self.compositor.pointer_cancel();
        self.overlay.clear();
        if self.store.remove(self.current) {
            log::info!("Session {}: cleared page {}", self.id, self.current);
        }
    }

    /// Flush the live overlay and export the merged document.
    pub async fn export<S: Storage>(
        &mut self,
        exporter: &DocumentExporter<S>,
        doc: &DocumentRef,
        record_id: &str,
    ) -> AnnotateResult<ArtifactMetadata> {
        self.ensure_open()?;
        self.flush()?;
        exporter.export(doc, &self.store, record_id).await
    }

    /// Tear the session down, returning the overlays for later reuse.
    pub fn close(mut self) -> AnnotateResult<OverlayStore> {
        self.compositor.pointer_cancel();
        self.flush()?;
        self.cancel.cancel();
        log::info!("Session {} closed with {} annotated pages", self.id, self.store.len());
        Ok(self.store)
    }

    fn ensure_open(&self) -> AnnotateResult<()> {
        if self.cancel.is_cancelled() {
            Err(AnnotateError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Rasterize `page` and build a matching overlay restored from the store.
async fn render_page<R: PageRasterizer>(
    rasterizer: &R,
    document: &SourceDocument,
    store: &OverlayStore,
    page: PageIndex,
    cancel: &CancelHandle,
) -> AnnotateResult<(RgbaImage, OverlaySurface)> {
    let rendered = rasterizer
        .render(&document.bytes, page, DISPLAY_SCALE)
        .await
        .map_err(|source| {
            log::warn!("Rasterizing page {} failed: {}", page, source);
            AnnotateError::RasterizationFailed { page, source }
        })?;

    if cancel.is_cancelled() {
        log::debug!("Discarding rasterization of page {}: session closed", page);
        return Err(AnnotateError::Cancelled);
    }

    let size = rendered.size();
    let base = rendered
        .paint()
        .map_err(|source| AnnotateError::RasterizationFailed { page, source })?;

    let mut overlay = OverlaySurface::new(size);
    if store.restore(page, &mut overlay)? {
        log::debug!("Restored overlay for page {}", page);
    }
    Ok((base, overlay))
}
