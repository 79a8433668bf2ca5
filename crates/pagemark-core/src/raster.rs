//! Page rasterizer contract.
//!
//! Rendering page content to pixels is an external capability. The session
//! only needs a page count, each page's pixel size at [`DISPLAY_SCALE`], and a
//! way to paint the page onto a surface of exactly that size.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{Rgba, RgbaImage};
use lopdf::Document;
use thiserror::Error;

use crate::PageIndex;
use crate::pdf::{PageExtent, page_extent};
use crate::storage::BoxFuture;
use crate::surface::PixelSize;

/// Pixels per PDF point for both live rendering and export sizing.
///
/// Overlays are embedded at full page extent with no further transform, so
/// drawing and export must agree on this value.
pub const DISPLAY_SCALE: f64 = 1.5;

/// Rasterizer errors.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Document could not be parsed: {0}")]
    Unparseable(String),
    #[error("Page {0} does not exist")]
    PageMissing(PageIndex),
    #[error("Painting failed: {0}")]
    Paint(String),
}

pub type RasterResult<T> = Result<T, RasterError>;

type PaintFn = Box<dyn FnOnce(&mut RgbaImage) -> RasterResult<()> + Send>;

/// A page ready to be painted.
pub struct RenderedPage {
    size: PixelSize,
    paint: PaintFn,
}

impl RenderedPage {
    pub fn new(
        size: PixelSize,
        paint: impl FnOnce(&mut RgbaImage) -> RasterResult<()> + Send + 'static,
    ) -> Self {
        Self {
            size,
            paint: Box::new(paint),
        }
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    /// Paint onto a freshly allocated surface of exactly [`Self::size`].
    pub fn paint(self) -> RasterResult<RgbaImage> {
        let mut surface = RgbaImage::new(self.size.width, self.size.height);
        (self.paint)(&mut surface)?;
        if surface.dimensions() != (self.size.width, self.size.height) {
            return Err(RasterError::Paint(format!(
                "painter resized the surface to {:?}",
                surface.dimensions()
            )));
        }
        Ok(surface)
    }
}

impl std::fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedPage").field("size", &self.size).finish()
    }
}

/// Trait for page rendering backends.
pub trait PageRasterizer: Send + Sync {
    /// Number of pages, or an error if the bytes are not a readable document.
    fn page_count(&self, document: &[u8]) -> RasterResult<u32>;

    /// Prepare `page` for painting at `scale` pixels per point.
    fn render<'a>(&'a self, document: &'a [u8], page: PageIndex, scale: f64) -> BoxFuture<'a, RasterResult<RenderedPage>>;
}

/// Headless rasterizer: sizes pages from their MediaBox and paints them
/// white.
///
/// The page layout of the most recent document is kept, so a session's
/// renders parse the document once.
#[derive(Debug, Default)]
pub struct BlankPageRasterizer {
    layout: Mutex<Option<PageLayout>>,
    parses: AtomicUsize,
}

#[derive(Debug)]
struct PageLayout {
    source: Vec<u8>,
    extents: Arc<Vec<PageExtent>>,
}

impl BlankPageRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page extents of `document` in page order.
    fn extents(&self, document: &[u8]) -> RasterResult<Arc<Vec<PageExtent>>> {
        let mut layout = self
            .layout
            .lock()
            .map_err(|e| RasterError::Paint(format!("Lock error: {}", e)))?;
        if let Some(cached) = layout.as_ref().filter(|l| l.source == document) {
            return Ok(cached.extents.clone());
        }

        let doc = Document::load_mem(document).map_err(|e| RasterError::Unparseable(e.to_string()))?;
        self.parses.fetch_add(1, Ordering::Relaxed);
        let extents: Arc<Vec<PageExtent>> = Arc::new(
            doc.get_pages()
                .values()
                .map(|page_id| page_extent(&doc, *page_id))
                .collect(),
        );
        *layout = Some(PageLayout {
            source: document.to_vec(),
            extents: extents.clone(),
        });
        Ok(extents)
    }
}

impl PageRasterizer for BlankPageRasterizer {
    fn page_count(&self, document: &[u8]) -> RasterResult<u32> {
        Ok(self.extents(document)?.len() as u32)
    }

    fn render<'a>(&'a self, document: &'a [u8], page: PageIndex, scale: f64) -> BoxFuture<'a, RasterResult<RenderedPage>> {
        Box::pin(async move {
            let extents = self.extents(document)?;
            let extent = page
                .checked_sub(1)
                .and_then(|i| extents.get(i as usize))
                .ok_or(RasterError::PageMissing(page))?;
            let size = PixelSize::from_points(extent.width, extent.height, scale);
            Ok(RenderedPage::new(size, |surface| {
                for pixel in surface.pixels_mut() {
                    *pixel = Rgba([255, 255, 255, 255]);
                }
                Ok(())
            }))
        })
    }
}
