//! Per-page overlay snapshots.
//!
//! Only one overlay surface is ever live (the page on screen). Every other
//! page's annotations rest here as PNG snapshots; `flush` and `restore` are the
//! only ways state moves between the two.

mod snapshot;

pub use snapshot::{Snapshot, SnapshotError, SnapshotResult};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::PageIndex;
use crate::surface::OverlaySurface;

/// Mapping from page to encoded overlay.
///
/// A page without an entry has no annotations. Blank overlays are never
/// stored: flushing a blank surface removes the entry instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayStore {
    entries: HashMap<PageIndex, Snapshot>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `surface` as the overlay of `page`.
    pub fn flush(&mut self, page: PageIndex, surface: &OverlaySurface) -> SnapshotResult<()> {
        if surface.is_blank() {
            if self.entries.remove(&page).is_some() {
                log::debug!("Overlay for page {} is blank, entry removed", page);
            }
            return Ok(());
        }
        let snapshot = Snapshot::encode(surface)?;
        log::debug!(
            "Flushed overlay for page {} ({} bytes)",
            page,
            snapshot.png_bytes().len()
        );
        self.entries.insert(page, snapshot);
        Ok(())
    }

    /// Paint the stored overlay for `page` onto `surface`.
    ///
    /// Returns `Ok(false)` and leaves the surface untouched when the page has
    /// no entry.
    pub fn restore(&self, page: PageIndex, surface: &mut OverlaySurface) -> SnapshotResult<bool> {
        match self.entries.get(&page) {
            Some(snapshot) => {
                snapshot.restore_into(surface)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Insert a snapshot directly (e.g. one imported from disk).
    pub fn insert(&mut self, page: PageIndex, snapshot: Snapshot) {
        self.entries.insert(page, snapshot);
    }

    /// Drop the overlay for `page`. Returns true if there was one.
    pub fn remove(&mut self, page: PageIndex) -> bool {
        self.entries.remove(&page).is_some()
    }

    pub fn get(&self, page: PageIndex) -> Option<&Snapshot> {
        self.entries.get(&page)
    }

    pub fn contains(&self, page: PageIndex) -> bool {
        self.entries.contains_key(&page)
    }

    /// Annotated pages in ascending order.
    pub fn pages(&self) -> Vec<PageIndex> {
        let mut pages: Vec<_> = self.entries.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    /// Entries in ascending page order.
    pub fn iter(&self) -> impl Iterator<Item = (PageIndex, &Snapshot)> {
        self.pages()
            .into_iter()
            .filter_map(|page| self.entries.get(&page).map(|s| (page, s)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to JSON so a review can be resumed later.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::PixelSize;
    use crate::tools::{SerializableColor, ToolState, draw_segment};
    use kurbo::Point;

    fn marked(size: PixelSize) -> OverlaySurface {
        let mut surface = OverlaySurface::new(size);
        draw_segment(
            &mut surface,
            Point::new(2.0, 2.0),
            Point::new(15.0, 9.0),
            &ToolState::marker(SerializableColor::black(), 3.0),
        );
        surface
    }

    #[test]
    fn test_flush_and_restore() {
        let size = PixelSize::new(20, 12);
        let mut store = OverlayStore::new();
        let surface = marked(size);

        store.flush(2, &surface).unwrap();
        assert!(store.contains(2));

        let mut restored = OverlaySurface::new(size);
        assert!(store.restore(2, &mut restored).unwrap());
        assert_eq!(restored, surface);
    }

    #[test]
    fn test_restore_missing_is_not_an_error() {
        let store = OverlayStore::new();
        let mut surface = OverlaySurface::new(PixelSize::new(5, 5));
        assert!(!store.restore(1, &mut surface).unwrap());
        assert!(surface.is_blank());
    }

    #[test]
    fn test_flush_blank_removes_entry() {
        let size = PixelSize::new(20, 12);
        let mut store = OverlayStore::new();
        store.flush(1, &marked(size)).unwrap();
        assert_eq!(store.len(), 1);

        store.flush(1, &OverlaySurface::new(size)).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_flush_blank_never_creates_entry() {
        let mut store = OverlayStore::new();
        store.flush(4, &OverlaySurface::new(PixelSize::new(8, 8))).unwrap();
        assert!(!store.contains(4));
    }

    #[test]
    fn test_pages_sorted() {
        let size = PixelSize::new(20, 12);
        let mut store = OverlayStore::new();
        for page in [3, 1, 7] {
            store.flush(page, &marked(size)).unwrap();
        }
        assert_eq!(store.pages(), vec![1, 3, 7]);
        assert_eq!(store.iter().map(|(p, _)| p).collect::<Vec<_>>(), vec![1, 3, 7]);
    }

    #[test]
    fn test_json_roundtrip_preserves_pixels() {
        let size = PixelSize::new(20, 12);
        let mut store = OverlayStore::new();
        let surface = marked(size);
        store.flush(5, &surface).unwrap();

        let loaded = OverlayStore::from_json(&store.to_json().unwrap()).unwrap();
        let mut restored = OverlaySurface::new(size);
        assert!(loaded.restore(5, &mut restored).unwrap());
        assert_eq!(restored, surface);
    }
}
