//! Merge overlay snapshots into a PDF.
//!
//! Each stored overlay becomes an RGB image XObject with a DeviceGray soft
//! mask, drawn over the full MediaBox after the page's own content.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::RgbaImage;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use thiserror::Error;

use crate::PageIndex;
use crate::overlay::{OverlayStore, SnapshotError};
use crate::pdf::{PageExtent, inherited_attribute, page_extent, resolve};
use crate::raster::DISPLAY_SCALE;
use crate::surface::PixelSize;

const OVERLAY_NAME_PREFIX: &str = "PmOverlay";

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Document could not be opened: {0}")]
    Open(#[from] lopdf::Error),
    #[error("Page {page}: {message}")]
    Page { page: PageIndex, message: String },
    #[error("Overlay for page {page} is unreadable: {source}")]
    Snapshot {
        page: PageIndex,
        #[source]
        source: SnapshotError,
    },
    #[error("Overlay for page {page} is {found:?} but the page renders at {expected:?}")]
    SizeMismatch {
        page: PageIndex,
        expected: PixelSize,
        found: PixelSize,
    },
    #[error("Compression failed: {0}")]
    Compress(#[from] std::io::Error),
    #[error("Document could not be written: {0}")]
    Save(String),
}

pub type ComposeResult<T> = Result<T, ComposeError>;

/// Result of [`composite`].
#[derive(Debug)]
pub struct Composited {
    pub bytes: Vec<u8>,
    /// Pages that received an overlay.
    pub stamped: Vec<PageIndex>,
    /// Store entries with no matching page in the document.
    pub skipped: Vec<PageIndex>,
}

/// Draw every overlay in `store` onto its page of `document`.
///
/// Pages without an entry keep their content streams untouched. An overlay
/// must have the page's pixel size at [`DISPLAY_SCALE`].
pub fn composite(document: &[u8], store: &OverlayStore) -> ComposeResult<Composited> {
    let mut doc = Document::load_mem(document)?;
    let pages = doc.get_pages();
    let mut stamped = Vec::new();
    let mut skipped = Vec::new();

    for (page, snapshot) in store.iter() {
        let Some(&page_id) = pages.get(&page) else {
            log::warn!(
                "Skipping overlay for page {}: document has {} pages",
                page,
                pages.len()
            );
            skipped.push(page);
            continue;
        };

        let extent = page_extent(&doc, page_id);
        let expected = PixelSize::from_points(extent.width, extent.height, DISPLAY_SCALE);
        if snapshot.size != expected {
            return Err(ComposeError::SizeMismatch {
                page,
                expected,
                found: snapshot.size,
            });
        }
        let pixels = snapshot
            .decode()
            .map_err(|source| ComposeError::Snapshot { page, source })?;
        let image_id = embed_image(&mut doc, &pixels)?;
        stamp_page(&mut doc, page, page_id, image_id, extent)?;
        stamped.push(page);
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ComposeError::Save(e.to_string()))?;

    Ok(Composited {
        bytes,
        stamped,
        skipped,
    })
}

fn deflate(data: &[u8]) -> ComposeResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Add the overlay as an image XObject with a soft mask; returns the image id.
fn embed_image(doc: &mut Document, pixels: &RgbaImage) -> ComposeResult<ObjectId> {
    let (width, height) = pixels.dimensions();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in pixels.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let smask_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        deflate(&alpha)?,
    ));

    Ok(doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
            "SMask" => smask_id,
        },
        deflate(&rgb)?,
    )))
}

fn stamp_page(
    doc: &mut Document,
    page: PageIndex,
    page_id: ObjectId,
    image_id: ObjectId,
    extent: PageExtent,
) -> ComposeResult<()> {
    let page_error = |message: &str| ComposeError::Page {
        page,
        message: message.to_string(),
    };

    let (resources, name) = resources_with_image(doc, page_id, image_id);
    let mut contents = existing_contents(doc, page_id);
    let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let draw = format!(
        "\nQ\nq {} 0 0 {} {} {} cm /{} Do Q\n",
        extent.width, extent.height, extent.x, extent.y, name
    );
    let draw_id = doc.add_object(Stream::new(dictionary! {}, draw.into_bytes()));
    contents.insert(0, Object::Reference(open_id));
    contents.push(Object::Reference(draw_id));

    let page_dict = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|_| page_error("page object is not a dictionary"))?;
    // Resources are written inline so pages sharing a dictionary stay unchanged.
    page_dict.set("Resources", resources);
    page_dict.set("Contents", contents);
    Ok(())
}

/// A copy of the page's resources with the image registered under a fresh
/// XObject name.
fn resources_with_image(doc: &Document, page_id: ObjectId, image_id: ObjectId) -> (Dictionary, String) {
    let mut resources = page_resources(doc, page_id);
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_dict().ok())
        .cloned()
        .unwrap_or_default();
    let name = unused_name(&xobjects);
    xobjects.set(name.clone(), image_id);
    resources.set("XObject", xobjects);
    (resources, name)
}

/// The page's effective resource dictionary, copied.
fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let own = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|dict| dict.get(b"Resources").ok().cloned());
    own.or_else(|| inherited_attribute(doc, page_id, b"Resources"))
        .and_then(|obj| resolve(doc, &obj).as_dict().ok().cloned())
        .unwrap_or_default()
}

/// The page's content streams as a list of references.
fn existing_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Some(contents) = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|dict| dict.get(b"Contents").ok())
    else {
        return Vec::new();
    };
    match contents {
        Object::Array(items) => items.clone(),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    }
}

fn unused_name(xobjects: &Dictionary) -> String {
    (1..)
        .map(|n| format!("{}{}", OVERLAY_NAME_PREFIX, n))
        .find(|name| !xobjects.has(name.as_bytes()))
        .unwrap_or_else(|| OVERLAY_NAME_PREFIX.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::Snapshot;
    use crate::surface::OverlaySurface;
    use crate::test_util::sample_pdf;
    use crate::tools::{SerializableColor, ToolState, draw_segment};
    use flate2::read::ZlibDecoder;
    use kurbo::Point;
    use std::io::Read;

    fn marked_store(doc: &[u8], pages: &[PageIndex]) -> OverlayStore {
        let parsed = Document::load_mem(doc).unwrap();
        let ids = parsed.get_pages();
        let mut store = OverlayStore::new();
        for &page in pages {
            let extent = page_extent(&parsed, ids[&page]);
            let mut surface =
                OverlaySurface::new(PixelSize::from_points(extent.width, extent.height, DISPLAY_SCALE));
            let tool = ToolState::marker(SerializableColor::red(), 4.0);
            draw_segment(&mut surface, Point::new(5.0, 5.0), Point::new(60.0, 40.0), &tool);
            store.flush(page, &surface).unwrap();
        }
        store
    }

    fn xobject_names(doc: &Document, page_id: ObjectId) -> Vec<Vec<u8>> {
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = resolve(doc, page.get(b"Resources").unwrap()).as_dict().unwrap();
        let xobjects = resolve(doc, resources.get(b"XObject").unwrap()).as_dict().unwrap();
        xobjects.iter().map(|(k, _)| k.clone()).collect()
    }

    #[test]
    fn test_composite_stamps_only_stored_pages() {
        let pdf = sample_pdf(&[(200.0, 100.0), (200.0, 100.0), (300.0, 400.0)]);
        let original = Document::load_mem(&pdf).unwrap();
        let page2_before = original.get_page_content(original.get_pages()[&2]).unwrap();

        let store = marked_store(&pdf, &[1, 3]);
        let out = composite(&pdf, &store).unwrap();
        assert_eq!(out.stamped, vec![1, 3]);
        assert!(out.skipped.is_empty());

        let merged = Document::load_mem(&out.bytes).unwrap();
        let pages = merged.get_pages();
        assert_eq!(pages.len(), 3);
        assert_eq!(merged.get_page_content(pages[&2]).unwrap(), page2_before);

        let page3 = String::from_utf8(merged.get_page_content(pages[&3]).unwrap()).unwrap();
        assert!(page3.starts_with("q\n"));
        assert!(page3.contains("% page 3"));
        assert!(page3.ends_with("q 300 0 0 400 0 0 cm /PmOverlay1 Do Q\n"));
        assert_eq!(xobject_names(&merged, pages[&3]), vec![b"PmOverlay1".to_vec()]);
    }

    #[test]
    fn test_composite_embeds_soft_masked_image() {
        let pdf = sample_pdf(&[(200.0, 100.0)]);
        let store = marked_store(&pdf, &[1]);
        let out = composite(&pdf, &store).unwrap();

        let merged = Document::load_mem(&out.bytes).unwrap();
        let page_id = merged.get_pages()[&1];
        let page = merged.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let image_id = xobjects.get(b"PmOverlay1").unwrap().as_reference().unwrap();
        let image = merged.get_object(image_id).unwrap().as_stream().unwrap();

        assert_eq!(image.dict.get(b"Width").unwrap().as_i64().unwrap(), 300);
        assert_eq!(image.dict.get(b"Height").unwrap().as_i64().unwrap(), 150);
        let smask_id = image.dict.get(b"SMask").unwrap().as_reference().unwrap();
        let smask = merged.get_object(smask_id).unwrap().as_stream().unwrap();
        assert_eq!(smask.dict.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceGray");

        let mut alpha = Vec::new();
        ZlibDecoder::new(smask.content.as_slice()).read_to_end(&mut alpha).unwrap();
        assert_eq!(alpha.len(), 300 * 150);
        assert!(alpha.iter().any(|&a| a == 255));
        assert!(alpha.iter().any(|&a| a == 0));
    }

    #[test]
    fn test_composite_skips_pages_beyond_document() {
        let pdf = sample_pdf(&[(200.0, 100.0), (200.0, 100.0)]);
        let mut store = marked_store(&pdf, &[1]);
        let stale = store.get(1).unwrap().clone();
        store.insert(5, stale);

        let out = composite(&pdf, &store).unwrap();
        assert_eq!(out.stamped, vec![1]);
        assert_eq!(out.skipped, vec![5]);
        assert_eq!(Document::load_mem(&out.bytes).unwrap().get_pages().len(), 2);
    }

    #[test]
    fn test_composite_keeps_shared_resources_intact() {
        let pdf = sample_pdf(&[(200.0, 100.0), (200.0, 100.0)]);
        let mut doc = Document::load_mem(&pdf).unwrap();
        let logo = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let shared = doc.add_object(dictionary! {
            "XObject" => dictionary! { "PmOverlay1" => logo },
        });
        for page_id in doc.get_pages().values() {
            doc.get_object_mut(*page_id)
                .and_then(Object::as_dict_mut)
                .unwrap()
                .set("Resources", shared);
        }
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let store = marked_store(&bytes, &[1]);
        let out = composite(&bytes, &store).unwrap();
        let merged = Document::load_mem(&out.bytes).unwrap();
        let pages = merged.get_pages();

        let mut names = xobject_names(&merged, pages[&1]);
        names.sort();
        assert_eq!(names, vec![b"PmOverlay1".to_vec(), b"PmOverlay2".to_vec()]);
        assert_eq!(xobject_names(&merged, pages[&2]), vec![b"PmOverlay1".to_vec()]);
    }

    #[test]
    fn test_composite_rejects_non_pdf() {
        let result = composite(b"<html>nope</html>", &OverlayStore::new());
        assert!(matches!(result, Err(ComposeError::Open(_))));
    }

    #[test]
    fn test_composite_rejects_overlay_of_wrong_size() {
        let pdf = sample_pdf(&[(200.0, 100.0)]);
        let mut store = OverlayStore::new();
        let mut small = OverlaySurface::new(PixelSize::new(10, 10));
        draw_segment(&mut small, Point::new(1.0, 1.0), Point::new(8.0, 8.0), &ToolState::default());
        store.insert(1, Snapshot::encode(&small).unwrap());

        let result = composite(&pdf, &store);
        assert!(matches!(
            result,
            Err(ComposeError::SizeMismatch { page: 1, expected, found })
                if expected == PixelSize::new(300, 150) && found == PixelSize::new(10, 10)
        ));
    }
}
