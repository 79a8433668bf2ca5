//! Page-tree helpers shared by the blank rasterizer and the compositor.

use lopdf::{Dictionary, Document, Object, ObjectId};

/// US Letter, used when a page tree carries no usable MediaBox.
const FALLBACK_EXTENT: PageExtent = PageExtent {
    x: 0.0,
    y: 0.0,
    width: 612.0,
    height: 792.0,
};

/// Full page area in PDF user-space points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageExtent {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// The page's MediaBox, inherited through `Parent` links when absent.
pub fn page_extent(doc: &Document, page_id: ObjectId) -> PageExtent {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        if let Some(extent) = media_box(doc, dict) {
            return extent;
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    log::warn!("Page {:?} has no MediaBox, assuming US Letter", page_id);
    FALLBACK_EXTENT
}

fn media_box(doc: &Document, dict: &Dictionary) -> Option<PageExtent> {
    let raw = dict.get(b"MediaBox").ok()?;
    let arr = resolve(doc, raw).as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let llx = number(doc, &arr[0])?;
    let lly = number(doc, &arr[1])?;
    let urx = number(doc, &arr[2])?;
    let ury = number(doc, &arr[3])?;

    let extent = PageExtent {
        x: llx.min(urx),
        y: lly.min(ury),
        width: (urx - llx).abs(),
        height: (ury - lly).abs(),
    };
    (extent.width > 0.0 && extent.height > 0.0).then_some(extent)
}

/// Follow a single indirect reference.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn number(doc: &Document, obj: &Object) -> Option<f64> {
    match resolve(doc, obj) {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some((*f).into()),
        _ => None,
    }
}

/// Inherited page attribute (`Resources`, `MediaBox`, ...) looked up through
/// the page's ancestors, excluding the page itself.
pub fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let page = doc.get_dictionary(page_id).ok()?;
    let mut current = page.get(b"Parent").and_then(Object::as_reference).ok();
    while let Some(id) = current {
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::sample_pdf;

    #[test]
    fn test_page_extent_reads_media_box() {
        let doc = Document::load_mem(&sample_pdf(&[(200.0, 100.0), (300.0, 400.0)])).unwrap();
        let pages = doc.get_pages();

        assert_eq!(
            page_extent(&doc, pages[&2]),
            PageExtent { x: 0.0, y: 0.0, width: 300.0, height: 400.0 }
        );
    }

    #[test]
    fn test_page_extent_inherits_from_parent() {
        let mut doc = Document::load_mem(&sample_pdf(&[(200.0, 100.0)])).unwrap();
        let page_id = doc.get_pages()[&1];
        let parent_id = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Parent")
            .unwrap()
            .as_reference()
            .unwrap();

        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .remove(b"MediaBox");
        doc.get_object_mut(parent_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .set(
                "MediaBox",
                vec![
                    Object::Integer(10),
                    Object::Integer(20),
                    Object::Integer(110),
                    Object::Integer(70),
                ],
            );

        assert_eq!(
            page_extent(&doc, page_id),
            PageExtent { x: 10.0, y: 20.0, width: 100.0, height: 50.0 }
        );
    }
}
