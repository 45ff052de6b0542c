//! Page geometry read from the document
//!
//! Export needs each page's real MediaBox to flip stored top-left `y`
//! values into PDF space.

use crate::coords::{PageSize, ScreenRect, Viewport};
use crate::pdf_objects::{rect, resolve_dict};
use lopdf::{Dictionary, Document, ObjectId};
use std::collections::BTreeMap;

/// US Letter, used when no MediaBox can be found
const FALLBACK_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Inheritance depth limit when walking `Parent` links
const MAX_PARENT_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl MediaBox {
    fn from_array(b: [f64; 4]) -> Self {
        Self {
            x: b[0],
            y: b[1],
            width: b[2] - b[0],
            height: b[3] - b[1],
        }
    }

    pub fn size(&self) -> PageSize {
        PageSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Convert an unscaled top-left-origin point on this page into PDF
    /// user space
    pub fn to_pdf(&self, x: f64, y: f64) -> (f64, f64) {
        (self.x + x, self.y + self.height - y)
    }

    /// Project a PDF-space rectangle on this page onto the rendered page
    pub fn rect_to_screen(&self, rect: [f64; 4], viewport: &Viewport) -> ScreenRect {
        let shifted = [
            rect[0] - self.x,
            rect[1] - self.y,
            rect[2] - self.x,
            rect[3] - self.y,
        ];
        viewport.pdf_rect_to_screen(shifted, self.height)
    }
}

impl Default for MediaBox {
    fn default() -> Self {
        Self::from_array(FALLBACK_MEDIA_BOX)
    }
}

/// MediaBox of every page keyed by 1-indexed page number
pub fn media_boxes(doc: &Document) -> BTreeMap<u32, MediaBox> {
    doc.get_pages()
        .into_iter()
        .map(|(num, id)| (num, media_box(doc, id)))
        .collect()
}

/// Natural size of every page keyed by 1-indexed page number
pub fn page_sizes(doc: &Document) -> BTreeMap<u32, PageSize> {
    media_boxes(doc)
        .into_iter()
        .map(|(num, mb)| (num, mb.size()))
        .collect()
}

/// MediaBox of one page, inherited from ancestors when the page omits it
pub fn media_box(doc: &Document, page_id: ObjectId) -> MediaBox {
    let Ok(page_dict) = doc.get_dictionary(page_id) else {
        return MediaBox::from_array(FALLBACK_MEDIA_BOX);
    };
    let found = inherited(doc, page_dict, b"MediaBox", |d| {
        d.get(b"MediaBox").ok().and_then(|o| rect(doc, o))
    });
    MediaBox::from_array(found.unwrap_or(FALLBACK_MEDIA_BOX))
}

/// Look up an inheritable page attribute, walking the `Parent` chain
pub(crate) fn inherited<T>(
    doc: &Document,
    page_dict: &Dictionary,
    key: &[u8],
    read: impl Fn(&Dictionary) -> Option<T>,
) -> Option<T> {
    let mut current = page_dict;
    for _ in 0..MAX_PARENT_DEPTH {
        if current.has(key) {
            if let Some(value) = read(current) {
                return Some(value);
            }
        }
        current = current
            .get(b"Parent")
            .ok()
            .and_then(|p| resolve_dict(doc, p))?;
    }
    None
}
