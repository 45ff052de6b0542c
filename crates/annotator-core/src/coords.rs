//! Coordinate transformation between screen space and PDF space
//!
//! Screen space is the rendered page element: top-left origin, pixels,
//! multiplied by the current zoom scale. Annotations are stored in an
//! unscaled top-left space (`page = screen / scale`) and only flipped into
//! the PDF's bottom-left user space at export time.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Natural size of a page in PDF units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Axis-aligned rectangle with a top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    /// Rectangle spanning two arbitrary corners
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

/// Pick the display scale for a document.
///
/// The page is fitted inside the container without exceeding `max_scale`.
pub fn fit_scale(container_width: f64, container_height: f64, page: PageSize, max_scale: f64) -> f64 {
    if page.width <= 0.0 || page.height <= 0.0 {
        return max_scale;
    }
    let scale = (container_width / page.width)
        .min(container_height / page.height)
        .min(max_scale);
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        max_scale
    }
}

/// Current zoom applied to every page of the loaded document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl Viewport {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    pub fn screen_to_page(&self, p: Point) -> Point {
        Point::new(p.x / self.scale, p.y / self.scale)
    }

    pub fn page_to_screen(&self, p: Point) -> Point {
        Point::new(p.x * self.scale, p.y * self.scale)
    }

    /// Project a PDF-space rectangle `[x1, y1, x2, y2]` (bottom-left origin)
    /// onto the rendered page
    pub fn pdf_rect_to_screen(&self, rect: [f64; 4], page_height: f64) -> ScreenRect {
        let top = page_height - rect[1].max(rect[3]);
        ScreenRect {
            x: rect[0].min(rect[2]) * self.scale,
            y: top * self.scale,
            width: (rect[2] - rect[0]).abs() * self.scale,
            height: (rect[3] - rect[1]).abs() * self.scale,
        }
    }
}

/// Flip a top-left-origin `y` into PDF bottom-left space
pub fn to_pdf_y(page_height: f64, y: f64) -> f64 {
    page_height - y
}

/// Round to one decimal place
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
