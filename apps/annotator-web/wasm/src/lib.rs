//! WASM bindings for the PDF annotator
//!
//! All annotation state lives in Rust inside [`PdfAnnotator`]. JavaScript
//! renders pages, forwards pointer and keyboard events with page-relative
//! coordinates, draws the overlays it is handed back, and triggers the
//! download.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { PdfAnnotator } from './pkg/annotator_wasm.js';
//!
//! await init();
//!
//! const annotator = new PdfAnnotator();
//! const forms = annotator.openDocument(file.name, file.type, bytes);
//! annotator.setContainerSize(container.clientWidth, container.clientHeight);
//! const scale = annotator.pageLoaded(1, page.width, page.height);
//!
//! annotator.setMode("box");
//! annotator.pointerDown(1, e.offsetX, e.offsetY);
//! document.addEventListener("pointermove", (e) => annotator.pointerMove(x, y));
//! document.addEventListener("pointerup", (e) => annotator.pointerUp(x, y));
//! document.addEventListener("keydown", (e) => annotator.keyDown(e.key));
//!
//! const boxes = annotator.renderBoxes(1);
//! const pdf = annotator.exportPdf();
//! downloadBlob(pdf, annotator.exportFileName());
//! ```

pub mod session;

use wasm_bindgen::prelude::*;

pub use session::PdfAnnotator;

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    web_sys::console::log_1(&"Annotator WASM initialized".into());
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Check a picked file before reading it, using the default limits
/// Returns Ok(()) if acceptable, Err with a user-facing message if not
#[wasm_bindgen(js_name = validateUpload)]
pub fn validate_upload(mime: &str, size: usize) -> Result<(), JsValue> {
    annotator_core::validate_upload(mime, size, &annotator_core::AnnotatorConfig::default())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Get page count from PDF bytes (convenience function)
#[wasm_bindgen(js_name = getPageCount)]
pub fn get_page_count(bytes: &[u8]) -> Result<u32, JsValue> {
    annotator_core::get_page_count(bytes).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Natural size of every page, as `{ "1": { width, height }, ... }`
#[wasm_bindgen(js_name = getPageSizes)]
pub fn get_page_sizes(bytes: &[u8]) -> Result<JsValue, JsValue> {
    let sizes =
        annotator_core::get_page_sizes(bytes).map_err(|e| JsValue::from_str(&e.to_string()))?;
    session::to_js(&sizes)
}
