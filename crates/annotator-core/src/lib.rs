//! PDF annotation core
//!
//! Everything the browser annotator does that is not rendering: upload
//! checks, form introspection, the annotation store, the pointer/keyboard
//! state machine and the export compositor that bakes boxes, text and form
//! values into a new PDF with lopdf.
//!
//! [`AnnotatorSession`] wires the pieces together for one loaded document.

pub mod config;
pub mod coords;
pub mod error;
pub mod export;
pub mod forms;
pub mod interaction;
pub mod page;
mod pdf_objects;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod upload;

#[cfg(test)]
mod testing;

pub use config::{AnnotatorConfig, StrokeStyle};
pub use coords::{fit_scale, PageSize, Point, ScreenRect, Viewport};
pub use error::{AnnotatorError, ConfigError, ExportError, FormValueError, UploadError};
pub use export::{export_document, ExportOutput, ExportWarning};
pub use forms::{introspect, FieldKind, FormFieldDescriptor, FormIntrospection};
pub use interaction::{InteractionMachine, Key, Outcome, ToolMode};
pub use session::{AnnotatorSession, BoxView, EditView, FieldOverlay, TextView};
pub use snapshot::AnnotationSnapshot;
pub use store::{AnnotationStore, BoundingBox, FormValue, FormValues, TextAnnotation, TextPatch};
pub use upload::validate_upload;

use std::collections::BTreeMap;

/// Count the pages of a document
pub fn get_page_count(bytes: &[u8]) -> Result<u32, ExportError> {
    let doc =
        lopdf::Document::load_mem(bytes).map_err(|e| ExportError::ParseError(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}

/// Natural size of every page, keyed by 1-based page number
pub fn get_page_sizes(bytes: &[u8]) -> Result<BTreeMap<u32, PageSize>, ExportError> {
    let doc =
        lopdf::Document::load_mem(bytes).map_err(|e| ExportError::ParseError(e.to_string()))?;
    Ok(page::page_sizes(&doc))
}
