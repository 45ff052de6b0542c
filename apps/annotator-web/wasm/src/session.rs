//! Stateful annotator session
//!
//! Thin wasm-bindgen layer over [`AnnotatorSession`]. Every method that
//! can fail has an `*_internal` twin returning `String` errors so it can be
//! tested without a JavaScript host.

use annotator_core::{
    AnnotatorConfig, AnnotatorSession, ExportWarning, FormIntrospection, FormValue, Key, Outcome,
    ToolMode,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Maps become plain JS objects, not `Map`s
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Browser-facing annotator holding one document and its annotations
#[wasm_bindgen]
pub struct PdfAnnotator {
    session: AnnotatorSession,
    last_export: Option<(String, Vec<ExportWarning>)>,
}

impl Default for PdfAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl PdfAnnotator {
    /// Create an annotator with the default configuration
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            session: AnnotatorSession::new(AnnotatorConfig::default()),
            last_export: None,
        }
    }

    /// Create an annotator from a JSON configuration; missing keys keep
    /// their defaults
    #[wasm_bindgen(js_name = withConfig)]
    pub fn with_config(json: &str) -> Result<PdfAnnotator, JsValue> {
        let config = AnnotatorConfig::from_json(json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(Self {
            session: AnnotatorSession::new(config),
            last_export: None,
        })
    }

    // ============ Document ============

    fn open_internal(
        &mut self,
        name: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<FormIntrospection, String> {
        let forms = self
            .session
            .open(name, mime, bytes.to_vec())
            .map_err(|e| e.to_string())?
            .clone();
        self.last_export = None;
        Ok(forms)
    }

    /// Load a picked file. Returns the introspected form (`hasFormFields`,
    /// `fields`, `values`); rejects wrong types and oversized files without
    /// touching the current document.
    #[wasm_bindgen(js_name = openDocument)]
    pub fn open_document(&mut self, name: &str, mime: &str, bytes: &[u8]) -> Result<JsValue, JsValue> {
        let forms = self
            .open_internal(name, mime, bytes)
            .map_err(|e| JsValue::from_str(&e))?;
        to_js(&forms)
    }

    /// Drop the document and all annotations
    pub fn close(&mut self) {
        self.session.close();
        self.last_export = None;
    }

    #[wasm_bindgen(getter, js_name = hasDocument)]
    pub fn has_document(&self) -> bool {
        self.session.has_document()
    }

    #[wasm_bindgen(getter, js_name = pageCount)]
    pub fn page_count(&self) -> usize {
        self.session.page_count()
    }

    #[wasm_bindgen(js_name = setContainerSize)]
    pub fn set_container_size(&mut self, width: f64, height: f64) {
        self.session.set_container_size(width, height);
    }

    /// Report a rendered page's natural size; returns the scale to render at
    #[wasm_bindgen(js_name = pageLoaded)]
    pub fn page_loaded(&mut self, page: u32, width: f64, height: f64) -> f64 {
        self.session.page_loaded(page, width, height)
    }

    #[wasm_bindgen(getter)]
    pub fn scale(&self) -> f64 {
        self.session.scale()
    }

    // ============ Events ============

    fn set_mode_internal(&mut self, mode: &str) -> Result<Outcome, String> {
        let mode: ToolMode = mode.parse()?;
        Ok(self.session.set_mode(mode))
    }

    /// Switch between "box" and "text"
    #[wasm_bindgen(js_name = setMode)]
    pub fn set_mode(&mut self, mode: &str) -> Result<JsValue, JsValue> {
        let outcome = self
            .set_mode_internal(mode)
            .map_err(|e| JsValue::from_str(&e))?;
        to_js(&outcome)
    }

    #[wasm_bindgen(getter)]
    pub fn mode(&self) -> String {
        match self.session.mode() {
            ToolMode::Box => "box".to_string(),
            ToolMode::Text => "text".to_string(),
        }
    }

    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(&mut self, page: u32, x: f64, y: f64) -> Result<JsValue, JsValue> {
        to_js(&self.session.pointer_down(page, x, y))
    }

    /// Pointer moved anywhere in the document, relative to the page the
    /// gesture started on
    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(&mut self, x: f64, y: f64) -> Result<JsValue, JsValue> {
        to_js(&self.session.pointer_move(x, y))
    }

    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(&mut self, x: f64, y: f64) -> Result<JsValue, JsValue> {
        to_js(&self.session.pointer_up(x, y))
    }

    /// Forward a `KeyboardEvent.key` value
    #[wasm_bindgen(js_name = keyDown)]
    pub fn key_down(&mut self, key: &str) -> Result<JsValue, JsValue> {
        to_js(&self.session.key(Key::from_dom(key)))
    }

    /// Edit an existing text annotation in place
    #[wasm_bindgen(js_name = beginEdit)]
    pub fn begin_edit(&mut self, id: &str) -> Result<JsValue, JsValue> {
        to_js(&self.session.begin_edit(id))
    }

    pub fn cancel(&mut self) -> Result<JsValue, JsValue> {
        to_js(&self.session.cancel())
    }

    // ============ Annotations ============

    #[wasm_bindgen(js_name = removeBox)]
    pub fn remove_box(&mut self, id: &str) -> bool {
        self.session.remove_box(id)
    }

    #[wasm_bindgen(js_name = removeText)]
    pub fn remove_text(&mut self, id: &str) -> bool {
        self.session.remove_text(id)
    }

    /// Select a box, or clear the selection with `undefined`
    #[wasm_bindgen(js_name = selectBox)]
    pub fn select_box(&mut self, id: Option<String>) -> bool {
        self.session.select_box(id.as_deref())
    }

    #[wasm_bindgen(js_name = getBoxes)]
    pub fn get_boxes(&self) -> Result<JsValue, JsValue> {
        to_js(self.session.store().boxes())
    }

    /// One box by id, or `undefined`
    #[wasm_bindgen(js_name = getBox)]
    pub fn get_box(&self, id: &str) -> Result<JsValue, JsValue> {
        to_js(&self.session.store().get_box(id))
    }

    #[wasm_bindgen(js_name = getTextAnnotations)]
    pub fn get_text_annotations(&self) -> Result<JsValue, JsValue> {
        to_js(self.session.store().texts())
    }

    // ============ Form fields ============

    #[wasm_bindgen(getter, js_name = hasFormFields)]
    pub fn has_form_fields(&self) -> bool {
        self.session.has_form_fields()
    }

    #[wasm_bindgen(js_name = getFormFields)]
    pub fn get_form_fields(&self) -> Result<JsValue, JsValue> {
        to_js(self.session.form_fields())
    }

    #[wasm_bindgen(js_name = getFormValues)]
    pub fn get_form_values(&self) -> Result<JsValue, JsValue> {
        to_js(self.session.store().form_values())
    }

    fn set_form_value_internal(&mut self, name: &str, value: FormValue) -> Result<(), String> {
        self.session
            .set_form_value(name, value)
            .map_err(|e| e.to_string())
    }

    /// Set a field value: a string, a boolean or an array of strings,
    /// depending on the field type
    #[wasm_bindgen(js_name = setFormValue)]
    pub fn set_form_value(&mut self, name: &str, value: JsValue) -> Result<(), JsValue> {
        let value: FormValue = serde_wasm_bindgen::from_value(value)
            .map_err(|e| JsValue::from_str(&format!("Invalid form value: {}", e)))?;
        self.set_form_value_internal(name, value)
            .map_err(|e| JsValue::from_str(&e))
    }

    // ============ Rendering ============

    #[wasm_bindgen(js_name = renderBoxes)]
    pub fn render_boxes(&self, page: u32) -> Result<JsValue, JsValue> {
        to_js(&self.session.render_boxes(page))
    }

    #[wasm_bindgen(js_name = renderTexts)]
    pub fn render_texts(&self, page: u32) -> Result<JsValue, JsValue> {
        to_js(&self.session.render_texts(page))
    }

    #[wasm_bindgen(js_name = formOverlays)]
    pub fn form_overlays(&self, page: u32) -> Result<JsValue, JsValue> {
        to_js(&self.session.form_overlays(page))
    }

    /// Rubber-band rectangle on `page`, or `undefined`
    #[wasm_bindgen(js_name = previewRect)]
    pub fn preview_rect(&self, page: u32) -> Result<JsValue, JsValue> {
        to_js(&self.session.preview_rect(page))
    }

    /// Open text edit session, or `undefined`
    #[wasm_bindgen(js_name = editView)]
    pub fn edit_view(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.edit_view())
    }

    // ============ Snapshot / export ============

    fn export_json_internal(&self) -> Result<String, String> {
        self.session
            .snapshot()
            .to_json()
            .map_err(|e| format!("Serialization error: {}", e))
    }

    /// All three collections as JSON
    #[wasm_bindgen(js_name = exportJson)]
    pub fn export_json(&self) -> Result<String, JsValue> {
        self.export_json_internal()
            .map_err(|e| JsValue::from_str(&e))
    }

    #[wasm_bindgen(js_name = importJson)]
    pub fn import_json(&mut self, json: &str) -> Result<(), JsValue> {
        self.session
            .import_json(json)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    fn export_pdf_internal(&mut self) -> Result<Vec<u8>, String> {
        let output = self.session.export().map_err(|e| e.to_string())?;
        self.last_export = Some((output.file_name, output.warnings));
        Ok(output.bytes)
    }

    /// Bake annotations and form values into a new PDF
    #[wasm_bindgen(js_name = exportPdf)]
    pub fn export_pdf(&mut self) -> Result<js_sys::Uint8Array, JsValue> {
        let bytes = self
            .export_pdf_internal()
            .map_err(|e| JsValue::from_str(&e))?;
        Ok(js_sys::Uint8Array::from(bytes.as_slice()))
    }

    /// Download name of the last export
    #[wasm_bindgen(js_name = exportFileName)]
    pub fn export_file_name(&self) -> Option<String> {
        self.last_export.as_ref().map(|(name, _)| name.clone())
    }

    /// Field writes skipped during the last export
    #[wasm_bindgen(js_name = exportWarnings)]
    pub fn export_warnings(&self) -> Vec<String> {
        self.last_export
            .as_ref()
            .map(|(_, warnings)| warnings.iter().map(|w| w.to_string()).collect())
            .unwrap_or_default()
    }
}
