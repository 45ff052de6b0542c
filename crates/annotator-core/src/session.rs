//! Annotator session
//!
//! Top-level application state for one loaded document. Owns the store,
//! the interaction state machine and the viewport, and exposes everything a
//! front end needs: event entry points, render projections and export.

use crate::config::AnnotatorConfig;
use crate::coords::{fit_scale, PageSize, Point, ScreenRect, Viewport};
use crate::error::{AnnotatorError, ExportError, FormValueError, UploadError};
use crate::export::{export_document, ExportOutput};
use crate::forms::{introspect_document, FieldKind, FormFieldDescriptor, FormIntrospection};
use crate::interaction::{
    field_region, text_region, InteractionContext, InteractionMachine, Key, Outcome, ToolMode,
};
use crate::page::{media_boxes, MediaBox};
use crate::snapshot::AnnotationSnapshot;
use crate::store::{AnnotationStore, FormValue};
use crate::upload::validate_upload;
use lopdf::Document;
use serde::Serialize;
use std::collections::BTreeMap;

struct LoadedDocument {
    name: String,
    bytes: Vec<u8>,
    media_boxes: BTreeMap<u32, MediaBox>,
    forms: FormIntrospection,
}

/// Bounding box as drawn on the rendered page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxView {
    pub id: String,
    pub label: Option<String>,
    pub rect: ScreenRect,
    pub active: bool,
}

/// Text annotation as drawn on the rendered page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextView {
    pub id: String,
    pub text: String,
    /// Font size in screen pixels
    pub font_size: f64,
    pub rect: ScreenRect,
}

/// Form field widget overlay on the rendered page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOverlay {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub rect: ScreenRect,
    pub value: Option<FormValue>,
    pub options: Vec<String>,
    pub is_read_only: bool,
    pub is_required: bool,
}

/// Open text edit session in screen space, for drawing the input caret
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditView {
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub buffer: String,
    pub editing_existing: bool,
}

#[derive(Default)]
pub struct AnnotatorSession {
    config: AnnotatorConfig,
    document: Option<LoadedDocument>,
    store: AnnotationStore,
    machine: InteractionMachine,
    viewport: Viewport,
    scale_fixed: bool,
    container: Option<(f64, f64)>,
}

impl AnnotatorSession {
    pub fn new(config: AnnotatorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    /// Load a picked file. An invalid upload is rejected without touching
    /// the current document; a valid one replaces it and discards every
    /// annotation.
    pub fn open(
        &mut self,
        name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<&FormIntrospection, UploadError> {
        validate_upload(mime, bytes.len(), &self.config)?;

        let (media_boxes, forms) = match Document::load_mem(&bytes) {
            Ok(doc) => (media_boxes(&doc), introspect_document(&doc)),
            Err(e) => {
                tracing::warn!("{} did not parse, continuing without page data: {}", name, e);
                (BTreeMap::new(), FormIntrospection::empty())
            }
        };
        tracing::info!(
            "Opened {} ({} bytes, {} pages, {} form fields)",
            name,
            bytes.len(),
            media_boxes.len(),
            forms.fields.len()
        );

        self.store.reset(forms.values.clone());
        self.machine = InteractionMachine::new(self.machine.mode());
        self.viewport = Viewport::default();
        self.scale_fixed = false;

        let doc = self.document.insert(LoadedDocument {
            name: name.to_string(),
            bytes,
            media_boxes,
            forms,
        });
        Ok(&doc.forms)
    }

    /// Drop the document and everything authored on it
    pub fn close(&mut self) {
        self.document = None;
        self.store.reset(Default::default());
        self.machine = InteractionMachine::new(self.machine.mode());
        self.viewport = Viewport::default();
        self.scale_fixed = false;
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.name.as_str())
    }

    pub fn page_count(&self) -> usize {
        self.document.as_ref().map_or(0, |d| d.media_boxes.len())
    }

    /// Natural size of a page, from the document
    pub fn page_size(&self, page: u32) -> Option<PageSize> {
        self.document
            .as_ref()
            .and_then(|d| d.media_boxes.get(&page))
            .map(MediaBox::size)
    }

    pub fn set_container_size(&mut self, width: f64, height: f64) {
        self.container = Some((width, height));
    }

    /// The renderer finished a page of the given natural size. The first
    /// call after a document is opened fixes the scale for every page.
    pub fn page_loaded(&mut self, page: u32, width: f64, height: f64) -> f64 {
        if !self.scale_fixed {
            if let Some((cw, ch)) = self.container {
                let scale = fit_scale(cw, ch, PageSize { width, height }, self.config.max_scale);
                self.viewport = Viewport::new(scale);
                self.scale_fixed = true;
                tracing::debug!("Scale fixed at {:.3} from page {}", scale, page);
            }
        }
        self.viewport.scale
    }

    pub fn scale(&self) -> f64 {
        self.viewport.scale
    }

    // ============ Interaction ============

    fn split(&mut self) -> Option<(&mut InteractionMachine, InteractionContext<'_>)> {
        let doc = self.document.as_ref()?;
        Some((
            &mut self.machine,
            InteractionContext {
                store: &mut self.store,
                viewport: self.viewport,
                fields: &doc.forms.fields,
                media_boxes: &doc.media_boxes,
                config: &self.config,
            },
        ))
    }

    pub fn mode(&self) -> ToolMode {
        self.machine.mode()
    }

    pub fn set_mode(&mut self, mode: ToolMode) -> Outcome {
        if self.document.is_none() {
            self.machine = InteractionMachine::new(mode);
            return Outcome::Ignored;
        }
        match self.split() {
            Some((machine, mut ctx)) => machine.set_mode(&mut ctx, mode),
            None => Outcome::Ignored,
        }
    }

    pub fn pointer_down(&mut self, page: u32, x: f64, y: f64) -> Vec<Outcome> {
        match self.split() {
            Some((machine, mut ctx)) => machine.pointer_down(&mut ctx, page, Point::new(x, y)),
            None => vec![Outcome::Ignored],
        }
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) -> Outcome {
        match self.split() {
            Some((machine, mut ctx)) => machine.pointer_move(&mut ctx, Point::new(x, y)),
            None => Outcome::Ignored,
        }
    }

    pub fn pointer_up(&mut self, x: f64, y: f64) -> Outcome {
        match self.split() {
            Some((machine, mut ctx)) => machine.pointer_up(&mut ctx, Point::new(x, y)),
            None => Outcome::Ignored,
        }
    }

    pub fn key(&mut self, key: Key) -> Outcome {
        match self.split() {
            Some((machine, mut ctx)) => machine.key(&mut ctx, key),
            None => Outcome::Ignored,
        }
    }

    pub fn begin_edit(&mut self, id: &str) -> Vec<Outcome> {
        match self.split() {
            Some((machine, mut ctx)) => machine.begin_edit(&mut ctx, id),
            None => vec![Outcome::Ignored],
        }
    }

    pub fn cancel(&mut self) -> Outcome {
        match self.split() {
            Some((machine, mut ctx)) => machine.cancel(&mut ctx),
            None => Outcome::Ignored,
        }
    }

    // ============ Store ============

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn remove_box(&mut self, id: &str) -> bool {
        self.store.remove_box(id)
    }

    pub fn remove_text(&mut self, id: &str) -> bool {
        self.machine.forget(id);
        self.store.remove_text(id)
    }

    pub fn select_box(&mut self, id: Option<&str>) -> bool {
        self.store.select_box(id)
    }

    // ============ Form fields ============

    pub fn introspection(&self) -> Option<&FormIntrospection> {
        self.document.as_ref().map(|d| &d.forms)
    }

    pub fn form_fields(&self) -> &[FormFieldDescriptor] {
        self.document
            .as_ref()
            .map(|d| d.forms.fields.as_slice())
            .unwrap_or_default()
    }

    pub fn has_form_fields(&self) -> bool {
        self.document
            .as_ref()
            .map_or(false, |d| d.forms.has_form_fields)
    }

    /// Edit a field value, checked against the field's kind
    pub fn set_form_value(&mut self, name: &str, value: FormValue) -> Result<(), FormValueError> {
        let field = self
            .form_fields()
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| FormValueError::UnknownField(name.to_string()))?;
        let value = field.coerce(value)?;
        self.store.set_form_value(name, value);
        Ok(())
    }

    // ============ Snapshot / export ============

    pub fn snapshot(&self) -> AnnotationSnapshot {
        AnnotationSnapshot::from_store(&self.store)
    }

    /// Replace the session's annotations with a snapshot. Form values that
    /// do not fit the document's fields are skipped.
    pub fn import(&mut self, snapshot: AnnotationSnapshot) -> Result<(), AnnotatorError> {
        if self.document.is_none() {
            return Err(ExportError::NoDocument.into());
        }
        let mut values = self
            .document
            .as_ref()
            .map(|d| d.forms.values.clone())
            .unwrap_or_default();
        for (name, value) in snapshot.form_values {
            let checked = self
                .form_fields()
                .iter()
                .find(|f| f.name == name)
                .ok_or_else(|| FormValueError::UnknownField(name.clone()))
                .and_then(|f| f.coerce(value));
            match checked {
                Ok(value) => {
                    values.insert(name, value);
                }
                Err(e) => tracing::warn!("Skipping imported form value: {}", e),
            }
        }
        self.store.load(snapshot.boxes, snapshot.texts, values);
        self.machine = InteractionMachine::new(self.machine.mode());
        Ok(())
    }

    pub fn import_json(&mut self, json: &str) -> Result<(), AnnotatorError> {
        let snapshot = AnnotationSnapshot::from_json(json)?;
        self.import(snapshot)
    }

    pub fn export(&self) -> Result<ExportOutput, ExportError> {
        let doc = self.document.as_ref().ok_or(ExportError::NoDocument)?;
        export_document(&doc.bytes, &doc.name, &self.store, &self.config)
    }

    // ============ Render projections ============

    pub fn render_boxes(&self, page: u32) -> Vec<BoxView> {
        let active = self.store.active_box().map(|b| b.id.as_str());
        self.store
            .boxes_on_page(page)
            .map(|b| {
                let top_left = self.viewport.page_to_screen(Point::new(b.coords[0], b.coords[1]));
                let bottom_right =
                    self.viewport.page_to_screen(Point::new(b.coords[2], b.coords[3]));
                BoxView {
                    id: b.id.clone(),
                    label: b.label.clone(),
                    rect: ScreenRect::from_corners(top_left, bottom_right),
                    active: active == Some(b.id.as_str()),
                }
            })
            .collect()
    }

    pub fn render_texts(&self, page: u32) -> Vec<TextView> {
        self.store
            .texts_on_page(page)
            .map(|t| TextView {
                id: t.id.clone(),
                text: t.text.clone(),
                font_size: t.font_size * self.viewport.scale,
                rect: text_region(t, &self.viewport),
            })
            .collect()
    }

    pub fn form_overlays(&self, page: u32) -> Vec<FieldOverlay> {
        let Some(doc) = self.document.as_ref() else {
            return Vec::new();
        };
        doc.forms
            .fields_on_page(page)
            .filter_map(|f| {
                let rect = field_region(f, &doc.media_boxes, &self.viewport)?;
                Some(FieldOverlay {
                    name: f.name.clone(),
                    kind: f.kind,
                    rect,
                    value: self.store.form_value(&f.name).cloned(),
                    options: f.options.clone(),
                    is_read_only: f.is_read_only,
                    is_required: f.is_required,
                })
            })
            .collect()
    }

    /// Rubber-band rectangle of a box being drawn on `page`
    pub fn preview_rect(&self, page: u32) -> Option<ScreenRect> {
        self.machine
            .preview()
            .filter(|(p, _)| *p == page)
            .map(|(_, rect)| rect)
    }

    pub fn edit_view(&self) -> Option<EditView> {
        self.machine.edit_session().map(|edit| {
            let at = self.viewport.page_to_screen(edit.position);
            EditView {
                page: edit.page,
                x: at.x,
                y: at.y,
                buffer: edit.buffer.clone(),
                editing_existing: edit.target.is_some(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{form_pdf, simple_pdf};
    use pretty_assertions::assert_eq;

    fn opened(bytes: Vec<u8>) -> AnnotatorSession {
        let mut session = AnnotatorSession::default();
        session.open("doc.pdf", "application/pdf", bytes).unwrap();
        session
    }

    #[test]
    fn test_open_plain_document() {
        let mut session = AnnotatorSession::default();
        let forms = session
            .open("doc.pdf", "application/pdf", simple_pdf(3))
            .unwrap();
        assert!(!forms.has_form_fields);
        assert!(forms.fields.is_empty());
        assert_eq!(session.page_count(), 3);
        assert_eq!(session.file_name(), Some("doc.pdf"));
    }

    #[test]
    fn test_rejected_upload_keeps_state() {
        let mut session = opened(simple_pdf(1));
        session.pointer_down(1, 10.0, 10.0);
        session.pointer_up(60.0, 60.0);
        assert_eq!(session.store().boxes().len(), 1);

        let err = session.open("x.png", "image/png", vec![1, 2, 3]).unwrap_err();
        assert_eq!(err, UploadError::WrongType("image/png".into()));
        assert_eq!(session.store().boxes().len(), 1);
        assert_eq!(session.file_name(), Some("doc.pdf"));
    }

    #[test]
    fn test_new_upload_discards_annotations() {
        let mut session = opened(simple_pdf(1));
        session.pointer_down(1, 10.0, 10.0);
        session.pointer_up(60.0, 60.0);

        session
            .open("other.pdf", "application/pdf", form_pdf())
            .unwrap();
        assert!(session.store().is_empty());
        assert_eq!(
            session.store().form_value("company"),
            Some(&FormValue::Text("Initech".into()))
        );
    }

    #[test]
    fn test_events_without_document_are_ignored() {
        let mut session = AnnotatorSession::default();
        assert_eq!(session.pointer_down(1, 0.0, 0.0), vec![Outcome::Ignored]);
        assert_eq!(session.key(Key::Enter), Outcome::Ignored);
        assert!(matches!(session.export(), Err(ExportError::NoDocument)));
    }

    #[test]
    fn test_scale_is_fixed_by_first_page_load() {
        let mut session = opened(simple_pdf(2));
        session.set_container_size(306.0, 2000.0);
        assert_eq!(session.page_loaded(1, 612.0, 792.0), 0.5);

        // Later loads and resizes do not re-fit
        session.set_container_size(5000.0, 5000.0);
        assert_eq!(session.page_loaded(2, 612.0, 792.0), 0.5);

        // A new document does
        session.open("b.pdf", "application/pdf", simple_pdf(1)).unwrap();
        assert_eq!(session.page_loaded(1, 612.0, 792.0), 1.5);
    }

    #[test]
    fn test_render_boxes_are_scaled() {
        let mut session = opened(simple_pdf(1));
        session.set_container_size(1224.0, 1584.0);
        session.page_loaded(1, 612.0, 792.0);
        assert_eq!(session.scale(), 1.5);

        session.pointer_down(1, 150.0, 150.0);
        session.pointer_up(450.0, 300.0);
        let id = session.store().boxes()[0].id.clone();
        assert_eq!(session.store().boxes()[0].coords, [100.0, 100.0, 300.0, 200.0]);
        session.select_box(Some(&id));

        let views = session.render_boxes(1);
        assert_eq!(views.len(), 1);
        assert_eq!(
            views[0].rect,
            ScreenRect {
                x: 150.0,
                y: 150.0,
                width: 300.0,
                height: 150.0
            }
        );
        assert!(views[0].active);
        assert!(session.render_boxes(2).is_empty());
    }

    #[test]
    fn test_set_form_value_checks_kind() {
        let mut session = opened(form_pdf());
        session
            .set_form_value("company", FormValue::Text("Acme Corp".into()))
            .unwrap();
        assert_eq!(
            session.set_form_value("agree", FormValue::Text("yes".into())),
            Err(FormValueError::KindMismatch {
                name: "agree".into(),
                expected: "boolean"
            })
        );
        assert_eq!(
            session.set_form_value("nope", FormValue::Flag(true)),
            Err(FormValueError::UnknownField("nope".into()))
        );
        assert!(matches!(
            session.set_form_value("account", FormValue::Text("x".into())),
            Err(FormValueError::ReadOnly(_))
        ));
    }

    #[test]
    fn test_form_overlays_skip_unplaced_fields() {
        let session = opened(form_pdf());
        let names: Vec<String> = session.form_overlays(2).into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["country", "toppings", "submit", "person.first"]);

        let company = &session.form_overlays(1)[0];
        assert_eq!(company.value, Some(FormValue::Text("Initech".into())));
        assert_eq!(company.rect.y, 172.0);
    }

    #[test]
    fn test_removing_text_ends_its_drag() {
        let mut session = opened(simple_pdf(1));
        session.set_mode(ToolMode::Text);
        session.pointer_down(1, 50.0, 50.0);
        for c in "Hello".chars() {
            session.key(Key::Char(c));
        }
        session.key(Key::Enter);
        let id = session.store().texts()[0].id.clone();

        session.pointer_down(1, 52.0, 52.0);
        assert!(session.remove_text(&id));
        assert_eq!(session.pointer_move(90.0, 90.0), Outcome::Ignored);
        assert!(session.store().texts().is_empty());
    }

    #[test]
    fn test_edit_view_tracks_buffer() {
        let mut session = opened(simple_pdf(1));
        session.set_mode(ToolMode::Text);
        session.pointer_down(1, 20.0, 30.0);
        session.key(Key::Char('a'));
        let view = session.edit_view().unwrap();
        assert_eq!((view.x, view.y), (20.0, 30.0));
        assert_eq!(view.buffer, "a");
        assert!(!view.editing_existing);
    }

    #[test]
    fn test_snapshot_import_roundtrip() {
        let mut session = opened(form_pdf());
        session.pointer_down(1, 10.0, 10.0);
        session.pointer_up(60.0, 60.0);
        session.set_form_value("agree", FormValue::Flag(true)).unwrap();
        let json = session.snapshot().to_json().unwrap();

        let mut other = opened(form_pdf());
        other.import_json(&json).unwrap();
        assert_eq!(other.store().boxes(), session.store().boxes());
        assert_eq!(other.store().form_value("agree"), Some(&FormValue::Flag(true)));
    }

    #[test]
    fn test_import_skips_bad_values() {
        let mut session = opened(form_pdf());
        let json = r#"{"formValues": {"agree": "yes", "ghost": 1, "company": "Acme"}}"#;
        // "ghost": 1 is not a valid FormValue shape at all
        assert!(session.import_json(json).is_err());

        let json = r#"{"formValues": {"agree": "yes", "company": "Acme"}}"#;
        session.import_json(json).unwrap();
        assert_eq!(
            session.store().form_value("company"),
            Some(&FormValue::Text("Acme".into()))
        );
        assert_eq!(session.store().form_value("agree"), Some(&FormValue::Flag(false)));
    }
}
