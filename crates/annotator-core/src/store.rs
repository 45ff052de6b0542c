//! Annotation state store
//!
//! Holds the three user-facing collections of a loaded document: bounding
//! boxes, text annotations and form-field values. The store does no
//! validation of its own; the interaction state machine and the session
//! only hand it well-formed entries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type AnnotationId = String;

/// Value of one form field. The shape follows the field kind: text and
/// radio fields hold a string, checkboxes a flag, choice fields the list of
/// selected options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Flag(bool),
    Text(String),
    List(Vec<String>),
}

pub type FormValues = BTreeMap<String, FormValue>;

/// User-drawn rectangle. `coords` is `[x1, y1, x2, y2]` in unscaled
/// top-left page space with `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub id: AnnotationId,
    pub coords: [f64; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// 1-indexed page number
    pub page: u32,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.coords[2] - self.coords[0]
    }

    pub fn height(&self) -> f64 {
        self.coords[3] - self.coords[1]
    }
}

/// Movable text label. `(x, y)` is its top-left corner in unscaled
/// top-left page space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnnotation {
    pub id: AnnotationId,
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub font_size: f64,
    /// 1-indexed page number
    pub page: u32,
}

/// Partial update for a text annotation; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextPatch {
    pub text: Option<String>,
    pub position: Option<(f64, f64)>,
}

impl TextPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            position: None,
        }
    }

    pub fn position(x: f64, y: f64) -> Self {
        Self {
            text: None,
            position: Some((x, y)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    boxes: Vec<BoundingBox>,
    texts: Vec<TextAnnotation>,
    form_values: FormValues,
    active_box: Option<AnnotationId>,
}

fn new_id() -> AnnotationId {
    Uuid::new_v4().to_string()
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over for a freshly loaded document, seeding the field values
    /// read from it
    pub fn reset(&mut self, form_values: FormValues) {
        self.boxes.clear();
        self.texts.clear();
        self.active_box = None;
        self.form_values = form_values;
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty() && self.texts.is_empty()
    }

    // ============ Bounding boxes ============

    pub fn add_box(&mut self, coords: [f64; 4], label: Option<String>, page: u32) -> AnnotationId {
        let id = new_id();
        self.boxes.push(BoundingBox {
            id: id.clone(),
            coords,
            label,
            page,
        });
        id
    }

    /// Swap an existing box for a new version with the same id
    pub fn replace_box(&mut self, replacement: BoundingBox) -> bool {
        match self.boxes.iter_mut().find(|b| b.id == replacement.id) {
            Some(slot) => {
                *slot = replacement;
                true
            }
            None => false,
        }
    }

    pub fn remove_box(&mut self, id: &str) -> bool {
        let Some(pos) = self.boxes.iter().position(|b| b.id == id) else {
            return false;
        };
        self.boxes.remove(pos);
        if self.active_box.as_deref() == Some(id) {
            self.active_box = None;
        }
        true
    }

    /// Mark a box as the active selection. Unknown ids clear the selection.
    pub fn select_box(&mut self, id: Option<&str>) -> bool {
        match id {
            Some(id) if self.boxes.iter().any(|b| b.id == id) => {
                self.active_box = Some(id.to_string());
                true
            }
            _ => {
                self.active_box = None;
                false
            }
        }
    }

    pub fn active_box(&self) -> Option<&BoundingBox> {
        let id = self.active_box.as_deref()?;
        self.boxes.iter().find(|b| b.id == id)
    }

    pub fn get_box(&self, id: &str) -> Option<&BoundingBox> {
        self.boxes.iter().find(|b| b.id == id)
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn boxes_on_page(&self, page: u32) -> impl Iterator<Item = &BoundingBox> {
        self.boxes.iter().filter(move |b| b.page == page)
    }

    // ============ Text annotations ============

    pub fn add_text(
        &mut self,
        x: f64,
        y: f64,
        text: impl Into<String>,
        font_size: f64,
        page: u32,
    ) -> AnnotationId {
        let id = new_id();
        self.texts.push(TextAnnotation {
            id: id.clone(),
            x,
            y,
            text: text.into(),
            font_size,
            page,
        });
        id
    }

    pub fn update_text(&mut self, id: &str, patch: TextPatch) -> bool {
        let Some(annotation) = self.texts.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        if let Some(text) = patch.text {
            annotation.text = text;
        }
        if let Some((x, y)) = patch.position {
            annotation.x = x;
            annotation.y = y;
        }
        true
    }

    pub fn remove_text(&mut self, id: &str) -> bool {
        let before = self.texts.len();
        self.texts.retain(|t| t.id != id);
        self.texts.len() != before
    }

    pub fn get_text(&self, id: &str) -> Option<&TextAnnotation> {
        self.texts.iter().find(|t| t.id == id)
    }

    pub fn texts(&self) -> &[TextAnnotation] {
        &self.texts
    }

    pub fn texts_on_page(&self, page: u32) -> impl Iterator<Item = &TextAnnotation> {
        self.texts.iter().filter(move |t| t.page == page)
    }

    // ============ Form values ============

    pub fn set_form_value(&mut self, name: impl Into<String>, value: FormValue) {
        self.form_values.insert(name.into(), value);
    }

    pub fn form_value(&self, name: &str) -> Option<&FormValue> {
        self.form_values.get(name)
    }

    pub fn form_values(&self) -> &FormValues {
        &self.form_values
    }

    /// Replace all three collections at once
    pub fn load(
        &mut self,
        boxes: Vec<BoundingBox>,
        texts: Vec<TextAnnotation>,
        form_values: FormValues,
    ) {
        self.boxes = boxes;
        self.texts = texts;
        self.form_values = form_values;
        self.active_box = None;
    }
}
