//! Form field introspection and value writing
//!
//! Reads the document's AcroForm once per upload into a flat list of
//! [`FormFieldDescriptor`]s plus the current value of every field, and
//! writes edited values back during export.
//!
//! A document without a form, or with a form we cannot make sense of, is
//! reported as having no fields. That is never an error.

use crate::error::FormValueError;
use crate::pdf_objects::{decode_text, name, rect, resolve, resolve_array, resolve_dict, text, text_string};
use crate::store::{FormValue, FormValues};
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// Field flag bits (Ff)
const FF_READ_ONLY: i64 = 1;
const FF_REQUIRED: i64 = 1 << 1;
const FF_RADIO: i64 = 1 << 15;
const FF_PUSHBUTTON: i64 = 1 << 16;
const FF_COMBO: i64 = 1 << 17;

const MAX_FIELD_DEPTH: usize = 32;

const OFF_STATE: &str = "Off";
const DEFAULT_ON_STATE: &str = "Yes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    Text,
    Checkbox,
    Dropdown,
    Radio,
    Button,
    OptionList,
}

impl FieldKind {
    fn from_type(field_type: &str, flags: i64) -> Option<Self> {
        match field_type {
            "Tx" => Some(FieldKind::Text),
            "Btn" if flags & FF_PUSHBUTTON != 0 => Some(FieldKind::Button),
            "Btn" if flags & FF_RADIO != 0 => Some(FieldKind::Radio),
            "Btn" => Some(FieldKind::Checkbox),
            "Ch" if flags & FF_COMBO != 0 => Some(FieldKind::Dropdown),
            "Ch" => Some(FieldKind::OptionList),
            _ => None,
        }
    }

    /// Human-readable value shape, used in error messages
    pub fn value_shape(&self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::Radio => "string",
            FieldKind::Checkbox => "boolean",
            FieldKind::Dropdown => "single-option",
            FieldKind::OptionList => "list",
            FieldKind::Button => "no",
        }
    }

    fn has_options(&self) -> bool {
        matches!(
            self,
            FieldKind::Dropdown | FieldKind::OptionList | FieldKind::Radio
        )
    }
}

/// Normalized, read-only view of one interactive form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFieldDescriptor {
    /// Fully qualified field name, unique within the document
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// 1-indexed page of the first widget, when it can be resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// PDF-space rectangle `[x1, y1, x2, y2]` of the first widget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<[f64; 4]>,
    #[serde(default)]
    pub options: Vec<String>,
    pub is_read_only: bool,
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

impl FormFieldDescriptor {
    /// Whether the field can be drawn as an overlay on a page
    pub fn is_placed(&self) -> bool {
        self.page.is_some() && self.rect.is_some()
    }

    /// Check a user-supplied value against this field and normalize its shape
    pub fn coerce(&self, value: FormValue) -> Result<FormValue, FormValueError> {
        if self.is_read_only {
            return Err(FormValueError::ReadOnly(self.name.clone()));
        }
        let mismatch = || FormValueError::KindMismatch {
            name: self.name.clone(),
            expected: self.kind.value_shape(),
        };

        match (self.kind, value) {
            (FieldKind::Text, FormValue::Text(s)) => {
                if let Some(max) = self.max_length {
                    if s.chars().count() > max as usize {
                        return Err(FormValueError::TooLong {
                            name: self.name.clone(),
                            max,
                        });
                    }
                }
                Ok(FormValue::Text(s))
            }
            (FieldKind::Checkbox, FormValue::Flag(b)) => Ok(FormValue::Flag(b)),
            (FieldKind::Radio, FormValue::Text(s)) => {
                if !s.is_empty() {
                    self.check_option(&s)?;
                }
                Ok(FormValue::Text(s))
            }
            (FieldKind::Dropdown, FormValue::Text(s)) => {
                self.check_option(&s)?;
                Ok(FormValue::List(vec![s]))
            }
            (FieldKind::Dropdown, FormValue::List(v)) if v.len() <= 1 => {
                for s in &v {
                    self.check_option(s)?;
                }
                Ok(FormValue::List(v))
            }
            (FieldKind::OptionList, FormValue::Text(s)) => {
                self.check_option(&s)?;
                Ok(FormValue::List(vec![s]))
            }
            (FieldKind::OptionList, FormValue::List(v)) => {
                for s in &v {
                    self.check_option(s)?;
                }
                Ok(FormValue::List(v))
            }
            _ => Err(mismatch()),
        }
    }

    fn check_option(&self, value: &str) -> Result<(), FormValueError> {
        if self.options.is_empty() || self.options.iter().any(|o| o == value) {
            Ok(())
        } else {
            Err(FormValueError::NotAnOption {
                name: self.name.clone(),
                value: value.to_string(),
            })
        }
    }
}

/// Result of reading a document's form once after upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormIntrospection {
    pub has_form_fields: bool,
    pub fields: Vec<FormFieldDescriptor>,
    pub values: FormValues,
}

impl FormIntrospection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn field(&self, name: &str) -> Option<&FormFieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields_on_page(&self, page: u32) -> impl Iterator<Item = &FormFieldDescriptor> {
        self.fields
            .iter()
            .filter(move |f| f.page == Some(page) && f.rect.is_some())
    }
}

/// Read the form of an uploaded document. Never fails: a missing or
/// malformed form yields an empty result.
pub fn introspect(bytes: &[u8]) -> FormIntrospection {
    let doc = match Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("Form introspection skipped, document did not parse: {}", e);
            return FormIntrospection::empty();
        }
    };
    introspect_document(&doc)
}

pub fn introspect_document(doc: &Document) -> FormIntrospection {
    let nodes = match collect_fields(doc) {
        Ok(nodes) => nodes,
        Err(e) => {
            tracing::warn!("Form introspection degraded to no fields: {}", e);
            return FormIntrospection::empty();
        }
    };

    let page_of = page_lookup(doc);
    let mut fields = Vec::with_capacity(nodes.len());
    let mut values = FormValues::new();

    for node in &nodes {
        let placement = node
            .widgets
            .first()
            .and_then(|&w| widget_placement(doc, w, &page_of));

        if let Some(value) = read_value(doc, node) {
            values.insert(node.name.clone(), value);
        }

        fields.push(FormFieldDescriptor {
            name: node.name.clone(),
            kind: node.kind,
            page: placement.map(|(page, _)| page),
            rect: placement.map(|(_, r)| r),
            options: read_options(doc, node),
            is_read_only: node.flags & FF_READ_ONLY != 0,
            is_required: node.flags & FF_REQUIRED != 0,
            max_length: node.max_length,
        });
    }

    tracing::info!("Introspected {} form fields", fields.len());
    FormIntrospection {
        has_form_fields: !fields.is_empty(),
        fields,
        values,
    }
}

/// One terminal field of the AcroForm tree
#[derive(Debug, Clone)]
pub(crate) struct FieldNode {
    pub id: ObjectId,
    pub name: String,
    pub kind: FieldKind,
    pub flags: i64,
    pub max_length: Option<u32>,
    pub widgets: Vec<ObjectId>,
}

#[derive(Clone, Default)]
struct Inherited {
    field_type: Option<String>,
    flags: i64,
    max_length: Option<u32>,
}

fn catalog(doc: &Document) -> Option<&Dictionary> {
    doc.trailer
        .get(b"Root")
        .ok()
        .and_then(|root| resolve_dict(doc, root))
}

/// Walk the AcroForm tree and return its terminal fields in document order
pub(crate) fn collect_fields(doc: &Document) -> Result<Vec<FieldNode>, String> {
    let Some(catalog) = catalog(doc) else {
        return Err("document has no catalog".to_string());
    };
    let Ok(acroform_obj) = catalog.get(b"AcroForm") else {
        return Ok(Vec::new());
    };
    let acroform =
        resolve_dict(doc, acroform_obj).ok_or_else(|| "AcroForm is not a dictionary".to_string())?;
    let Ok(fields_obj) = acroform.get(b"Fields") else {
        return Ok(Vec::new());
    };
    let roots = resolve_array(doc, fields_obj)
        .ok_or_else(|| "AcroForm Fields is not an array".to_string())?;

    let mut out = Vec::new();
    let mut visited = HashSet::new();
    for root in roots {
        if let Object::Reference(id) = root {
            walk(doc, *id, None, Inherited::default(), &mut visited, &mut out, 0);
        }
    }
    Ok(out)
}

fn walk(
    doc: &Document,
    id: ObjectId,
    parent_name: Option<&str>,
    inherited: Inherited,
    visited: &mut HashSet<ObjectId>,
    out: &mut Vec<FieldNode>,
    depth: usize,
) {
    if depth > MAX_FIELD_DEPTH || !visited.insert(id) {
        return;
    }
    let Ok(dict) = doc.get_dictionary(id) else {
        return;
    };

    let partial = dict.get(b"T").ok().and_then(|t| text(doc, t));
    let full_name = match (parent_name, partial) {
        (Some(parent), Some(part)) => format!("{}.{}", parent, part),
        (None, Some(part)) => part,
        (Some(parent), None) => parent.to_string(),
        (None, None) => String::new(),
    };

    let inherited = Inherited {
        field_type: dict
            .get(b"FT")
            .ok()
            .and_then(name)
            .or(inherited.field_type),
        flags: dict
            .get(b"Ff")
            .ok()
            .and_then(|f| f.as_i64().ok())
            .unwrap_or(inherited.flags),
        max_length: dict
            .get(b"MaxLen")
            .ok()
            .and_then(|m| m.as_i64().ok())
            .and_then(|m| u32::try_from(m).ok())
            .or(inherited.max_length),
    };

    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|k| resolve_array(doc, k))
        .map(|arr| arr.iter().filter_map(|o| o.as_reference().ok()).collect())
        .unwrap_or_default();

    // Kids carrying a partial name are child fields; the rest are widgets
    let (child_fields, widgets): (Vec<ObjectId>, Vec<ObjectId>) = kids
        .into_iter()
        .partition(|kid| doc.get_dictionary(*kid).map(|d| d.has(b"T")).unwrap_or(false));

    if !child_fields.is_empty() {
        for child in child_fields {
            walk(
                doc,
                child,
                Some(&full_name).filter(|n| !n.is_empty()).map(String::as_str),
                inherited.clone(),
                visited,
                out,
                depth + 1,
            );
        }
        return;
    }

    let Some(kind) = inherited
        .field_type
        .as_deref()
        .and_then(|ft| FieldKind::from_type(ft, inherited.flags))
    else {
        return;
    };
    if full_name.is_empty() {
        return;
    }

    // A field without widget kids is merged with its own widget
    let widgets = if widgets.is_empty() && (dict.has(b"Rect") || dict.has(b"Subtype")) {
        vec![id]
    } else {
        widgets
    };

    out.push(FieldNode {
        id,
        name: full_name,
        kind,
        flags: inherited.flags,
        max_length: inherited.max_length,
        widgets,
    });
}

/// Map page object ids to 1-indexed page numbers
fn page_lookup(doc: &Document) -> HashMap<ObjectId, u32> {
    doc.get_pages().into_iter().map(|(num, id)| (id, num)).collect()
}

/// Resolve a widget's page and rectangle. The page comes from the widget's
/// `P` entry when it names a known page, otherwise from the page whose
/// `Annots` list contains the widget.
fn widget_placement(
    doc: &Document,
    widget: ObjectId,
    page_of: &HashMap<ObjectId, u32>,
) -> Option<(u32, [f64; 4])> {
    let dict = doc.get_dictionary(widget).ok()?;
    let r = rect(doc, dict.get(b"Rect").ok()?)?;

    let from_p = dict
        .get(b"P")
        .ok()
        .and_then(|p| p.as_reference().ok())
        .and_then(|p| page_of.get(&p).copied());

    let page = from_p.or_else(|| {
        doc.get_pages().into_iter().find_map(|(num, page_id)| {
            let page_dict = doc.get_dictionary(page_id).ok()?;
            let annots = resolve_array(doc, page_dict.get(b"Annots").ok()?)?;
            annots
                .iter()
                .any(|a| a.as_reference().ok() == Some(widget))
                .then_some(num)
        })
    })?;

    Some((page, r))
}

/// Appearance states of a widget other than `Off`
fn widget_states(doc: &Document, widget: ObjectId) -> Vec<String> {
    let Ok(dict) = doc.get_dictionary(widget) else {
        return Vec::new();
    };
    dict.get(b"AP")
        .ok()
        .and_then(|ap| resolve_dict(doc, ap))
        .and_then(|ap| ap.get(b"N").ok())
        .and_then(|n| resolve_dict(doc, n))
        .map(|normal| {
            normal
                .iter()
                .map(|(k, _)| String::from_utf8_lossy(k).into_owned())
                .filter(|k| k != OFF_STATE)
                .collect()
        })
        .unwrap_or_default()
}

fn read_options(doc: &Document, node: &FieldNode) -> Vec<String> {
    if !node.kind.has_options() {
        return Vec::new();
    }
    if node.kind == FieldKind::Radio {
        let mut seen = Vec::new();
        for &w in &node.widgets {
            for state in widget_states(doc, w) {
                if !seen.contains(&state) {
                    seen.push(state);
                }
            }
        }
        return seen;
    }

    let Ok(dict) = doc.get_dictionary(node.id) else {
        return Vec::new();
    };
    dict.get(b"Opt")
        .ok()
        .and_then(|o| resolve_array(doc, o))
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match resolve(doc, item)? {
                    // [export value, display text]
                    Object::Array(pair) => pair.first().and_then(|e| text(doc, e)),
                    other => text(doc, other),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Current value of a field as stored in the document
pub(crate) fn read_value(doc: &Document, node: &FieldNode) -> Option<FormValue> {
    let dict = doc.get_dictionary(node.id).ok()?;
    let v = dict.get(b"V").ok().and_then(|v| resolve(doc, v));

    match node.kind {
        FieldKind::Text => Some(FormValue::Text(
            v.and_then(|v| text(doc, v)).unwrap_or_default(),
        )),
        FieldKind::Checkbox => {
            let state = v.and_then(name).or_else(|| {
                node.widgets
                    .first()
                    .and_then(|&w| doc.get_dictionary(w).ok())
                    .and_then(|w| w.get(b"AS").ok())
                    .and_then(name)
            });
            Some(FormValue::Flag(matches!(
                state.as_deref(),
                Some(s) if s != OFF_STATE && !s.is_empty()
            )))
        }
        FieldKind::Radio => Some(FormValue::Text(
            v.and_then(name)
                .filter(|s| s != OFF_STATE)
                .unwrap_or_default(),
        )),
        FieldKind::Dropdown | FieldKind::OptionList => {
            let selected = match v {
                Some(Object::Array(items)) => items.iter().filter_map(|i| text(doc, i)).collect(),
                Some(Object::String(bytes, _)) => vec![decode_text(bytes)],
                _ => Vec::new(),
            };
            Some(FormValue::List(selected))
        }
        FieldKind::Button => None,
    }
}

/// Why a value could not be written into a field
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WriteSkip {
    Mismatch(&'static str),
    Unwritable(String),
}

fn dict_mut(doc: &mut Document, id: ObjectId) -> Result<&mut Dictionary, WriteSkip> {
    doc.get_object_mut(id)
        .and_then(|o| o.as_dict_mut())
        .map_err(|e| WriteSkip::Unwritable(e.to_string()))
}

/// Write one value into its field
pub(crate) fn write_value(
    doc: &mut Document,
    node: &FieldNode,
    value: &FormValue,
) -> Result<(), WriteSkip> {
    match (node.kind, value) {
        (FieldKind::Text, FormValue::Text(s)) => {
            dict_mut(doc, node.id)?.set("V", text_string(s));
            drop_appearances(doc, node)
        }
        (FieldKind::Checkbox, FormValue::Flag(checked)) => {
            let states: Vec<(ObjectId, Option<String>)> = node
                .widgets
                .iter()
                .map(|&w| (w, widget_states(doc, w).into_iter().next()))
                .collect();
            let on = states
                .iter()
                .find_map(|(_, s)| s.clone())
                .unwrap_or_else(|| DEFAULT_ON_STATE.to_string());

            let v = if *checked { on.as_str() } else { OFF_STATE };
            dict_mut(doc, node.id)?.set("V", Object::Name(v.as_bytes().to_vec()));
            for (widget, state) in states {
                let appearance = match (checked, state) {
                    (true, Some(s)) => s,
                    (true, None) => on.clone(),
                    (false, _) => OFF_STATE.to_string(),
                };
                dict_mut(doc, widget)?.set("AS", Object::Name(appearance.into_bytes()));
            }
            Ok(())
        }
        (FieldKind::Radio, FormValue::Text(choice)) => {
            let states: Vec<(ObjectId, Vec<String>)> = node
                .widgets
                .iter()
                .map(|&w| (w, widget_states(doc, w)))
                .collect();
            let v = if choice.is_empty() { OFF_STATE } else { choice.as_str() };
            dict_mut(doc, node.id)?.set("V", Object::Name(v.as_bytes().to_vec()));
            for (widget, widget_states) in states {
                let appearance = if widget_states.iter().any(|s| s == choice) {
                    choice.as_str()
                } else {
                    OFF_STATE
                };
                dict_mut(doc, widget)?.set("AS", Object::Name(appearance.as_bytes().to_vec()));
            }
            Ok(())
        }
        (FieldKind::Dropdown | FieldKind::OptionList, FormValue::Text(s)) => {
            dict_mut(doc, node.id)?.set("V", text_string(s));
            drop_appearances(doc, node)
        }
        (FieldKind::Dropdown | FieldKind::OptionList, FormValue::List(items)) => {
            let v = match items.as_slice() {
                [single] => text_string(single),
                many => Object::Array(many.iter().map(|s| text_string(s)).collect()),
            };
            dict_mut(doc, node.id)?.set("V", v);
            drop_appearances(doc, node)
        }
        (kind, _) => Err(WriteSkip::Mismatch(kind.value_shape())),
    }
}

/// Remove stale appearance streams so viewers regenerate them from `V`
fn drop_appearances(doc: &mut Document, node: &FieldNode) -> Result<(), WriteSkip> {
    for &widget in &node.widgets {
        dict_mut(doc, widget)?.remove(b"AP");
    }
    Ok(())
}

/// Ask viewers to rebuild field appearances after values were written
pub(crate) fn set_need_appearances(doc: &mut Document) {
    let Ok(root_id) = doc.trailer.get(b"Root").and_then(|r| r.as_reference()) else {
        return;
    };
    let acroform_ref = doc
        .get_dictionary(root_id)
        .ok()
        .and_then(|c| c.get(b"AcroForm").ok())
        .and_then(|a| a.as_reference().ok());

    let acroform = match acroform_ref {
        Some(id) => doc.get_object_mut(id).and_then(|o| o.as_dict_mut()),
        None => doc
            .get_object_mut(root_id)
            .and_then(|o| o.as_dict_mut())
            .and_then(|c| c.get_mut(b"AcroForm"))
            .and_then(|a| a.as_dict_mut()),
    };
    if let Ok(acroform) = acroform {
        acroform.set("NeedAppearances", Object::Boolean(true));
    }
}
