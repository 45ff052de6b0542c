//! Export compositor
//!
//! Bakes the session's annotations into a copy of the uploaded document:
//! form values are written into their fields, then boxes and text are
//! appended to each page's content in a single save pass.

use crate::config::AnnotatorConfig;
use crate::error::ExportError;
use crate::forms::{self, WriteSkip};
use crate::page::{media_box, MediaBox};
use crate::pdf_objects::{resolve, resolve_dict, winansi_bytes};
use crate::store::{AnnotationStore, BoundingBox, FormValues, TextAnnotation};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Gap between a box's top edge and the baseline of its label
const LABEL_GAP: f64 = 2.0;

/// Non-fatal problem met while exporting. The export still succeeds.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExportWarning {
    #[error("Form field {name:?} was not found, value skipped")]
    UnknownField { name: String },

    #[error("Form field {name:?} expects a {expected} value, value skipped")]
    ValueMismatch { name: String, expected: &'static str },

    #[error("Form field {name:?} could not be written: {reason}")]
    FieldUnwritable { name: String, reason: String },

    #[error("Annotation {id} is on page {page}, which the document does not have")]
    MissingPage { id: String, page: u32 },
}

#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub bytes: Vec<u8>,
    /// Download name: the configured prefix followed by the original name
    pub file_name: String,
    pub warnings: Vec<ExportWarning>,
}

/// Parse hex color string (e.g., "#FF0000" or "FF0000") to RGB floats (0-1 range)
pub(crate) fn parse_hex_color(color: &str) -> (f32, f32, f32) {
    let hex = color.trim_start_matches('#');
    if hex.len() >= 6 && hex.is_ascii() {
        let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0) as f32 / 255.0;
        let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0) as f32 / 255.0;
        let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0) as f32 / 255.0;
        (r, g, b)
    } else {
        (0.0, 0.0, 0.0) // Default to black
    }
}

pub fn output_file_name(config: &AnnotatorConfig, original: &str) -> String {
    format!("{}{}", config.output_prefix, original)
}

/// Produce the annotated document from the original bytes and the store
pub fn export_document(
    pdf_bytes: &[u8],
    file_name: &str,
    store: &AnnotationStore,
    config: &AnnotatorConfig,
) -> Result<ExportOutput, ExportError> {
    let mut doc =
        Document::load_mem(pdf_bytes).map_err(|e| ExportError::ParseError(e.to_string()))?;
    if doc.is_encrypted() {
        return Err(ExportError::Encrypted);
    }

    let mut warnings = apply_form_values(&mut doc, store.form_values());

    let pages = doc.get_pages();
    for b in store.boxes().iter().filter(|b| !pages.contains_key(&b.page)) {
        warnings.push(missing_page(&b.id, b.page));
    }
    for t in store.texts().iter().filter(|t| !pages.contains_key(&t.page)) {
        warnings.push(missing_page(&t.id, t.page));
    }

    let mut painter = Painter::new(&mut doc, config);
    for (&page_num, &page_id) in &pages {
        let boxes: Vec<&BoundingBox> = store.boxes_on_page(page_num).collect();
        let texts: Vec<&TextAnnotation> = store.texts_on_page(page_num).collect();
        if boxes.is_empty() && texts.is_empty() {
            continue;
        }
        painter.paint_page(page_id, &boxes, &texts)?;
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ExportError::SerializationError(e.to_string()))?;

    tracing::info!(
        "Exported {} boxes, {} text annotations, {} form values ({} warnings)",
        store.boxes().len(),
        store.texts().len(),
        store.form_values().len(),
        warnings.len()
    );

    Ok(ExportOutput {
        bytes,
        file_name: output_file_name(config, file_name),
        warnings,
    })
}

fn missing_page(id: &str, page: u32) -> ExportWarning {
    let warning = ExportWarning::MissingPage {
        id: id.to_string(),
        page,
    };
    tracing::warn!("{}", warning);
    warning
}

/// Write every changed form value into its field. Fields whose current
/// value already matches are left alone so their appearance survives.
pub fn apply_form_values(doc: &mut Document, values: &FormValues) -> Vec<ExportWarning> {
    if values.is_empty() {
        return Vec::new();
    }
    let nodes = forms::collect_fields(doc).unwrap_or_else(|e| {
        tracing::warn!("Form fields could not be read for export: {}", e);
        Vec::new()
    });

    let mut warnings = Vec::new();
    let mut written = 0usize;
    for (name, value) in values {
        let Some(node) = nodes.iter().find(|n| &n.name == name) else {
            warnings.push(ExportWarning::UnknownField { name: name.clone() });
            continue;
        };
        if forms::read_value(doc, node).as_ref() == Some(value) {
            continue;
        }
        match forms::write_value(doc, node, value) {
            Ok(()) => written += 1,
            Err(WriteSkip::Mismatch(expected)) => warnings.push(ExportWarning::ValueMismatch {
                name: name.clone(),
                expected,
            }),
            Err(WriteSkip::Unwritable(reason)) => warnings.push(ExportWarning::FieldUnwritable {
                name: name.clone(),
                reason,
            }),
        }
    }

    if written > 0 {
        forms::set_need_appearances(doc);
    }
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }
    tracing::debug!("Wrote {} form values", written);
    warnings
}

/// Appends drawing operations to pages, sharing one font and one
/// graphics state object across the whole document
struct Painter<'a> {
    doc: &'a mut Document,
    config: &'a AnnotatorConfig,
    font_id: Option<ObjectId>,
    gs_id: Option<ObjectId>,
}

/// Resource names registered on one page
struct PageResources {
    font: String,
    gs: String,
}

impl<'a> Painter<'a> {
    fn new(doc: &'a mut Document, config: &'a AnnotatorConfig) -> Self {
        Self {
            doc,
            config,
            font_id: None,
            gs_id: None,
        }
    }

    fn font(&mut self) -> ObjectId {
        if let Some(id) = self.font_id {
            return id;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        self.font_id = Some(id);
        id
    }

    fn graphics_state(&mut self) -> ObjectId {
        if let Some(id) = self.gs_id {
            return id;
        }
        let opacity = self.config.box_border.opacity as f32;
        let id = self.doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "CA" => Object::Real(opacity),
            "ca" => Object::Real(opacity),
        });
        self.gs_id = Some(id);
        id
    }

    fn paint_page(
        &mut self,
        page_id: ObjectId,
        boxes: &[&BoundingBox],
        texts: &[&TextAnnotation],
    ) -> Result<(), ExportError> {
        let mb = media_box(self.doc, page_id);
        let names = self.register_resources(page_id)?;

        let mut ops = Vec::new();
        for b in boxes {
            ops.extend(self.box_operations(b, &mb, &names));
        }
        for t in texts {
            ops.extend(text_operations(t, &mb, &names.font));
        }

        self.append_content(page_id, ops)?;
        tracing::debug!(
            "Painted {} boxes and {} texts on page {:?}",
            boxes.len(),
            texts.len(),
            page_id
        );
        Ok(())
    }

    fn box_operations(&self, b: &BoundingBox, mb: &MediaBox, names: &PageResources) -> Vec<Operation> {
        let border = &self.config.box_border;
        let (r, g, bl) = parse_hex_color(&border.color);

        let (ax, ay) = mb.to_pdf(b.coords[0], b.coords[1]);
        let (bx, by) = mb.to_pdf(b.coords[2], b.coords[3]);
        let (x, y) = (ax.min(bx), ay.min(by));
        let (w, h) = ((bx - ax).abs(), (by - ay).abs());
        let top = ay.max(by);

        let mut ops = vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(names.gs.as_bytes().to_vec())]),
            Operation::new("RG", vec![Object::Real(r), Object::Real(g), Object::Real(bl)]),
            Operation::new("w", vec![real(border.width)]),
            Operation::new("re", vec![real(x), real(y), real(w), real(h)]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ];

        if let Some(label) = b.label.as_deref().filter(|l| !l.is_empty()) {
            ops.extend([
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![
                        Object::Name(names.font.as_bytes().to_vec()),
                        real(self.config.label_font_size),
                    ],
                ),
                Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(bl)]),
                Operation::new("Td", vec![real(x), real(top + LABEL_GAP)]),
                Operation::new("Tj", vec![show_text(label)]),
                Operation::new("ET", vec![]),
            ]);
        }
        ops
    }

    /// Make sure the page has our font and graphics state under names that
    /// do not clash with its existing resources
    fn register_resources(&mut self, page_id: ObjectId) -> Result<PageResources, ExportError> {
        let font_id = self.font();
        let gs_id = self.graphics_state();

        let mut resources = effective_resources(self.doc, page_id);
        let mut fonts = sub_dictionary(self.doc, &resources, b"Font");
        let mut states = sub_dictionary(self.doc, &resources, b"ExtGState");

        let font = unique_key(&fonts, "AnnotF");
        let gs = unique_key(&states, "AnnotGS");
        fonts.set(font.as_str(), font_id);
        states.set(gs.as_str(), gs_id);
        resources.set("Font", fonts);
        resources.set("ExtGState", states);

        page_dict_mut(self.doc, page_id)?.set("Resources", resources);
        Ok(PageResources { font, gs })
    }

    /// Wrap the existing content in q/Q and append ours after it, so
    /// whatever graphics state the page leaves behind cannot leak into
    /// the overlay
    fn append_content(&mut self, page_id: ObjectId, ops: Vec<Operation>) -> Result<(), ExportError> {
        let mut overlay = Content {
            operations: vec![Operation::new("Q", vec![])],
        };
        overlay.operations.extend(ops);
        let encoded = overlay
            .encode()
            .map_err(|e| ExportError::OperationError(e.to_string()))?;

        let existing = existing_contents(self.doc, page_id)?;

        let open = self
            .doc
            .add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let close = self.doc.add_object(Stream::new(Dictionary::new(), encoded));

        let mut contents = Vec::with_capacity(existing.len() + 2);
        contents.push(Object::Reference(open));
        contents.extend(existing);
        contents.push(Object::Reference(close));

        page_dict_mut(self.doc, page_id)?.set("Contents", contents);
        Ok(())
    }
}

/// References to the page's content streams. `Contents` may be a stream,
/// an array of streams, or a reference to such an array.
fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, ExportError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| ExportError::OperationError(e.to_string()))?;
    let contents = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            Ok(_) => vec![Object::Reference(*id)],
            Err(e) => return Err(ExportError::OperationError(e.to_string())),
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    Ok(contents)
}

fn text_operations(t: &TextAnnotation, mb: &MediaBox, font: &str) -> Vec<Operation> {
    let (x, y) = mb.to_pdf(t.x, t.y);
    vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font.as_bytes().to_vec()), real(t.font_size)],
        ),
        Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
        Operation::new("Td", vec![real(x), real(y)]),
        Operation::new("Tj", vec![show_text(&t.text)]),
        Operation::new("ET", vec![]),
    ]
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

fn show_text(s: &str) -> Object {
    Object::String(winansi_bytes(s), StringFormat::Literal)
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, ExportError> {
    doc.get_object_mut(page_id)
        .and_then(|o| o.as_dict_mut())
        .map_err(|e| ExportError::OperationError(e.to_string()))
}

/// Copy of the page's resource dictionary, following inheritance
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    doc.get_dictionary(page_id)
        .ok()
        .and_then(|page| {
            crate::page::inherited(doc, page, b"Resources", |d| {
                d.get(b"Resources")
                    .ok()
                    .and_then(|r| resolve_dict(doc, r))
                    .cloned()
            })
        })
        .unwrap_or_default()
}

fn sub_dictionary(doc: &Document, resources: &Dictionary, key: &[u8]) -> Dictionary {
    resources
        .get(key)
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

fn unique_key(dict: &Dictionary, base: &str) -> String {
    let taken: HashSet<&[u8]> = dict.iter().map(|(k, _)| k.as_slice()).collect();
    (1..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !taken.contains(candidate.as_bytes()))
        .unwrap_or_else(|| base.to_string())
}

/// Decoded drawing operations per 1-indexed page, for inspecting output
pub fn page_operations(pdf_bytes: &[u8]) -> Result<BTreeMap<u32, Vec<Operation>>, ExportError> {
    let doc = Document::load_mem(pdf_bytes).map_err(|e| ExportError::ParseError(e.to_string()))?;
    let mut out = BTreeMap::new();
    for (num, id) in doc.get_pages() {
        let content = doc
            .get_page_content(id)
            .map_err(|e| ExportError::ParseError(e.to_string()))?;
        let decoded =
            Content::decode(&content).map_err(|e| ExportError::ParseError(e.to_string()))?;
        out.insert(num, decoded.operations);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::introspect;
    use crate::store::FormValue;
    use crate::testing::{form_pdf, simple_pdf};
    use pretty_assertions::assert_eq;

    fn floats(op: &Operation) -> Vec<f32> {
        op.operands.iter().filter_map(|o| o.as_float().ok()).collect()
    }

    fn find<'a>(ops: &'a [Operation], operator: &str) -> Vec<&'a Operation> {
        ops.iter().filter(|op| op.operator == operator).collect()
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000"), (1.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("00ff00"), (0.0, 1.0, 0.0));
        assert_eq!(parse_hex_color("#abc"), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_output_name_is_prefixed() {
        let config = AnnotatorConfig::default();
        assert_eq!(output_file_name(&config, "lease.pdf"), "annotated_lease.pdf");
    }

    #[test]
    fn test_empty_store_still_produces_valid_pdf() {
        let store = AnnotationStore::new();
        let out =
            export_document(&simple_pdf(1), "a.pdf", &store, &AnnotatorConfig::default()).unwrap();
        assert!(out.bytes.starts_with(b"%PDF-"));
        assert!(out.warnings.is_empty());
        assert_eq!(Document::load_mem(&out.bytes).unwrap().get_pages().len(), 1);
    }

    #[test]
    fn test_garbage_input_is_a_parse_error() {
        let store = AnnotationStore::new();
        let result = export_document(b"not a pdf", "a.pdf", &store, &AnnotatorConfig::default());
        assert!(matches!(result, Err(ExportError::ParseError(_))));
    }

    #[test]
    fn test_box_is_flipped_into_pdf_space() {
        let mut store = AnnotationStore::new();
        store.add_box([100.0, 100.0, 300.0, 200.0], Some("Box 1".into()), 1);

        let out =
            export_document(&simple_pdf(1), "a.pdf", &store, &AnnotatorConfig::default()).unwrap();
        let ops = &page_operations(&out.bytes).unwrap()[&1];

        let rects = find(ops, "re");
        assert_eq!(rects.len(), 1);
        assert_eq!(floats(rects[0]), vec![100.0, 592.0, 200.0, 100.0]);
        assert_eq!(find(ops, "S").len(), 1);

        // Label sits just above the top edge (792 - 100)
        let label = ops
            .iter()
            .zip(ops.iter().skip(1))
            .find(|(_, next)| {
                next.operator == "Tj" && next.operands[0].as_str().ok() == Some(&b"Box 1"[..])
            })
            .map(|(td, _)| floats(td))
            .unwrap();
        assert_eq!(label, vec![100.0, 694.0]);
    }

    #[test]
    fn test_original_content_is_kept_and_isolated() {
        let mut store = AnnotationStore::new();
        store.add_text(50.0, 50.0, "Hello", 14.0, 1);

        let out =
            export_document(&simple_pdf(1), "a.pdf", &store, &AnnotatorConfig::default()).unwrap();
        let ops = &page_operations(&out.bytes).unwrap()[&1];

        assert_eq!(ops.first().unwrap().operator, "q");
        let shown: Vec<&[u8]> = find(ops, "Tj")
            .iter()
            .filter_map(|op| op.operands[0].as_str().ok())
            .collect();
        assert_eq!(shown, vec![&b"Page 1"[..], &b"Hello"[..]]);
    }

    #[test]
    fn test_indirect_contents_array_is_kept() {
        let mut doc = Document::load_mem(&simple_pdf(1)).unwrap();
        let page_id = doc.get_pages()[&1];
        let stream_id = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Contents")
            .unwrap()
            .as_reference()
            .unwrap();
        let array_id = doc.add_object(vec![Object::Reference(stream_id)]);
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Contents", array_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let mut store = AnnotationStore::new();
        store.add_text(50.0, 50.0, "Hello", 14.0, 1);
        let out = export_document(&bytes, "a.pdf", &store, &AnnotatorConfig::default()).unwrap();

        let out_doc = Document::load_mem(&out.bytes).unwrap();
        let out_page = out_doc.get_pages()[&1];
        let contents = out_doc
            .get_dictionary(out_page)
            .unwrap()
            .get(b"Contents")
            .unwrap()
            .as_array()
            .unwrap();
        assert_eq!(contents.len(), 3);
        for item in contents {
            let id = item.as_reference().unwrap();
            assert!(out_doc.get_object(id).unwrap().as_stream().is_ok());
        }

        let ops = &page_operations(&out.bytes).unwrap()[&1];
        let shown: Vec<&[u8]> = find(ops, "Tj")
            .iter()
            .filter_map(|op| op.operands[0].as_str().ok())
            .collect();
        assert_eq!(shown, vec![&b"Page 1"[..], &b"Hello"[..]]);
    }

    #[test]
    fn test_annotations_are_drawn_on_their_own_page() {
        let mut store = AnnotationStore::new();
        store.add_box([10.0, 10.0, 50.0, 50.0], None, 2);
        store.add_text(5.0, 5.0, "second", 12.0, 2);

        let out =
            export_document(&simple_pdf(2), "a.pdf", &store, &AnnotatorConfig::default()).unwrap();
        let pages = page_operations(&out.bytes).unwrap();
        assert!(find(&pages[&1], "re").is_empty());
        assert_eq!(find(&pages[&2], "re").len(), 1);
    }

    #[test]
    fn test_missing_page_is_a_warning() {
        let mut store = AnnotationStore::new();
        let id = store.add_text(5.0, 5.0, "lost", 12.0, 9);

        let out =
            export_document(&simple_pdf(1), "a.pdf", &store, &AnnotatorConfig::default()).unwrap();
        assert_eq!(out.warnings, vec![ExportWarning::MissingPage { id, page: 9 }]);
    }

    #[test]
    fn test_resource_names_do_not_clash() {
        let mut doc = Document::load_mem(&simple_pdf(1)).unwrap();
        let page_id = doc.get_pages()[&1];
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set(
                "Resources",
                dictionary! { "Font" => dictionary! { "AnnotF1" => "Placeholder" } },
            );
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let mut store = AnnotationStore::new();
        store.add_text(5.0, 5.0, "x", 12.0, 1);
        let out = export_document(&bytes, "a.pdf", &store, &AnnotatorConfig::default()).unwrap();

        let out_doc = Document::load_mem(&out.bytes).unwrap();
        let page = out_doc.get_dictionary(out_doc.get_pages()[&1]).unwrap();
        let fonts = page
            .get(b"Resources")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Font")
            .unwrap()
            .as_dict()
            .unwrap();
        assert!(fonts.has(b"AnnotF1"));
        assert!(fonts.has(b"AnnotF2"));
    }

    #[test]
    fn test_form_values_are_written() {
        let mut store = AnnotationStore::new();
        store.reset(introspect(&form_pdf()).values);
        store.set_form_value("company", FormValue::Text("Acme Corp".into()));
        store.set_form_value("agree", FormValue::Flag(true));

        let out =
            export_document(&form_pdf(), "f.pdf", &store, &AnnotatorConfig::default()).unwrap();
        assert!(out.warnings.is_empty());

        let values = introspect(&out.bytes).values;
        assert_eq!(values["company"], FormValue::Text("Acme Corp".into()));
        assert_eq!(values["agree"], FormValue::Flag(true));
        assert_eq!(values["size"], FormValue::Text("M".into()));
    }

    #[test]
    fn test_unknown_and_mismatched_fields_are_skipped() {
        let mut store = AnnotationStore::new();
        store.set_form_value("ghost", FormValue::Text("boo".into()));
        store.set_form_value("agree", FormValue::Text("yes".into()));
        store.set_form_value("company", FormValue::Text("Still written".into()));

        let out =
            export_document(&form_pdf(), "f.pdf", &store, &AnnotatorConfig::default()).unwrap();
        assert_eq!(
            out.warnings,
            vec![
                ExportWarning::ValueMismatch {
                    name: "agree".into(),
                    expected: "boolean"
                },
                ExportWarning::UnknownField {
                    name: "ghost".into()
                },
            ]
        );
        let values = introspect(&out.bytes).values;
        assert_eq!(values["company"], FormValue::Text("Still written".into()));
    }

    #[test]
    fn test_need_appearances_set_after_write() {
        let mut store = AnnotationStore::new();
        store.set_form_value("company", FormValue::Text("Acme Corp".into()));
        let out =
            export_document(&form_pdf(), "f.pdf", &store, &AnnotatorConfig::default()).unwrap();

        let doc = Document::load_mem(&out.bytes).unwrap();
        let root = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
        let acroform_id = doc
            .get_dictionary(root)
            .unwrap()
            .get(b"AcroForm")
            .unwrap()
            .as_reference()
            .unwrap();
        let acroform = doc.get_dictionary(acroform_id).unwrap();
        assert_eq!(
            acroform.get(b"NeedAppearances").unwrap().as_bool().unwrap(),
            true
        );
    }
}
