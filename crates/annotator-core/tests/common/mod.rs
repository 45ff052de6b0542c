//! Shared fixtures for integration tests

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

pub const PDF: &str = "application/pdf";

fn literal(s: &str) -> Object {
    Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
}

fn letter_pages(doc: &mut Document, count: u32) -> (ObjectId, Vec<ObjectId>) {
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for _ in 0..count {
        let content = Content {
            operations: vec![Operation::new("n", vec![])],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().unwrap(),
        ));
        kids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
        }));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => count as i64,
        }),
    );
    (pages_id, kids)
}

fn finish(mut doc: Document, catalog: Dictionary) -> Vec<u8> {
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Letter-size document without a form
pub fn blank_pdf(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let (pages_id, _) = letter_pages(&mut doc, pages);
    finish(
        doc,
        dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        },
    )
}

/// One page with a text field "company" and a checkbox "agree"
pub fn contact_form_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let (pages_id, kids) = letter_pages(&mut doc, 1);
    let page = kids[0];

    let company = doc.add_object(dictionary! {
        "FT" => "Tx",
        "T" => literal("company"),
        "V" => literal(""),
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Rect" => vec![100.into(), 600.into(), 300.into(), 620.into()],
        "P" => page,
    });

    let on = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
    let off = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
    let agree = doc.add_object(dictionary! {
        "FT" => "Btn",
        "T" => literal("agree"),
        "V" => "Off",
        "AS" => "Off",
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Rect" => vec![100.into(), 560.into(), 114.into(), 574.into()],
        "P" => page,
        "AP" => dictionary! { "N" => dictionary! { "Yes" => on, "Off" => off } },
    });

    doc.get_object_mut(page)
        .unwrap()
        .as_dict_mut()
        .unwrap()
        .set("Annots", vec![Object::Reference(company), Object::Reference(agree)]);

    let acroform = doc.add_object(dictionary! {
        "Fields" => vec![Object::Reference(company), Object::Reference(agree)],
    });
    finish(
        doc,
        dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "AcroForm" => acroform,
        },
    )
}

/// Decoded content operations of one page
pub fn page_ops(pdf: &[u8], page: u32) -> Vec<Operation> {
    let doc = Document::load_mem(pdf).unwrap();
    let page_id = doc.get_pages()[&page];
    let content = doc.get_page_content(page_id).unwrap();
    Content::decode(&content).unwrap().operations
}

pub fn operands(op: &Operation) -> Vec<f32> {
    op.operands.iter().map(|o| o.as_float().unwrap()).collect()
}

/// Strings shown with Tj, paired with the Td position right before them
pub fn shown_text(ops: &[Operation]) -> Vec<(String, Vec<f32>)> {
    let mut out = Vec::new();
    let mut last_td = Vec::new();
    for op in ops {
        match op.operator.as_str() {
            "Td" => last_td = operands(op),
            "Tj" => {
                let bytes = op.operands[0].as_str().unwrap();
                out.push((String::from_utf8_lossy(bytes).into_owned(), last_td.clone()));
            }
            _ => {}
        }
    }
    out
}
