//! In-memory PDF fixtures for unit tests

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

fn literal(s: &str) -> Object {
    Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Build a catalog with `num_pages` Letter pages, each carrying a small
/// content stream. Returns the document and its page ids.
fn letter_document(num_pages: u32) -> (Document, ObjectId, Vec<ObjectId>) {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut page_ids = Vec::new();

    for i in 0..num_pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new("Tj", vec![literal(&format!("Page {}", i + 1))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
        });
        page_ids.push(page_id);
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => num_pages as i64,
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    (doc, catalog_id, page_ids)
}

/// Plain Letter-size document without any form
pub(crate) fn simple_pdf(num_pages: u32) -> Vec<u8> {
    save(letter_document(num_pages).0)
}

fn appearance(doc: &mut Document, on_state: &str) -> Object {
    let on = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
    let off = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
    let mut normal = Dictionary::new();
    normal.set(on_state, on);
    normal.set("Off", off);
    Object::Dictionary(dictionary! { "N" => normal })
}

fn rect(x1: i64, y1: i64, x2: i64, y2: i64) -> Object {
    vec![x1.into(), y1.into(), x2.into(), y2.into()].into()
}

/// Two-page document with an AcroForm covering every field kind:
///
/// | name            | kind        | page | notes                          |
/// |-----------------|-------------|------|--------------------------------|
/// | company         | text        | 1    | V "Initech", MaxLen 20         |
/// | agree           | checkbox    | 1    | V /Off, on-state /Yes          |
/// | size            | radio       | 1    | kids /S and /M, V /M           |
/// | country         | dropdown    | 2    | options US CA, V "CA"          |
/// | toppings        | option-list | 2    | options ch Ham, V [ch Ham]     |
/// | submit          | button      | 2    |                                |
/// | person.first    | text        | 2    | found through page Annots only |
/// | account         | text        | -    | read-only, required, no widget |
pub(crate) fn form_pdf() -> Vec<u8> {
    let (mut doc, catalog_id, page_ids) = letter_document(2);
    let (p1, p2) = (page_ids[0], page_ids[1]);

    let company = doc.add_object(dictionary! {
        "FT" => "Tx",
        "T" => literal("company"),
        "V" => literal("Initech"),
        "MaxLen" => 20,
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Rect" => rect(100, 600, 300, 620),
        "P" => p1,
    });

    let agree_ap = appearance(&mut doc, "Yes");
    let agree = doc.add_object(dictionary! {
        "FT" => "Btn",
        "T" => literal("agree"),
        "V" => "Off",
        "AS" => "Off",
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Rect" => rect(100, 560, 114, 574),
        "P" => p1,
        "AP" => agree_ap,
    });

    let size_id = doc.new_object_id();
    let small_ap = appearance(&mut doc, "S");
    let small = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Parent" => size_id,
        "Rect" => rect(100, 520, 114, 534),
        "P" => p1,
        "AS" => "Off",
        "AP" => small_ap,
    });
    let medium_ap = appearance(&mut doc, "M");
    let medium = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Parent" => size_id,
        "Rect" => rect(130, 520, 144, 534),
        "P" => p1,
        "AS" => "M",
        "AP" => medium_ap,
    });
    doc.objects.insert(
        size_id,
        Object::Dictionary(dictionary! {
            "FT" => "Btn",
            "Ff" => 1 << 15,
            "T" => literal("size"),
            "V" => "M",
            "Kids" => vec![small.into(), medium.into()],
        }),
    );

    let country = doc.add_object(dictionary! {
        "FT" => "Ch",
        "Ff" => 1 << 17,
        "T" => literal("country"),
        "Opt" => vec![literal("US"), literal("CA")],
        "V" => literal("CA"),
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Rect" => rect(100, 700, 200, 720),
        "P" => p2,
    });

    let toppings = doc.add_object(dictionary! {
        "FT" => "Ch",
        "T" => literal("toppings"),
        "Opt" => vec![
            Object::Array(vec![literal("ch"), literal("Cheese")]),
            literal("Ham"),
        ],
        "V" => vec![literal("ch"), literal("Ham")],
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Rect" => rect(100, 600, 200, 660),
        "P" => p2,
    });

    let submit = doc.add_object(dictionary! {
        "FT" => "Btn",
        "Ff" => 1 << 16,
        "T" => literal("submit"),
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Rect" => rect(400, 100, 480, 130),
        "P" => p2,
    });

    let person_id = doc.new_object_id();
    let first = doc.add_object(dictionary! {
        "FT" => "Tx",
        "T" => literal("first"),
        "Parent" => person_id,
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Rect" => rect(100, 400, 250, 420),
    });
    doc.objects.insert(
        person_id,
        Object::Dictionary(dictionary! {
            "T" => literal("person"),
            "Kids" => vec![first.into()],
        }),
    );

    let account = doc.add_object(dictionary! {
        "FT" => "Tx",
        "Ff" => 0b11,
        "T" => literal("account"),
        "V" => literal("ACC-1"),
    });

    for (page, annots) in [
        (p1, vec![company, agree, small, medium]),
        (p2, vec![country, toppings, submit, first]),
    ] {
        let dict = doc.get_object_mut(page).unwrap().as_dict_mut().unwrap();
        dict.set(
            "Annots",
            annots.into_iter().map(Object::Reference).collect::<Vec<_>>(),
        );
    }

    let acroform = doc.add_object(dictionary! {
        "Fields" => vec![
            company.into(),
            agree.into(),
            size_id.into(),
            country.into(),
            toppings.into(),
            submit.into(),
            person_id.into(),
            account.into(),
        ],
    });
    doc.get_object_mut(catalog_id)
        .unwrap()
        .as_dict_mut()
        .unwrap()
        .set("AcroForm", acroform);

    save(doc)
}
