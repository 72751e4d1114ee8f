//! PDF fixtures and inspection helpers for tests

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// Build a PDF with one page per `(width, height, text)`, each drawing `text`.
pub(crate) fn build_pdf(pages: &[(f32, f32, &str)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for (width, height, text) in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![10.into(), 10.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode fixture content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(*width), Object::Real(*height)],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save fixture pdf");
    bytes
}

/// One overlay drawn on a page: its translation and the text it shows.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Placement {
    pub tx: f32,
    pub ty: f32,
    pub text: String,
}

/// For every page, the overlays drawn on it in drawing order.
pub(crate) fn placements(bytes: &[u8]) -> Vec<Vec<Placement>> {
    let doc = Document::load_mem(bytes).expect("load pdf");

    doc.get_pages()
        .values()
        .map(|&page_id| {
            let content =
                Content::decode(&doc.get_page_content(page_id).expect("page content"))
                    .expect("decode page content");
            let page = doc.get_dictionary(page_id).expect("page dictionary");
            let xobjects = page
                .get(b"Resources")
                .ok()
                .and_then(|r| resolve_dict(&doc, r))
                .and_then(|r| r.get(b"XObject").ok().and_then(|x| resolve_dict(&doc, x)));

            let mut translation = (0.0, 0.0);
            let mut found = Vec::new();
            for op in content.operations {
                match op.operator.as_str() {
                    "cm" if op.operands.len() == 6 => {
                        translation = (number(&op.operands[4]), number(&op.operands[5]));
                    }
                    "Do" => {
                        let Some(Object::Name(name)) = op.operands.first() else {
                            continue;
                        };
                        let Some(xobjects) = xobjects else { continue };
                        let form_id = xobjects
                            .get(name)
                            .and_then(Object::as_reference)
                            .expect("form reference");
                        let form = doc
                            .get_object(form_id)
                            .and_then(Object::as_stream)
                            .expect("form stream");
                        found.push(Placement {
                            tx: translation.0,
                            ty: translation.1,
                            text: stream_text(&form.content),
                        });
                    }
                    _ => {}
                }
            }
            found
        })
        .collect()
}

/// Text shown by every page's own content, ignoring overlays.
pub(crate) fn page_texts(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).expect("load pdf");
    doc.get_pages()
        .values()
        .map(|&page_id| stream_text(&doc.get_page_content(page_id).expect("page content")))
        .collect()
}

fn stream_text(content: &[u8]) -> String {
    Content::decode(content)
        .expect("decode stream")
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a lopdf::Dictionary> {
    match object {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn number(object: &Object) -> f32 {
    match object {
        Object::Integer(i) => *i as f32,
        Object::Real(r) => *r,
        _ => 0.0,
    }
}
