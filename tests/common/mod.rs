//! Shared fixtures: small PDFs built in memory with lopdf.

#![allow(dead_code)]

use lopdf::content::Content;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Serialize a document with one Letter page per content string. Every page
/// shares a Helvetica `/F1` font.
pub fn pdf_with_pages(contents: &[&str]) -> Vec<u8> {
    let mut doc = document_with_pages(contents);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// The unsaved form of [`pdf_with_pages`].
pub fn document_with_pages(contents: &[&str]) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids = Vec::new();
    for content in contents {
        let stream_id = doc.add_object(Stream::new(dictionary! {}, format!("{}\n", content).into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
            "Contents" => stream_id,
        });
        kids.push(Object::Reference(page_id));
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
    doc
}

/// A page that shows one line of text per `(y, text)` pair at x = 72.
pub fn text_page(lines: &[(f64, &str)]) -> String {
    lines
        .iter()
        .map(|(y, text)| format!("BT /F1 12 Tf 72 {} Td ({}) Tj ET", y, text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn load(bytes: &[u8]) -> Document {
    Document::load_mem(bytes).unwrap()
}

pub fn page_id(doc: &Document, number: u32) -> ObjectId {
    doc.get_pages()[&number]
}

/// Decoded operator names of a page, across all of its content streams.
pub fn page_operators(doc: &Document, number: u32) -> Vec<String> {
    let content = pdfremedy::pdf::page_content(doc, page_id(doc, number)).unwrap();
    Content::decode(&content)
        .unwrap()
        .operations
        .into_iter()
        .map(|op| op.operator)
        .collect()
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
