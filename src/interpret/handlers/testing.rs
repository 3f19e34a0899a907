//! In-memory documents for handler tests.

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::pdf::DocumentHandle;

/// A document with one Letter page per content string, each page sharing a
/// Helvetica `/F1` font resource.
pub fn document(contents: &[&str]) -> DocumentHandle {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let mut kids = Vec::new();
    for content in contents {
        let stream = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
        let page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font } },
            "Contents" => stream,
        });
        kids.push(Object::Reference(page));
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => count }),
    );
    let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog);
    let mut handle = DocumentHandle::from_document(doc);
    handle.set_compress(false);
    handle
}

/// Operators of a page's content after a handler ran.
pub fn operators(handle: &DocumentHandle, page_id: ObjectId) -> Vec<String> {
    handle
        .page_operations(page_id)
        .unwrap()
        .into_iter()
        .map(|op| op.operator)
        .collect()
}

/// The object behind a dictionary entry, following one reference.
pub fn entry<'a>(handle: &'a DocumentHandle, id: ObjectId, key: &[u8]) -> &'a Object {
    let doc = handle.document();
    let value = doc.get_dictionary(id).unwrap().get(key).unwrap();
    match value {
        Object::Reference(target) => doc.get_object(*target).unwrap(),
        other => other,
    }
}
