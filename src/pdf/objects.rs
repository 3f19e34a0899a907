//! Small helpers over the lopdf object model.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::text::decode_text_string;
use crate::geometry::BoundingBox;

static NULL_OBJECT: Object = Object::Null;

/// Reference chains longer than this are treated as broken.
const MAX_REFERENCE_DEPTH: usize = 32;

/// Name-tree nesting beyond this depth is ignored while flattening.
const MAX_NAME_TREE_DEPTH: usize = 32;

/// Follow indirect references until a direct object is reached.
///
/// Dangling or cyclic references resolve to `null`.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    for _ in 0..MAX_REFERENCE_DEPTH {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return &NULL_OBJECT,
            },
            _ => return current,
        }
    }
    &NULL_OBJECT
}

/// Resolve to a dictionary; stream objects yield their stream dictionary.
pub fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj) {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// Look up `key` in `dict` and resolve the value.
pub fn dict_get<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().map(|obj| resolve(doc, obj))
}

/// Look up a dictionary-valued entry.
pub fn dict_get_dict<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Dictionary> {
    dict.get(key).ok().and_then(|obj| resolve_dict(doc, obj))
}

/// Look up an array-valued entry.
pub fn dict_get_array<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Vec<Object>> {
    match dict_get(doc, dict, key)? {
        Object::Array(items) => Some(items),
        _ => None,
    }
}

/// Look up a name-valued entry as a string.
pub fn dict_get_name(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict_get(doc, dict, key).and_then(name)
}

/// Look up a numeric entry.
pub fn dict_get_number(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<f64> {
    dict_get(doc, dict, key).and_then(number)
}

/// Numeric value of an integer or real object.
pub fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Name object as a string.
pub fn name(obj: &Object) -> Option<String> {
    match obj {
        Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        _ => None,
    }
}

/// The object id a value refers to, if it is a reference.
pub fn reference(obj: &Object) -> Option<ObjectId> {
    match obj {
        Object::Reference(id) => Some(*id),
        _ => None,
    }
}

/// Parse a PDF rectangle array into a box.
pub fn rect(doc: &Document, obj: &Object) -> Option<BoundingBox> {
    let Object::Array(items) = resolve(doc, obj) else {
        return None;
    };
    if items.len() < 4 {
        return None;
    }
    let values: Vec<f64> = items
        .iter()
        .take(4)
        .filter_map(|item| number(resolve(doc, item)))
        .collect();
    if values.len() < 4 {
        return None;
    }
    Some(BoundingBox::from_corners(
        values[0], values[1], values[2], values[3],
    ))
}

/// Numeric object, integral values written as integers.
pub fn real(value: f64) -> Object {
    if value.fract() == 0.0 && value.abs() < i32::MAX as f64 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value as f32)
    }
}

/// PDF rectangle array for a box.
pub fn rect_object(bbox: &BoundingBox) -> Object {
    Object::Array(bbox.to_rect().iter().map(|v| real(*v)).collect())
}

/// `"12 0"` style label for an object id.
pub fn object_label(id: ObjectId) -> String {
    format!("{} {}", id.0, id.1)
}

/// Key of a name object as an owned byte vector, for dictionary lookups.
pub fn name_bytes(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::Name(bytes) => Some(bytes.as_slice()),
        _ => None,
    }
}

/// Flatten a name tree into `out`, later duplicates winning.
pub fn collect_names(
    doc: &Document,
    node: &Dictionary,
    out: &mut BTreeMap<String, Object>,
    depth: usize,
) {
    if depth > MAX_NAME_TREE_DEPTH {
        return;
    }
    if let Some(Object::Array(names)) = dict_get(doc, node, b"Names") {
        for pair in names.chunks(2) {
            if let [key, value] = pair {
                if let Object::String(key, _) = resolve(doc, key) {
                    out.insert(decode_text_string(key), value.clone());
                }
            }
        }
    }
    if let Some(Object::Array(kids)) = dict_get(doc, node, b"Kids") {
        for kid in kids {
            if let Object::Dictionary(child) = resolve(doc, kid) {
                collect_names(doc, child, out, depth + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_resolve_follows_references() {
        let mut doc = Document::with_version("1.7");
        let inner = doc.add_object(Object::Integer(7));
        let outer = doc.add_object(Object::Reference(inner));
        assert_eq!(number(resolve(&doc, &Object::Reference(outer))), Some(7.0));
        assert!(matches!(
            resolve(&doc, &Object::Reference((999, 0))),
            Object::Null
        ));
    }

    #[test]
    fn test_rect_normalizes_corners() {
        let doc = Document::with_version("1.7");
        let array = Object::Array(vec![
            Object::Integer(100),
            Object::Integer(50),
            Object::Integer(0),
            Object::Real(0.5),
        ]);
        assert_eq!(
            rect(&doc, &array),
            Some(BoundingBox::new(0.0, 0.5, 100.0, 49.5))
        );
    }

    #[test]
    fn test_dict_helpers() {
        let mut doc = Document::with_version("1.7");
        let child = doc.add_object(dictionary! { "Type" => "Font" });
        let dict = dictionary! { "Font" => child, "Size" => 12 };
        assert_eq!(
            dict_get_dict(&doc, &dict, b"Font").and_then(|d| dict_get_name(&doc, d, b"Type")),
            Some("Font".to_string())
        );
        assert_eq!(dict_get_number(&doc, &dict, b"Size"), Some(12.0));
    }

    #[test]
    fn test_real_prefers_integers() {
        assert!(matches!(real(3.0), Object::Integer(3)));
        assert!(matches!(real(2.5), Object::Real(_)));
    }
}
