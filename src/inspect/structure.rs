//! The tag tree as a report.

use std::collections::{BTreeMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::display_object;
use super::report::{AttributeReport, McidReference, StructureElementReport, StructureTreeReport};
use crate::pdf::objects::{dict_get, dict_get_dict, dict_get_number, name, object_label, reference, resolve};
use crate::pdf::text::dict_string;

/// Elements nested deeper than this are not reported.
const MAX_DEPTH: usize = 256;
/// RoleMap chains longer than this are treated as unmapped.
const MAX_ROLE_HOPS: usize = 8;

/// The RoleMap of a StructTreeRoot.
pub fn role_map(doc: &Document, root: &Dictionary) -> BTreeMap<String, String> {
    dict_get_dict(doc, root, b"RoleMap")
        .map(|map| {
            map.iter()
                .filter_map(|(key, value)| {
                    Some((String::from_utf8_lossy(key).to_string(), name(resolve(doc, value))?))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Report the tree under `root`; `parent_tree_entries` is the flattened
/// ParentTree size.
pub fn structure_tree(
    doc: &Document,
    root_id: Option<ObjectId>,
    root: &Dictionary,
    page_numbers: &BTreeMap<ObjectId, u32>,
    parent_tree_entries: usize,
) -> StructureTreeReport {
    let mut walker = TreeWalker {
        doc,
        page_numbers,
        role_map: role_map(doc, root),
        visited: HashSet::new(),
    };
    if let Some(id) = root_id {
        walker.visited.insert(id);
    }
    let mut children = Vec::new();
    for kid in kids(root) {
        if let Some(element) = walker.element(kid, None, 0) {
            children.push(element);
        }
    }
    StructureTreeReport {
        children,
        parent_tree_entries,
        parent_tree_next_key: dict_get_number(doc, root, b"ParentTreeNextKey").map(|k| k as i64),
    }
}

fn kids(dict: &Dictionary) -> Vec<&Object> {
    match dict.get(b"K") {
        Ok(Object::Array(items)) => items.iter().collect(),
        Ok(item) => vec![item],
        Err(_) => Vec::new(),
    }
}

struct TreeWalker<'a> {
    doc: &'a Document,
    page_numbers: &'a BTreeMap<ObjectId, u32>,
    role_map: BTreeMap<String, String>,
    visited: HashSet<ObjectId>,
}

impl TreeWalker<'_> {
    /// Report a kid that is a structure element; `None` for content kids.
    fn element(
        &mut self,
        kid: &Object,
        inherited_page: Option<u32>,
        depth: usize,
    ) -> Option<StructureElementReport> {
        if depth > MAX_DEPTH {
            log::warn!("Structure tree deeper than {} levels, truncating", MAX_DEPTH);
            return None;
        }
        let object_id = reference(kid);
        if let Some(id) = object_id {
            if !self.visited.insert(id) {
                log::warn!("Structure element {:?} reached twice, skipping", id);
                return None;
            }
        }
        let doc = self.doc;
        let dict = match resolve(doc, kid) {
            Object::Dictionary(dict) if dict.has(b"S") => dict,
            _ => return None,
        };

        let role = dict_get(doc, dict, b"S").and_then(name).unwrap_or_default();
        let standard = self.standard_role(&role);
        let page = self.page_of(dict).or(inherited_page);
        let attributes = attributes(doc, dict);
        let mut report = StructureElementReport {
            object_id: object_id.map(object_label),
            standard_role: (standard != role).then_some(standard),
            role,
            id: dict_string(doc, dict, b"ID"),
            title: dict_string(doc, dict, b"T"),
            language: dict_string(doc, dict, b"Lang"),
            alt_text: dict_string(doc, dict, b"Alt"),
            actual_text: dict_string(doc, dict, b"ActualText"),
            has_bbox: attributes.iter().any(|a| a.key == "BBox"),
            attributes,
            page,
            ..StructureElementReport::default()
        };

        for child in kids(dict) {
            match resolve(doc, child) {
                Object::Integer(mcid) => report.content.push(McidReference { page, mcid: *mcid }),
                Object::Dictionary(item) if !item.has(b"S") => {
                    match dict_get(doc, item, b"Type").and_then(name).as_deref() {
                        Some("MCR") => {
                            if let Some(mcid) = dict_get_number(doc, item, b"MCID") {
                                report.content.push(McidReference {
                                    page: self.page_of(item).or(page),
                                    mcid: mcid as i64,
                                });
                            }
                        }
                        Some("OBJR") => {
                            if let Some(obj) = item.get(b"Obj").ok().and_then(reference) {
                                report.annotations.push(object_label(obj));
                            }
                        }
                        _ => {}
                    }
                }
                _ => {
                    if let Some(element) = self.element(child, page, depth + 1) {
                        report.children.push(element);
                    }
                }
            }
        }
        Some(report)
    }

    fn page_of(&self, dict: &Dictionary) -> Option<u32> {
        let pg = dict.get(b"Pg").ok().and_then(reference)?;
        self.page_numbers.get(&pg).copied()
    }

    fn standard_role(&self, role: &str) -> String {
        let mut current = role.to_string();
        for _ in 0..MAX_ROLE_HOPS {
            match self.role_map.get(&current) {
                Some(next) if *next != current => current = next.clone(),
                _ => break,
            }
        }
        current
    }
}

/// Attribute entries of `/A`, a dictionary or an array of dictionaries
/// with optional revision numbers.
fn attributes(doc: &Document, element: &Dictionary) -> Vec<AttributeReport> {
    let dicts: Vec<&Dictionary> = match dict_get(doc, element, b"A") {
        Some(Object::Dictionary(dict)) => vec![dict],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match resolve(doc, item) {
                Object::Dictionary(dict) => Some(dict),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    dicts
        .into_iter()
        .flat_map(|dict| {
            let owner = dict_get(doc, dict, b"O").and_then(name);
            dict.iter()
                .filter(|(key, _)| key.as_slice() != b"O")
                .map(move |(key, value)| AttributeReport {
                    owner: owner.clone(),
                    key: String::from_utf8_lossy(key).to_string(),
                    value: display_object(doc, value),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, StringFormat};

    #[test]
    fn test_tree_with_content_and_cycle() {
        let mut doc = Document::with_version("1.7");
        let page = doc.add_object(dictionary! { "Type" => "Page" });
        let root_id = doc.new_object_id();
        let doc_elem = doc.new_object_id();
        let heading = doc.add_object(dictionary! {
            "Type" => "StructElem",
            "S" => "Heading",
            "P" => doc_elem,
            "Pg" => page,
            "Alt" => Object::String(b"Intro".to_vec(), StringFormat::Literal),
            "A" => dictionary! {
                "O" => "Layout",
                "BBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(10), Object::Integer(10)],
            },
            "K" => vec![
                Object::Integer(0),
                Object::Dictionary(dictionary! { "Type" => "MCR", "MCID" => 3 }),
                Object::Dictionary(dictionary! { "Type" => "OBJR", "Obj" => Object::Reference((40, 0)) }),
                // Cycle back to the parent.
                Object::Reference(doc_elem),
            ],
        });
        doc.objects.insert(
            doc_elem,
            Object::Dictionary(dictionary! {
                "Type" => "StructElem",
                "S" => "Document",
                "P" => root_id,
                "K" => vec![Object::Reference(heading)],
            }),
        );
        let root = dictionary! {
            "Type" => "StructTreeRoot",
            "K" => doc_elem,
            "RoleMap" => dictionary! { "Heading" => "H1" },
            "ParentTreeNextKey" => 2,
        };
        doc.objects.insert(root_id, Object::Dictionary(root.clone()));

        let pages = BTreeMap::from([(page, 1)]);
        let report = structure_tree(&doc, Some(root_id), &root, &pages, 1);
        assert_eq!(report.parent_tree_next_key, Some(2));
        assert_eq!(report.children.len(), 1);
        let document = &report.children[0];
        assert_eq!(document.role, "Document");
        assert_eq!(document.children.len(), 1);

        let heading = &document.children[0];
        assert_eq!(heading.standard_role.as_deref(), Some("H1"));
        assert_eq!(heading.alt_text.as_deref(), Some("Intro"));
        assert!(heading.has_bbox);
        assert_eq!(heading.attributes[0].owner.as_deref(), Some("Layout"));
        assert_eq!(
            heading.content,
            vec![
                McidReference { page: Some(1), mcid: 0 },
                McidReference { page: Some(1), mcid: 3 },
            ]
        );
        assert_eq!(heading.annotations, vec!["40 0"]);
        assert!(heading.children.is_empty());
    }

    #[test]
    fn test_role_map_names() {
        let doc = Document::with_version("1.7");
        let root = dictionary! { "RoleMap" => dictionary! { "Chapter" => "Sect", "Note" => "P" } };
        let map = role_map(&doc, &root);
        assert_eq!(map.get("Chapter").map(String::as_str), Some("Sect"));
        assert_eq!(map.len(), 2);
    }
}
