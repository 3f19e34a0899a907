//! Outlines, embedded files and optional content configurations.

use std::collections::{BTreeMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::report::{EmbeddedFileReport, OcgConfigurationReport, OutlineReport};
use crate::pdf::objects::{
    collect_names, dict_get, dict_get_array, dict_get_dict, dict_get_name, dict_get_number, name,
    reference, resolve,
};
use crate::pdf::text::{decode_text_string, dict_string};

/// Outline items beyond this count are not reported.
const MAX_OUTLINE_ITEMS: usize = 10_000;

/// Named destinations from the catalog `/Dests` dictionary and the
/// `/Names /Dests` name tree.
fn named_destinations(doc: &Document, catalog: &Dictionary) -> BTreeMap<String, Object> {
    let mut named = BTreeMap::new();
    if let Some(dests) = dict_get_dict(doc, catalog, b"Dests") {
        for (key, value) in dests.iter() {
            named.insert(String::from_utf8_lossy(key).to_string(), value.clone());
        }
    }
    if let Some(tree) = dict_get_dict(doc, catalog, b"Names")
        .and_then(|names| dict_get_dict(doc, names, b"Dests"))
    {
        collect_names(doc, tree, &mut named, 0);
    }
    named
}

/// The outline tree.
pub fn outlines(
    doc: &Document,
    catalog: &Dictionary,
    page_numbers: &BTreeMap<ObjectId, u32>,
) -> Vec<OutlineReport> {
    let Some(root) = dict_get_dict(doc, catalog, b"Outlines") else {
        return Vec::new();
    };
    let mut reader = OutlineReader {
        doc,
        page_numbers,
        named: named_destinations(doc, catalog),
        visited: HashSet::new(),
    };
    reader.siblings(root)
}

struct OutlineReader<'a> {
    doc: &'a Document,
    page_numbers: &'a BTreeMap<ObjectId, u32>,
    named: BTreeMap<String, Object>,
    visited: HashSet<ObjectId>,
}

impl OutlineReader<'_> {
    /// Children of an outline node, following `/First` and `/Next`.
    fn siblings(&mut self, parent: &Dictionary) -> Vec<OutlineReport> {
        let doc = self.doc;
        let mut items = Vec::new();
        let mut next = parent.get(b"First").ok().and_then(reference);
        while let Some(id) = next {
            if self.visited.len() >= MAX_OUTLINE_ITEMS || !self.visited.insert(id) {
                log::warn!("Outline item {:?} repeats, stopping", id);
                break;
            }
            let Ok(item) = doc.get_dictionary(id) else {
                break;
            };
            items.push(OutlineReport {
                title: dict_string(doc, item, b"Title").unwrap_or_default(),
                page: self.destination_page(item),
                open: dict_get_number(doc, item, b"Count").is_some_and(|c| c > 0.0),
                has_structure_element: item.has(b"SE"),
                children: self.siblings(item),
            });
            next = item.get(b"Next").ok().and_then(reference);
        }
        items
    }

    /// Page targeted by `/Dest` or a GoTo action's `/D`.
    fn destination_page(&self, item: &Dictionary) -> Option<u32> {
        let doc = self.doc;
        let dest = match dict_get(doc, item, b"Dest") {
            Some(dest) => dest,
            None => {
                let action = dict_get_dict(doc, item, b"A")?;
                if dict_get_name(doc, action, b"S").as_deref() != Some("GoTo") {
                    return None;
                }
                dict_get(doc, action, b"D")?
            }
        };
        self.resolve_destination(dest, 0)
    }

    fn resolve_destination(&self, dest: &Object, depth: usize) -> Option<u32> {
        let doc = self.doc;
        match resolve(doc, dest) {
            Object::Array(items) => match items.first()? {
                Object::Reference(page) => self.page_numbers.get(page).copied(),
                // Remote-style destinations use a 0-based page index.
                Object::Integer(index) => u32::try_from(*index).ok().map(|i| i + 1),
                _ => None,
            },
            Object::Dictionary(dict) if depth == 0 => {
                self.resolve_destination(dict.get(b"D").ok()?, depth + 1)
            }
            Object::Name(key) if depth == 0 => {
                let target = self.named.get(&String::from_utf8_lossy(key).to_string())?;
                self.resolve_destination(target, depth + 1)
            }
            Object::String(key, _) if depth == 0 => {
                let target = self.named.get(&decode_text_string(key))?;
                self.resolve_destination(target, depth + 1)
            }
            _ => None,
        }
    }
}

/// Files in the `/Names /EmbeddedFiles` name tree.
pub fn embedded_files(doc: &Document, catalog: &Dictionary) -> Vec<EmbeddedFileReport> {
    let Some(tree) = dict_get_dict(doc, catalog, b"Names")
        .and_then(|names| dict_get_dict(doc, names, b"EmbeddedFiles"))
    else {
        return Vec::new();
    };
    let mut entries = BTreeMap::new();
    collect_names(doc, tree, &mut entries, 0);

    entries
        .into_iter()
        .map(|(key, value)| {
            let Object::Dictionary(spec) = resolve(doc, &value) else {
                return EmbeddedFileReport {
                    name: key,
                    ..EmbeddedFileReport::default()
                };
            };
            let stream = dict_get_dict(doc, spec, b"EF").and_then(|ef| {
                match dict_get(doc, ef, b"UF").or_else(|| dict_get(doc, ef, b"F")) {
                    Some(Object::Stream(stream)) => Some(stream),
                    _ => None,
                }
            });
            let size = stream.and_then(|stream| {
                dict_get_dict(doc, &stream.dict, b"Params")
                    .and_then(|params| dict_get_number(doc, params, b"Size"))
                    .map(|size| size as i64)
                    .or(Some(stream.content.len() as i64))
            });
            EmbeddedFileReport {
                file_name: dict_string(doc, spec, b"UF").or_else(|| dict_string(doc, spec, b"F")),
                description: dict_string(doc, spec, b"Desc"),
                mime_type: stream.and_then(|stream| dict_get_name(doc, &stream.dict, b"Subtype")),
                size,
                af_relationship: dict_get_name(doc, spec, b"AFRelationship"),
                name: key,
            }
        })
        .collect()
}

/// The default optional content configuration followed by the alternates.
pub fn ocg_configurations(doc: &Document, catalog: &Dictionary) -> Vec<OcgConfigurationReport> {
    let Some(properties) = dict_get_dict(doc, catalog, b"OCProperties") else {
        return Vec::new();
    };
    let mut configurations = Vec::new();
    if let Some(default) = dict_get_dict(doc, properties, b"D") {
        configurations.push(configuration(doc, default, true));
    }
    if let Some(alternates) = dict_get_array(doc, properties, b"Configs") {
        for alternate in alternates {
            if let Object::Dictionary(config) = resolve(doc, alternate) {
                configurations.push(configuration(doc, config, false));
            }
        }
    }
    configurations
}

fn configuration(doc: &Document, config: &Dictionary, is_default: bool) -> OcgConfigurationReport {
    let group_names = |key: &[u8]| -> Vec<String> {
        dict_get_array(doc, config, key)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(|group| match resolve(doc, group) {
                        Object::Dictionary(ocg) => dict_string(doc, ocg, b"Name"),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    OcgConfigurationReport {
        is_default,
        name: dict_string(doc, config, b"Name"),
        creator: dict_string(doc, config, b"Creator"),
        base_state: dict_get(doc, config, b"BaseState").and_then(name),
        on: group_names(b"ON"),
        off: group_names(b"OFF"),
        order_size: dict_get_array(doc, config, b"Order").map_or(0, Vec::len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream, StringFormat};

    fn text(value: &str) -> Object {
        Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
    }

    #[test]
    fn test_outline_tree_and_named_destination() {
        let mut doc = Document::with_version("1.7");
        let page = doc.add_object(dictionary! { "Type" => "Page" });
        let root = doc.new_object_id();
        let first = doc.new_object_id();
        let second = doc.new_object_id();
        let child = doc.add_object(dictionary! {
            "Title" => text("Child"),
            "Parent" => first,
            "Dest" => vec![Object::Reference(page), Object::Name(b"Fit".to_vec())],
        });
        doc.objects.insert(first, Object::Dictionary(dictionary! {
            "Title" => text("First"),
            "Parent" => root,
            "Next" => second,
            "First" => child,
            "Last" => child,
            "Count" => 1,
            "SE" => Object::Reference((77, 0)),
        }));
        doc.objects.insert(second, Object::Dictionary(dictionary! {
            "Title" => text("Second"),
            "Parent" => root,
            "Prev" => first,
            // Loops back onto the first item.
            "Next" => first,
            "A" => dictionary! { "S" => "GoTo", "D" => text("chapter2") },
        }));
        doc.objects.insert(root, Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => first,
            "Last" => second,
        }));
        let catalog = dictionary! {
            "Outlines" => root,
            "Names" => dictionary! {
                "Dests" => dictionary! {
                    "Names" => vec![text("chapter2"), Object::Array(vec![Object::Reference(page), Object::Name(b"XYZ".to_vec())])],
                },
            },
        };
        let pages = BTreeMap::from([(page, 1)]);

        let items = outlines(&doc, &catalog, &pages);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First");
        assert!(items[0].open);
        assert!(items[0].has_structure_element);
        assert_eq!(items[0].page, None);
        assert_eq!(items[0].children[0].page, Some(1));
        assert_eq!(items[1].title, "Second");
        assert_eq!(items[1].page, Some(1));
    }

    #[test]
    fn test_embedded_files() {
        let mut doc = Document::with_version("1.7");
        let file = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "EmbeddedFile",
                "Subtype" => Object::Name(b"text/csv".to_vec()),
                "Params" => dictionary! { "Size" => 42 },
            },
            b"a,b".to_vec(),
        ));
        let spec = doc.add_object(dictionary! {
            "Type" => "Filespec",
            "F" => text("data.csv"),
            "Desc" => text("Source data"),
            "AFRelationship" => "Data",
            "EF" => dictionary! { "F" => file },
        });
        let catalog = dictionary! {
            "Names" => dictionary! {
                "EmbeddedFiles" => dictionary! { "Names" => vec![text("data"), Object::Reference(spec)] },
            },
        };
        let files = embedded_files(&doc, &catalog);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "data");
        assert_eq!(files[0].file_name.as_deref(), Some("data.csv"));
        assert_eq!(files[0].mime_type.as_deref(), Some("text/csv"));
        assert_eq!(files[0].size, Some(42));
        assert_eq!(files[0].af_relationship.as_deref(), Some("Data"));
    }

    #[test]
    fn test_ocg_configurations() {
        let mut doc = Document::with_version("1.7");
        let print = doc.add_object(dictionary! { "Type" => "OCG", "Name" => text("Print") });
        let screen = doc.add_object(dictionary! { "Type" => "OCG", "Name" => text("Screen") });
        let catalog = dictionary! {
            "OCProperties" => dictionary! {
                "OCGs" => vec![Object::Reference(print), Object::Reference(screen)],
                "D" => dictionary! {
                    "Name" => text("Default"),
                    "BaseState" => "ON",
                    "OFF" => vec![Object::Reference(print)],
                    "Order" => vec![Object::Reference(print), Object::Reference(screen)],
                },
                "Configs" => vec![Object::Dictionary(dictionary! {
                    "Name" => text("Print view"),
                    "ON" => vec![Object::Reference(print)],
                    "OFF" => vec![Object::Reference(screen)],
                })],
            },
        };
        let configs = ocg_configurations(&doc, &catalog);
        assert_eq!(configs.len(), 2);
        assert!(configs[0].is_default);
        assert_eq!(configs[0].base_state.as_deref(), Some("ON"));
        assert_eq!(configs[0].off, vec!["Print"]);
        assert_eq!(configs[0].order_size, 2);
        assert!(!configs[1].is_default);
        assert_eq!(configs[1].on, vec!["Print"]);
        assert_eq!(configs[1].off, vec!["Screen"]);
    }
}
