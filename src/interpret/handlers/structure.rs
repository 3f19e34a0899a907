//! Building the logical structure tree from the declared node tree.

use std::collections::BTreeMap;

use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

use crate::content::property_mcid;
use crate::error::Result;
use crate::instruction::{AttributeValue, InstructionSet, StructureInstruction, StructureNode};
use crate::interpret::tree::{append_kid, ensure_struct_tree_root, mark_tagged, new_element};
use crate::interpret::Handler;
use crate::pdf::objects::{collect_names, dict_get, real, rect_object};
use crate::pdf::text::text_string;
use crate::pdf::DocumentHandle;

pub struct StructureHandler;

impl Handler for StructureHandler {
    type Section = StructureInstruction;

    fn name(&self) -> &'static str {
        "structure"
    }

    fn section<'a>(&self, set: &'a InstructionSet) -> Option<&'a StructureInstruction> {
        set.structure.as_ref()
    }

    fn apply(
        &self,
        mut handle: DocumentHandle,
        structure: &StructureInstruction,
    ) -> Result<DocumentHandle> {
        if structure.strip_existing {
            strip_structure(&mut handle)?;
        }
        let root = ensure_struct_tree_root(&mut handle)?;
        let mut builder = TreeBuilder {
            handle: &mut handle,
            root,
            created: 0,
        };
        let element = builder.build(&structure.root, root)?;
        let created = builder.created;
        append_kid(&mut handle, root, Object::Reference(element))?;
        mark_tagged(&mut handle)?;
        log::info!("Built structure tree with {} element(s)", created);
        Ok(handle)
    }
}

/// Remove the structure tree, every StructParent(s) key and all MCID
/// marked-content brackets from page content.
pub fn strip_structure(handle: &mut DocumentHandle) -> Result<()> {
    handle.catalog_mut()?.remove(b"StructTreeRoot");
    handle.clear_structure_nodes();

    let pages: Vec<ObjectId> = handle.document().get_pages().into_values().collect();
    let mut removed = 0usize;
    for page_id in pages {
        let annots: Vec<ObjectId> = {
            let doc = handle.document();
            let page = doc.get_dictionary(page_id)?;
            match dict_get(doc, page, b"Annots") {
                Some(Object::Array(items)) => items
                    .iter()
                    .filter_map(|item| match item {
                        Object::Reference(id) => Some(*id),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            }
        };
        for annot in annots {
            if let Ok(dict) = handle.document_mut().get_dictionary_mut(annot) {
                dict.remove(b"StructParent");
            }
        }
        let page = handle.document_mut().get_dictionary_mut(page_id)?;
        page.remove(b"StructParents");
        if let Ok(Object::Array(items)) = page.get_mut(b"Annots") {
            for item in items.iter_mut() {
                if let Object::Dictionary(annot) = item {
                    annot.remove(b"StructParent");
                }
            }
        }

        let operations = handle.page_operations(page_id)?;
        let resources = handle.page_resources(page_id);
        let (kept, count) = unwrap_mcid_brackets(handle.document(), &resources, operations);
        if count > 0 {
            handle.set_page_operations(page_id, kept)?;
            removed += count;
        }
    }
    log::debug!("Stripped structure tree and {} MCID bracket(s)", removed);
    Ok(())
}

/// Drop `BDC … EMC` pairs that carry an MCID, keeping their contents.
fn unwrap_mcid_brackets(
    doc: &Document,
    resources: &Dictionary,
    operations: Vec<Operation>,
) -> (Vec<Operation>, usize) {
    let mut open: Vec<bool> = Vec::new();
    let mut kept = Vec::with_capacity(operations.len());
    let mut removed = 0;
    for op in operations {
        match op.operator.as_str() {
            "BDC" => {
                let tagged = op
                    .operands
                    .get(1)
                    .and_then(|props| property_mcid(doc, resources, props))
                    .is_some();
                open.push(tagged);
                if tagged {
                    removed += 1;
                    continue;
                }
            }
            "BMC" => open.push(false),
            "EMC" => {
                if open.pop() == Some(true) {
                    continue;
                }
            }
            _ => {}
        }
        kept.push(op);
    }
    (kept, removed)
}

struct TreeBuilder<'h> {
    handle: &'h mut DocumentHandle,
    root: ObjectId,
    created: usize,
}

impl TreeBuilder<'_> {
    fn build(&mut self, node: &StructureNode, parent: ObjectId) -> Result<ObjectId> {
        let mut element = new_element(&node.role, parent);
        if let Some(language) = &node.language {
            element.set("Lang", text_string(language));
        }
        if let Some(alt) = &node.alt_text {
            element.set("Alt", text_string(alt));
        }
        if let Some(actual) = &node.actual_text {
            element.set("ActualText", text_string(actual));
        }
        if let Some(element_id) = &node.element_id {
            element.set(
                "ID",
                Object::String(element_id.as_bytes().to_vec(), StringFormat::Literal),
            );
        }
        let mut attributes = attribute_dictionaries(node);
        match attributes.len() {
            0 => {}
            1 => element.set("A", Object::Dictionary(attributes.remove(0))),
            _ => element.set(
                "A",
                Object::Array(attributes.into_iter().map(Object::Dictionary).collect()),
            ),
        }

        let id = self.handle.document_mut().add_object(element);
        self.created += 1;
        if let Some(element_id) = &node.element_id {
            self.register_element_id(element_id, id)?;
        }
        if let Some(node_id) = &node.id {
            self.handle.register_structure_node(node_id.clone(), id);
        }
        for child in &node.children {
            let child_id = self.build(child, id)?;
            append_kid(self.handle, id, Object::Reference(child_id))?;
        }
        Ok(id)
    }

    /// Add an element to the root's `/IDTree`, keeping `/Names` sorted.
    fn register_element_id(&mut self, element_id: &str, element: ObjectId) -> Result<()> {
        let tree = self.handle.ensure_indirect_dict(self.root, b"IDTree")?;
        let mut entries = {
            let doc = self.handle.document();
            let mut entries = BTreeMap::new();
            collect_names(doc, doc.get_dictionary(tree)?, &mut entries, 0);
            entries
        };
        entries.insert(element_id.to_string(), Object::Reference(element));

        let mut names = Vec::with_capacity(entries.len() * 2);
        for (key, value) in entries {
            names.push(Object::String(key.into_bytes(), StringFormat::Literal));
            names.push(value);
        }
        let dict = self.handle.document_mut().get_dictionary_mut(tree)?;
        dict.remove(b"Kids");
        dict.remove(b"Limits");
        dict.set("Names", Object::Array(names));
        Ok(())
    }
}

/// Attribute dictionaries of a node, one per owner.
fn attribute_dictionaries(node: &StructureNode) -> Vec<Dictionary> {
    let mut owners: BTreeMap<String, Dictionary> = BTreeMap::new();

    if let Some(scope) = &node.scope {
        if node.role == "TH" {
            owner(&mut owners, "Table").set("Scope", Object::Name(scope.as_bytes().to_vec()));
        } else {
            log::debug!("Ignoring scope {} on {} element", scope, node.role);
        }
    }
    if let Some(colspan) = node.colspan {
        owner(&mut owners, "Table").set("ColSpan", Object::Integer(colspan));
    }
    if let Some(rowspan) = node.rowspan {
        owner(&mut owners, "Table").set("RowSpan", Object::Integer(rowspan));
    }
    if let Some(bbox) = &node.bbox {
        owner(&mut owners, "Layout").set("BBox", rect_object(bbox));
    }
    for attribute in &node.attributes {
        owner(&mut owners, &attribute.owner)
            .set(attribute.key.as_str(), attribute_value(&attribute.value));
    }
    owners.into_values().collect()
}

fn owner<'a>(owners: &'a mut BTreeMap<String, Dictionary>, name: &str) -> &'a mut Dictionary {
    owners.entry(name.to_string()).or_insert_with(|| {
        let mut dict = Dictionary::new();
        dict.set("O", Object::Name(name.as_bytes().to_vec()));
        dict
    })
}

fn attribute_value(value: &AttributeValue) -> Object {
    match value {
        AttributeValue::Bool(b) => Object::Boolean(*b),
        AttributeValue::Integer(i) => Object::Integer(*i),
        AttributeValue::Number(n) => real(*n),
        AttributeValue::Text(text) => match text.strip_prefix('/') {
            Some(name) => Object::Name(name.as_bytes().to_vec()),
            None => text_string(text),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::instruction::StructureAttribute;
    use crate::interpret::handlers::testing::{document, entry, operators};
    use crate::interpret::tree::struct_tree_root;

    fn section(root: StructureNode, strip: bool) -> StructureInstruction {
        StructureInstruction {
            strip_existing: strip,
            root,
        }
    }

    fn table() -> StructureNode {
        let mut header = StructureNode::new("TH").with_id("h1");
        header.scope = Some("Column".to_string());
        header.colspan = Some(2);
        let mut cell = StructureNode::new("TD").with_id("c1");
        cell.scope = Some("Row".to_string());
        cell.rowspan = Some(3);
        StructureNode::new("Document").with_id("doc").with_child(
            StructureNode::new("Table").with_child(
                StructureNode::new("TR")
                    .with_child(header)
                    .with_child(cell),
            ),
        )
    }

    fn attributes_of(handle: &DocumentHandle, id: ObjectId) -> Dictionary {
        entry(handle, id, b"A").as_dict().unwrap().clone()
    }

    #[test]
    fn test_builds_tree_and_registers_ids() {
        let handle = StructureHandler
            .apply(document(&[""]), &section(table(), false))
            .unwrap();
        let root = struct_tree_root(&handle).unwrap();
        let Object::Array(kids) = entry(&handle, root, b"K") else {
            panic!("root K is not an array");
        };
        let doc_id = handle.structure_node("doc").unwrap();
        assert!(matches!(kids.as_slice(), [Object::Reference(id)] if *id == doc_id));
        assert!(matches!(entry(&handle, doc_id, b"P"), Object::Dictionary(_)));

        let header = handle.structure_node("h1").unwrap();
        let attributes = attributes_of(&handle, header);
        assert!(matches!(attributes.get(b"O"), Ok(Object::Name(n)) if n == b"Table"));
        assert!(matches!(attributes.get(b"Scope"), Ok(Object::Name(n)) if n == b"Column"));
        assert!(matches!(attributes.get(b"ColSpan"), Ok(Object::Integer(2))));

        let cell = handle.structure_node("c1").unwrap();
        let attributes = attributes_of(&handle, cell);
        assert!(!attributes.has(b"Scope"));
        assert!(matches!(attributes.get(b"RowSpan"), Ok(Object::Integer(3))));

        let catalog = handle.catalog_id().unwrap();
        assert!(matches!(
            entry(&handle, catalog, b"MarkInfo").as_dict().unwrap().get(b"Marked"),
            Ok(Object::Boolean(true))
        ));
    }

    #[test]
    fn test_element_properties_and_attributes() {
        let mut figure = StructureNode::new("Figure").with_id("fig");
        figure.alt_text = Some("Chart".to_string());
        figure.language = Some("de".to_string());
        figure.element_id = Some("F-1".to_string());
        figure.bbox = Some(BoundingBox::new(10.0, 20.0, 100.0, 50.0));
        figure.attributes = vec![
            StructureAttribute {
                owner: "Layout".to_string(),
                key: "Placement".to_string(),
                value: AttributeValue::Text("/Block".to_string()),
            },
            StructureAttribute {
                owner: "List".to_string(),
                key: "ListNumbering".to_string(),
                value: AttributeValue::Text("/Decimal".to_string()),
            },
        ];
        let handle = StructureHandler
            .apply(document(&[""]), &section(figure, false))
            .unwrap();
        let fig = handle.structure_node("fig").unwrap();
        assert!(matches!(entry(&handle, fig, b"Alt"), Object::String(s, _) if s == b"Chart"));
        assert!(matches!(entry(&handle, fig, b"Lang"), Object::String(s, _) if s == b"de"));

        let Object::Array(attributes) = entry(&handle, fig, b"A") else {
            panic!("expected two attribute owners");
        };
        let layout = attributes[0].as_dict().unwrap();
        assert!(matches!(layout.get(b"Placement"), Ok(Object::Name(n)) if n == b"Block"));
        assert!(matches!(layout.get(b"BBox"), Ok(Object::Array(r)) if r.len() == 4));

        let root = struct_tree_root(&handle).unwrap();
        let id_tree = entry(&handle, root, b"IDTree").as_dict().unwrap();
        let Ok(Object::Array(names)) = id_tree.get(b"Names") else {
            panic!("IDTree has no Names");
        };
        assert!(matches!(&names[1], Object::Reference(id) if *id == fig));
    }

    #[test]
    fn test_appends_to_existing_root() {
        let handle = StructureHandler
            .apply(document(&[""]), &section(StructureNode::new("Document"), false))
            .unwrap();
        let handle = StructureHandler
            .apply(handle, &section(StructureNode::new("Document"), false))
            .unwrap();
        let root = struct_tree_root(&handle).unwrap();
        assert!(matches!(entry(&handle, root, b"K"), Object::Array(kids) if kids.len() == 2));
    }

    #[test]
    fn test_strip_removes_mcid_brackets() {
        let handle = document(&[
            "/P <</MCID 0>> BDC BT /F1 12 Tf (a) Tj ET EMC /Artifact BMC 0 0 5 5 re f EMC",
        ]);
        let handle = StructureHandler
            .apply(handle, &section(StructureNode::new("Document"), false))
            .unwrap();
        let page = handle.page_id(1).unwrap();
        let old_root = struct_tree_root(&handle).unwrap();

        let handle = StructureHandler
            .apply(handle, &section(StructureNode::new("Document"), true))
            .unwrap();
        assert_ne!(struct_tree_root(&handle), Some(old_root));
        assert_eq!(
            operators(&handle, page),
            vec!["BT", "Tf", "Tj", "ET", "BMC", "re", "f", "EMC"]
        );
        let root = struct_tree_root(&handle).unwrap();
        assert!(matches!(entry(&handle, root, b"K"), Object::Array(kids) if kids.len() == 1));
    }
}
