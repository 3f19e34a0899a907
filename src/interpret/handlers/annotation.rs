//! Annotation remediation: descriptions, field tooltips, structure
//! association and new form widgets.

use lopdf::{dictionary, Dictionary, Object, ObjectId, StringFormat};

use super::declared_page;
use crate::error::{Error, Result};
use crate::geometry::BboxResolver;
use crate::instruction::{AnnotationOpKind, AnnotationOperation, InstructionSet};
use crate::interpret::tree::{
    allocate_struct_parent, append_kid, ensure_struct_tree_root, mark_tagged, new_element,
    set_parent_tree_entry,
};
use crate::interpret::{Handler, InterpretOptions};
use crate::pdf::objects::{dict_get_array, dict_get_name, rect_object, reference};
use crate::pdf::text::text_string;
use crate::pdf::DocumentHandle;

/// Default appearance of created widgets.
const DEFAULT_APPEARANCE: &str = "/Helv 0 Tf 0 g";

/// Print flag.
const FLAG_PRINT: i64 = 4;

pub struct AnnotationHandler {
    resolver: BboxResolver,
}

impl AnnotationHandler {
    pub fn new(options: &InterpretOptions) -> Self {
        Self {
            resolver: BboxResolver::new(options.resolver),
        }
    }

    fn apply_one(&self, handle: &mut DocumentHandle, op: &AnnotationOperation) -> Result<()> {
        let (page, page_id) = declared_page(handle, op.page)?;
        let Some(kind) = op.kind() else {
            log::warn!("Skipping unknown annotation operation '{}'", op.op);
            return Ok(());
        };
        match kind {
            AnnotationOpKind::SetContents => {
                let annot = annotation_id(handle, page, page_id, op.index)?;
                let value = op.value.as_deref().unwrap_or_default();
                handle
                    .document_mut()
                    .get_dictionary_mut(annot)?
                    .set("Contents", text_string(value));
            }
            AnnotationOpKind::SetTu => {
                let annot = annotation_id(handle, page, page_id, op.index)?;
                let field = field_of(handle, annot)?;
                let value = op.value.as_deref().unwrap_or_default();
                handle
                    .document_mut()
                    .get_dictionary_mut(field)?
                    .set("TU", text_string(value));
            }
            AnnotationOpKind::Associate => {
                let annot = annotation_id(handle, page, page_id, op.index)?;
                associate(handle, annot, page_id, op.node.as_deref())?;
            }
            AnnotationOpKind::CreateWidget => {
                let annot = self.create_widget(handle, page_id, op)?;
                if op.node.is_some() {
                    associate(handle, annot, page_id, op.node.as_deref())?;
                }
            }
        }
        log::debug!("Applied {} on page {}", op.op, page);
        Ok(())
    }

    fn create_widget(
        &self,
        handle: &mut DocumentHandle,
        page_id: ObjectId,
        op: &AnnotationOperation,
    ) -> Result<ObjectId> {
        let declared = op
            .rect
            .ok_or_else(|| Error::MissingObject("widget rectangle".to_string()))?;
        let rect = self
            .resolver
            .to_user_space(&declared, &handle.page_box(page_id));
        let field_type = op.field_type.as_deref().unwrap_or("Tx");
        let field_name = op.field_name.as_deref().unwrap_or_default();

        let mut widget = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "Rect" => rect_object(&rect),
            "FT" => Object::Name(field_type.as_bytes().to_vec()),
            "T" => text_string(field_name),
            "F" => FLAG_PRINT,
            "P" => page_id,
            "DA" => Object::String(DEFAULT_APPEARANCE.as_bytes().to_vec(), StringFormat::Literal),
        };
        if let Some(tooltip) = &op.tooltip {
            widget.set("TU", text_string(tooltip));
        }
        let widget = handle.document_mut().add_object(widget);
        handle
            .array_entry_mut(page_id, b"Annots")?
            .push(Object::Reference(widget));

        let form = acro_form(handle)?;
        handle
            .array_entry_mut(form, b"Fields")?
            .push(Object::Reference(widget));
        log::debug!("Created {} widget '{}' as {:?}", field_type, field_name, widget);
        Ok(widget)
    }
}

impl Handler for AnnotationHandler {
    type Section = [AnnotationOperation];

    fn name(&self) -> &'static str {
        "annotations"
    }

    fn section<'a>(&self, set: &'a InstructionSet) -> Option<&'a [AnnotationOperation]> {
        (!set.annotations.is_empty()).then_some(set.annotations.as_slice())
    }

    fn apply(
        &self,
        mut handle: DocumentHandle,
        operations: &[AnnotationOperation],
    ) -> Result<DocumentHandle> {
        for op in operations {
            self.apply_one(&mut handle, op)?;
        }
        log::info!("Applied {} annotation operation(s)", operations.len());
        Ok(handle)
    }
}

/// Object id of the `index`-th entry of a page's `/Annots`; direct
/// annotation dictionaries are moved into objects of their own.
fn annotation_id(
    handle: &mut DocumentHandle,
    page: u32,
    page_id: ObjectId,
    index: Option<i64>,
) -> Result<ObjectId> {
    let index = index.and_then(|i| usize::try_from(i).ok()).unwrap_or(0);
    let not_found = || Error::AnnotationNotFound { page, index };
    let item = {
        let doc = handle.document();
        let page_dict = doc.get_dictionary(page_id)?;
        dict_get_array(doc, page_dict, b"Annots")
            .and_then(|items| items.get(index))
            .cloned()
            .ok_or_else(not_found)?
    };
    match item {
        Object::Reference(id) if handle.document().get_dictionary(id).is_ok() => Ok(id),
        Object::Dictionary(dict) => {
            let id = handle.document_mut().add_object(dict);
            handle.array_entry_mut(page_id, b"Annots")?[index] = Object::Reference(id);
            Ok(id)
        }
        _ => Err(not_found()),
    }
}

/// The field dictionary a widget belongs to: its parent when the widget is
/// a bare kid without a name of its own.
fn field_of(handle: &DocumentHandle, annot: ObjectId) -> Result<ObjectId> {
    let dict = handle.document().get_dictionary(annot)?;
    let parent = dict.get(b"Parent").ok().and_then(reference);
    match parent {
        Some(parent) if !dict.has(b"T") => Ok(parent),
        _ => Ok(annot),
    }
}

/// Link an annotation into the structure tree through an object reference.
fn associate(
    handle: &mut DocumentHandle,
    annot: ObjectId,
    page_id: ObjectId,
    node: Option<&str>,
) -> Result<()> {
    let root = ensure_struct_tree_root(handle)?;
    mark_tagged(handle)?;
    let element = match node {
        Some(node) => handle.structure_node(node)?,
        None => {
            let subtype = {
                let doc = handle.document();
                dict_get_name(doc, doc.get_dictionary(annot)?, b"Subtype").unwrap_or_default()
            };
            let role = match subtype.as_str() {
                "Link" => "Link",
                "Widget" => "Form",
                _ => "Annot",
            };
            let parent = document_element(handle, root);
            let element = handle.document_mut().add_object(new_element(role, parent));
            append_kid(handle, parent, Object::Reference(element))?;
            element
        }
    };

    let existing = match handle.document().get_dictionary(annot)?.get(b"StructParent") {
        Ok(Object::Integer(key)) => Some(*key),
        _ => None,
    };
    let key = match existing {
        Some(key) => key,
        None => allocate_struct_parent(handle, root)?,
    };
    handle
        .document_mut()
        .get_dictionary_mut(annot)?
        .set("StructParent", Object::Integer(key));
    set_parent_tree_entry(handle, root, key, Object::Reference(element))?;

    let mut object_reference = Dictionary::new();
    object_reference.set("Type", Object::Name(b"OBJR".to_vec()));
    object_reference.set("Obj", Object::Reference(annot));
    object_reference.set("Pg", Object::Reference(page_id));
    append_kid(handle, element, Object::Dictionary(object_reference))?;
    log::debug!("Associated annotation {:?} with element {:?}", annot, element);
    Ok(())
}

/// First element kid of the root, or the root itself.
fn document_element(handle: &DocumentHandle, root: ObjectId) -> ObjectId {
    let doc = handle.document();
    let first = doc
        .get_dictionary(root)
        .ok()
        .and_then(|dict| match dict.get(b"K") {
            Ok(Object::Array(kids)) => kids.iter().find_map(reference),
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        });
    first
        .filter(|id| doc.get_dictionary(*id).is_ok())
        .unwrap_or(root)
}

/// The catalog's AcroForm, created with default appearance resources.
fn acro_form(handle: &mut DocumentHandle) -> Result<ObjectId> {
    let catalog = handle.catalog_id()?;
    let form = handle.ensure_indirect_dict(catalog, b"AcroForm")?;
    let dict = handle.document_mut().get_dictionary_mut(form)?;
    if !dict.has(b"Fields") {
        dict.set("Fields", Object::Array(Vec::new()));
    }
    if !dict.has(b"DA") {
        dict.set(
            "DA",
            Object::String(DEFAULT_APPEARANCE.as_bytes().to_vec(), StringFormat::Literal),
        );
    }
    if !dict.has(b"DR") {
        dict.set(
            "DR",
            dictionary! {
                "Font" => dictionary! {
                    "Helv" => dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => "Helvetica",
                        "Encoding" => "WinAnsiEncoding",
                    },
                },
            },
        );
    }
    Ok(form)
}
