//! Per-page facts: geometry, content operators, annotations and MCIDs.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::{Document, Object, ObjectId};

use super::report::{AnnotationReport, OperatorReport, PageReport};
use crate::content::{scan_page, PageScan};
use crate::error::Result;
use crate::pdf::objects::{
    dict_get, dict_get_name, dict_get_number, number, object_label, rect, reference, resolve,
};
use crate::pdf::text::dict_string;
use crate::pdf::{inherited, DocumentHandle};

/// A page report together with its scan, kept for colour analysis.
pub struct InspectedPage {
    pub report: PageReport,
    pub scan: PageScan,
}

/// Inspect one page. `parent_tree` is the flattened ParentTree.
pub fn inspect_page(
    handle: &DocumentHandle,
    page_number: u32,
    page_id: ObjectId,
    parent_tree: &BTreeMap<i64, Object>,
    include_operators: bool,
) -> Result<InspectedPage> {
    let doc = handle.document();
    let page = doc.get_dictionary(page_id)?;
    let page_box = handle.page_box(page_id);
    let scan = match scan_page(handle, page_id) {
        Ok((_, scan)) => scan,
        Err(e) => {
            log::warn!("Page {}: content stream unreadable: {}", page_number, e);
            PageScan::default()
        }
    };

    let struct_parents = dict_get_number(doc, page, b"StructParents").map(|k| k as i64);
    let structured_mcids = struct_parents
        .and_then(|key| parent_tree.get(&key))
        .map(|entry| match resolve(doc, entry) {
            Object::Array(parents) => parents
                .iter()
                .enumerate()
                .filter(|(_, parent)| !matches!(resolve(doc, parent), Object::Null))
                .map(|(mcid, _)| mcid as i64)
                .collect(),
            _ => Vec::new(),
        })
        .unwrap_or_default();

    let fonts_used: BTreeSet<String> = scan.operators.iter().filter_map(|op| op.font.clone()).collect();
    let content_operators = if include_operators {
        scan.operators
            .iter()
            .map(|op| OperatorReport {
                index: op.index,
                operator: op.operator.clone(),
                kind: op.kind,
                bbox: op.bbox,
                artifact: op.artifact,
                marked_content: op.marked,
                mcid: op.mcid,
                text: op.text.clone(),
                font: op.font.clone(),
                unicode_mapped: op.unicode_mapped,
                invisible: op.is_invisible(),
                fill_color: op.fill_color.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let report = PageReport {
        number: page_number,
        object_id: object_label(page_id),
        width: page_box.width,
        height: page_box.height,
        rotation: inherited(doc, page_id, b"Rotate")
            .and_then(|r| number(resolve(doc, r)))
            .map_or(0, |r| r as i64),
        tab_order: dict_get_name(doc, page, b"Tabs"),
        struct_parents,
        content_operators,
        annotations: annotations(doc, page_id),
        fonts_used: fonts_used.into_iter().collect(),
        mcids: scan.mcids.iter().copied().collect(),
        structured_mcids,
    };
    Ok(InspectedPage { report, scan })
}

/// Character codes shown with each font object on a page.
pub fn used_codes(
    inspected: &InspectedPage,
    font_ids: &BTreeMap<String, ObjectId>,
    out: &mut BTreeMap<ObjectId, BTreeSet<u32>>,
) {
    for op in &inspected.scan.operators {
        let Some(id) = op.font.as_ref().and_then(|name| font_ids.get(name)) else {
            continue;
        };
        out.entry(*id).or_default().extend(op.codes.iter().copied());
    }
}

fn annotations(doc: &Document, page_id: ObjectId) -> Vec<AnnotationReport> {
    let Some(Object::Array(annots)) = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| dict_get(doc, page, b"Annots"))
    else {
        return Vec::new();
    };
    annots
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let Object::Dictionary(annot) = resolve(doc, item) else {
                return None;
            };
            // Widgets merged with their field inherit the field entries.
            let field = match dict_get(doc, annot, b"Parent") {
                Some(Object::Dictionary(parent)) if !annot.has(b"T") => parent,
                _ => annot,
            };
            Some(AnnotationReport {
                index,
                object_id: reference(item).map(object_label),
                subtype: dict_get_name(doc, annot, b"Subtype"),
                rect: annot.get(b"Rect").ok().and_then(|r| rect(doc, r)),
                contents: dict_string(doc, annot, b"Contents"),
                struct_parent: dict_get_number(doc, annot, b"StructParent").map(|k| k as i64),
                field_type: dict_get_name(doc, field, b"FT"),
                field_name: dict_string(doc, field, b"T"),
                tooltip: dict_string(doc, field, b"TU"),
                flags: dict_get_number(doc, annot, b"F").map(|f| f as i64),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpret::handlers::testing::document;
    use lopdf::{dictionary, StringFormat};

    #[test]
    fn test_page_operators_and_annotations() {
        let mut handle = document(&["/P <</MCID 0>> BDC BT /F1 12 Tf 72 700 Td (Hello) Tj ET EMC \
                                     0 0 10 10 re f"]);
        let page_id = handle.page_id(1).unwrap();
        let doc = handle.document_mut();
        let parent = doc.add_object(dictionary! {
            "FT" => "Tx",
            "T" => Object::String(b"email".to_vec(), StringFormat::Literal),
        });
        let widget = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "Rect" => vec![Object::Integer(10), Object::Integer(10), Object::Integer(110), Object::Integer(30)],
            "Parent" => parent,
            "StructParent" => 1,
            "F" => 4,
        });
        let paragraph = doc.add_object(dictionary! { "Type" => "StructElem", "S" => "P" });
        let page = doc.get_dictionary_mut(page_id).unwrap();
        page.set("Annots", vec![Object::Reference(widget)]);
        page.set("StructParents", Object::Integer(0));
        page.set("Tabs", Object::Name(b"S".to_vec()));

        let parent_tree = BTreeMap::from([(0, Object::Array(vec![Object::Reference(paragraph)]))]);
        let inspected = inspect_page(&handle, 1, page_id, &parent_tree, true).unwrap();
        let report = &inspected.report;

        assert_eq!(report.width, 612.0);
        assert_eq!(report.tab_order.as_deref(), Some("S"));
        assert_eq!(report.mcids, vec![0]);
        assert_eq!(report.structured_mcids, vec![0]);
        assert_eq!(report.fonts_used, vec!["F1"]);
        assert_eq!(report.content_operators.len(), 2);
        let tj = &report.content_operators[0];
        assert_eq!(tj.mcid, Some(0));
        assert_eq!(tj.text.as_deref(), Some("Hello"));
        assert!(!tj.invisible);

        let annotation = &report.annotations[0];
        assert_eq!(annotation.subtype.as_deref(), Some("Widget"));
        assert_eq!(annotation.field_type.as_deref(), Some("Tx"));
        assert_eq!(annotation.field_name.as_deref(), Some("email"));
        assert_eq!(annotation.struct_parent, Some(1));
        assert_eq!(annotation.rect.unwrap().width, 100.0);
    }

    #[test]
    fn test_operators_omitted_on_request() {
        let handle = document(&["BT /F1 12 Tf (x) Tj ET"]);
        let page_id = handle.page_id(1).unwrap();
        let inspected = inspect_page(&handle, 1, page_id, &BTreeMap::new(), false).unwrap();
        assert!(inspected.report.content_operators.is_empty());
        assert_eq!(inspected.scan.operators.len(), 1);

        let mut used = BTreeMap::new();
        let font_ids = BTreeMap::from([("F1".to_string(), (99, 0))]);
        used_codes(&inspected, &font_ids, &mut used);
        assert_eq!(used[&(99, 0)], BTreeSet::from([u32::from(b'x')]));
    }
}
