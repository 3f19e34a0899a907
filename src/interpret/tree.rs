//! Structure tree plumbing shared by the handlers: the root, the parent
//! tree, and kid lists.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};
use crate::pdf::objects::{dict_get, number, reference, resolve};
use crate::pdf::DocumentHandle;

/// Number-tree nesting beyond this depth is ignored while flattening.
const MAX_TREE_DEPTH: usize = 32;

/// Highest MCID a page may be given a parent for.
pub const MAX_MCID: i64 = 1 << 20;

/// The existing StructTreeRoot, if any.
pub fn struct_tree_root(handle: &DocumentHandle) -> Option<ObjectId> {
    let catalog = handle.catalog().ok()?;
    catalog.get(b"StructTreeRoot").ok().and_then(reference)
}

/// The StructTreeRoot, created (with an empty parent tree) if absent.
pub fn ensure_struct_tree_root(handle: &mut DocumentHandle) -> Result<ObjectId> {
    let catalog = handle.catalog_id()?;
    let existed = handle.catalog()?.has(b"StructTreeRoot");
    let root = handle.ensure_indirect_dict(catalog, b"StructTreeRoot")?;
    if !existed {
        log::debug!("Creating StructTreeRoot {:?}", root);
    }
    let dict = handle.document_mut().get_dictionary_mut(root)?;
    dict.set("Type", Object::Name(b"StructTreeRoot".to_vec()));
    if !dict.has(b"K") {
        dict.set("K", Object::Array(Vec::new()));
    }
    parent_tree(handle, root)?;
    Ok(root)
}

/// Set `/MarkInfo /Marked true` on the catalog.
pub fn mark_tagged(handle: &mut DocumentHandle) -> Result<()> {
    set_mark_info(handle, true)
}

/// Set `/MarkInfo /Marked` on the catalog, keeping other MarkInfo entries.
pub fn set_mark_info(handle: &mut DocumentHandle, marked: bool) -> Result<()> {
    let catalog = handle.catalog_id()?;
    let mark_info = handle.ensure_indirect_dict(catalog, b"MarkInfo")?;
    handle
        .document_mut()
        .get_dictionary_mut(mark_info)?
        .set("Marked", Object::Boolean(marked));
    Ok(())
}

/// The ParentTree of a root, made indirect and flattened into one `/Nums`.
pub fn parent_tree(handle: &mut DocumentHandle, root: ObjectId) -> Result<ObjectId> {
    let tree = handle.ensure_indirect_dict(root, b"ParentTree")?;
    let (has_kids, nums) = {
        let doc = handle.document();
        let dict = doc.get_dictionary(tree)?;
        let mut nums = Vec::new();
        collect_nums(doc, dict, &mut nums, 0);
        (dict.has(b"Kids"), nums)
    };
    let dict = handle.document_mut().get_dictionary_mut(tree)?;
    if has_kids || !dict.has(b"Nums") {
        let mut flat = Vec::new();
        for (key, value) in nums {
            nums_insert(&mut flat, key, value);
        }
        dict.remove(b"Kids");
        dict.remove(b"Limits");
        dict.set("Nums", Object::Array(flat));
    }
    Ok(tree)
}

/// Key/value pairs of a number tree, leaves in order.
pub fn collect_nums(
    doc: &Document,
    node: &Dictionary,
    out: &mut Vec<(i64, Object)>,
    depth: usize,
) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    if let Some(Object::Array(nums)) = dict_get(doc, node, b"Nums") {
        for pair in nums.chunks(2) {
            if let [key, value] = pair {
                if let Some(key) = number(resolve(doc, key)) {
                    out.push((key as i64, value.clone()));
                }
            }
        }
    }
    if let Some(Object::Array(kids)) = dict_get(doc, node, b"Kids") {
        for kid in kids {
            if let Object::Dictionary(child) = resolve(doc, kid) {
                collect_nums(doc, child, out, depth + 1);
            }
        }
    }
}

/// Insert or replace `key` in a flat, key-sorted `/Nums` array.
pub fn nums_insert(nums: &mut Vec<Object>, key: i64, value: Object) {
    let mut position = nums.len();
    let mut replace = None;
    for (i, pair) in nums.chunks(2).enumerate() {
        let existing = match pair.first() {
            Some(Object::Integer(k)) => *k,
            _ => continue,
        };
        if existing == key {
            replace = Some(i * 2 + 1);
            break;
        }
        if existing > key {
            position = i * 2;
            break;
        }
    }
    if let Some(slot) = replace.filter(|slot| *slot < nums.len()) {
        nums[slot] = value;
        return;
    }
    nums.insert(position, value);
    nums.insert(position, Object::Integer(key));
}

fn nums_get(nums: &[Object], key: i64) -> Option<&Object> {
    nums.chunks(2).find_map(|pair| match pair {
        [Object::Integer(k), value] if *k == key => Some(value),
        _ => None,
    })
}

/// Reserve the next parent-tree key.
pub fn allocate_struct_parent(handle: &mut DocumentHandle, root: ObjectId) -> Result<i64> {
    let tree = parent_tree(handle, root)?;
    let doc = handle.document();
    let declared = doc
        .get_dictionary(root)?
        .get(b"ParentTreeNextKey")
        .ok()
        .and_then(number)
        .map(|k| k as i64);
    let max_used = match doc.get_dictionary(tree)?.get(b"Nums") {
        Ok(Object::Array(nums)) => nums
            .chunks(2)
            .filter_map(|pair| match pair.first() {
                Some(Object::Integer(k)) => Some(*k + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0),
        _ => 0,
    };
    // Page StructParents / annotation StructParent keys may be set without
    // a parent-tree entry yet.
    let max_assigned = assigned_struct_parents(doc).map_or(0, |k| k + 1);
    let key = declared.unwrap_or(0).max(max_used).max(max_assigned);
    handle
        .document_mut()
        .get_dictionary_mut(root)?
        .set("ParentTreeNextKey", Object::Integer(key + 1));
    Ok(key)
}

fn assigned_struct_parents(doc: &Document) -> Option<i64> {
    let mut max: Option<i64> = None;
    for page_id in doc.get_pages().values() {
        let Ok(page) = doc.get_dictionary(*page_id) else {
            continue;
        };
        if let Ok(Object::Integer(k)) = page.get(b"StructParents") {
            max = max.max(Some(*k));
        }
        if let Some(Object::Array(annots)) = dict_get(doc, page, b"Annots") {
            for annot in annots {
                if let Object::Dictionary(annot) = resolve(doc, annot) {
                    if let Ok(Object::Integer(k)) = annot.get(b"StructParent") {
                        max = max.max(Some(*k));
                    }
                }
            }
        }
    }
    max
}

/// The page's `/StructParents` key, assigned if absent.
pub fn page_struct_parents(
    handle: &mut DocumentHandle,
    root: ObjectId,
    page_id: ObjectId,
) -> Result<i64> {
    let page = handle.document().get_dictionary(page_id)?;
    if let Ok(Object::Integer(key)) = page.get(b"StructParents") {
        return Ok(*key);
    }
    let key = allocate_struct_parent(handle, root)?;
    handle
        .document_mut()
        .get_dictionary_mut(page_id)?
        .set("StructParents", Object::Integer(key));
    Ok(key)
}

/// Record `element` as the parent of `mcid` under a page's parent-tree key.
pub fn set_parent_tree_mcid(
    handle: &mut DocumentHandle,
    root: ObjectId,
    key: i64,
    mcid: i64,
    element: ObjectId,
) -> Result<()> {
    let slot = checked_mcid(mcid)? as usize;
    let tree = parent_tree(handle, root)?;
    let existing = match handle.document().get_dictionary(tree)?.get(b"Nums") {
        Ok(Object::Array(nums)) => nums_get(nums, key).cloned(),
        _ => None,
    };

    let reusable = match &existing {
        Some(Object::Reference(id)) => {
            matches!(handle.document().get_object(*id), Ok(Object::Array(_))).then_some(*id)
        }
        _ => None,
    };
    let array_id = match (reusable, existing) {
        (Some(id), _) => id,
        (None, Some(Object::Array(items))) => {
            handle.document_mut().add_object(Object::Array(items))
        }
        _ => handle.document_mut().add_object(Object::Array(Vec::new())),
    };

    if let Ok(Object::Array(items)) = handle.document_mut().get_object_mut(array_id) {
        if items.len() <= slot {
            items.resize(slot + 1, Object::Null);
        }
        items[slot] = Object::Reference(element);
    }
    set_parent_tree_entry(handle, root, key, Object::Reference(array_id))
}

/// `mcid` if it lies in `0..=MAX_MCID`.
pub fn checked_mcid(mcid: i64) -> Result<i64> {
    if (0..=MAX_MCID).contains(&mcid) {
        Ok(mcid)
    } else {
        Err(Error::Structure(format!(
            "MCID {} is outside 0..={}",
            mcid, MAX_MCID
        )))
    }
}

/// Set a parent-tree entry.
pub fn set_parent_tree_entry(
    handle: &mut DocumentHandle,
    root: ObjectId,
    key: i64,
    value: Object,
) -> Result<()> {
    let tree = parent_tree(handle, root)?;
    let dict = handle.document_mut().get_dictionary_mut(tree)?;
    match dict.get_mut(b"Nums") {
        Ok(Object::Array(nums)) => nums_insert(nums, key, value),
        _ => {
            let mut nums = Vec::new();
            nums_insert(&mut nums, key, value);
            dict.set("Nums", Object::Array(nums));
        }
    }
    Ok(())
}

/// Append a kid to an element's (or the root's) `/K`, normalizing it to an
/// array.
pub fn append_kid(handle: &mut DocumentHandle, element: ObjectId, kid: Object) -> Result<()> {
    let dict = handle.document_mut().get_dictionary_mut(element)?;
    let kids = match dict.get(b"K") {
        Ok(Object::Array(items)) => {
            let mut items = items.clone();
            items.push(kid);
            items
        }
        Ok(existing) => vec![existing.clone(), kid],
        Err(_) => vec![kid],
    };
    dict.set("K", Object::Array(kids));
    Ok(())
}

/// The `/S` role of a structure element.
pub fn element_role(handle: &DocumentHandle, element: ObjectId) -> Result<String> {
    let dict = handle.document().get_dictionary(element)?;
    match dict.get(b"S") {
        Ok(Object::Name(role)) => Ok(String::from_utf8_lossy(role).to_string()),
        _ => Err(Error::MissingObject(format!(
            "structure type of element {:?}",
            element
        ))),
    }
}

/// New structure element dictionary.
pub fn new_element(role: &str, parent: ObjectId) -> Dictionary {
    dictionary! {
        "Type" => "StructElem",
        "S" => Object::Name(role.as_bytes().to_vec()),
        "P" => parent,
        "K" => Object::Array(Vec::new()),
    }
}
