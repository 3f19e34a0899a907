//! Outline generation from the heading elements of the structure tree.

use std::collections::{BTreeMap, HashMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::content::{scan_page, PageScan};
use crate::error::Result;
use crate::instruction::{heading_level, BookmarksInstruction, InstructionSet};
use crate::interpret::tree::struct_tree_root;
use crate::interpret::Handler;
use crate::pdf::objects::{dict_get, dict_get_dict, name, reference, resolve};
use crate::pdf::text::{dict_string, text_string};
use crate::pdf::DocumentHandle;

/// RoleMap chains longer than this are treated as unmapped.
const MAX_ROLE_HOPS: usize = 8;

pub struct BookmarkHandler;

/// One heading found in the tag tree.
#[derive(Debug, Clone)]
struct Heading {
    level: u8,
    role: String,
    element: ObjectId,
    page: Option<ObjectId>,
}

/// An outline entry before it is written.
#[derive(Debug, Default)]
struct OutlineNode {
    title: String,
    page: Option<ObjectId>,
    children: Vec<OutlineNode>,
}

impl OutlineNode {
    fn descendants(&self) -> i64 {
        self.children.iter().map(|c| 1 + c.descendants()).sum()
    }
}

impl Handler for BookmarkHandler {
    type Section = BookmarksInstruction;

    fn name(&self) -> &'static str {
        "bookmarks"
    }

    fn section<'a>(&self, set: &'a InstructionSet) -> Option<&'a BookmarksInstruction> {
        set.bookmarks
            .as_ref()
            .filter(|bookmarks| bookmarks.generate_from_headings)
    }

    fn apply(&self, mut handle: DocumentHandle, _: &BookmarksInstruction) -> Result<DocumentHandle> {
        let Some(root) = struct_tree_root(&handle) else {
            log::warn!("No structure tree, skipping bookmark generation");
            return Ok(handle);
        };
        let headings = collect_headings(handle.document(), root);
        if headings.is_empty() {
            log::info!("No headings in the structure tree, outline left unchanged");
            return Ok(handle);
        }

        let mut titles = TitleSource::new(&handle);
        let titled: Vec<(u8, OutlineNode)> = headings
            .iter()
            .map(|heading| {
                let node = OutlineNode {
                    title: titles.title(heading),
                    page: heading.page,
                    children: Vec::new(),
                };
                (heading.level, node)
            })
            .collect();
        let outline = nest(titled);

        let count = write_outline(&mut handle, &outline)?;
        log::info!("Generated {} bookmark(s) from headings", count);
        Ok(handle)
    }
}

/// Heading elements under `root` in document order.
fn collect_headings(doc: &Document, root: ObjectId) -> Vec<Heading> {
    let role_map = role_map(doc, root);
    let mut visited = HashSet::from([root]);
    let mut headings = Vec::new();
    let mut pending: Vec<ObjectId> = kid_elements(doc, root).into_iter().rev().collect();

    while let Some(element) = pending.pop() {
        if !visited.insert(element) {
            log::warn!("Structure element {:?} reached twice, skipping", element);
            continue;
        }
        let Ok(dict) = doc.get_dictionary(element) else {
            continue;
        };
        if let Some(role) = dict_get(doc, dict, b"S").and_then(name) {
            let standard = standard_role(&role_map, &role);
            if let Some(level) = heading_level(&standard) {
                headings.push(Heading {
                    level,
                    role,
                    element,
                    page: dict.get(b"Pg").ok().and_then(reference),
                });
            }
        }
        pending.extend(kid_elements(doc, element).into_iter().rev());
    }
    headings
}

/// Indirect structure-element kids of an element or the root.
fn kid_elements(doc: &Document, element: ObjectId) -> Vec<ObjectId> {
    let Ok(dict) = doc.get_dictionary(element) else {
        return Vec::new();
    };
    let kids: Vec<&Object> = match dict.get(b"K") {
        Ok(Object::Array(items)) => items.iter().collect(),
        Ok(item) => vec![item],
        Err(_) => return Vec::new(),
    };
    kids.into_iter()
        .filter_map(reference)
        .filter(|id| {
            doc.get_dictionary(*id)
                .map(|kid| kid.has(b"S"))
                .unwrap_or(false)
        })
        .collect()
}

fn role_map(doc: &Document, root: ObjectId) -> BTreeMap<String, String> {
    let Ok(root) = doc.get_dictionary(root) else {
        return BTreeMap::new();
    };
    let Some(map) = dict_get_dict(doc, root, b"RoleMap") else {
        return BTreeMap::new();
    };
    map.iter()
        .filter_map(|(key, value)| {
            let target = name(resolve(doc, value))?;
            Some((String::from_utf8_lossy(key).to_string(), target))
        })
        .collect()
}

/// Follow RoleMap entries until a role maps to nothing.
fn standard_role(map: &BTreeMap<String, String>, role: &str) -> String {
    let mut current = role.to_string();
    for _ in 0..MAX_ROLE_HOPS {
        match map.get(&current) {
            Some(next) if *next != current => current = next.clone(),
            _ => break,
        }
    }
    current
}

/// Build the outline forest with a level stack: a heading closes every open
/// heading of the same or deeper level.
fn nest(headings: Vec<(u8, OutlineNode)>) -> Vec<OutlineNode> {
    let mut roots = Vec::new();
    let mut open: Vec<(u8, OutlineNode)> = Vec::new();

    fn close(open: &mut Vec<(u8, OutlineNode)>, roots: &mut Vec<OutlineNode>) {
        if let Some((_, node)) = open.pop() {
            match open.last_mut() {
                Some((_, parent)) => parent.children.push(node),
                None => roots.push(node),
            }
        }
    }

    for (level, node) in headings {
        while open.last().is_some_and(|(open_level, _)| *open_level >= level) {
            close(&mut open, &mut roots);
        }
        open.push((level, node));
    }
    while !open.is_empty() {
        close(&mut open, &mut roots);
    }
    roots
}

/// Resolves heading titles, scanning each page at most once.
struct TitleSource<'a> {
    handle: &'a DocumentHandle,
    scans: HashMap<ObjectId, Option<PageScan>>,
}

impl<'a> TitleSource<'a> {
    fn new(handle: &'a DocumentHandle) -> Self {
        Self {
            handle,
            scans: HashMap::new(),
        }
    }

    /// ActualText, Alt or T, then the marked text, then the role name.
    fn title(&mut self, heading: &Heading) -> String {
        let doc = self.handle.document();
        let declared = doc.get_dictionary(heading.element).ok().and_then(|dict| {
            [b"ActualText".as_slice(), b"Alt", b"T"]
                .into_iter()
                .filter_map(|key| dict_string(doc, dict, key))
                .map(|text| text.trim().to_string())
                .find(|text| !text.is_empty())
        });
        declared
            .or_else(|| self.marked_text(heading))
            .unwrap_or_else(|| heading.role.clone())
    }

    fn marked_text(&mut self, heading: &Heading) -> Option<String> {
        let page = heading.page?;
        let mcids = self.element_mcids(heading.element, page);
        if mcids.is_empty() {
            return None;
        }
        let handle = self.handle;
        let scan = self
            .scans
            .entry(page)
            .or_insert_with(|| match scan_page(handle, page) {
                Ok((_, scan)) => Some(scan),
                Err(e) => {
                    log::warn!("Could not read page content for heading text: {}", e);
                    None
                }
            })
            .as_ref()?;
        let text: Vec<&str> = scan
            .operators
            .iter()
            .filter(|op| op.mcid.is_some_and(|mcid| mcids.contains(&mcid)))
            .filter_map(|op| op.text.as_deref())
            .collect();
        let text = text.join("").split_whitespace().collect::<Vec<_>>().join(" ");
        (!text.is_empty()).then_some(text)
    }

    /// MCIDs an element references on `page`, directly or through MCRs.
    fn element_mcids(&self, element: ObjectId, page: ObjectId) -> HashSet<i64> {
        let doc = self.handle.document();
        let Ok(dict) = doc.get_dictionary(element) else {
            return HashSet::new();
        };
        let kids: Vec<&Object> = match dict.get(b"K") {
            Ok(Object::Array(items)) => items.iter().collect(),
            Ok(item) => vec![item],
            Err(_) => Vec::new(),
        };
        kids.into_iter()
            .filter_map(|kid| match resolve(doc, kid) {
                Object::Integer(mcid) => Some(*mcid),
                Object::Dictionary(mcr) => {
                    let on_page = mcr
                        .get(b"Pg")
                        .ok()
                        .and_then(reference)
                        .map_or(true, |pg| pg == page);
                    match (on_page, mcr.get(b"MCID")) {
                        (true, Ok(Object::Integer(mcid))) => Some(*mcid),
                        _ => None,
                    }
                }
                _ => None,
            })
            .collect()
    }
}

/// Replace the catalog's outline with `entries`; returns the entry count.
fn write_outline(handle: &mut DocumentHandle, entries: &[OutlineNode]) -> Result<usize> {
    let catalog = handle.catalog_id()?;
    let doc = handle.document_mut();
    let outlines = doc.new_object_id();
    let (first, last) = write_siblings(doc, outlines, entries);
    let total: i64 = entries.iter().map(|e| 1 + e.descendants()).sum();

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Outlines".to_vec()));
    if let (Some(first), Some(last)) = (first, last) {
        dict.set("First", Object::Reference(first));
        dict.set("Last", Object::Reference(last));
    }
    dict.set("Count", Object::Integer(total));
    doc.objects.insert(outlines, Object::Dictionary(dict));

    let catalog = doc.get_dictionary_mut(catalog)?;
    catalog.set("Outlines", Object::Reference(outlines));
    catalog.set("PageMode", Object::Name(b"UseOutlines".to_vec()));
    Ok(total as usize)
}

/// Write one sibling chain under `parent`, returning its first and last ids.
fn write_siblings(
    doc: &mut Document,
    parent: ObjectId,
    entries: &[OutlineNode],
) -> (Option<ObjectId>, Option<ObjectId>) {
    let ids: Vec<ObjectId> = entries.iter().map(|_| doc.new_object_id()).collect();
    for (i, entry) in entries.iter().enumerate() {
        let mut item = Dictionary::new();
        item.set("Title", text_string(&entry.title));
        item.set("Parent", Object::Reference(parent));
        if i > 0 {
            item.set("Prev", Object::Reference(ids[i - 1]));
        }
        if let Some(next) = ids.get(i + 1) {
            item.set("Next", Object::Reference(*next));
        }
        if let Some(page) = entry.page {
            item.set(
                "Dest",
                Object::Array(vec![
                    Object::Reference(page),
                    Object::Name(b"XYZ".to_vec()),
                    Object::Null,
                    Object::Null,
                    Object::Null,
                ]),
            );
        }
        if let (Some(first), Some(last)) = write_siblings(doc, ids[i], &entry.children) {
            item.set("First", Object::Reference(first));
            item.set("Last", Object::Reference(last));
            item.set("Count", Object::Integer(entry.descendants()));
        }
        doc.objects.insert(ids[i], Object::Dictionary(item));
    }
    (ids.first().copied(), ids.last().copied())
}
