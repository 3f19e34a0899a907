//! Binding page content to structure elements with marked-content IDs.

use lopdf::{dictionary, Dictionary, Object, ObjectId};

use super::declared_page;
use crate::content::scan_page;
use crate::error::{Error, Result};
use crate::geometry::BboxResolver;
use crate::instruction::{ContentTaggingEntry, InstructionSet};
use crate::interpret::marking::{begin_marked, group_ranges, select_region, unresolved, wrap_ranges};
use crate::interpret::tree::{
    append_kid, checked_mcid, element_role, ensure_struct_tree_root, mark_tagged,
    page_struct_parents, set_parent_tree_mcid,
};
use crate::interpret::{ErrorMode, Handler, InterpretOptions};
use crate::pdf::DocumentHandle;

pub struct ContentTaggingHandler {
    resolver: BboxResolver,
    error_mode: ErrorMode,
}

impl ContentTaggingHandler {
    pub fn new(options: &InterpretOptions) -> Self {
        Self {
            resolver: BboxResolver::new(options.resolver),
            error_mode: options.error_mode,
        }
    }

    fn tag(
        &self,
        handle: &mut DocumentHandle,
        root: ObjectId,
        entry: &ContentTaggingEntry,
    ) -> Result<usize> {
        let element = handle.structure_node(&entry.node)?;
        let role = element_role(handle, element)?;
        let (page, page_id) = declared_page(handle, entry.page)?;
        let page_box = handle.page_box(page_id);
        let target = entry
            .bbox
            .map(|bbox| self.resolver.to_user_space(&bbox, &page_box));

        let (operations, scan) = scan_page(handle, page_id)?;
        let positions = select_region(&scan, &self.resolver, target.as_ref());
        if positions.is_empty() {
            unresolved(
                self.error_mode,
                page,
                &target.unwrap_or(page_box),
                &format!("node '{}'", entry.node),
            )?;
            return Ok(0);
        }

        let ranges = group_ranges(&scan, &positions);
        let first = scan
            .next_mcid()
            .ok_or_else(|| Error::Structure(format!("page {} has no free MCID", page)))?;
        checked_mcid(checked_mcid(first)? + ranges.len() as i64 - 1)?;
        let wrapped = wrap_ranges(operations, &ranges, |n| {
            begin_marked(&role, dictionary! { "MCID" => first + n as i64 })
        });
        handle.set_page_operations(page_id, wrapped)?;

        let key = page_struct_parents(handle, root, page_id)?;
        for n in 0..ranges.len() {
            let mcid = first + n as i64;
            set_parent_tree_mcid(handle, root, key, mcid, element)?;
            add_content_kid(handle, element, page_id, mcid)?;
        }
        log::debug!(
            "Tagged {} operator(s) on page {} as {} ({} sequence(s))",
            positions.len(),
            page,
            role,
            ranges.len()
        );
        Ok(ranges.len())
    }
}

impl Handler for ContentTaggingHandler {
    type Section = [ContentTaggingEntry];

    fn name(&self) -> &'static str {
        "content_tagging"
    }

    fn section<'a>(&self, set: &'a InstructionSet) -> Option<&'a [ContentTaggingEntry]> {
        (!set.content_tagging.is_empty()).then_some(set.content_tagging.as_slice())
    }

    fn apply(
        &self,
        mut handle: DocumentHandle,
        entries: &[ContentTaggingEntry],
    ) -> Result<DocumentHandle> {
        let root = ensure_struct_tree_root(&mut handle)?;
        let mut sequences = 0;
        for entry in entries {
            sequences += self.tag(&mut handle, root, entry)?;
        }
        mark_tagged(&mut handle)?;
        log::info!(
            "Tagged {} marked-content sequence(s) from {} entr(ies)",
            sequences,
            entries.len()
        );
        Ok(handle)
    }
}

/// Reference an MCID from an element's `/K`: a bare integer on the
/// element's own page, a marked-content reference elsewhere.
fn add_content_kid(
    handle: &mut DocumentHandle,
    element: ObjectId,
    page_id: ObjectId,
    mcid: i64,
) -> Result<()> {
    let dict = handle.document_mut().get_dictionary_mut(element)?;
    let own_page = match dict.get(b"Pg") {
        Ok(Object::Reference(pg)) => *pg == page_id,
        _ => {
            dict.set("Pg", Object::Reference(page_id));
            true
        }
    };
    let kid = if own_page {
        Object::Integer(mcid)
    } else {
        let mut reference = Dictionary::new();
        reference.set("Type", Object::Name(b"MCR".to_vec()));
        reference.set("Pg", Object::Reference(page_id));
        reference.set("MCID", Object::Integer(mcid));
        Object::Dictionary(reference)
    };
    append_kid(handle, element, kid)
}
