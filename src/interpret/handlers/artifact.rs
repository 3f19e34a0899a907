//! Marking decorative content as artifacts.

use lopdf::{Dictionary, Object};

use super::declared_page;
use crate::content::scan_page;
use crate::error::Result;
use crate::geometry::{BboxResolver, BoundingBox};
use crate::instruction::{ArtifactEntry, ArtifactKind, InstructionSet};
use crate::interpret::marking::{begin_marked, group_ranges, select_region, unresolved, wrap_ranges};
use crate::interpret::{ErrorMode, Handler, InterpretOptions};
use crate::pdf::objects::rect_object;
use crate::pdf::DocumentHandle;

pub struct ArtifactHandler {
    resolver: BboxResolver,
    error_mode: ErrorMode,
}

impl ArtifactHandler {
    pub fn new(options: &InterpretOptions) -> Self {
        Self {
            resolver: BboxResolver::new(options.resolver),
            error_mode: options.error_mode,
        }
    }

    fn mark(&self, handle: &mut DocumentHandle, entry: &ArtifactEntry) -> Result<usize> {
        let kind = ArtifactKind::parse(&entry.kind).unwrap_or(ArtifactKind::Layout);
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
                &format!("{} artifact", entry.kind),
            )?;
            return Ok(0);
        }

        let ranges = group_ranges(&scan, &positions);
        let properties = artifact_properties(kind, target.as_ref());
        let wrapped = wrap_ranges(operations, &ranges, |_| {
            begin_marked("Artifact", properties.clone())
        });
        handle.set_page_operations(page_id, wrapped)?;
        log::debug!(
            "Marked {} operator(s) on page {} as {:?} artifact",
            positions.len(),
            page,
            kind
        );
        Ok(ranges.len())
    }
}

impl Handler for ArtifactHandler {
    type Section = [ArtifactEntry];

    fn name(&self) -> &'static str {
        "artifacts"
    }

    fn section<'a>(&self, set: &'a InstructionSet) -> Option<&'a [ArtifactEntry]> {
        (!set.artifacts.is_empty()).then_some(set.artifacts.as_slice())
    }

    fn apply(&self, mut handle: DocumentHandle, entries: &[ArtifactEntry]) -> Result<DocumentHandle> {
        let mut sequences = 0;
        for entry in entries {
            sequences += self.mark(&mut handle, entry)?;
        }
        log::info!("Marked {} artifact sequence(s)", sequences);
        Ok(handle)
    }
}

/// `<< /Type /Pagination /Subtype /Header /BBox [...] >>`
fn artifact_properties(kind: ArtifactKind, bbox: Option<&BoundingBox>) -> Dictionary {
    let (artifact_type, subtype) = kind.pdf_type();
    let mut properties = Dictionary::new();
    properties.set("Type", Object::Name(artifact_type.as_bytes().to_vec()));
    if let Some(subtype) = subtype {
        properties.set("Subtype", Object::Name(subtype.as_bytes().to_vec()));
    }
    if let Some(bbox) = bbox {
        properties.set("BBox", rect_object(bbox));
    }
    properties
}
