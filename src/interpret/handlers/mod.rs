//! The pipeline handlers, one per instruction section.

mod annotation;
mod artifact;
mod bookmark;
mod content_tagging;
mod finalize;
mod font;
mod metadata;
mod ocr;
mod structure;

pub use annotation::AnnotationHandler;
pub use artifact::ArtifactHandler;
pub use bookmark::BookmarkHandler;
pub use content_tagging::ContentTaggingHandler;
pub use finalize::FinalizeHandler;
pub use font::FontHandler;
pub use metadata::MetadataHandler;
pub use ocr::OcrHandler;
pub use structure::{strip_structure, StructureHandler};

use lopdf::ObjectId;

use crate::error::{Error, Result};
use crate::pdf::DocumentHandle;

/// Object id of a 1-indexed page number as declared in instructions.
pub(crate) fn declared_page(handle: &DocumentHandle, page: i64) -> Result<(u32, ObjectId)> {
    let number = u32::try_from(page)
        .ok()
        .filter(|n| *n > 0)
        .ok_or(Error::PageOutOfRange(page.clamp(0, u32::MAX as i64) as u32, handle.page_count()))?;
    Ok((number, handle.page_id(number)?))
}

#[cfg(test)]
pub(crate) mod testing;
