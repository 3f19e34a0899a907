//! Instruction interpretation: a fixed-order pipeline of handlers applied
//! to one document.
//!
//! ```no_run
//! use pdfremedy::interpret::{InterpretOptions, Interpreter};
//! use pdfremedy::parse_instructions;
//!
//! fn main() -> pdfremedy::Result<()> {
//!     let set = parse_instructions("version: \"1.0\"\nmetadata:\n  language: fr\n", None)?;
//!     let input = std::fs::read("scan.pdf")?;
//!     let output = Interpreter::new(InterpretOptions::default()).execute(&input, &set)?;
//!     std::fs::write("scan.tagged.pdf", output)?;
//!     Ok(())
//! }
//! ```

pub mod handlers;
mod marking;
mod options;
pub mod tree;

pub use options::{ErrorMode, InterpretOptions, DEFAULT_PROCESSOR_NAME};

use crate::error::Result;
use crate::instruction::InstructionSet;
use crate::pdf::DocumentHandle;
use handlers::{
    AnnotationHandler, ArtifactHandler, BookmarkHandler, ContentTaggingHandler, FinalizeHandler,
    FontHandler, MetadataHandler, OcrHandler, StructureHandler,
};

/// One pipeline step bound to the instruction section it consumes.
pub trait Handler {
    type Section: ?Sized + 'static;

    /// Name used in log output.
    fn name(&self) -> &'static str;

    /// The section this handler consumes; `None` skips the handler.
    fn section<'a>(&self, set: &'a InstructionSet) -> Option<&'a Self::Section>;

    /// Apply the section to the document.
    fn apply(&self, handle: DocumentHandle, section: &Self::Section) -> Result<DocumentHandle>;
}

/// Type-erased pipeline step.
pub trait Stage {
    fn name(&self) -> &'static str;

    fn run(&self, handle: DocumentHandle, set: &InstructionSet) -> Result<DocumentHandle>;
}

impl<H: Handler> Stage for H {
    fn name(&self) -> &'static str {
        Handler::name(self)
    }

    fn run(&self, handle: DocumentHandle, set: &InstructionSet) -> Result<DocumentHandle> {
        match self.section(set) {
            Some(section) => {
                log::debug!("Running {} handler", Handler::name(self));
                self.apply(handle, section)
            }
            None => {
                log::trace!("Skipping {} handler: no instructions", Handler::name(self));
                Ok(handle)
            }
        }
    }
}

/// Ordered list of stages.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Empty pipeline.
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Metadata, Structure, ContentTagging, Artifact, Annotation, Font, Ocr,
    /// Bookmark, then Finalize.
    pub fn standard(options: &InterpretOptions) -> Self {
        Self::new()
            .with_stage(MetadataHandler)
            .with_stage(StructureHandler)
            .with_stage(ContentTaggingHandler::new(options))
            .with_stage(ArtifactHandler::new(options))
            .with_stage(AnnotationHandler::new(options))
            .with_stage(FontHandler)
            .with_stage(OcrHandler::new(options))
            .with_stage(BookmarkHandler)
            .with_stage(FinalizeHandler::new(options))
    }

    /// Append a stage.
    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage in order; the first error aborts.
    pub fn run(&self, mut handle: DocumentHandle, set: &InstructionSet) -> Result<DocumentHandle> {
        for stage in &self.stages {
            handle = stage.run(handle, set).map_err(|e| {
                log::debug!("{} handler failed: {}", stage.name(), e);
                e
            })?;
        }
        Ok(handle)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies instruction sets to documents.
pub struct Interpreter {
    options: InterpretOptions,
    pipeline: Pipeline,
}

impl Interpreter {
    /// Interpreter running the standard pipeline.
    pub fn new(options: InterpretOptions) -> Self {
        let pipeline = Pipeline::standard(&options);
        Self { options, pipeline }
    }

    /// Interpreter running a custom pipeline.
    pub fn with_pipeline(options: InterpretOptions, pipeline: Pipeline) -> Self {
        Self { options, pipeline }
    }

    pub fn options(&self) -> &InterpretOptions {
        &self.options
    }

    /// Load `pdf`, apply `set`, and serialize the result.
    ///
    /// The instruction set is expected to have passed validation.
    pub fn execute(&self, pdf: &[u8], set: &InstructionSet) -> Result<Vec<u8>> {
        let handle = DocumentHandle::load(pdf)?;
        let mut handle = self.execute_document(handle, set)?;
        handle.save()
    }

    /// Apply `set` to an already loaded document.
    pub fn execute_document(
        &self,
        mut handle: DocumentHandle,
        set: &InstructionSet,
    ) -> Result<DocumentHandle> {
        handle.set_compress(self.options.compress_streams);
        log::info!(
            "Applying instructions to {} page(s)",
            handle.page_count()
        );
        self.pipeline.run(handle, set)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(InterpretOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_pipeline_order() {
        let pipeline = Pipeline::standard(&InterpretOptions::default());
        assert_eq!(
            pipeline.stage_names(),
            vec![
                "metadata",
                "structure",
                "content_tagging",
                "artifacts",
                "annotations",
                "fonts",
                "ocr",
                "bookmarks",
                "finalize",
            ]
        );
    }
}
