//! # pdfremedy
//!
//! Instruction-driven PDF accessibility remediation.
//!
//! An instruction document (YAML or JSON) describes metadata, a structure
//! tree, content bindings, artifacts, annotation fixes, font repairs, OCR
//! text and bookmarks. pdfremedy validates it, applies it to a PDF through a
//! fixed pipeline of handlers, and can inspect the result as a JSON report.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdfremedy::{parse_instructions, remediate, InterpretOptions};
//!
//! fn main() -> pdfremedy::Result<()> {
//!     let set = parse_instructions(&std::fs::read_to_string("fix.yaml")?, None)?;
//!     let input = std::fs::read("scan.pdf")?;
//!     let output = remediate(&input, &set, InterpretOptions::default())?;
//!     std::fs::write("scan.tagged.pdf", output)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Instruction DSL**: YAML or JSON, validated with field paths
//! - **Tagging**: structure tree, MCID binding, artifacts, ParentTree upkeep
//! - **Forms and links**: widget creation, tooltips, structure association
//! - **Font repair**: ToUnicode, widths, encodings, CIDSet and CharSet
//! - **OCR layers**: invisible, idempotent text from recognized words
//! - **Inspection**: fonts, tag tree, operators, outlines, colour contrast

pub mod content;
pub mod detect;
pub mod error;
pub mod font;
pub mod geometry;
pub mod inspect;
pub mod instruction;
pub mod interpret;
pub mod pdf;

// Re-export commonly used types
pub use detect::{detect_format_from_bytes, is_pdf_bytes, InstructionFormat, PdfFormat};
pub use error::{Error, Result};
pub use geometry::{BboxOrigin, BoundingBox, ResolverConfig};
pub use inspect::{to_json, InspectOptions, InspectionReport, Inspector, JsonFormat};
pub use instruction::{parse_instructions, validate, FieldError, InstructionSet};
pub use interpret::{ErrorMode, InterpretOptions, Interpreter, Pipeline};

use std::path::Path;

/// Validate `set` and apply it to `pdf`.
///
/// Validation errors are returned together as [`Error::Validation`] before
/// the document is touched.
pub fn remediate(pdf: &[u8], set: &InstructionSet, options: InterpretOptions) -> Result<Vec<u8>> {
    check(set)?;
    Interpreter::new(options).execute(pdf, set)
}

/// Read an instruction file, choosing the format from its extension when it
/// names one.
pub fn read_instructions<P: AsRef<Path>>(path: P) -> Result<InstructionSet> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(InstructionFormat::from_hint);
    parse_instructions(&text, format)
}

/// Inspect PDF bytes with default options.
pub fn inspect_bytes(data: &[u8]) -> Result<InspectionReport> {
    Inspector::default().inspect(data)
}

/// Inspect a PDF file with default options.
pub fn inspect_file<P: AsRef<Path>>(path: P) -> Result<InspectionReport> {
    let data = std::fs::read(path)?;
    inspect_bytes(&data)
}

fn check(set: &InstructionSet) -> Result<()> {
    let errors = validate(set);
    if errors.is_empty() {
        Ok(())
    } else {
        log::debug!("Instruction set rejected with {} error(s)", errors.len());
        Err(Error::Validation(errors))
    }
}

/// Builder for remediating documents.
///
/// # Example
///
/// ```no_run
/// use pdfremedy::Remedy;
///
/// let report = Remedy::new()
///     .lenient()
///     .top_left_origin()
///     .instructions_file("fix.json")?
///     .apply_file("scan.pdf", "scan.tagged.pdf")?
///     .inspect()?;
/// println!("{} page(s)", report.document.page_count);
/// # Ok::<(), pdfremedy::Error>(())
/// ```
pub struct Remedy {
    options: InterpretOptions,
    instructions: InstructionSet,
}

impl Remedy {
    /// Create a builder with default options and an empty instruction set.
    pub fn new() -> Self {
        Self {
            options: InterpretOptions::default(),
            instructions: InstructionSet::new(),
        }
    }

    /// Log unmatched regions instead of failing.
    pub fn lenient(mut self) -> Self {
        self.options = self.options.lenient();
        self
    }

    /// Read declared boxes with the origin at the page's top-left corner.
    pub fn top_left_origin(mut self) -> Self {
        self.options = self.options.top_left_origin();
        self
    }

    /// Write authored streams uncompressed.
    pub fn uncompressed(mut self) -> Self {
        self.options = self.options.with_compression(false);
        self
    }

    /// Replace the interpreter options.
    pub fn with_options(mut self, options: InterpretOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an already parsed instruction set.
    pub fn instructions(mut self, set: InstructionSet) -> Self {
        self.instructions = set;
        self
    }

    /// Parse the instructions from text, sniffing the format.
    pub fn instructions_text(mut self, text: &str) -> Result<Self> {
        self.instructions = parse_instructions(text, None)?;
        Ok(self)
    }

    /// Read the instructions from a file.
    pub fn instructions_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.instructions = read_instructions(path)?;
        Ok(self)
    }

    /// Apply the instructions to PDF bytes.
    pub fn apply(&self, pdf: &[u8]) -> Result<RemedyResult> {
        let data = remediate(pdf, &self.instructions, self.options.clone())?;
        Ok(RemedyResult { data })
    }

    /// Apply the instructions to a file and write the result.
    pub fn apply_file<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> Result<RemedyResult> {
        let pdf = std::fs::read(input)?;
        let result = self.apply(&pdf)?;
        std::fs::write(output, &result.data)?;
        Ok(result)
    }
}

impl Default for Remedy {
    fn default() -> Self {
        Self::new()
    }
}

/// A remediated document.
pub struct RemedyResult {
    /// Serialized PDF bytes
    pub data: Vec<u8>,
}

impl RemedyResult {
    /// Inspect the remediated document.
    pub fn inspect(&self) -> Result<InspectionReport> {
        inspect_bytes(&self.data)
    }

    /// Inspect with custom options.
    pub fn inspect_with(&self, options: InspectOptions) -> Result<InspectionReport> {
        Inspector::new(options).inspect(&self.data)
    }

    /// Size of the serialized document in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remediate_rejects_invalid_set() {
        let set = parse_instructions("version: \"2.0\"\n", None).unwrap();
        let err = remediate(b"%PDF-1.7\n", &set, InterpretOptions::default()).unwrap_err();
        match err {
            Error::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "version");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_remedy_builder_options() {
        let remedy = Remedy::new().lenient().top_left_origin().uncompressed();
        assert_eq!(remedy.options.error_mode, ErrorMode::Lenient);
        assert_eq!(remedy.options.resolver.origin, BboxOrigin::TopLeft);
        assert!(!remedy.options.compress_streams);
    }

    #[test]
    fn test_inspect_rejects_non_pdf() {
        assert!(matches!(inspect_bytes(b"hello"), Err(Error::UnknownFormat)));
    }
}
