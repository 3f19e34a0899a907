//! Error types for pdfremedy.

use std::io;
use thiserror::Error;

use crate::instruction::FieldError;

/// Result type alias for pdfremedy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading instructions or processing a document.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not a PDF file.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The PDF header carries a version string we cannot read.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// The instruction text was empty or whitespace only.
    #[error("Instruction document is empty")]
    EmptyInstructions,

    /// The instruction text could not be deserialized.
    #[error("Invalid instruction document: {0}")]
    Deserialize(String),

    /// The instruction set violates one or more business rules.
    #[error("Instruction set failed validation with {} error(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// Error parsing PDF structure.
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// The PDF document is encrypted.
    #[error("Document is encrypted")]
    Encrypted,

    /// A required PDF object is missing.
    #[error("Missing required object: {0}")]
    MissingObject(String),

    /// Page number is out of range.
    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(u32, u32),

    /// Resource (font, XObject) not found on a page.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Annotation index does not exist on the page.
    #[error("Annotation {index} not found on page {page}")]
    AnnotationNotFound { page: u32, index: usize },

    /// A structure node id was referenced but never built.
    #[error("Unknown structure node: {0}")]
    UnknownNode(String),

    /// No content operator could be matched to a declared region.
    #[error("No content found on page {page} inside [{x}, {y}, {width}, {height}]")]
    UnresolvedRegion {
        page: u32,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },

    /// The structure tree or its marked content cannot be extended.
    #[error("Structure error: {0}")]
    Structure(String),

    /// Error reading or writing a font resource.
    #[error("Font error: {0}")]
    Font(String),

    /// Error decoding or encoding a content stream.
    #[error("Content stream error: {0}")]
    Content(String),

    /// Error serializing a report.
    #[error("Rendering error: {0}")]
    Render(String),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::PdfParse(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialize(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Deserialize(err.to_string())
    }
}
