//! The remediation instruction DSL: model, parsing and validation.

mod model;
mod parse;
mod validate;

pub use model::{
    heading_level, AnnotationOpKind, AnnotationOperation, ArtifactEntry, ArtifactKind,
    AttributeValue, BookmarksInstruction, CharCode, ContentTaggingEntry, FontOpKind,
    FontOperation, InstructionSet, MetadataInstruction, OcrPage, OcrWord, StructureAttribute,
    StructureInstruction, StructureNode, TabOrder, ANNOTATION_OPS, ARTIFACT_TYPES, FIELD_TYPES,
    FONT_ENCODINGS, FONT_OPS, HEADER_SCOPES, STRUCTURE_ROLES, SUPPORTED_VERSION, TAB_ORDERS,
};
pub use parse::{from_json, from_yaml, parse_instructions};
pub use validate::{validate, FieldError};
