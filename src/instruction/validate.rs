//! Business-rule validation of instruction sets.
//!
//! Validation never fails fast: every rule is evaluated and all violations are
//! returned together, each tagged with a field path such as
//! `structure.children[1].colspan` or `fonts[0].cids`.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::model::{
    AnnotationOpKind, AnnotationOperation, ArtifactKind, CharCode, FontOpKind, FontOperation,
    InstructionSet, MetadataInstruction, OcrPage, StructureNode, TabOrder, FIELD_TYPES,
    FONT_ENCODINGS, HEADER_SCOPES, STRUCTURE_ROLES, SUPPORTED_VERSION,
};
use crate::geometry::BoundingBox;

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate an instruction set, returning every violation found.
///
/// An empty list means the set may be executed.
pub fn validate(set: &InstructionSet) -> Vec<FieldError> {
    let mut validator = Validator::default();
    validator.check_version(set.version.as_deref());

    if let Some(metadata) = &set.metadata {
        validator.check_metadata(metadata);
    }

    // Pass 1: collect ids (and report duplicates) while checking node fields.
    let mut ids = HashSet::new();
    if let Some(structure) = &set.structure {
        validator.check_node(&structure.root, "structure", &mut ids);
    }

    // Pass 2: references into the id set.
    for (i, entry) in set.content_tagging.iter().enumerate() {
        let path = format!("content_tagging[{}]", i);
        if entry.node.trim().is_empty() {
            validator.push(format!("{}.node", path), "is required");
        } else if !ids.contains(entry.node.as_str()) {
            validator.push(
                format!("{}.node", path),
                format!("references unknown structure id '{}'", entry.node),
            );
        }
        validator.check_page(&path, entry.page);
        validator.check_required_bbox(&format!("{}.bbox", path), entry.bbox.as_ref());
    }

    for (i, artifact) in set.artifacts.iter().enumerate() {
        let path = format!("artifacts[{}]", i);
        validator.check_page(&path, artifact.page);
        validator.check_required_bbox(&format!("{}.bbox", path), artifact.bbox.as_ref());
        if ArtifactKind::parse(&artifact.kind).is_none() {
            validator.push(
                format!("{}.type", path),
                format!(
                    "'{}' is not one of layout, header, footer, pagination, background",
                    artifact.kind
                ),
            );
        }
    }

    for (i, annotation) in set.annotations.iter().enumerate() {
        validator.check_annotation(&format!("annotations[{}]", i), annotation, &ids);
    }

    for (i, font) in set.fonts.iter().enumerate() {
        validator.check_font(&format!("fonts[{}]", i), font);
    }

    for (i, page) in set.ocr.iter().enumerate() {
        validator.check_ocr(&format!("ocr[{}]", i), page);
    }

    validator.errors
}

#[derive(Default)]
struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    fn check_version(&mut self, version: Option<&str>) {
        match version {
            Some(SUPPORTED_VERSION) => {}
            Some(other) => self.push(
                "version",
                format!("unsupported version '{}', expected \"{}\"", other, SUPPORTED_VERSION),
            ),
            None => self.push("version", format!("is required (\"{}\")", SUPPORTED_VERSION)),
        }
    }

    fn check_metadata(&mut self, metadata: &MetadataInstruction) {
        if let Some(language) = &metadata.language {
            self.check_language("metadata.language", language);
        }
        if let Some(part) = metadata.pdfua_identifier {
            if part != 1 && part != 2 {
                self.push("metadata.pdfua_identifier", "must be 1 or 2");
            }
        }
        if let Some(tab_order) = &metadata.tab_order {
            if TabOrder::parse(tab_order).is_none() {
                self.push(
                    "metadata.tab_order",
                    format!("'{}' is not one of S, R, C", tab_order),
                );
            }
        }
    }

    fn check_language(&mut self, field: &str, language: &str) {
        if !language_pattern().is_match(language) {
            self.push(field, format!("'{}' is not a valid language tag", language));
        }
    }

    fn check_node(&mut self, node: &StructureNode, path: &str, ids: &mut HashSet<String>) {
        if let Some(id) = &node.id {
            if id.trim().is_empty() {
                self.push(format!("{}.id", path), "must not be empty");
            } else if !ids.insert(id.clone()) {
                self.push(format!("{}.id", path), format!("duplicate structure id '{}'", id));
            }
        }

        if node.role.is_empty() {
            self.push(format!("{}.role", path), "is required");
        } else if !STRUCTURE_ROLES.contains(&node.role.as_str()) {
            self.push(
                format!("{}.role", path),
                format!("'{}' is not a recognised structure role", node.role),
            );
        }

        if let Some(scope) = &node.scope {
            if !HEADER_SCOPES.contains(&scope.as_str()) {
                self.push(
                    format!("{}.scope", path),
                    format!("'{}' is not one of Row, Column, Both", scope),
                );
            }
        }
        if let Some(colspan) = node.colspan {
            if colspan <= 0 {
                self.push(format!("{}.colspan", path), "must be greater than 0");
            }
        }
        if let Some(rowspan) = node.rowspan {
            if rowspan <= 0 {
                self.push(format!("{}.rowspan", path), "must be greater than 0");
            }
        }
        if let Some(language) = &node.language {
            self.check_language(&format!("{}.language", path), language);
        }
        if let Some(bbox) = &node.bbox {
            self.check_bbox(&format!("{}.bbox", path), bbox);
        }
        for (i, attribute) in node.attributes.iter().enumerate() {
            if attribute.owner.trim().is_empty() {
                self.push(format!("{}.attributes[{}].owner", path, i), "is required");
            }
            if attribute.key.trim().is_empty() {
                self.push(format!("{}.attributes[{}].key", path, i), "is required");
            }
        }

        for (i, child) in node.children.iter().enumerate() {
            self.check_node(child, &format!("{}.children[{}]", path, i), ids);
        }
    }

    fn check_page(&mut self, path: &str, page: i64) {
        if page <= 0 {
            self.push(format!("{}.page", path), "must be greater than 0");
        }
    }

    fn check_required_bbox(&mut self, field: &str, bbox: Option<&BoundingBox>) {
        match bbox {
            Some(bbox) => self.check_bbox(field, bbox),
            None => self.push(field, "is required"),
        }
    }

    fn check_bbox(&mut self, field: &str, bbox: &BoundingBox) {
        if !(bbox.x >= 0.0) {
            self.push(format!("{}.x", field), "must be non-negative");
        }
        if !(bbox.y >= 0.0) {
            self.push(format!("{}.y", field), "must be non-negative");
        }
        if !(bbox.width > 0.0) {
            self.push(format!("{}.width", field), "must be greater than 0");
        }
        if !(bbox.height > 0.0) {
            self.push(format!("{}.height", field), "must be greater than 0");
        }
    }

    fn check_annotation(
        &mut self,
        path: &str,
        annotation: &AnnotationOperation,
        ids: &HashSet<String>,
    ) {
        let Some(kind) = annotation.kind() else {
            self.push(
                format!("{}.op", path),
                format!("'{}' is not a recognised annotation operation", annotation.op),
            );
            return;
        };

        self.check_page(path, annotation.page);

        match kind {
            AnnotationOpKind::SetContents | AnnotationOpKind::SetTu => {
                self.check_index(path, annotation.index);
                if annotation.value.is_none() {
                    self.push(format!("{}.value", path), "is required");
                }
            }
            AnnotationOpKind::Associate => {
                self.check_index(path, annotation.index);
            }
            AnnotationOpKind::CreateWidget => {
                self.check_required_bbox(&format!("{}.rect", path), annotation.rect.as_ref());
                match annotation.field_name.as_deref() {
                    Some(name) if !name.trim().is_empty() => {}
                    _ => self.push(format!("{}.field_name", path), "is required"),
                }
                match annotation.field_type.as_deref() {
                    Some(field_type) if FIELD_TYPES.contains(&field_type) => {}
                    Some(other) => self.push(
                        format!("{}.field_type", path),
                        format!("'{}' is not one of Tx, Btn, Ch", other),
                    ),
                    None => self.push(format!("{}.field_type", path), "is required"),
                }
            }
        }

        if matches!(
            kind,
            AnnotationOpKind::Associate | AnnotationOpKind::CreateWidget
        ) {
            if let Some(node) = &annotation.node {
                if !ids.contains(node.as_str()) {
                    self.push(
                        format!("{}.node", path),
                        format!("references unknown structure id '{}'", node),
                    );
                }
            }
        }
    }

    fn check_index(&mut self, path: &str, index: Option<i64>) {
        match index {
            Some(index) if index < 0 => {
                self.push(format!("{}.index", path), "must be non-negative")
            }
            Some(_) => {}
            None => self.push(format!("{}.index", path), "is required"),
        }
    }

    fn check_font(&mut self, path: &str, font: &FontOperation) {
        let Some(kind) = font.kind() else {
            self.push(
                format!("{}.op", path),
                format!("'{}' is not a recognised font operation", font.op),
            );
            return;
        };

        if font.font.trim().is_empty() {
            self.push(format!("{}.font", path), "is required");
        }
        self.check_page(path, font.page);

        match kind {
            FontOpKind::WriteCidSet => {
                if font.cids.is_empty() {
                    self.push(format!("{}.cids", path), "must list at least one CID");
                }
                if font.cids.iter().any(|&cid| !(0..=0xFFFF).contains(&cid)) {
                    self.push(format!("{}.cids", path), "CIDs must be between 0 and 65535");
                }
            }
            FontOpKind::WriteCharSet => {
                if font.glyph_names.is_empty() {
                    self.push(
                        format!("{}.glyph_names", path),
                        "must list at least one glyph name",
                    );
                }
                if font
                    .glyph_names
                    .iter()
                    .any(|name| name.is_empty() || name.contains(char::is_whitespace))
                {
                    self.push(
                        format!("{}.glyph_names", path),
                        "glyph names must be non-empty and contain no whitespace",
                    );
                }
            }
            FontOpKind::SetEncoding => match font.encoding.as_deref() {
                Some(encoding) if FONT_ENCODINGS.contains(&encoding) => {}
                Some(other) => self.push(
                    format!("{}.encoding", path),
                    format!("'{}' is not a recognised encoding", other),
                ),
                None => self.push(format!("{}.encoding", path), "is required"),
            },
            FontOpKind::SetDifferences => {
                if font.differences.is_empty() {
                    self.push(format!("{}.differences", path), "must not be empty");
                }
                self.check_codes(&format!("{}.differences", path), font.differences.keys(), 0xFF);
                if font.differences.values().any(|name| name.trim().is_empty()) {
                    self.push(
                        format!("{}.differences", path),
                        "glyph names must not be empty",
                    );
                }
            }
            FontOpKind::WriteToUnicode => {
                if font.mappings.is_empty() {
                    self.push(format!("{}.mappings", path), "must not be empty");
                }
                self.check_codes(&format!("{}.mappings", path), font.mappings.keys(), 0xFFFF);
            }
            FontOpKind::SetWidths => {
                if font.widths.is_empty() {
                    self.push(format!("{}.widths", path), "must not be empty");
                }
                self.check_codes(&format!("{}.widths", path), font.widths.keys(), 0xFFFF);
                if font.widths.values().any(|w| !w.is_finite() || *w < 0.0) {
                    self.push(
                        format!("{}.widths", path),
                        "widths must be finite and non-negative",
                    );
                }
            }
            FontOpKind::AddFontDescriptor => {}
        }
    }

    /// The font's own codespace is checked when the operation runs.
    fn check_codes<'a>(
        &mut self,
        path: &str,
        mut codes: impl Iterator<Item = &'a CharCode>,
        max: u32,
    ) {
        if let Some(code) = codes.find(|code| code.0 > max) {
            self.push(
                path.to_string(),
                format!("character code {} is above {:#X}", code.0, max),
            );
        }
    }

    fn check_ocr(&mut self, path: &str, page: &OcrPage) {
        self.check_page(path, page.page);
        for (i, word) in page.words.iter().enumerate() {
            let word_path = format!("{}.words[{}]", path, i);
            if word.text.trim().is_empty() {
                self.push(format!("{}.text", word_path), "is required");
            }
            self.check_required_bbox(&format!("{}.bbox", word_path), word.bbox.as_ref());
            if let Some(confidence) = word.confidence {
                if !(0.0..=1.0).contains(&confidence) {
                    self.push(
                        format!("{}.confidence", word_path),
                        "must be between 0 and 1",
                    );
                }
            }
        }
    }
}

/// BCP 47-shaped language tag (`en`, `fr-CA`, `zh-Hant-TW`).
fn language_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z]{2,8}(-[A-Za-z0-9]{1,8})*$").expect("language tag pattern compiles")
    })
}
