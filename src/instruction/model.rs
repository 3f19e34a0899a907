//! Instruction set types.
//!
//! These mirror the remediation DSL one-to-one. Scalar fields that carry
//! business rules (pages, enum strings, spans) are kept loose here so that a
//! bad value becomes a validation error instead of a deserialization failure.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::geometry::BoundingBox;

/// Accessibility roles accepted for structure nodes (case-sensitive).
pub const STRUCTURE_ROLES: &[&str] = &[
    "Document", "DocumentFragment", "Part", "Art", "Sect", "Div", "Aside", "NonStruct",
    "Private", "BlockQuote", "Caption", "TOC", "TOCI", "Index", "Title", "P", "H", "H1", "H2",
    "H3", "H4", "H5", "H6", "L", "LI", "Lbl", "LBody", "Table", "TR", "TH", "TD", "THead",
    "TBody", "TFoot", "Span", "Quote", "Note", "FENote", "Reference", "BibEntry", "Code", "Link",
    "Annot", "Ruby", "RB", "RT", "RP", "Warichu", "WT", "WP", "Figure", "Formula", "Form", "Sub",
    "Em", "Strong", "Artifact",
];

/// Header cell scopes (case-sensitive).
pub const HEADER_SCOPES: &[&str] = &["Row", "Column", "Both"];

/// Artifact classifications (case-insensitive).
pub const ARTIFACT_TYPES: &[&str] = &["layout", "header", "footer", "pagination", "background"];

/// Page tab orders, short and long forms (case-insensitive).
pub const TAB_ORDERS: &[&str] = &["S", "R", "C", "structure", "row", "column"];

/// Annotation operations.
pub const ANNOTATION_OPS: &[&str] = &["set_contents", "set_tu", "associate", "create_widget"];

/// Form field types for synthesized widgets (case-sensitive).
pub const FIELD_TYPES: &[&str] = &["Tx", "Btn", "Ch"];

/// Font operations.
pub const FONT_OPS: &[&str] = &[
    "write_cidset",
    "write_charset",
    "set_encoding",
    "set_differences",
    "write_tounicode",
    "set_widths",
    "add_font_descriptor",
];

/// Encoding names accepted by `set_encoding`.
pub const FONT_ENCODINGS: &[&str] = &[
    "StandardEncoding",
    "WinAnsiEncoding",
    "MacRomanEncoding",
    "MacExpertEncoding",
    "Identity-H",
    "Identity-V",
];

/// The only DSL version understood by this crate.
pub const SUPPORTED_VERSION: &str = "1.0";

/// Root of a remediation instruction document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstructionSet {
    #[serde(default, deserialize_with = "deserialize_version")]
    pub version: Option<String>,
    #[serde(default)]
    pub metadata: Option<MetadataInstruction>,
    #[serde(default)]
    pub structure: Option<StructureInstruction>,
    #[serde(default)]
    pub content_tagging: Vec<ContentTaggingEntry>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactEntry>,
    #[serde(default)]
    pub annotations: Vec<AnnotationOperation>,
    #[serde(default)]
    pub bookmarks: Option<BookmarksInstruction>,
    #[serde(default)]
    pub fonts: Vec<FontOperation>,
    #[serde(default)]
    pub ocr: Vec<OcrPage>,
}

impl InstructionSet {
    /// Create an empty instruction set at the supported version.
    pub fn new() -> Self {
        Self {
            version: Some(SUPPORTED_VERSION.to_string()),
            ..Self::default()
        }
    }

    /// Visit every structure node depth-first, parents before children.
    pub fn structure_nodes(&self) -> Vec<&StructureNode> {
        let mut nodes = Vec::new();
        if let Some(structure) = &self.structure {
            collect_nodes(&structure.root, &mut nodes);
        }
        nodes
    }
}

fn collect_nodes<'a>(node: &'a StructureNode, out: &mut Vec<&'a StructureNode>) {
    out.push(node);
    for child in &node.children {
        collect_nodes(child, out);
    }
}

/// Document-level metadata settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataInstruction {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "display_doc_title")]
    pub display_doc_title: Option<bool>,
    #[serde(default, rename = "mark_info")]
    pub mark_info: Option<bool>,
    #[serde(default, rename = "pdfua_identifier")]
    pub pdfua_identifier: Option<i64>,
    #[serde(default, rename = "tab_order")]
    pub tab_order: Option<String>,
}

/// The structure section: a root node plus build options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureInstruction {
    /// Remove any existing tag tree before building.
    #[serde(default, rename = "strip_existing")]
    pub strip_existing: bool,
    /// Root element; its fields sit inline in the section.
    #[serde(flatten)]
    pub root: StructureNode,
}

/// One node of the declared tag tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureNode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, rename = "alt_text")]
    pub alt_text: Option<String>,
    #[serde(default, rename = "actual_text")]
    pub actual_text: Option<String>,
    #[serde(default, rename = "element_id")]
    pub element_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default, rename = "colspan")]
    pub colspan: Option<i64>,
    #[serde(default, rename = "rowspan")]
    pub rowspan: Option<i64>,
    #[serde(default)]
    pub attributes: Vec<StructureAttribute>,
    #[serde(default)]
    pub children: Vec<StructureNode>,
}

impl StructureNode {
    /// Create a node with the given role and no children.
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Self::default()
        }
    }

    /// Set the node id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Append a child node.
    pub fn with_child(mut self, child: StructureNode) -> Self {
        self.children.push(child);
        self
    }

    /// Heading level for H1..H6 roles.
    pub fn heading_level(&self) -> Option<u8> {
        heading_level(&self.role)
    }
}

/// Heading level (1-6) of a role name, if it is a numbered heading.
pub fn heading_level(role: &str) -> Option<u8> {
    match role.as_bytes() {
        [b'H', d @ b'1'..=b'6'] => Some(d - b'0'),
        _ => None,
    }
}

/// An attribute triple attached to a structure element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureAttribute {
    pub owner: String,
    pub key: String,
    pub value: AttributeValue,
}

/// Scalar attribute value.
///
/// Text beginning with `/` is written as a PDF name (`/Block`), other text
/// as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

/// Links a declared region of a page to a structure node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentTaggingEntry {
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

/// Marks a declared region as an artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Artifact classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Layout,
    Header,
    Footer,
    Pagination,
    Background,
}

impl ArtifactKind {
    /// Parse an artifact type, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "layout" => Some(Self::Layout),
            "header" => Some(Self::Header),
            "footer" => Some(Self::Footer),
            "pagination" => Some(Self::Pagination),
            "background" => Some(Self::Background),
            _ => None,
        }
    }

    /// PDF `/Type` and optional `/Subtype` for the artifact property list.
    pub fn pdf_type(self) -> (&'static str, Option<&'static str>) {
        match self {
            Self::Layout => ("Layout", None),
            Self::Header => ("Pagination", Some("Header")),
            Self::Footer => ("Pagination", Some("Footer")),
            Self::Pagination => ("Pagination", None),
            Self::Background => ("Background", None),
        }
    }
}

/// Page tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabOrder {
    Structure,
    Row,
    Column,
}

impl TabOrder {
    /// Parse a tab order in short (`S`) or long (`structure`) form, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "s" | "structure" => Some(Self::Structure),
            "r" | "row" => Some(Self::Row),
            "c" | "column" => Some(Self::Column),
            _ => None,
        }
    }

    /// Value of the page `/Tabs` entry.
    pub fn pdf_name(self) -> &'static str {
        match self {
            Self::Structure => "S",
            Self::Row => "R",
            Self::Column => "C",
        }
    }
}

/// An annotation mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationOperation {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub index: Option<i64>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub rect: Option<BoundingBox>,
    #[serde(default, rename = "field_name")]
    pub field_name: Option<String>,
    #[serde(default, rename = "field_type")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub tooltip: Option<String>,
}

impl AnnotationOperation {
    /// The parsed operation, if `op` names a known one.
    pub fn kind(&self) -> Option<AnnotationOpKind> {
        AnnotationOpKind::parse(&self.op)
    }
}

/// Known annotation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationOpKind {
    SetContents,
    SetTu,
    Associate,
    CreateWidget,
}

impl AnnotationOpKind {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "set_contents" => Some(Self::SetContents),
            "set_tu" => Some(Self::SetTu),
            "associate" => Some(Self::Associate),
            "create_widget" => Some(Self::CreateWidget),
            _ => None,
        }
    }
}

/// A font resource mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontOperation {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub font: String,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub cids: Vec<i64>,
    #[serde(default, rename = "glyph_names")]
    pub glyph_names: Vec<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub differences: BTreeMap<CharCode, String>,
    #[serde(default)]
    pub mappings: BTreeMap<CharCode, String>,
    #[serde(default)]
    pub widths: BTreeMap<CharCode, f64>,
}

impl FontOperation {
    /// The parsed operation, if `op` names a known one.
    pub fn kind(&self) -> Option<FontOpKind> {
        FontOpKind::parse(&self.op)
    }
}

/// Known font operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontOpKind {
    WriteCidSet,
    WriteCharSet,
    SetEncoding,
    SetDifferences,
    WriteToUnicode,
    SetWidths,
    AddFontDescriptor,
}

impl FontOpKind {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "write_cidset" => Some(Self::WriteCidSet),
            "write_charset" => Some(Self::WriteCharSet),
            "set_encoding" => Some(Self::SetEncoding),
            "set_differences" => Some(Self::SetDifferences),
            "write_tounicode" => Some(Self::WriteToUnicode),
            "set_widths" => Some(Self::SetWidths),
            "add_font_descriptor" => Some(Self::AddFontDescriptor),
            _ => None,
        }
    }
}

/// A character code key in font mapping tables.
///
/// Accepts integers, decimal strings, `0x` hex strings and `<..>` hex strings,
/// so YAML integer keys and JSON string keys read the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CharCode(pub u32);

impl CharCode {
    /// Parse the textual forms of a character code.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let parsed = if let Some(hex) = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
        {
            u32::from_str_radix(hex, 16).ok()
        } else if let Some(hex) = text.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
            u32::from_str_radix(hex, 16).ok()
        } else {
            text.parse::<u32>().ok()
        };
        parsed.map(CharCode)
    }
}

impl Serialize for CharCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for CharCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct CharCodeVisitor;

        impl Visitor<'_> for CharCodeVisitor {
            type Value = CharCode;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a character code as an integer or a decimal/hex string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<CharCode, E> {
                u32::try_from(v)
                    .map(CharCode)
                    .map_err(|_| E::custom(format!("character code {} out of range", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<CharCode, E> {
                u32::try_from(v)
                    .map(CharCode)
                    .map_err(|_| E::custom(format!("character code {} out of range", v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<CharCode, E> {
                CharCode::parse(v)
                    .ok_or_else(|| E::custom(format!("invalid character code '{}'", v)))
            }
        }

        deserializer.deserialize_any(CharCodeVisitor)
    }
}

/// OCR results for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub words: Vec<OcrWord>,
}

/// One recognized word.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Outline generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarksInstruction {
    #[serde(default, rename = "generate_from_headings")]
    pub generate_from_headings: bool,
}

/// Read `version` from a string or a bare number (`1.0` in YAML).
fn deserialize_version<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct VersionVisitor;

    impl<'de> Visitor<'de> for VersionVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a version string such as \"1.0\"")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
            Ok(Some(format!("{:?}", v)))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2: Deserializer<'de>>(
            self,
            deserializer: D2,
        ) -> std::result::Result<Self::Value, D2::Error> {
            deserializer.deserialize_any(VersionVisitor)
        }
    }

    deserializer.deserialize_any(VersionVisitor)
}
