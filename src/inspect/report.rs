//! Inspection report types and their JSON rendering.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::content::OperatorKind;
use crate::error::{Error, Result};
use crate::font::truetype::CmapSubtable;
use crate::geometry::BoundingBox;

/// Structural snapshot of one PDF.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionReport {
    pub document: DocumentReport,
    pub fonts: Vec<FontReport>,
    pub structure_tree: Option<StructureTreeReport>,
    pub role_map: BTreeMap<String, String>,
    pub pages: Vec<PageReport>,
    pub outlines: Vec<OutlineReport>,
    pub embedded_files: Vec<EmbeddedFileReport>,
    pub ocg_configurations: Vec<OcgConfigurationReport>,
    pub color_pairs: Vec<ColorPairReport>,
}

impl InspectionReport {
    /// Font by object label (`"12 0"`).
    pub fn font(&self, object_id: &str) -> Option<&FontReport> {
        self.fonts.iter().find(|f| f.object_id == object_id)
    }

    /// Page by 1-indexed number.
    pub fn page(&self, number: u32) -> Option<&PageReport> {
        self.pages.iter().find(|p| p.number == number)
    }
}

/// Document-level facts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReport {
    /// SHA-256 of the input bytes, lowercase hex
    pub file_hash: String,
    pub file_size_bytes: u64,
    pub pdf_version: String,
    pub page_count: u32,
    /// `/MarkInfo /Marked true`
    pub tagged: bool,
    pub language: Option<String>,
    pub info: BTreeMap<String, String>,
    /// `/CreationDate` from the info dictionary, when it parses
    pub creation_date: Option<DateTime<FixedOffset>>,
    pub mod_date: Option<DateTime<FixedOffset>>,
    pub xmp_metadata: Option<String>,
    pub pdfua_part: Option<i64>,
    pub display_doc_title: Option<bool>,
    pub has_struct_tree_root: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontReport {
    pub object_id: String,
    /// Resource names the font is registered under, across pages.
    pub resource_names: Vec<String>,
    pub subtype: String,
    pub base_font: String,
    pub embedded: bool,
    /// FontDescriptor flag bit 3.
    pub symbolic: Option<bool>,
    pub has_font_descriptor: bool,
    pub encoding: Option<EncodingReport>,
    pub has_to_unicode: bool,
    pub to_unicode: Option<ToUnicodeReport>,
    pub cid_system_info: Option<CidSystemInfoReport>,
    pub cmap: Option<CMapReport>,
    pub cid_to_gid_map: Option<String>,
    pub font_program: Option<FontProgramReport>,
    pub type3: Option<Type3Report>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingReport {
    pub name: Option<String>,
    pub base_encoding: Option<String>,
    pub differences: BTreeMap<u32, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToUnicodeReport {
    pub mapping_count: usize,
    pub valid: bool,
    pub maps_notdef: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CidSystemInfoReport {
    pub registry: Option<String>,
    pub ordering: Option<String>,
    pub supplement: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CMapReport {
    pub name: Option<String>,
    pub embedded: bool,
    pub w_mode: Option<i64>,
    /// `cmap` table subtables of an embedded TrueType program.
    pub subtables: Vec<CmapSubtable>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontProgramReport {
    /// FontFile, FontFile2 or FontFile3
    pub key: String,
    pub subtype: Option<String>,
    pub length: usize,
    pub filters: Vec<String>,
    pub decode_parms: Vec<BTreeMap<String, String>>,
    /// SHA-256 of the stored (undecoded) bytes
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_hex: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Type3Report {
    pub glyph_names: Vec<String>,
    pub used_codes: Vec<u32>,
    pub unicode: BTreeMap<u32, String>,
    pub font_matrix: Vec<f64>,
    pub has_font_descriptor: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureTreeReport {
    pub children: Vec<StructureElementReport>,
    pub parent_tree_entries: usize,
    pub parent_tree_next_key: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureElementReport {
    pub object_id: Option<String>,
    pub role: String,
    /// Role after following the RoleMap, when it differs.
    pub standard_role: Option<String>,
    pub id: Option<String>,
    pub title: Option<String>,
    pub language: Option<String>,
    pub alt_text: Option<String>,
    pub actual_text: Option<String>,
    pub attributes: Vec<AttributeReport>,
    pub has_bbox: bool,
    pub page: Option<u32>,
    pub content: Vec<McidReference>,
    /// Object labels of annotations referenced through OBJR kids.
    pub annotations: Vec<String>,
    pub children: Vec<StructureElementReport>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeReport {
    pub owner: Option<String>,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McidReference {
    pub page: Option<u32>,
    pub mcid: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReport {
    pub number: u32,
    pub object_id: String,
    pub width: f64,
    pub height: f64,
    pub rotation: i64,
    pub tab_order: Option<String>,
    pub struct_parents: Option<i64>,
    pub content_operators: Vec<OperatorReport>,
    pub annotations: Vec<AnnotationReport>,
    pub fonts_used: Vec<String>,
    /// MCIDs opened in the content stream.
    pub mcids: Vec<i64>,
    /// MCIDs with a parent element in the ParentTree.
    pub structured_mcids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorReport {
    pub index: usize,
    pub operator: String,
    pub kind: OperatorKind,
    pub bbox: Option<BoundingBox>,
    pub artifact: bool,
    pub marked_content: bool,
    pub mcid: Option<i64>,
    pub text: Option<String>,
    pub font: Option<String>,
    pub unicode_mapped: bool,
    pub invisible: bool,
    pub fill_color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationReport {
    pub index: usize,
    pub object_id: Option<String>,
    pub subtype: Option<String>,
    pub rect: Option<BoundingBox>,
    pub contents: Option<String>,
    pub struct_parent: Option<i64>,
    pub field_type: Option<String>,
    pub field_name: Option<String>,
    pub tooltip: Option<String>,
    pub flags: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineReport {
    pub title: String,
    pub page: Option<u32>,
    pub open: bool,
    pub has_structure_element: bool,
    pub children: Vec<OutlineReport>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedFileReport {
    pub name: String,
    pub file_name: Option<String>,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub af_relationship: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcgConfigurationReport {
    pub is_default: bool,
    pub name: Option<String>,
    pub creator: Option<String>,
    pub base_state: Option<String>,
    pub on: Vec<String>,
    pub off: Vec<String>,
    pub order_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorPairReport {
    pub foreground: String,
    pub background: String,
    pub count: usize,
    /// WCAG 2.x contrast ratio, rounded to two decimals
    pub contrast_ratio: f64,
}

/// JSON output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonFormat {
    /// Pretty-printed JSON with indentation
    #[default]
    Pretty,
    /// Compact JSON without extra whitespace
    Compact,
}

/// Serialize a report.
pub fn to_json(report: &InspectionReport, format: JsonFormat) -> Result<String> {
    let result = match format {
        JsonFormat::Pretty => serde_json::to_string_pretty(report),
        JsonFormat::Compact => serde_json::to_string(report),
    };

    result.map_err(|e| Error::Render(format!("JSON serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InspectionReport {
        let mut report = InspectionReport::default();
        report.document.file_size_bytes = 1024;
        report.document.page_count = 1;
        report.pages.push(PageReport {
            number: 1,
            struct_parents: Some(0),
            ..PageReport::default()
        });
        report
    }

    #[test]
    fn test_to_json_pretty_uses_camel_case() {
        let json = to_json(&sample(), JsonFormat::Pretty).unwrap();
        assert!(json.contains("\"fileSizeBytes\": 1024"));
        assert!(json.contains("\"structParents\": 0"));
        assert!(json.contains("\"ocgConfigurations\""));
        assert!(json.contains('\n'));
    }

    #[test]
    fn test_to_json_compact() {
        let json = to_json(&sample(), JsonFormat::Compact).unwrap();
        assert!(!json.contains('\n'));
        let parsed: InspectionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.pages[0].number, 1);
    }

    #[test]
    fn test_raw_font_bytes_omitted_when_absent() {
        let program = FontProgramReport {
            key: "FontFile2".to_string(),
            ..FontProgramReport::default()
        };
        let json = serde_json::to_string(&program).unwrap();
        assert!(!json.contains("rawHex"));
        assert!(json.contains("decodeParms"));
    }
}
