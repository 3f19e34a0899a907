//! Read-only structural inspection of a PDF.
//!
//! The [`Inspector`] walks fonts, the tag tree, page content, annotations,
//! outlines, embedded files and optional content, and assembles an
//! [`InspectionReport`] that serializes to camelCase JSON.
//!
//! ```no_run
//! use pdfremedy::inspect::{to_json, Inspector, JsonFormat};
//!
//! fn main() -> pdfremedy::Result<()> {
//!     let bytes = std::fs::read("tagged.pdf")?;
//!     let report = Inspector::default().inspect(&bytes)?;
//!     println!("{}", to_json(&report, JsonFormat::Pretty)?);
//!     Ok(())
//! }
//! ```

mod colors;
mod fonts;
mod navigation;
mod pages;
mod report;
mod structure;

pub use colors::{contrast_ratio, PAGE_BACKGROUND};
pub use report::*;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use lopdf::{Dictionary, Document, Object, ObjectId};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::detect::detect_format_from_bytes;
use crate::error::Result;
use crate::interpret::tree::collect_nums;
use crate::pdf::objects::{dict_get, dict_get_dict, object_label, reference, resolve_dict};
use crate::pdf::text::{decode_text_string, dict_string, parse_pdf_date};
use crate::pdf::DocumentHandle;

/// What the inspector includes beyond the always-present sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectOptions {
    /// Embed undecoded font program bytes as hex.
    pub font_programs: bool,
    /// List every drawing operator of every page.
    pub content_operators: bool,
    /// Compute text/background colour pairs.
    pub color_pairs: bool,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            font_programs: false,
            content_operators: true,
            color_pairs: true,
        }
    }
}

impl InspectOptions {
    pub fn with_font_programs(mut self, include: bool) -> Self {
        self.font_programs = include;
        self
    }

    pub fn with_content_operators(mut self, include: bool) -> Self {
        self.content_operators = include;
        self
    }

    pub fn with_color_pairs(mut self, include: bool) -> Self {
        self.color_pairs = include;
        self
    }
}

/// Builds inspection reports.
#[derive(Debug, Clone, Default)]
pub struct Inspector {
    options: InspectOptions,
}

impl Inspector {
    pub fn new(options: InspectOptions) -> Self {
        Self { options }
    }

    /// Inspect PDF bytes.
    pub fn inspect(&self, bytes: &[u8]) -> Result<InspectionReport> {
        let header = detect_format_from_bytes(bytes)?;
        let handle = DocumentHandle::load(bytes)?;
        let mut report = self.inspect_document(&handle)?;
        report.document.file_hash = hex::encode(Sha256::digest(bytes));
        report.document.file_size_bytes = bytes.len() as u64;
        report.document.pdf_version = header.version;
        Ok(report)
    }

    /// Inspect an already loaded document. File-level fields other than the
    /// version are left empty.
    pub fn inspect_document(&self, handle: &DocumentHandle) -> Result<InspectionReport> {
        let doc = handle.document();
        let catalog = handle.catalog()?;
        let pages = doc.get_pages();
        let page_numbers: BTreeMap<ObjectId, u32> =
            pages.iter().map(|(number, id)| (*id, *number)).collect();

        let struct_root_id = catalog.get(b"StructTreeRoot").ok().and_then(reference);
        let struct_root = dict_get_dict(doc, catalog, b"StructTreeRoot");
        let parent_tree: BTreeMap<i64, Object> = struct_root
            .and_then(|root| dict_get_dict(doc, root, b"ParentTree"))
            .map(|tree| {
                let mut nums = Vec::new();
                collect_nums(doc, tree, &mut nums, 0);
                nums.into_iter().collect()
            })
            .unwrap_or_default();

        let mut page_reports = Vec::with_capacity(pages.len());
        let mut scans = Vec::with_capacity(pages.len());
        let mut used_codes = BTreeMap::new();
        for (&number, &page_id) in &pages {
            let inspected = pages::inspect_page(
                handle,
                number,
                page_id,
                &parent_tree,
                self.options.content_operators,
            )?;
            pages::used_codes(&inspected, &fonts::page_font_ids(doc, page_id), &mut used_codes);
            page_reports.push(inspected.report);
            scans.push(inspected.scan);
        }
        log::debug!("Inspected {} page(s)", page_reports.len());

        let (structure_tree, role_map) = match struct_root {
            Some(root) => (
                Some(structure::structure_tree(
                    doc,
                    struct_root_id,
                    root,
                    &page_numbers,
                    parent_tree.len(),
                )),
                structure::role_map(doc, root),
            ),
            None => (None, BTreeMap::new()),
        };

        Ok(InspectionReport {
            document: document_report(handle, &pages)?,
            fonts: fonts::collect_fonts(doc, &pages, &used_codes, &self.options),
            structure_tree,
            role_map,
            pages: page_reports,
            outlines: navigation::outlines(doc, catalog, &page_numbers),
            embedded_files: navigation::embedded_files(doc, catalog),
            ocg_configurations: navigation::ocg_configurations(doc, catalog),
            color_pairs: if self.options.color_pairs {
                colors::color_pairs(&scans)
            } else {
                Vec::new()
            },
        })
    }
}

fn document_report(
    handle: &DocumentHandle,
    pages: &BTreeMap<u32, ObjectId>,
) -> Result<DocumentReport> {
    let doc = handle.document();
    let catalog = handle.catalog()?;
    let xmp_metadata = xmp_text(doc, catalog);
    let pdfua_part = xmp_metadata.as_deref().and_then(pdfua_part);

    let info: BTreeMap<String, String> = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|info| resolve_dict(doc, info))
        .map(|info| {
            info.iter()
                .map(|(key, value)| {
                    (String::from_utf8_lossy(key).to_string(), display_object(doc, value))
                })
                .collect()
        })
        .unwrap_or_default();

    let creation_date = info.get("CreationDate").and_then(|d| parse_pdf_date(d));
    let mod_date = info.get("ModDate").and_then(|d| parse_pdf_date(d));

    Ok(DocumentReport {
        pdf_version: doc.version.clone(),
        page_count: pages.len() as u32,
        tagged: dict_get_dict(doc, catalog, b"MarkInfo")
            .and_then(|mark| dict_get(doc, mark, b"Marked"))
            .is_some_and(|marked| matches!(marked, Object::Boolean(true))),
        language: dict_string(doc, catalog, b"Lang"),
        info,
        creation_date,
        mod_date,
        xmp_metadata,
        pdfua_part,
        display_doc_title: dict_get_dict(doc, catalog, b"ViewerPreferences")
            .and_then(|prefs| dict_get(doc, prefs, b"DisplayDocTitle"))
            .and_then(|value| value.as_bool().ok()),
        has_struct_tree_root: catalog.has(b"StructTreeRoot"),
        ..DocumentReport::default()
    })
}

fn xmp_text(doc: &Document, catalog: &Dictionary) -> Option<String> {
    let Some(Object::Stream(stream)) = dict_get(doc, catalog, b"Metadata") else {
        return None;
    };
    let bytes = if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()?
    } else {
        stream.content.clone()
    };
    Some(String::from_utf8_lossy(&bytes).to_string())
}

fn pdfua_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"pdfuaid:part\s*(?:=\s*["']\s*(\d+)|>\s*(\d+))"#).expect("part pattern compiles")
    })
}

/// `pdfuaid:part` from an XMP packet, attribute or element form.
fn pdfua_part(xmp: &str) -> Option<i64> {
    let caps = pdfua_pattern().captures(xmp)?;
    caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()
}

/// Compact text rendering of an object for report fields.
pub(crate) fn display_object(doc: &Document, obj: &Object) -> String {
    match obj {
        Object::Null => "null".to_string(),
        Object::Boolean(b) => b.to_string(),
        Object::Integer(i) => i.to_string(),
        Object::Real(r) => r.to_string(),
        Object::Name(n) => format!("/{}", String::from_utf8_lossy(n)),
        Object::String(bytes, _) => decode_text_string(bytes),
        Object::Array(items) => format!(
            "[{}]",
            items
                .iter()
                .map(|item| display_object(doc, item))
                .collect::<Vec<_>>()
                .join(" ")
        ),
        Object::Dictionary(dict) => format!(
            "<<{}>>",
            dict.iter()
                .map(|(k, v)| format!("/{} {}", String::from_utf8_lossy(k), display_object(doc, v)))
                .collect::<Vec<_>>()
                .join(" ")
        ),
        Object::Stream(stream) => format!("stream({} bytes)", stream.content.len()),
        Object::Reference(id) => format!("{} R", object_label(*id)),
    }
}
