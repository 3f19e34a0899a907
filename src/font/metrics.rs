//! Font resources as the content scanner sees them: code splitting, glyph
//! advances, and text decoding.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::cmap::ToUnicodeCMap;
use super::encoding::{base_encoding_decode, glyph_to_unicode, parse_differences};
use crate::pdf::objects::{
    dict_get, dict_get_array, dict_get_dict, dict_get_name, dict_get_number, number, resolve,
};

/// Advance used for codes without a declared width, in glyph units.
const DEFAULT_SIMPLE_WIDTH: f64 = 500.0;
/// CIDFont `/DW` default.
const DEFAULT_CID_WIDTH: f64 = 1000.0;

/// A font resource with the data needed to measure and decode shown text.
#[derive(Debug, Clone)]
pub struct LoadedFont {
    pub id: Option<ObjectId>,
    pub subtype: String,
    pub base_font: String,
    /// Type0 fonts use two-byte codes.
    pub composite: bool,
    widths: BTreeMap<u32, f64>,
    default_width: f64,
    /// Type3 FontMatrix `a`; other fonts use 1/1000.
    type3_scale: Option<f64>,
    to_unicode: Option<ToUnicodeCMap>,
    base_encoding: Option<String>,
    differences: BTreeMap<u32, String>,
}

impl LoadedFont {
    /// Read a font dictionary.
    pub fn load(doc: &Document, font: &Dictionary, id: Option<ObjectId>) -> Self {
        let subtype = dict_get_name(doc, font, b"Subtype").unwrap_or_default();
        let base_font = dict_get_name(doc, font, b"BaseFont").unwrap_or_default();
        let composite = subtype == "Type0";

        let to_unicode = match dict_get(doc, font, b"ToUnicode") {
            Some(Object::Stream(stream)) => {
                let data = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                ToUnicodeCMap::parse(&data).ok()
            }
            _ => None,
        };

        let (base_encoding, differences) = match dict_get(doc, font, b"Encoding") {
            Some(Object::Name(name)) => (
                Some(String::from_utf8_lossy(name).to_string()),
                BTreeMap::new(),
            ),
            Some(Object::Dictionary(enc)) => (
                dict_get_name(doc, enc, b"BaseEncoding"),
                dict_get_array(doc, enc, b"Differences")
                    .map(|array| parse_differences(doc, array))
                    .unwrap_or_default(),
            ),
            _ => (None, BTreeMap::new()),
        };

        let (widths, default_width) = if composite {
            descendant_font(doc, font)
                .map(|cid_font| {
                    let widths = dict_get_array(doc, cid_font, b"W")
                        .map(|array| parse_cid_widths(doc, array))
                        .unwrap_or_default();
                    let dw = dict_get_number(doc, cid_font, b"DW").unwrap_or(DEFAULT_CID_WIDTH);
                    (widths, dw)
                })
                .unwrap_or((BTreeMap::new(), DEFAULT_CID_WIDTH))
        } else {
            let missing = dict_get_dict(doc, font, b"FontDescriptor")
                .and_then(|fd| dict_get_number(doc, fd, b"MissingWidth"))
                .filter(|w| *w > 0.0)
                .unwrap_or(DEFAULT_SIMPLE_WIDTH);
            (simple_widths(doc, font), missing)
        };

        let type3_scale = if subtype == "Type3" {
            dict_get_array(doc, font, b"FontMatrix")
                .and_then(|m| m.first())
                .and_then(|a| number(resolve(doc, a)))
        } else {
            None
        };

        Self {
            id,
            subtype,
            base_font,
            composite,
            widths,
            default_width,
            type3_scale,
            to_unicode,
            base_encoding,
            differences,
        }
    }

    /// A stand-in for a font resource that cannot be found.
    pub fn missing() -> Self {
        Self {
            id: None,
            subtype: String::new(),
            base_font: String::new(),
            composite: false,
            widths: BTreeMap::new(),
            default_width: DEFAULT_SIMPLE_WIDTH,
            type3_scale: None,
            to_unicode: None,
            base_encoding: None,
            differences: BTreeMap::new(),
        }
    }

    /// Split a shown string into character codes.
    pub fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.composite {
            bytes
                .chunks(2)
                .map(|pair| pair.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
                .collect()
        } else {
            bytes.iter().map(|b| *b as u32).collect()
        }
    }

    /// Horizontal advance of a code in text space for a 1-point font.
    pub fn advance(&self, code: u32) -> f64 {
        let width = self.widths.get(&code).copied().unwrap_or(self.default_width);
        match self.type3_scale {
            Some(scale) => width * scale,
            None => width / 1000.0,
        }
    }

    pub fn has_to_unicode(&self) -> bool {
        self.to_unicode.is_some()
    }

    /// Unicode text for one code, if the font defines it.
    pub fn unicode(&self, code: u32) -> Option<String> {
        if let Some(cmap) = &self.to_unicode {
            return cmap.get(code).map(str::to_string);
        }
        if self.composite {
            return None;
        }
        if let Some(glyph) = self.differences.get(&code) {
            return glyph_to_unicode(glyph);
        }
        if self.subtype == "Type3" {
            return None;
        }
        base_encoding_decode(self.base_encoding.as_deref(), code).map(|c| c.to_string())
    }

    /// Decode codes to text; the flag is false when any code has no mapping.
    pub fn decode(&self, codes: &[u32]) -> (String, bool) {
        let mut text = String::new();
        let mut complete = true;
        for code in codes {
            match self.unicode(*code) {
                Some(s) => text.push_str(&s),
                None => complete = false,
            }
        }
        (text, complete)
    }
}

/// First descendant of a Type0 font.
pub fn descendant_font<'a>(doc: &'a Document, font: &'a Dictionary) -> Option<&'a Dictionary> {
    let descendants = dict_get_array(doc, font, b"DescendantFonts")?;
    match resolve(doc, descendants.first()?) {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// `FirstChar`/`Widths` of a simple font as code → width.
pub fn simple_widths(doc: &Document, font: &Dictionary) -> BTreeMap<u32, f64> {
    let first = dict_get_number(doc, font, b"FirstChar").unwrap_or(0.0).max(0.0) as u32;
    dict_get_array(doc, font, b"Widths")
        .map(|widths| {
            widths
                .iter()
                .enumerate()
                .filter_map(|(i, w)| number(resolve(doc, w)).map(|w| (first + i as u32, w)))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a CIDFont `/W` array.
///
/// Both forms are accepted: `c [w1 w2 …]` and `c_first c_last w`.
pub fn parse_cid_widths(doc: &Document, array: &[Object]) -> BTreeMap<u32, f64> {
    let mut widths = BTreeMap::new();
    let items: Vec<&Object> = array.iter().map(|o| resolve(doc, o)).collect();
    let mut i = 0;
    while i < items.len() {
        let Some(start) = number(items[i]) else {
            i += 1;
            continue;
        };
        let start = start.max(0.0) as u32;
        match items.get(i + 1) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    if let Some(w) = number(resolve(doc, w)) {
                        widths.insert(start + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(end) => {
                let end = number(end).map(|e| e.max(0.0) as u32);
                let width = items.get(i + 2).and_then(|w| number(w));
                if let (Some(end), Some(width)) = (end, width) {
                    for cid in start..=end.min(start.saturating_add(0xFFFF)) {
                        widths.insert(cid, width);
                    }
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

/// Write a CIDFont `/W` array using `c [w …]` runs of consecutive CIDs.
pub fn cid_widths_array(widths: &BTreeMap<u32, f64>) -> Vec<Object> {
    let mut array = Vec::new();
    let mut run: Vec<Object> = Vec::new();
    let mut run_start = 0u32;
    let mut next: Option<u32> = None;
    for (cid, width) in widths {
        if next != Some(*cid) {
            if !run.is_empty() {
                array.push(Object::Integer(run_start as i64));
                array.push(Object::Array(std::mem::take(&mut run)));
            }
            run_start = *cid;
        }
        run.push(crate::pdf::objects::real(*width));
        next = Some(cid + 1);
    }
    if !run.is_empty() {
        array.push(Object::Integer(run_start as i64));
        array.push(Object::Array(run));
    }
    array
}
