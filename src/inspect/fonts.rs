//! Font resources: descriptors, encodings, ToUnicode maps and programs.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use sha2::{Digest, Sha256};

use super::report::{
    CMapReport, CidSystemInfoReport, EncodingReport, FontProgramReport, FontReport,
    ToUnicodeReport, Type3Report,
};
use super::{display_object, InspectOptions};
use crate::font::encoding::parse_differences;
use crate::font::truetype::cmap_subtables;
use crate::font::{descendant_font, LoadedFont, ToUnicodeCMap};
use crate::pdf::objects::{
    dict_get, dict_get_array, dict_get_dict, dict_get_name, dict_get_number, name, number,
    object_label, resolve,
};
use crate::pdf::text::dict_string;
use crate::pdf::page_resources;

/// FontDescriptor flag bit 3.
const FLAG_SYMBOLIC: i64 = 1 << 2;
const PROGRAM_KEYS: [&str; 3] = ["FontFile", "FontFile2", "FontFile3"];

/// Where a font dictionary lives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum FontKey {
    Object(ObjectId),
    /// Direct font dictionary: page number and resource name.
    Inline(u32, String),
}

impl FontKey {
    fn label(&self) -> String {
        match self {
            FontKey::Object(id) => object_label(*id),
            FontKey::Inline(page, name) => format!("page {} /{}", page, name),
        }
    }
}

/// Font object ids by resource name for one page.
pub fn page_font_ids(doc: &Document, page_id: ObjectId) -> BTreeMap<String, ObjectId> {
    page_resources(doc, page_id)
        .and_then(|resources| dict_get_dict(doc, resources, b"Font"))
        .map(|fonts| {
            fonts
                .iter()
                .filter_map(|(name, value)| match value {
                    Object::Reference(id) => Some((String::from_utf8_lossy(name).to_string(), *id)),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Every font in the page resources, deduplicated by object id.
///
/// `used_codes` holds the character codes shown with each font, used for
/// Type 3 detail.
pub fn collect_fonts(
    doc: &Document,
    pages: &BTreeMap<u32, ObjectId>,
    used_codes: &BTreeMap<ObjectId, BTreeSet<u32>>,
    options: &InspectOptions,
) -> Vec<FontReport> {
    let mut found: BTreeMap<FontKey, (Dictionary, BTreeSet<String>)> = BTreeMap::new();
    for (&number, &page_id) in pages {
        let Some(fonts) =
            page_resources(doc, page_id).and_then(|res| dict_get_dict(doc, res, b"Font"))
        else {
            continue;
        };
        for (resource, value) in fonts.iter() {
            let resource = String::from_utf8_lossy(resource).to_string();
            let key = match value {
                Object::Reference(id) => FontKey::Object(*id),
                _ => FontKey::Inline(number, resource.clone()),
            };
            let Object::Dictionary(dict) = resolve(doc, value) else {
                log::debug!("Font resource /{} on page {} is not a dictionary", resource, number);
                continue;
            };
            found
                .entry(key)
                .or_insert_with(|| (dict.clone(), BTreeSet::new()))
                .1
                .insert(resource);
        }
    }

    found
        .into_iter()
        .map(|(key, (dict, names))| {
            let id = match key {
                FontKey::Object(id) => Some(id),
                FontKey::Inline(..) => None,
            };
            let used = id.and_then(|id| used_codes.get(&id));
            let mut report = font_report(doc, &dict, id, used, options);
            report.object_id = key.label();
            report.resource_names = names.into_iter().collect();
            report
        })
        .collect()
}

fn font_report(
    doc: &Document,
    font: &Dictionary,
    id: Option<ObjectId>,
    used: Option<&BTreeSet<u32>>,
    options: &InspectOptions,
) -> FontReport {
    let subtype = dict_get_name(doc, font, b"Subtype").unwrap_or_default();
    let descendant = descendant_font(doc, font);
    // Composite fonts keep their descriptor on the descendant.
    let described = descendant.unwrap_or(font);
    let descriptor = dict_get_dict(doc, described, b"FontDescriptor");
    let program = descriptor.and_then(|fd| font_program(doc, fd, options));

    let symbolic = descriptor
        .and_then(|fd| dict_get_number(doc, fd, b"Flags"))
        .map(|flags| flags as i64 & FLAG_SYMBOLIC != 0);

    let subtables = program
        .as_ref()
        .map(|(_, data)| cmap_subtables(data))
        .unwrap_or_default();
    let cmap = if subtype == "Type0" || !subtables.is_empty() {
        let mut cmap = encoding_cmap(doc, font, &subtype);
        cmap.subtables = subtables;
        Some(cmap)
    } else {
        None
    };

    let to_unicode = match dict_get(doc, font, b"ToUnicode") {
        Some(Object::Stream(stream)) => Some(to_unicode_report(stream)),
        _ => None,
    };

    FontReport {
        object_id: String::new(),
        resource_names: Vec::new(),
        base_font: dict_get_name(doc, font, b"BaseFont").unwrap_or_default(),
        embedded: program.is_some(),
        symbolic,
        has_font_descriptor: descriptor.is_some(),
        encoding: encoding_report(doc, font),
        has_to_unicode: to_unicode.is_some(),
        to_unicode,
        cid_system_info: descendant.and_then(|cid| cid_system_info(doc, cid)),
        cmap,
        cid_to_gid_map: descendant.and_then(|cid| match dict_get(doc, cid, b"CIDToGIDMap") {
            Some(Object::Name(map)) => Some(String::from_utf8_lossy(map).to_string()),
            Some(Object::Stream(_)) => Some("stream".to_string()),
            _ => None,
        }),
        font_program: program.map(|(report, _)| report),
        type3: (subtype == "Type3").then(|| type3_report(doc, font, id, used, descriptor.is_some())),
        subtype,
    }
}

fn encoding_report(doc: &Document, font: &Dictionary) -> Option<EncodingReport> {
    match dict_get(doc, font, b"Encoding")? {
        Object::Name(encoding) => Some(EncodingReport {
            name: Some(String::from_utf8_lossy(encoding).to_string()),
            ..EncodingReport::default()
        }),
        Object::Dictionary(encoding) => Some(EncodingReport {
            name: None,
            base_encoding: dict_get_name(doc, encoding, b"BaseEncoding"),
            differences: dict_get_array(doc, encoding, b"Differences")
                .map(|array| parse_differences(doc, array))
                .unwrap_or_default(),
        }),
        Object::Stream(cmap) => Some(EncodingReport {
            name: dict_get_name(doc, &cmap.dict, b"CMapName"),
            ..EncodingReport::default()
        }),
        _ => None,
    }
}

/// The CMap of a composite font's `/Encoding`.
fn encoding_cmap(doc: &Document, font: &Dictionary, subtype: &str) -> CMapReport {
    match dict_get(doc, font, b"Encoding") {
        Some(Object::Name(cmap)) if subtype == "Type0" => CMapReport {
            name: Some(String::from_utf8_lossy(cmap).to_string()),
            ..CMapReport::default()
        },
        Some(Object::Stream(cmap)) => CMapReport {
            name: dict_get_name(doc, &cmap.dict, b"CMapName"),
            embedded: true,
            w_mode: dict_get_number(doc, &cmap.dict, b"WMode").map(|m| m as i64),
            subtables: Vec::new(),
        },
        _ => CMapReport::default(),
    }
}

fn to_unicode_report(stream: &Stream) -> ToUnicodeReport {
    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    match ToUnicodeCMap::parse(&data) {
        Ok(cmap) => ToUnicodeReport {
            mapping_count: cmap.len(),
            valid: cmap.is_valid(),
            maps_notdef: cmap.maps_notdef(),
        },
        Err(e) => {
            log::debug!("Unparseable ToUnicode map: {}", e);
            ToUnicodeReport::default()
        }
    }
}

fn cid_system_info(doc: &Document, cid_font: &Dictionary) -> Option<CidSystemInfoReport> {
    let info = dict_get_dict(doc, cid_font, b"CIDSystemInfo")?;
    Some(CidSystemInfoReport {
        registry: dict_string(doc, info, b"Registry"),
        ordering: dict_string(doc, info, b"Ordering"),
        supplement: dict_get_number(doc, info, b"Supplement").map(|s| s as i64),
    })
}

/// The embedded program and its decoded bytes.
fn font_program(
    doc: &Document,
    descriptor: &Dictionary,
    options: &InspectOptions,
) -> Option<(FontProgramReport, Vec<u8>)> {
    let (key, stream) = PROGRAM_KEYS.iter().find_map(|key| {
        match dict_get(doc, descriptor, key.as_bytes()) {
            Some(Object::Stream(stream)) => Some((*key, stream)),
            _ => None,
        }
    })?;
    let decoded = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let filters = filter_chain(doc, &stream.dict);
    let decode_parms = match dict_get(doc, &stream.dict, b"DecodeParms") {
        Some(Object::Array(items)) => items
            .iter()
            .map(|item| parameter_map(doc, resolve(doc, item)))
            .collect(),
        Some(item @ Object::Dictionary(_)) => vec![parameter_map(doc, item)],
        _ => Vec::new(),
    };

    let report = FontProgramReport {
        key: key.to_string(),
        subtype: dict_get_name(doc, &stream.dict, b"Subtype"),
        length: stream.content.len(),
        filters,
        decode_parms,
        sha256: hex::encode(Sha256::digest(&stream.content)),
        raw_hex: options
            .font_programs
            .then(|| hex::encode(&stream.content)),
    };
    Some((report, decoded))
}

/// Filter names with abbreviations expanded.
pub fn filter_chain(doc: &Document, dict: &Dictionary) -> Vec<String> {
    let filters: Vec<String> = match dict_get(doc, dict, b"Filter") {
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| name(resolve(doc, item)))
            .collect(),
        Some(obj) => name(obj).into_iter().collect(),
        None => Vec::new(),
    };
    filters
        .into_iter()
        .map(|filter| {
            match filter.as_str() {
                "Fl" => "FlateDecode",
                "AHx" => "ASCIIHexDecode",
                "A85" => "ASCII85Decode",
                "LZW" => "LZWDecode",
                "RL" => "RunLengthDecode",
                "CCF" => "CCITTFaxDecode",
                "DCT" => "DCTDecode",
                other => other,
            }
            .to_string()
        })
        .collect()
}

fn parameter_map(doc: &Document, obj: &Object) -> BTreeMap<String, String> {
    match obj {
        Object::Dictionary(parms) => parms
            .iter()
            .map(|(key, value)| {
                (
                    String::from_utf8_lossy(key).to_string(),
                    display_object(doc, value),
                )
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn type3_report(
    doc: &Document,
    font: &Dictionary,
    id: Option<ObjectId>,
    used: Option<&BTreeSet<u32>>,
    has_font_descriptor: bool,
) -> Type3Report {
    let glyph_names = dict_get_dict(doc, font, b"CharProcs")
        .map(|procs| {
            procs
                .iter()
                .map(|(glyph, _)| String::from_utf8_lossy(glyph).to_string())
                .collect()
        })
        .unwrap_or_default();
    let used_codes: Vec<u32> = used.map(|codes| codes.iter().copied().collect()).unwrap_or_default();
    let loaded = LoadedFont::load(doc, font, id);
    let unicode = used_codes
        .iter()
        .filter_map(|code| loaded.unicode(*code).map(|text| (*code, text)))
        .collect();
    let font_matrix = dict_get_array(doc, font, b"FontMatrix")
        .map(|m| m.iter().filter_map(|v| number(resolve(doc, v))).collect())
        .unwrap_or_default();
    Type3Report {
        glyph_names,
        used_codes,
        unicode,
        font_matrix,
        has_font_descriptor,
    }
}
