//! Font dictionary repairs: subset descriptors, encodings, ToUnicode maps
//! and widths.

use std::collections::BTreeMap;

use lopdf::{dictionary, Object, ObjectId, StringFormat};

use super::declared_page;
use crate::error::{Error, Result};
use crate::font::encoding::{differences_array, parse_differences};
use crate::font::metrics::{cid_widths_array, parse_cid_widths, simple_widths};
use crate::font::subset::{cidset_bytes, charset_string};
use crate::font::ToUnicodeCMap;
use crate::instruction::{CharCode, FontOpKind, FontOperation, InstructionSet};
use crate::interpret::Handler;
use crate::pdf::objects::{dict_get, dict_get_dict, dict_get_name, dict_get_number, real};
use crate::pdf::DocumentHandle;

/// Nonsymbolic flag for synthesized descriptors.
const FLAG_NONSYMBOLIC: i64 = 32;

/// Highest single-byte code of a simple font.
const MAX_SIMPLE_CODE: u32 = 0xFF;

/// Highest two-byte code or CID of a Type0 font.
const MAX_COMPOSITE_CODE: u32 = 0xFFFF;

pub struct FontHandler;

impl Handler for FontHandler {
    type Section = [FontOperation];

    fn name(&self) -> &'static str {
        "fonts"
    }

    fn section<'a>(&self, set: &'a InstructionSet) -> Option<&'a [FontOperation]> {
        (!set.fonts.is_empty()).then_some(set.fonts.as_slice())
    }

    fn apply(&self, mut handle: DocumentHandle, operations: &[FontOperation]) -> Result<DocumentHandle> {
        for op in operations {
            apply_font_op(&mut handle, op)?;
        }
        log::info!("Applied {} font operation(s)", operations.len());
        Ok(handle)
    }
}

fn apply_font_op(handle: &mut DocumentHandle, op: &FontOperation) -> Result<()> {
    let Some(kind) = op.kind() else {
        log::warn!("Skipping unknown font operation '{}'", op.op);
        return Ok(());
    };
    let (page, page_id) = declared_page(handle, op.page)?;
    let font = font_id(handle, page_id, &op.font)?;
    let composite = is_type0(handle, font)?;
    let max_code = if composite {
        MAX_COMPOSITE_CODE
    } else {
        MAX_SIMPLE_CODE
    };
    log::debug!("{} on font /{} of page {} ({:?})", op.op, op.font, page, font);

    match kind {
        FontOpKind::WriteCidSet => {
            let owner = descriptor_owner(handle, font)?;
            let descriptor = ensure_descriptor(handle, owner)?;
            let cids: Vec<u32> = op
                .cids
                .iter()
                .filter_map(|cid| u32::try_from(*cid).ok())
                .collect();
            let stream = handle.content_stream(cidset_bytes(&cids));
            let stream = handle.document_mut().add_object(stream);
            handle
                .document_mut()
                .get_dictionary_mut(descriptor)?
                .set("CIDSet", Object::Reference(stream));
        }
        FontOpKind::WriteCharSet => {
            let owner = descriptor_owner(handle, font)?;
            let descriptor = ensure_descriptor(handle, owner)?;
            let charset = charset_string(&op.glyph_names);
            handle.document_mut().get_dictionary_mut(descriptor)?.set(
                "CharSet",
                Object::String(charset.into_bytes(), StringFormat::Literal),
            );
        }
        FontOpKind::SetEncoding => {
            let encoding = op.encoding.as_deref().unwrap_or_default();
            set_encoding(handle, font, encoding)?;
        }
        FontOpKind::SetDifferences => {
            check_codes(op, op.differences.keys(), MAX_SIMPLE_CODE)?;
            let differences: BTreeMap<u32, String> = op
                .differences
                .iter()
                .map(|(code, glyph)| (code.0, glyph.trim_start_matches('/').to_string()))
                .collect();
            set_differences(handle, font, &differences)?;
        }
        FontOpKind::WriteToUnicode => {
            check_codes(op, op.mappings.keys(), max_code)?;
            let mappings: BTreeMap<u32, String> = op
                .mappings
                .iter()
                .map(|(code, text)| (code.0, text.clone()))
                .collect();
            write_to_unicode(handle, font, composite, &mappings)?;
        }
        FontOpKind::SetWidths => {
            check_codes(op, op.widths.keys(), max_code)?;
            let widths: BTreeMap<u32, f64> =
                op.widths.iter().map(|(code, width)| (code.0, *width)).collect();
            if composite {
                let owner = descriptor_owner(handle, font)?;
                set_cid_widths(handle, owner, &widths)?;
            } else {
                set_simple_widths(handle, font, &widths)?;
            }
        }
        FontOpKind::AddFontDescriptor => {
            let owner = descriptor_owner(handle, font)?;
            let exists = {
                let doc = handle.document();
                dict_get_dict(doc, doc.get_dictionary(owner)?, b"FontDescriptor").is_some()
            };
            if exists {
                log::debug!("Font /{} already has a descriptor", op.font);
            } else {
                ensure_descriptor(handle, owner)?;
            }
        }
    }
    Ok(())
}

fn check_codes<'a>(
    op: &FontOperation,
    mut codes: impl Iterator<Item = &'a CharCode>,
    max: u32,
) -> Result<()> {
    match codes.find(|code| code.0 > max) {
        Some(code) => Err(Error::Font(format!(
            "{}: code {} is outside the codespace of font /{} (0 to {})",
            op.op, code.0, op.font, max
        ))),
        None => Ok(()),
    }
}

/// The font resource object named `name` on a page, made indirect.
fn font_id(handle: &mut DocumentHandle, page_id: ObjectId, name: &str) -> Result<ObjectId> {
    let key = name.trim_start_matches('/');
    let exists = {
        let doc = handle.document();
        let resources = handle.page_resources(page_id);
        dict_get_dict(doc, &resources, b"Font").is_some_and(|fonts| fonts.has(key.as_bytes()))
    };
    if !exists {
        return Err(Error::ResourceNotFound(format!("font /{}", key)));
    }
    let resources = handle.page_resources_id(page_id)?;
    let fonts = handle.ensure_indirect_dict(resources, b"Font")?;
    handle.ensure_indirect_dict(fonts, key.as_bytes())
}

fn is_type0(handle: &DocumentHandle, font: ObjectId) -> Result<bool> {
    let doc = handle.document();
    Ok(dict_get_name(doc, doc.get_dictionary(font)?, b"Subtype").as_deref() == Some("Type0"))
}

/// The dictionary that carries widths and the descriptor: the descendant
/// CIDFont of a Type0 font, the font itself otherwise.
fn descriptor_owner(handle: &mut DocumentHandle, font: ObjectId) -> Result<ObjectId> {
    if !is_type0(handle, font)? {
        return Ok(font);
    }
    let first = {
        let doc = handle.document();
        match dict_get(doc, doc.get_dictionary(font)?, b"DescendantFonts") {
            Some(Object::Array(items)) => items.first().cloned(),
            _ => None,
        }
    };
    match first {
        Some(Object::Reference(id)) if handle.document().get_dictionary(id).is_ok() => Ok(id),
        Some(Object::Dictionary(dict)) => {
            let id = handle.document_mut().add_object(dict);
            handle.array_entry_mut(font, b"DescendantFonts")?[0] = Object::Reference(id);
            Ok(id)
        }
        _ => Err(Error::Font(format!(
            "Type0 font {:?} has no descendant font",
            font
        ))),
    }
}

/// The owner's FontDescriptor, synthesized from the base font name when
/// missing.
fn ensure_descriptor(handle: &mut DocumentHandle, owner: ObjectId) -> Result<ObjectId> {
    let (exists, base_font) = {
        let doc = handle.document();
        let dict = doc.get_dictionary(owner)?;
        (
            dict_get_dict(doc, dict, b"FontDescriptor").is_some(),
            dict_get_name(doc, dict, b"BaseFont").unwrap_or_else(|| "Unknown".to_string()),
        )
    };
    if exists {
        return handle.ensure_indirect_dict(owner, b"FontDescriptor");
    }
    let descriptor = handle.document_mut().add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(base_font.as_bytes().to_vec()),
        "Flags" => FLAG_NONSYMBOLIC,
        "FontBBox" => vec![0.into(), (-200).into(), 1000.into(), 800.into()],
        "ItalicAngle" => 0,
        "Ascent" => 800,
        "Descent" => -200,
        "CapHeight" => 700,
        "StemV" => 80,
    });
    handle
        .document_mut()
        .get_dictionary_mut(owner)?
        .set("FontDescriptor", Object::Reference(descriptor));
    log::debug!("Synthesized FontDescriptor for /{}", base_font);
    Ok(descriptor)
}

/// Name the encoding, or its BaseEncoding when an encoding dictionary exists.
fn set_encoding(handle: &mut DocumentHandle, font: ObjectId, encoding: &str) -> Result<()> {
    let has_dictionary = {
        let doc = handle.document();
        dict_get_dict(doc, doc.get_dictionary(font)?, b"Encoding").is_some()
    };
    let name = Object::Name(encoding.as_bytes().to_vec());
    if has_dictionary {
        let dict = handle.ensure_indirect_dict(font, b"Encoding")?;
        handle
            .document_mut()
            .get_dictionary_mut(dict)?
            .set("BaseEncoding", name);
    } else {
        handle.document_mut().get_dictionary_mut(font)?.set("Encoding", name);
    }
    Ok(())
}

fn set_differences(
    handle: &mut DocumentHandle,
    font: ObjectId,
    declared: &BTreeMap<u32, String>,
) -> Result<()> {
    let base = {
        let doc = handle.document();
        dict_get_name(doc, doc.get_dictionary(font)?, b"Encoding")
    };
    let encoding = handle.ensure_indirect_dict(font, b"Encoding")?;
    let mut differences = {
        let doc = handle.document();
        match dict_get(doc, doc.get_dictionary(encoding)?, b"Differences") {
            Some(Object::Array(items)) => parse_differences(doc, items),
            _ => BTreeMap::new(),
        }
    };
    differences.extend(declared.iter().map(|(code, glyph)| (*code, glyph.clone())));

    let dict = handle.document_mut().get_dictionary_mut(encoding)?;
    dict.set("Type", Object::Name(b"Encoding".to_vec()));
    if let Some(base) = base {
        dict.set("BaseEncoding", Object::Name(base.into_bytes()));
    }
    dict.set("Differences", Object::Array(differences_array(&differences)));
    Ok(())
}

fn write_to_unicode(
    handle: &mut DocumentHandle,
    font: ObjectId,
    composite: bool,
    declared: &BTreeMap<u32, String>,
) -> Result<()> {
    let mut cmap = ToUnicodeCMap::new(if composite { 2 } else { 1 });
    let existing = {
        let doc = handle.document();
        match dict_get(doc, doc.get_dictionary(font)?, b"ToUnicode") {
            Some(Object::Stream(stream)) => {
                let data = if stream.dict.has(b"Filter") {
                    stream.decompressed_content().ok()
                } else {
                    Some(stream.content.clone())
                };
                data.and_then(|data| ToUnicodeCMap::parse(&data).ok())
            }
            _ => None,
        }
    };
    if let Some(existing) = existing {
        log::debug!("Merging {} existing ToUnicode mapping(s)", existing.len());
        cmap.merge(&existing);
    }
    for (code, text) in declared {
        cmap.insert(*code, text.clone());
    }
    let stream = handle.content_stream(cmap.to_bytes());
    let stream = handle.document_mut().add_object(stream);
    handle
        .document_mut()
        .get_dictionary_mut(font)?
        .set("ToUnicode", Object::Reference(stream));
    Ok(())
}

fn set_simple_widths(
    handle: &mut DocumentHandle,
    font: ObjectId,
    declared: &BTreeMap<u32, f64>,
) -> Result<()> {
    let (mut widths, missing) = {
        let doc = handle.document();
        let dict = doc.get_dictionary(font)?;
        let missing = dict_get_dict(doc, dict, b"FontDescriptor")
            .and_then(|descriptor| dict_get_number(doc, descriptor, b"MissingWidth"))
            .unwrap_or(0.0);
        (simple_widths(doc, dict), missing)
    };
    widths.extend(declared.iter().map(|(code, width)| (*code, *width)));
    let (Some(first), Some(last)) = (
        widths.keys().next().copied(),
        widths.keys().next_back().copied(),
    ) else {
        return Ok(());
    };
    let array: Vec<Object> = (first..=last)
        .map(|code| real(widths.get(&code).copied().unwrap_or(missing)))
        .collect();

    let dict = handle.document_mut().get_dictionary_mut(font)?;
    dict.set("FirstChar", Object::Integer(first as i64));
    dict.set("LastChar", Object::Integer(last as i64));
    dict.set("Widths", Object::Array(array));
    Ok(())
}

fn set_cid_widths(
    handle: &mut DocumentHandle,
    owner: ObjectId,
    declared: &BTreeMap<u32, f64>,
) -> Result<()> {
    let mut widths = {
        let doc = handle.document();
        match dict_get(doc, doc.get_dictionary(owner)?, b"W") {
            Some(Object::Array(items)) => parse_cid_widths(doc, items),
            _ => BTreeMap::new(),
        }
    };
    widths.extend(declared.iter().map(|(cid, width)| (*cid, *width)));
    handle
        .document_mut()
        .get_dictionary_mut(owner)?
        .set("W", Object::Array(cid_widths_array(&widths)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::subset::cidset_members;
    use crate::interpret::handlers::testing::{document, entry};
    use lopdf::Stream;

    /// Adds a Type0 `/F2` with a direct descendant and no descriptor.
    fn with_type0(mut handle: DocumentHandle) -> DocumentHandle {
        let page = handle.page_id(1).unwrap();
        let font = handle.document_mut().add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "NotoSans",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "CIDFontType2",
                "BaseFont" => "NotoSans",
                "W" => vec![
                    Object::Integer(1),
                    Object::Array(vec![Object::Integer(500), Object::Integer(600)]),
                ],
            })],
        });
        let resources = handle.page_resources_id(page).unwrap();
        let fonts = handle.ensure_indirect_dict(resources, b"Font").unwrap();
        handle
            .document_mut()
            .get_dictionary_mut(fonts)
            .unwrap()
            .set("F2", font);
        handle
    }

    fn op(kind: &str, font: &str) -> FontOperation {
        FontOperation {
            op: kind.to_string(),
            font: font.to_string(),
            page: 1,
            ..FontOperation::default()
        }
    }

    fn font(handle: &mut DocumentHandle, name: &str) -> ObjectId {
        let page = handle.page_id(1).unwrap();
        font_id(handle, page, name).unwrap()
    }

    #[test]
    fn test_cidset_on_descendant_descriptor() {
        let mut write = op("write_cidset", "F2");
        write.cids = vec![0, 1, 9];
        let mut handle = FontHandler
            .apply(with_type0(document(&[""])), &[write])
            .unwrap();
        let type0 = font(&mut handle, "F2");
        let descendant = descriptor_owner(&mut handle, type0).unwrap();
        assert_ne!(descendant, type0);
        let descriptor = entry(&handle, descendant, b"FontDescriptor").as_dict().unwrap();
        let cidset = descriptor.get(b"CIDSet").unwrap().as_reference().unwrap();
        let stream = handle.document().get_object(cidset).unwrap().as_stream().unwrap();
        assert_eq!(cidset_members(&stream.content), vec![0, 1, 9]);
        assert!(!handle.document().get_dictionary(type0).unwrap().has(b"FontDescriptor"));
    }

    #[test]
    fn test_charset_and_descriptor() {
        let mut write = op("write_charset", "F1");
        write.glyph_names = vec!["A".to_string(), "/B".to_string(), "A".to_string()];
        let mut handle = FontHandler.apply(document(&[""]), &[write]).unwrap();
        let f1 = font(&mut handle, "F1");
        let descriptor = entry(&handle, f1, b"FontDescriptor").as_dict().unwrap();
        assert!(matches!(descriptor.get(b"CharSet"), Ok(Object::String(s, _)) if s == b"/A/B"));
        assert!(matches!(descriptor.get(b"FontName"), Ok(Object::Name(n)) if n == b"Helvetica"));
    }

    #[test]
    fn test_differences_merge_compactly() {
        let mut first = op("set_differences", "F1");
        first.differences = BTreeMap::from([(CharCode(65), "Alpha".to_string())]);
        let mut second = op("set_differences", "F1");
        second.differences = BTreeMap::from([
            (CharCode(66), "Beta".to_string()),
            (CharCode(90), "Zeta".to_string()),
        ]);
        let mut handle = FontHandler.apply(document(&[""]), &[first, second]).unwrap();
        let f1 = font(&mut handle, "F1");
        let encoding = entry(&handle, f1, b"Encoding").as_dict().unwrap();
        assert!(matches!(encoding.get(b"BaseEncoding"), Ok(Object::Name(n)) if n == b"WinAnsiEncoding"));
        let Ok(Object::Array(differences)) = encoding.get(b"Differences") else {
            panic!("missing Differences");
        };
        assert_eq!(differences.len(), 5);
        assert!(matches!(differences[0], Object::Integer(65)));
        assert!(matches!(differences[3], Object::Integer(90)));
    }

    #[test]
    fn test_set_encoding_uses_base_encoding_for_dictionaries() {
        let mut differences = op("set_differences", "F1");
        differences.differences = BTreeMap::from([(CharCode(1), "bullet".to_string())]);
        let mut encoding = op("set_encoding", "F1");
        encoding.encoding = Some("MacRomanEncoding".to_string());
        let mut handle = FontHandler
            .apply(document(&[""]), &[differences, encoding])
            .unwrap();
        let f1 = font(&mut handle, "F1");
        let encoding = entry(&handle, f1, b"Encoding").as_dict().unwrap();
        assert!(matches!(encoding.get(b"BaseEncoding"), Ok(Object::Name(n)) if n == b"MacRomanEncoding"));
    }

    #[test]
    fn test_to_unicode_merges_existing() {
        let mut handle = document(&[""]);
        let f1 = font(&mut handle, "F1");
        let mut existing = ToUnicodeCMap::new(1);
        existing.insert(0x41, "A");
        existing.insert(0x42, "X");
        let stream = handle
            .document_mut()
            .add_object(Stream::new(dictionary! {}, existing.to_bytes()));
        handle
            .document_mut()
            .get_dictionary_mut(f1)
            .unwrap()
            .set("ToUnicode", stream);

        let mut write = op("write_tounicode", "F1");
        write.mappings = BTreeMap::from([(CharCode(0x42), "B".to_string())]);
        let handle = FontHandler.apply(handle, &[write]).unwrap();
        let stream = entry(&handle, f1, b"ToUnicode").as_stream().unwrap();
        let cmap = ToUnicodeCMap::parse(&stream.content).unwrap();
        assert_eq!(cmap.code_bytes(), 1);
        assert_eq!(cmap.get(0x41), Some("A"));
        assert_eq!(cmap.get(0x42), Some("B"));
    }

    #[test]
    fn test_widths_simple_and_cid() {
        let mut simple = op("set_widths", "F1");
        simple.widths = BTreeMap::from([(CharCode(32), 278.0), (CharCode(34), 355.0)]);
        let mut cid = op("set_widths", "F2");
        cid.widths = BTreeMap::from([(CharCode(3), 700.0)]);
        let mut handle = FontHandler
            .apply(with_type0(document(&[""])), &[simple, cid])
            .unwrap();

        let f1 = font(&mut handle, "F1");
        assert!(matches!(entry(&handle, f1, b"FirstChar"), Object::Integer(32)));
        assert!(matches!(entry(&handle, f1, b"LastChar"), Object::Integer(34)));
        assert!(matches!(entry(&handle, f1, b"Widths"), Object::Array(w) if w.len() == 3));

        let f2 = font(&mut handle, "F2");
        let descendant = descriptor_owner(&mut handle, f2).unwrap();
        let Object::Array(w) = entry(&handle, descendant, b"W") else {
            panic!("missing W");
        };
        let parsed = parse_cid_widths(handle.document(), w);
        assert_eq!(parsed.get(&1), Some(&500.0));
        assert_eq!(parsed.get(&3), Some(&700.0));
    }

    #[test]
    fn test_descriptor_added_only_when_absent() {
        let handle = FontHandler
            .apply(document(&[""]), &[op("add_font_descriptor", "F1")])
            .unwrap();
        let mut handle = FontHandler
            .apply(handle, &[op("add_font_descriptor", "F1")])
            .unwrap();
        let f1 = font(&mut handle, "F1");
        let first = handle
            .document()
            .get_dictionary(f1)
            .unwrap()
            .get(b"FontDescriptor")
            .unwrap()
            .as_reference()
            .unwrap();
        let descriptors = handle
            .document()
            .objects
            .values()
            .filter(|o| matches!(o.as_dict(), Ok(d) if d.has(b"FontName")))
            .count();
        assert_eq!(descriptors, 1);
        assert!(handle.document().get_dictionary(first).is_ok());
    }

    #[test]
    fn test_missing_font_resource() {
        let result = FontHandler.apply(document(&[""]), &[op("set_encoding", "F9")]);
        assert!(matches!(result, Err(Error::ResourceNotFound(_))));
    }

    #[test]
    fn test_codes_outside_simple_codespace() {
        let mut widths = op("set_widths", "F1");
        widths.widths = BTreeMap::from([(CharCode(72), 600.0), (CharCode(3_000_000), 500.0)]);
        let result = FontHandler.apply(document(&[""]), &[widths]);
        assert!(matches!(result, Err(Error::Font(msg)) if msg.contains("3000000")));

        let mut mappings = op("write_tounicode", "F1");
        mappings.mappings = BTreeMap::from([(CharCode(256), "X".to_string())]);
        let result = FontHandler.apply(document(&[""]), &[mappings]);
        assert!(matches!(result, Err(Error::Font(_))));
    }

    #[test]
    fn test_composite_codespace_allows_two_bytes() {
        let mut mappings = op("write_tounicode", "F2");
        mappings.mappings = BTreeMap::from([(CharCode(0x0100), "X".to_string())]);
        let mut handle = FontHandler
            .apply(with_type0(document(&[""])), &[mappings])
            .unwrap();
        let f2 = font(&mut handle, "F2");
        let stream = entry(&handle, f2, b"ToUnicode").as_stream().unwrap();
        let cmap = ToUnicodeCMap::parse(&stream.content).unwrap();
        assert_eq!(cmap.get(0x0100), Some("X"));

        let mut widths = op("set_widths", "F2");
        widths.widths = BTreeMap::from([(CharCode(0x1_0000), 500.0)]);
        let result = FontHandler.apply(with_type0(document(&[""])), &[widths]);
        assert!(matches!(result, Err(Error::Font(_))));
    }
}
