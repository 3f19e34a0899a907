//! Invisible text layers from recognized words.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, StringFormat};
use unicode_normalization::UnicodeNormalization;

use super::declared_page;
use crate::content::{scan_page, OperatorKind, PageScan};
use crate::error::{Error, Result};
use crate::font::encoding::win_ansi_encode_str;
use crate::font::ToUnicodeCMap;
use crate::geometry::{BboxResolver, BoundingBox};
use crate::instruction::{InstructionSet, OcrPage};
use crate::interpret::{Handler, InterpretOptions};
use crate::pdf::objects::{dict_get_name, real, resolve};
use crate::pdf::DocumentHandle;

/// Resource name of the WinAnsi Helvetica font.
const LATIN_FONT: &str = "OcrLatin";
/// Resource name of the Identity-H font.
const UNICODE_FONT: &str = "OcrUnicode";
/// Declared advance of every glyph, in thousandths of an em.
const GLYPH_WIDTH: f64 = 500.0;
/// Baseline offset below the word box bottom, as a share of the font size.
const DESCENT: f64 = 0.2;

pub struct OcrHandler {
    resolver: BboxResolver,
    min_confidence: f64,
}

impl OcrHandler {
    pub fn new(options: &InterpretOptions) -> Self {
        Self {
            resolver: BboxResolver::new(options.resolver),
            min_confidence: options.ocr_min_confidence,
        }
    }

    fn add_page(
        &self,
        handle: &mut DocumentHandle,
        fonts: &mut OcrFonts,
        ocr_page: &OcrPage,
    ) -> Result<usize> {
        let (page, page_id) = declared_page(handle, ocr_page.page)?;
        let page_box = handle.page_box(page_id);
        let (_, scan) = scan_page(handle, page_id)?;

        let mut operations = Vec::new();
        let mut written = 0;
        for word in &ocr_page.words {
            if word.confidence.unwrap_or(1.0) < self.min_confidence {
                log::trace!("Skipping low-confidence word '{}'", word.text);
                continue;
            }
            let Some(declared) = word.bbox else {
                log::warn!("Skipping OCR word '{}' without a box", word.text);
                continue;
            };
            let text: String = word.text.nfc().collect();
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let bbox = self.resolver.to_user_space(&declared, &page_box);
            if self.already_present(&scan, &bbox, text) {
                log::debug!("Word '{}' already present on page {}", text, page);
                continue;
            }
            let Some(shown) = ShownWord::encode(text) else {
                log::warn!("Word '{}' has no encodable characters", text);
                continue;
            };
            let font = match shown.font {
                WordFont::Latin => fonts.latin(handle)?,
                WordFont::Unicode => fonts.unicode(handle)?,
            };
            let resource = add_font_resource(handle, page_id, shown.font.resource(), font)?;
            operations.extend(word_operations(&resource, &bbox, &shown));
            written += 1;
        }

        if !operations.is_empty() {
            let bytes = Content { operations }
                .encode()
                .map_err(|e| Error::Content(e.to_string()))?;
            handle.append_page_content(page_id, bytes)?;
        }
        log::debug!("Added {} OCR word(s) to page {}", written, page);
        Ok(written)
    }

    /// Whether a text operator inside `bbox` already shows `text`.
    fn already_present(&self, scan: &PageScan, bbox: &BoundingBox, text: &str) -> bool {
        let candidates: Vec<(Option<BoundingBox>, String)> = scan
            .operators
            .iter()
            .filter(|op| op.kind == OperatorKind::Text)
            .filter_map(|op| {
                let shown: String = op.text.as_deref()?.nfc().collect();
                (!shown.trim().is_empty()).then_some((op.bbox, shown))
            })
            .collect();
        let boxes: Vec<Option<BoundingBox>> = candidates.iter().map(|(b, _)| *b).collect();
        self.resolver
            .resolve(&boxes, bbox)
            .into_iter()
            .any(|i| candidates[i].1.contains(text))
    }
}

impl Handler for OcrHandler {
    type Section = [OcrPage];

    fn name(&self) -> &'static str {
        "ocr"
    }

    fn section<'a>(&self, set: &'a InstructionSet) -> Option<&'a [OcrPage]> {
        (!set.ocr.is_empty()).then_some(set.ocr.as_slice())
    }

    fn apply(&self, mut handle: DocumentHandle, pages: &[OcrPage]) -> Result<DocumentHandle> {
        let mut fonts = OcrFonts::default();
        let mut words = 0;
        for page in pages {
            words += self.add_page(&mut handle, &mut fonts, page)?;
        }
        log::info!("Added {} OCR word(s) on {} page(s)", words, pages.len());
        Ok(handle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordFont {
    Latin,
    Unicode,
}

impl WordFont {
    fn resource(self) -> &'static str {
        match self {
            WordFont::Latin => LATIN_FONT,
            WordFont::Unicode => UNICODE_FONT,
        }
    }
}

/// A word encoded for one of the two text-layer fonts.
#[derive(Debug)]
struct ShownWord {
    font: WordFont,
    bytes: Vec<u8>,
    glyphs: usize,
}

impl ShownWord {
    fn encode(text: &str) -> Option<Self> {
        if let Some(bytes) = win_ansi_encode_str(text) {
            let glyphs = bytes.len();
            return (glyphs > 0).then_some(Self {
                font: WordFont::Latin,
                bytes,
                glyphs,
            });
        }
        // Two-byte codes equal to the BMP code point; the ToUnicode map
        // leaves out notdef and U+FFFD..U+FFFF.
        let units: Vec<u16> = text
            .chars()
            .map(|c| c as u32)
            .filter(|cp| *cp != 0 && *cp < 0xFFFD)
            .map(|cp| cp as u16)
            .collect();
        if units.len() < text.chars().count() {
            log::debug!("Dropping characters outside the BMP from '{}'", text);
        }
        (!units.is_empty()).then(|| Self {
            font: WordFont::Unicode,
            bytes: units.iter().flat_map(|u| u.to_be_bytes()).collect(),
            glyphs: units.len(),
        })
    }

    fn string(&self) -> Object {
        match self.font {
            WordFont::Latin => Object::String(self.bytes.clone(), StringFormat::Literal),
            WordFont::Unicode => Object::String(self.bytes.clone(), StringFormat::Hexadecimal),
        }
    }
}

/// `q BT 3 Tr /F size Tf scale Tz x y Td (text) Tj ET Q`
fn word_operations(resource: &str, bbox: &BoundingBox, word: &ShownWord) -> Vec<Operation> {
    let size = bbox.height;
    let natural = word.glyphs as f64 * GLYPH_WIDTH / 1000.0 * size;
    let scale = if natural > 0.0 {
        bbox.width / natural * 100.0
    } else {
        100.0
    };
    vec![
        Operation::new("q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new("Tr", vec![Object::Integer(3)]),
        Operation::new(
            "Tf",
            vec![Object::Name(resource.as_bytes().to_vec()), real(round(size))],
        ),
        Operation::new("Tz", vec![real(round(scale))]),
        Operation::new(
            "Td",
            vec![real(round(bbox.x)), real(round(bbox.y + DESCENT * size))],
        ),
        Operation::new("Tj", vec![word.string()]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]
}

fn round(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Register `font` in the page's font resources under `name`. An existing
/// entry of that name is reused only when it is one of our text-layer
/// fonts; otherwise a numbered name (`OcrLatin1`, ...) is taken.
fn add_font_resource(
    handle: &mut DocumentHandle,
    page_id: ObjectId,
    name: &str,
    font: ObjectId,
) -> Result<String> {
    let resources = handle.page_resources_id(page_id)?;
    let fonts = handle.ensure_indirect_dict(resources, b"Font")?;
    let mut candidate = name.to_string();
    let mut suffix = 0;
    loop {
        let existing = handle
            .document()
            .get_dictionary(fonts)?
            .get(candidate.as_bytes())
            .ok()
            .cloned();
        match existing {
            None => {
                handle
                    .document_mut()
                    .get_dictionary_mut(fonts)?
                    .set(candidate.as_str(), Object::Reference(font));
                return Ok(candidate);
            }
            Some(entry) if same_font(handle.document(), &entry, font) => return Ok(candidate),
            Some(_) => {
                log::debug!("Font resource /{} is taken on page {:?}", candidate, page_id);
                suffix += 1;
                candidate = format!("{}{}", name, suffix);
            }
        }
    }
}

/// Same object, or a font with the same subtype, base font and encoding.
fn same_font(doc: &Document, entry: &Object, font: ObjectId) -> bool {
    if matches!(entry, Object::Reference(id) if *id == font) {
        return true;
    }
    let (Object::Dictionary(theirs), Ok(ours)) = (resolve(doc, entry), doc.get_dictionary(font))
    else {
        return false;
    };
    [b"Subtype".as_slice(), b"BaseFont", b"Encoding"]
        .into_iter()
        .all(|key| {
            let name = dict_get_name(doc, ours, key);
            name.is_some() && dict_get_name(doc, theirs, key) == name
        })
}

/// The two text-layer fonts, created on first use.
#[derive(Default)]
struct OcrFonts {
    latin: Option<ObjectId>,
    unicode: Option<ObjectId>,
}

impl OcrFonts {
    fn latin(&mut self, handle: &mut DocumentHandle) -> Result<ObjectId> {
        if let Some(id) = self.latin {
            return Ok(id);
        }
        let widths: Vec<Object> = (32..=255).map(|_| real(GLYPH_WIDTH)).collect();
        let id = handle.document_mut().add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
            "FirstChar" => 32,
            "LastChar" => 255,
            "Widths" => widths,
        });
        self.latin = Some(id);
        Ok(id)
    }

    fn unicode(&mut self, handle: &mut DocumentHandle) -> Result<ObjectId> {
        if let Some(id) = self.unicode {
            return Ok(id);
        }
        let to_unicode = handle.content_stream(ToUnicodeCMap::identity_bmp());
        let to_unicode = handle.document_mut().add_object(to_unicode);
        let descriptor = handle.document_mut().add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => "OcrTextLayer",
            "Flags" => 32,
            "FontBBox" => Object::Array(
                [0, -200, 1000, 800].into_iter().map(Object::Integer).collect(),
            ),
            "ItalicAngle" => 0,
            "Ascent" => 800,
            "Descent" => -200,
            "CapHeight" => 700,
            "StemV" => 80,
        });
        let descendant = handle.document_mut().add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "OcrTextLayer",
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor,
            "DW" => real(GLYPH_WIDTH),
            "CIDToGIDMap" => "Identity",
        });
        let id = handle.document_mut().add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "OcrTextLayer",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(descendant)],
            "ToUnicode" => to_unicode,
        });
        self.unicode = Some(id);
        Ok(id)
    }
}
