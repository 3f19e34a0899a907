//! Simple-font encodings, glyph names, and `/Differences` arrays.

use std::collections::BTreeMap;

use lopdf::{Document, Object};

use crate::pdf::objects::{name, number, resolve};

/// Glyph names for printable ASCII, 0x20 through 0x7E.
const ASCII_NAMES: [&str; 95] = [
    "space", "exclam", "quotedbl", "numbersign", "dollar", "percent", "ampersand",
    "quotesingle", "parenleft", "parenright", "asterisk", "plus", "comma", "hyphen", "period",
    "slash", "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    "colon", "semicolon", "less", "equal", "greater", "question", "at", "A", "B", "C", "D", "E",
    "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T", "U", "V", "W",
    "X", "Y", "Z", "bracketleft", "backslash", "bracketright", "asciicircum", "underscore",
    "grave", "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p",
    "q", "r", "s", "t", "u", "v", "w", "x", "y", "z", "braceleft", "bar", "braceright",
    "asciitilde",
];

/// Glyph names for Latin-1, 0xA0 through 0xFF (code equals code point).
const LATIN1_NAMES: [&str; 96] = [
    "nbspace", "exclamdown", "cent", "sterling", "currency", "yen", "brokenbar", "section",
    "dieresis", "copyright", "ordfeminine", "guillemotleft", "logicalnot", "sfthyphen",
    "registered", "macron", "degree", "plusminus", "twosuperior", "threesuperior", "acute", "mu",
    "paragraph", "periodcentered", "cedilla", "onesuperior", "ordmasculine", "guillemotright",
    "onequarter", "onehalf", "threequarters", "questiondown", "Agrave", "Aacute", "Acircumflex",
    "Atilde", "Adieresis", "Aring", "AE", "Ccedilla", "Egrave", "Eacute", "Ecircumflex",
    "Edieresis", "Igrave", "Iacute", "Icircumflex", "Idieresis", "Eth", "Ntilde", "Ograve",
    "Oacute", "Ocircumflex", "Otilde", "Odieresis", "multiply", "Oslash", "Ugrave", "Uacute",
    "Ucircumflex", "Udieresis", "Yacute", "Thorn", "germandbls", "agrave", "aacute",
    "acircumflex", "atilde", "adieresis", "aring", "ae", "ccedilla", "egrave", "eacute",
    "ecircumflex", "edieresis", "igrave", "iacute", "icircumflex", "idieresis", "eth", "ntilde",
    "ograve", "oacute", "ocircumflex", "otilde", "odieresis", "divide", "oslash", "ugrave",
    "uacute", "ucircumflex", "udieresis", "yacute", "thorn", "ydieresis",
];

/// WinAnsiEncoding's departures from Latin-1 in 0x80..=0x9F.
const WIN_ANSI_HIGH: [(u8, char, &str); 27] = [
    (0x80, '\u{20AC}', "Euro"),
    (0x82, '\u{201A}', "quotesinglbase"),
    (0x83, '\u{0192}', "florin"),
    (0x84, '\u{201E}', "quotedblbase"),
    (0x85, '\u{2026}', "ellipsis"),
    (0x86, '\u{2020}', "dagger"),
    (0x87, '\u{2021}', "daggerdbl"),
    (0x88, '\u{02C6}', "circumflex"),
    (0x89, '\u{2030}', "perthousand"),
    (0x8A, '\u{0160}', "Scaron"),
    (0x8B, '\u{2039}', "guilsinglleft"),
    (0x8C, '\u{0152}', "OE"),
    (0x8E, '\u{017D}', "Zcaron"),
    (0x91, '\u{2018}', "quoteleft"),
    (0x92, '\u{2019}', "quoteright"),
    (0x93, '\u{201C}', "quotedblleft"),
    (0x94, '\u{201D}', "quotedblright"),
    (0x95, '\u{2022}', "bullet"),
    (0x96, '\u{2013}', "endash"),
    (0x97, '\u{2014}', "emdash"),
    (0x98, '\u{02DC}', "tilde"),
    (0x99, '\u{2122}', "trademark"),
    (0x9A, '\u{0161}', "scaron"),
    (0x9B, '\u{203A}', "guilsinglright"),
    (0x9C, '\u{0153}', "oe"),
    (0x9E, '\u{017E}', "zcaron"),
    (0x9F, '\u{0178}', "Ydieresis"),
];

/// Common glyph names outside the WinAnsi repertoire.
const EXTRA_GLYPHS: [(&str, char); 10] = [
    ("fi", '\u{FB01}'),
    ("fl", '\u{FB02}'),
    ("ff", '\u{FB00}'),
    ("ffi", '\u{FB03}'),
    ("ffl", '\u{FB04}'),
    ("minus", '\u{2212}'),
    ("dotlessi", '\u{0131}'),
    ("Lslash", '\u{0141}'),
    ("lslash", '\u{0142}'),
    ("fraction", '\u{2044}'),
];

/// Character for a WinAnsi code.
pub fn win_ansi_decode(code: u8) -> Option<char> {
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as char),
        0x80..=0x9F => WIN_ANSI_HIGH
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, ch, _)| *ch),
        _ => None,
    }
}

/// WinAnsi code for a character, if the encoding can represent it.
pub fn win_ansi_encode(ch: char) -> Option<u8> {
    let cp = ch as u32;
    match cp {
        0x20..=0x7E | 0xA0..=0xFF => Some(cp as u8),
        _ => WIN_ANSI_HIGH
            .iter()
            .find(|(_, c, _)| *c == ch)
            .map(|(code, _, _)| *code),
    }
}

/// Encode a whole string in WinAnsi, or `None` if any character is missing.
pub fn win_ansi_encode_str(text: &str) -> Option<Vec<u8>> {
    text.chars().map(win_ansi_encode).collect()
}

/// Glyph name WinAnsiEncoding assigns to a code.
pub fn win_ansi_glyph_name(code: u8) -> Option<&'static str> {
    match code {
        0x20..=0x7E => Some(ASCII_NAMES[(code - 0x20) as usize]),
        0xA0..=0xFF => Some(LATIN1_NAMES[(code - 0xA0) as usize]),
        0x80..=0x9F => WIN_ANSI_HIGH
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, _, n)| *n),
        _ => None,
    }
}

/// Unicode text for a glyph name.
///
/// Handles `uniXXXX` (one or more groups), `uXXXX[XX]`, the WinAnsi names
/// and a handful of ligatures; suffixes such as `.sc` are ignored.
pub fn glyph_to_unicode(glyph: &str) -> Option<String> {
    let base = glyph.split('.').next().unwrap_or(glyph);
    if base.is_empty() {
        return None;
    }
    // Ligature names join their components with underscores.
    base.split('_').map(component_to_unicode).collect()
}

fn component_to_unicode(base: &str) -> Option<String> {
    if let Some(hex) = base.strip_prefix("uni") {
        if !hex.is_empty() && hex.len() % 4 == 0 {
            let units: Option<Vec<u16>> = (0..hex.len())
                .step_by(4)
                .map(|i| u16::from_str_radix(&hex[i..i + 4], 16).ok())
                .collect();
            if let Some(units) = units {
                let text = String::from_utf16_lossy(&units);
                if !text.contains('\u{FFFD}') {
                    return Some(text);
                }
            }
        }
    }
    if let Some(hex) = base.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) {
            if let Some(ch) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                return Some(ch.to_string());
            }
        }
    }

    if let Some(index) = ASCII_NAMES.iter().position(|n| *n == base) {
        return Some(((index as u8 + 0x20) as char).to_string());
    }
    if let Some(index) = LATIN1_NAMES.iter().position(|n| *n == base) {
        return Some(((index as u8 + 0xA0) as char).to_string());
    }
    if let Some((_, ch, _)) = WIN_ANSI_HIGH.iter().find(|(_, _, n)| *n == base) {
        return Some(ch.to_string());
    }
    EXTRA_GLYPHS
        .iter()
        .find(|(n, _)| *n == base)
        .map(|(_, ch)| ch.to_string())
}

/// Character for a code under a named base encoding.
///
/// WinAnsi is exact; Standard and MacRoman are decoded for their ASCII
/// range, which covers the codes they share with WinAnsi.
pub fn base_encoding_decode(encoding: Option<&str>, code: u32) -> Option<char> {
    let byte = u8::try_from(code).ok()?;
    match encoding {
        Some("WinAnsiEncoding") => win_ansi_decode(byte),
        Some("MacRomanEncoding") | Some("MacExpertEncoding") => {
            (0x20..=0x7E).contains(&byte).then_some(byte as char)
        }
        _ => match byte {
            0x27 => Some('\u{2019}'),
            0x60 => Some('\u{2018}'),
            0x20..=0x7E => Some(byte as char),
            _ => None,
        },
    }
}

/// Parse a `/Differences` array into code → glyph name.
pub fn parse_differences(doc: &Document, array: &[Object]) -> BTreeMap<u32, String> {
    let mut differences = BTreeMap::new();
    let mut code: Option<u32> = None;
    for item in array {
        let item = resolve(doc, item);
        if let Some(value) = number(item) {
            if value >= 0.0 {
                code = Some(value as u32);
            }
            continue;
        }
        if let (Some(current), Some(glyph)) = (code, name(item)) {
            differences.insert(current, glyph);
            code = Some(current + 1);
        }
    }
    differences
}

/// Build a compact `/Differences` array: one start code per run of
/// consecutive codes.
pub fn differences_array(differences: &BTreeMap<u32, String>) -> Vec<Object> {
    let mut array = Vec::new();
    let mut next: Option<u32> = None;
    for (code, glyph) in differences {
        if next != Some(*code) {
            array.push(Object::Integer(*code as i64));
        }
        array.push(Object::Name(glyph.as_bytes().to_vec()));
        next = Some(code + 1);
    }
    array
}
