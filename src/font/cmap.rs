//! ToUnicode CMap reading and writing.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Entries per `beginbfchar` block; PDF limits blocks to 100.
const BLOCK_SIZE: usize = 100;

/// Largest range expanded while parsing `bfrange` entries.
const MAX_RANGE: u32 = 0x1_0000;

fn block_regex(kind: &str) -> &'static Regex {
    static CHAR: OnceLock<Regex> = OnceLock::new();
    static RANGE: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();
    let (cell, pattern) = match kind {
        "bfchar" => (&CHAR, r"(?s)beginbfchar(.*?)endbfchar"),
        "bfrange" => (&RANGE, r"(?s)beginbfrange(.*?)endbfrange"),
        _ => (&SPACE, r"(?s)begincodespacerange(.*?)endcodespacerange"),
    };
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"<[0-9A-Fa-f\s]*>|\[|\]").expect("static regex"))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Open,
    Close,
}

fn tokens(block: &str) -> Vec<Token> {
    token_regex()
        .find_iter(block)
        .map(|m| match m.as_str() {
            "[" => Token::Open,
            "]" => Token::Close,
            hex => Token::Hex(hex_bytes(&hex[1..hex.len() - 1])),
        })
        .collect()
}

fn hex_bytes(hex: &str) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .bytes()
        .filter(|b| b.is_ascii_hexdigit())
        .map(|b| (b as char).to_digit(16).unwrap_or(0) as u8)
        .collect();
    digits
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => hi << 4 | lo,
            [hi] => hi << 4,
            _ => 0,
        })
        .collect()
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [lo] => *lo as u16,
            _ => 0,
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Add `offset` to the last UTF-16 unit of a destination string.
fn offset_text(bytes: &[u8], offset: u32) -> String {
    let mut units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [lo] => *lo as u16,
            _ => 0,
        })
        .collect();
    if let Some(last) = units.last_mut() {
        *last = last.wrapping_add(offset as u16);
    }
    String::from_utf16_lossy(&units)
}

/// A parsed ToUnicode map: character code → Unicode text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicodeCMap {
    code_bytes: usize,
    mappings: BTreeMap<u32, String>,
}

impl ToUnicodeCMap {
    /// Empty map with the given code width (1 for simple fonts, 2 for Type0).
    pub fn new(code_bytes: usize) -> Self {
        Self {
            code_bytes: code_bytes.clamp(1, 4),
            mappings: BTreeMap::new(),
        }
    }

    /// Parse CMap stream data.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(data);
        if !text.contains("begincmap") && !text.contains("beginbf") {
            return Err(Error::Font("not a CMap stream".to_string()));
        }

        let code_bytes = block_regex("codespace")
            .captures(&text)
            .and_then(|caps| {
                tokens(&caps[1]).into_iter().find_map(|t| match t {
                    Token::Hex(bytes) if !bytes.is_empty() => Some(bytes.len()),
                    _ => None,
                })
            })
            .unwrap_or(1);
        let mut cmap = Self::new(code_bytes);

        for caps in block_regex("bfchar").captures_iter(&text) {
            let toks = tokens(&caps[1]);
            for pair in toks.chunks(2) {
                if let [Token::Hex(src), Token::Hex(dst)] = pair {
                    cmap.mappings.insert(code_value(src), utf16_text(dst));
                }
            }
        }

        for caps in block_regex("bfrange").captures_iter(&text) {
            let toks = tokens(&caps[1]);
            let mut i = 0;
            while i + 2 < toks.len() {
                let (Token::Hex(lo), Token::Hex(hi)) = (&toks[i], &toks[i + 1]) else {
                    i += 1;
                    continue;
                };
                let (lo, hi) = (code_value(lo), code_value(hi));
                let span = hi.saturating_sub(lo).min(MAX_RANGE - 1);
                match &toks[i + 2] {
                    Token::Hex(dst) => {
                        for offset in 0..=span {
                            cmap.mappings.insert(lo + offset, offset_text(dst, offset));
                        }
                        i += 3;
                    }
                    Token::Open => {
                        let mut j = i + 3;
                        let mut offset = 0;
                        while j < toks.len() && toks[j] != Token::Close {
                            if let Token::Hex(dst) = &toks[j] {
                                if offset <= span {
                                    cmap.mappings.insert(lo + offset, utf16_text(dst));
                                }
                                offset += 1;
                            }
                            j += 1;
                        }
                        i = j + 1;
                    }
                    Token::Close => i += 3,
                }
            }
        }

        Ok(cmap)
    }

    pub fn code_bytes(&self) -> usize {
        self.code_bytes
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn get(&self, code: u32) -> Option<&str> {
        self.mappings.get(&code).map(String::as_str)
    }

    pub fn insert(&mut self, code: u32, text: impl Into<String>) {
        self.mappings.insert(code, text.into());
    }

    pub fn mappings(&self) -> &BTreeMap<u32, String> {
        &self.mappings
    }

    /// Merge `other` into this map; entries from `other` win.
    pub fn merge(&mut self, other: &ToUnicodeCMap) {
        for (code, text) in &other.mappings {
            self.mappings.insert(*code, text.clone());
        }
    }

    /// Whether code 0 (notdef) maps to a printable character.
    pub fn maps_notdef(&self) -> bool {
        self.mappings
            .get(&0)
            .is_some_and(|text| text.chars().any(|c| !c.is_control() && c != '\u{FFFD}'))
    }

    /// A map is usable when it is non-empty, leaves notdef unmapped, and
    /// never maps to U+0000 or U+FFFD.
    pub fn is_valid(&self) -> bool {
        !self.is_empty()
            && !self.maps_notdef()
            && !self
                .mappings
                .values()
                .any(|text| text.is_empty() || text.contains('\0') || text.contains('\u{FFFD}'))
    }

    /// Highest code the codespace range can hold.
    pub fn max_code(&self) -> u32 {
        match self.code_bytes {
            4 => u32::MAX,
            n => (1u32 << (8 * n)) - 1,
        }
    }

    /// Serialize as a CMap stream body.
    ///
    /// Mappings whose code falls outside the codespace are left out.
    pub fn to_bytes(&self) -> Vec<u8> {
        let width = self.code_bytes * 2;
        let max = self.max_code();
        let mut body = String::new();
        let entries: Vec<(&u32, &String)> =
            self.mappings.iter().filter(|(code, _)| **code <= max).collect();
        for chunk in entries.chunks(BLOCK_SIZE) {
            let _ = writeln!(body, "{} beginbfchar", chunk.len());
            for (code, text) in chunk {
                let _ = writeln!(
                    body,
                    "<{:0width$X}> <{}>",
                    code,
                    utf16_hex(text),
                    width = width
                );
            }
            body.push_str("endbfchar\n");
        }
        wrap_cmap(self.code_bytes, &body)
    }

    /// CMap mapping every 2-byte code to the BMP code point of the same
    /// value, leaving out notdef, surrogates and the replacement character.
    pub fn identity_bmp() -> Vec<u8> {
        let ranges: Vec<(u32, u32)> = (0x00u32..=0xFF)
            .filter(|high| !(0xD8..=0xDF).contains(high))
            .map(|high| {
                let low = if high == 0 { 1 } else { 0 };
                let last = if high == 0xFF { 0xFC } else { 0xFF };
                (high << 8 | low, high << 8 | last)
            })
            .collect();
        let mut body = String::new();
        for chunk in ranges.chunks(BLOCK_SIZE) {
            let _ = writeln!(body, "{} beginbfrange", chunk.len());
            for (first, last) in chunk {
                let _ = writeln!(body, "<{:04X}> <{:04X}> <{:04X}>", first, last, first);
            }
            body.push_str("endbfrange\n");
        }
        wrap_cmap(2, &body)
    }
}

fn utf16_hex(text: &str) -> String {
    text.encode_utf16().map(|unit| format!("{:04X}", unit)).collect()
}

fn wrap_cmap(code_bytes: usize, body: &str) -> Vec<u8> {
    let (low, high) = ("00".repeat(code_bytes), "FF".repeat(code_bytes));
    format!(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <{low}> <{high}>\n\
         endcodespacerange\n\
         {body}\
         endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n"
    )
    .into_bytes()
}
