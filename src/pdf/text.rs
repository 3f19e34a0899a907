//! PDF text strings: decoding for reports, encoding for authored entries.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use lopdf::{Dictionary, Document, Object, StringFormat};

use super::objects::dict_get;

/// Decode a PDF text string.
///
/// UTF-16BE with a byte-order mark, then UTF-8 (with or without BOM), then
/// Latin-1 as the PDFDocEncoding approximation.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter_map(|c| {
                if c.len() == 2 {
                    Some(u16::from_be_bytes([c[0], c[1]]))
                } else {
                    None
                }
            })
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    bytes.iter().map(|&b| b as char).collect()
}

/// Encode text as a PDF string object.
///
/// ASCII text stays a literal string; anything else is written as UTF-16BE
/// with a byte-order mark.
pub fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Read a text string entry, accepting names as well.
pub fn dict_string(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict_get(doc, dict, key)? {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        _ => None,
    }
}

/// Parse a PDF date string (`D:YYYYMMDDHHmmSSOHH'mm'`).
///
/// Every field after the year is optional. A missing offset reads as UTC.
pub fn parse_pdf_date(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    let text = text.strip_prefix("D:").unwrap_or(text);
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits < 4 || digits % 2 != 0 || digits > 14 {
        return None;
    }
    let field = |start: usize, default: u32| -> Option<u32> {
        if start + 2 <= digits {
            text[start..start + 2].parse().ok()
        } else {
            Some(default)
        }
    };
    let year: i32 = text[..4].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(4, 1)?, field(6, 1)?)?;
    let time = date.and_hms_opt(field(8, 0)?, field(10, 0)?, field(12, 0)?)?;

    let rest = &text[digits..];
    let seconds = match rest.chars().next() {
        Some(sign @ ('+' | '-')) => {
            let offset: Vec<&str> = rest[1..].split('\'').filter(|p| !p.is_empty()).collect();
            let hours: i32 = offset.first()?.parse().ok()?;
            let minutes: i32 = offset.get(1).map_or(Ok(0), |m| m.parse()).ok()?;
            let seconds = hours * 3600 + minutes * 60;
            if sign == '-' {
                -seconds
            } else {
                seconds
            }
        }
        _ => 0,
    };
    FixedOffset::east_opt(seconds)?
        .from_local_datetime(&time)
        .single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_and_latin1() {
        assert_eq!(decode_text_string(b"Hello"), "Hello");
        assert_eq!(decode_text_string(&[0x48, 0x65, 0x6C, 0x6C, 0xE9]), "Hellé");
    }

    #[test]
    fn test_decode_utf16be() {
        let bytes = vec![0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69];
        assert_eq!(decode_text_string(&bytes), "Hi");
    }

    #[test]
    fn test_text_string_roundtrip_non_ascii() {
        let Object::String(bytes, format) = text_string("Résumé") else {
            panic!("expected string");
        };
        assert!(matches!(format, StringFormat::Hexadecimal));
        assert_eq!(decode_text_string(&bytes), "Résumé");
        assert!(matches!(
            text_string("Plain"),
            Object::String(_, StringFormat::Literal)
        ));
    }

    #[test]
    fn test_parse_pdf_date() {
        let date = parse_pdf_date("D:20240309140507-05'30'").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-03-09T14:05:07-05:30");

        let date = parse_pdf_date("D:19991231235959Z00'00'").unwrap();
        assert_eq!(date.to_rfc3339(), "1999-12-31T23:59:59+00:00");

        let date = parse_pdf_date("D:2023").unwrap();
        assert_eq!(date.to_rfc3339(), "2023-01-01T00:00:00+00:00");

        let date = parse_pdf_date("20230615+02").unwrap();
        assert_eq!(date.to_rfc3339(), "2023-06-15T00:00:00+02:00");
    }

    #[test]
    fn test_parse_pdf_date_rejects_garbage() {
        assert!(parse_pdf_date("yesterday").is_none());
        assert!(parse_pdf_date("D:202").is_none());
        assert!(parse_pdf_date("D:20241340").is_none());
    }
}
