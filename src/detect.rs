//! Input format detection: PDF headers and instruction document sniffing.

use crate::error::{Error, Result};

/// PDF header information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfFormat {
    /// PDF version (e.g., "1.7", "2.0")
    pub version: String,
}

impl std::fmt::Display for PdfFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PDF {}", self.version)
    }
}

/// Serialization format of an instruction document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionFormat {
    Json,
    Yaml,
}

impl InstructionFormat {
    /// Map a MIME type or file extension to a format.
    ///
    /// Returns `None` for anything that is neither JSON nor YAML, in which case
    /// callers fall back to [`sniff_instruction_format`].
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim().to_ascii_lowercase();
        let hint = hint.split(';').next().unwrap_or_default().trim();
        match hint {
            "json" | "application/json" | "text/json" => Some(Self::Json),
            "yaml" | "yml" | "application/yaml" | "application/x-yaml" | "text/yaml"
            | "text/x-yaml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// PDF magic bytes: %PDF-
const PDF_MAGIC: &[u8] = b"%PDF-";
const PDF_MAGIC_LEN: usize = 5;
const VERSION_LEN: usize = 3; // e.g., "1.7"

/// Some producers emit junk before the header; readers accept it within the first KiB.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Detect the PDF header in a byte buffer.
///
/// # Returns
/// * `Ok(PdfFormat)` if a valid header is found near the start of the data
/// * `Err(Error::UnknownFormat)` if the data is not a PDF
pub fn detect_format_from_bytes(data: &[u8]) -> Result<PdfFormat> {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    let start = window
        .windows(PDF_MAGIC_LEN)
        .position(|w| w == PDF_MAGIC)
        .ok_or(Error::UnknownFormat)?;

    let version_start = start + PDF_MAGIC_LEN;
    let version_bytes = data
        .get(version_start..version_start + VERSION_LEN)
        .ok_or(Error::UnknownFormat)?;
    let version = String::from_utf8_lossy(version_bytes).to_string();

    if !is_valid_version(&version) {
        return Err(Error::UnsupportedVersion(version));
    }

    Ok(PdfFormat { version })
}

/// Check if a version string is valid.
fn is_valid_version(version: &str) -> bool {
    let bytes = version.as_bytes();
    bytes.len() == 3 && bytes[0].is_ascii_digit() && bytes[1] == b'.' && bytes[2].is_ascii_digit()
}

/// Check if bytes represent a PDF.
pub fn is_pdf_bytes(data: &[u8]) -> bool {
    detect_format_from_bytes(data).is_ok()
}

/// Guess the format of an instruction document from its content.
///
/// JSON when the first non-whitespace character opens an object or array,
/// YAML otherwise. A leading UTF-8 BOM is ignored.
pub fn sniff_instruction_format(text: &str) -> InstructionFormat {
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    match trimmed.chars().next() {
        Some('{') | Some('[') => InstructionFormat::Json,
        _ => InstructionFormat::Yaml,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_valid_pdf() {
        let data = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3";
        let format = detect_format_from_bytes(data).unwrap();
        assert_eq!(format.version, "1.7");
    }

    #[test]
    fn test_detect_header_after_garbage() {
        let data = b"\r\n\0junk%PDF-2.0\n";
        let format = detect_format_from_bytes(data).unwrap();
        assert_eq!(format.version, "2.0");
    }

    #[test]
    fn test_detect_invalid_format() {
        let result = detect_format_from_bytes(b"<!DOCTYPE html>");
        assert!(matches!(result, Err(Error::UnknownFormat)));
        assert!(matches!(
            detect_format_from_bytes(b"%PDF"),
            Err(Error::UnknownFormat)
        ));
    }

    #[test]
    fn test_detect_bad_version() {
        let result = detect_format_from_bytes(b"%PDF-x.y\n");
        assert!(matches!(result, Err(Error::UnsupportedVersion(v)) if v == "x.y"));
    }

    #[test]
    fn test_sniff_instruction_format() {
        assert_eq!(
            sniff_instruction_format("  {\"version\": \"1.0\"}"),
            InstructionFormat::Json
        );
        assert_eq!(sniff_instruction_format("\n[]"), InstructionFormat::Json);
        assert_eq!(
            sniff_instruction_format("version: \"1.0\""),
            InstructionFormat::Yaml
        );
        assert_eq!(
            sniff_instruction_format("\u{feff}{}"),
            InstructionFormat::Json
        );
    }

    #[test]
    fn test_format_from_hint() {
        assert_eq!(
            InstructionFormat::from_hint("application/json; charset=utf-8"),
            Some(InstructionFormat::Json)
        );
        assert_eq!(
            InstructionFormat::from_hint("YML"),
            Some(InstructionFormat::Yaml)
        );
        assert_eq!(InstructionFormat::from_hint("text/plain"), None);
    }
}
