//! Reading instruction documents from YAML or JSON text.

use crate::detect::{sniff_instruction_format, InstructionFormat};
use crate::error::{Error, Result};

use super::model::InstructionSet;

/// Parse an instruction document.
///
/// With `format == None` the format is sniffed from the content: JSON when
/// it starts with `{` or `[`, YAML otherwise. Both encodings produce the same
/// [`InstructionSet`].
pub fn parse_instructions(text: &str, format: Option<InstructionFormat>) -> Result<InstructionSet> {
    if text.trim_start_matches('\u{feff}').trim().is_empty() {
        return Err(Error::EmptyInstructions);
    }

    let format = format.unwrap_or_else(|| sniff_instruction_format(text));
    log::debug!("Parsing instruction document as {:?}", format);

    match format {
        InstructionFormat::Json => from_json(text),
        InstructionFormat::Yaml => from_yaml(text),
    }
}

/// Parse a JSON instruction document.
pub fn from_json(text: &str) -> Result<InstructionSet> {
    let text = text.trim_start_matches('\u{feff}');
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(Error::Deserialize(
            "instruction document must be a JSON object".to_string(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}

/// Parse a YAML instruction document.
pub fn from_yaml(text: &str) -> Result<InstructionSet> {
    let text = text.trim_start_matches('\u{feff}');
    let value: serde_yaml::Value = serde_yaml::from_str(text)?;
    if !value.is_mapping() {
        return Err(Error::Deserialize(
            "instruction document must be a YAML mapping".to_string(),
        ));
    }
    Ok(serde_yaml::from_value(value)?)
}
