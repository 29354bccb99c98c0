//! Legacy line framing: `<code>:<json>\n`, one part per line.
//!
//! Kept for reading older recordings and servers. New tags are not given codes.

use serde_json::Value;

use super::parts::{decode_payload, DataStreamPart, PartType};
use crate::error::{PartParseError, StreamError};

/// Single-character code for each tag that existed in the line framing.
#[must_use]
pub fn code_for(part_type: PartType) -> Option<char> {
    let code = match part_type {
        PartType::Text => '0',
        PartType::Data => '2',
        PartType::Error => '3',
        PartType::MessageAnnotations => '8',
        PartType::ToolCall => '9',
        PartType::ToolResult => 'a',
        PartType::ToolCallStreamingStart => 'b',
        PartType::ToolCallDelta => 'c',
        PartType::Finish => 'd',
        PartType::FinishStep => 'e',
        PartType::StartStep => 'f',
        PartType::Reasoning => 'g',
        PartType::Source => 'h',
        PartType::File => 'k',
        PartType::ReasoningPartFinish => 'l',
        PartType::Start | PartType::MessageMetadata => return None,
    };
    Some(code)
}

#[must_use]
pub fn part_type_for_code(code: &str) -> Option<PartType> {
    let part_type = match code {
        "0" => PartType::Text,
        "2" => PartType::Data,
        "3" => PartType::Error,
        "8" => PartType::MessageAnnotations,
        "9" => PartType::ToolCall,
        "a" => PartType::ToolResult,
        "b" => PartType::ToolCallStreamingStart,
        "c" => PartType::ToolCallDelta,
        "d" => PartType::Finish,
        "e" => PartType::FinishStep,
        "f" => PartType::StartStep,
        "g" => PartType::Reasoning,
        "h" => PartType::Source,
        "k" => PartType::File,
        "l" => PartType::ReasoningPartFinish,
        _ => return None,
    };
    Some(part_type)
}

/// Parse one `<code>:<json>` line (without the trailing newline).
///
/// # Errors
///
/// Returns a [`PartParseError`] when the separator or code is missing, the
/// JSON is malformed, or the payload does not match the code's schema.
pub fn parse_legacy_line(line: &str) -> Result<DataStreamPart, PartParseError> {
    let Some((prefix, text_value)) = line.split_once(':') else {
        return Err(PartParseError::schema(
            "Failed to parse stream string. No separator found.",
            line,
        ));
    };
    let Some(part_type) = part_type_for_code(prefix) else {
        return Err(PartParseError::schema(
            format!("Failed to parse stream string. Invalid code {prefix}."),
            line,
        ));
    };
    let value: Value = serde_json::from_str(text_value)
        .map_err(|err| PartParseError::json(err.to_string(), line))?;
    decode_payload(part_type, value).map_err(|reason| PartParseError::schema(reason, line))
}

/// Format a part as a legacy line, including the trailing newline.
///
/// # Errors
///
/// Returns [`StreamError::Protocol`] for tags introduced after the line
/// framing was frozen.
pub fn format_legacy_line(part: &DataStreamPart) -> Result<String, StreamError> {
    let part_type = part.part_type();
    let code = code_for(part_type).ok_or_else(|| {
        StreamError::Protocol(format!("\"{part_type}\" parts have no legacy stream code"))
    })?;
    let payload = part.payload().to_string();
    let mut out = String::with_capacity(3 + payload.len());
    out.push(code);
    out.push(':');
    out.push_str(&payload);
    out.push('\n');
    Ok(out)
}
