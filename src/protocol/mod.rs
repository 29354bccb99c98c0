//! Wire protocol: the closed set of data stream parts and their JSON codecs.
//!
//! The current framing carries one `{"type": <tag>, "value": <payload>}` object
//! per SSE `data:` record. The older line framing (`<code>:<json>\n`) lives in
//! [`legacy`].

pub mod legacy;
pub mod parts;
pub mod usage;

pub use parts::{
    decode_payload, DataStreamPart, FileData, FinishMessage, FinishStep, MessageMetadata,
    PartType, ProviderMetadata, ReasoningDelta, Source, SourceTag, StartMessage, StartStep,
    ToolCall, ToolCallDelta, ToolCallStreamingStart, ToolResult,
};
pub use usage::{FinishReason, LanguageModelUsage};

use serde_json::Value;

use crate::error::PartParseError;

/// Parse one JSON-encoded `{type, value}` record.
///
/// # Errors
///
/// Returns a [`PartParseError`] of kind `Json` when `raw` is not valid JSON and
/// of kind `Schema` when the tag is unknown or the payload does not match it.
pub fn parse_json_part(raw: &str) -> Result<DataStreamPart, PartParseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| PartParseError::json(err.to_string(), raw))?;
    part_from_value(value).map_err(|reason| PartParseError::schema(reason, raw))
}

/// Validate an already-decoded JSON value as a data stream part.
///
/// # Errors
///
/// Returns the validation failure reason.
pub fn part_from_value(value: Value) -> Result<DataStreamPart, String> {
    let Value::Object(mut object) = value else {
        return Err("data stream parts must be JSON objects".to_string());
    };
    let tag = match object.get("type") {
        Some(Value::String(tag)) => tag.clone(),
        _ => return Err("data stream parts require a string \"type\" property".to_string()),
    };
    let Some(part_type) = PartType::from_tag(&tag) else {
        return Err(format!("unknown data stream part type \"{tag}\""));
    };
    let payload = object.remove("value").unwrap_or(Value::Null);
    decode_payload(part_type, payload)
}

/// Encode a part as its `{type, value}` JSON object.
#[must_use]
pub fn part_to_value(part: &DataStreamPart) -> Value {
    let mut object = serde_json::Map::with_capacity(2);
    object.insert(
        "type".to_string(),
        Value::String(part.part_type().as_str().to_string()),
    );
    object.insert("value".to_string(), part.payload());
    Value::Object(object)
}

/// Encode a part as compact JSON text.
#[must_use]
pub fn format_json_part(part: &DataStreamPart) -> String {
    part_to_value(part).to_string()
}

impl serde::Serialize for DataStreamPart {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        part_to_value(self).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for DataStreamPart {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        part_from_value(value).map_err(serde::de::Error::custom)
    }
}
