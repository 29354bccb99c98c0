use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::usage::{FinishReason, LanguageModelUsage};

/// Opaque provider metadata attached to reasoning, sources and tool results.
pub type ProviderMetadata = serde_json::Map<String, Value>;

/// Wire tag of a data stream part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartType {
    Text,
    Reasoning,
    ReasoningPartFinish,
    ToolCall,
    ToolCallDelta,
    ToolCallStreamingStart,
    ToolResult,
    Source,
    File,
    Error,
    Data,
    MessageAnnotations,
    MessageMetadata,
    StartStep,
    FinishStep,
    Start,
    Finish,
}

impl PartType {
    pub const ALL: [PartType; 17] = [
        PartType::Text,
        PartType::Reasoning,
        PartType::ReasoningPartFinish,
        PartType::ToolCall,
        PartType::ToolCallDelta,
        PartType::ToolCallStreamingStart,
        PartType::ToolResult,
        PartType::Source,
        PartType::File,
        PartType::Error,
        PartType::Data,
        PartType::MessageAnnotations,
        PartType::MessageMetadata,
        PartType::StartStep,
        PartType::FinishStep,
        PartType::Start,
        PartType::Finish,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PartType::Text => "text",
            PartType::Reasoning => "reasoning",
            PartType::ReasoningPartFinish => "reasoning-part-finish",
            PartType::ToolCall => "tool-call",
            PartType::ToolCallDelta => "tool-call-delta",
            PartType::ToolCallStreamingStart => "tool-call-streaming-start",
            PartType::ToolResult => "tool-result",
            PartType::Source => "source",
            PartType::File => "file",
            PartType::Error => "error",
            PartType::Data => "data",
            PartType::MessageAnnotations => "message-annotations",
            PartType::MessageMetadata => "message-metadata",
            PartType::StartStep => "start-step",
            PartType::FinishStep => "finish-step",
            PartType::Start => "start",
            PartType::Finish => "finish",
        }
    }

    /// Resolve a wire tag. `finish-message` is the older name of `finish`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "finish-message" => Some(PartType::Finish),
            other => Self::ALL.into_iter().find(|t| t.as_str() == other),
        }
    }
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningDelta {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallDelta {
    pub tool_call_id: String,
    pub args_text_delta: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallStreamingStart {
    pub tool_call_id: String,
    pub tool_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

/// Constant `"type": "source"` discriminator carried inside source payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    #[default]
    Source,
}

fn default_source_type() -> String {
    "url".to_string()
}

/// A cited source (currently always a URL source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(rename = "type", default)]
    pub tag: SourceTag,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

impl Source {
    #[must_use]
    pub fn url(id: impl Into<String>, url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            tag: SourceTag::Source,
            source_type: default_source_type(),
            id: id.into(),
            url: url.into(),
            title,
            provider_metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub url: String,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<LanguageModelUsage>,
    #[serde(default)]
    pub is_continued: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<LanguageModelUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// One validated unit of the wire protocol.
///
/// Exactly one variant per wire tag; the payload shape is fixed by the tag.
#[derive(Debug, Clone, PartialEq)]
pub enum DataStreamPart {
    Text(String),
    Reasoning(ReasoningDelta),
    ReasoningPartFinish,
    ToolCall(ToolCall),
    ToolCallDelta(ToolCallDelta),
    ToolCallStreamingStart(ToolCallStreamingStart),
    ToolResult(ToolResult),
    Source(Source),
    File(FileData),
    Error(String),
    Data(Vec<Value>),
    MessageAnnotations(Vec<Value>),
    MessageMetadata(MessageMetadata),
    StartStep(StartStep),
    FinishStep(FinishStep),
    Start(StartMessage),
    Finish(FinishMessage),
}

impl DataStreamPart {
    #[must_use]
    pub fn part_type(&self) -> PartType {
        match self {
            DataStreamPart::Text(_) => PartType::Text,
            DataStreamPart::Reasoning(_) => PartType::Reasoning,
            DataStreamPart::ReasoningPartFinish => PartType::ReasoningPartFinish,
            DataStreamPart::ToolCall(_) => PartType::ToolCall,
            DataStreamPart::ToolCallDelta(_) => PartType::ToolCallDelta,
            DataStreamPart::ToolCallStreamingStart(_) => PartType::ToolCallStreamingStart,
            DataStreamPart::ToolResult(_) => PartType::ToolResult,
            DataStreamPart::Source(_) => PartType::Source,
            DataStreamPart::File(_) => PartType::File,
            DataStreamPart::Error(_) => PartType::Error,
            DataStreamPart::Data(_) => PartType::Data,
            DataStreamPart::MessageAnnotations(_) => PartType::MessageAnnotations,
            DataStreamPart::MessageMetadata(_) => PartType::MessageMetadata,
            DataStreamPart::StartStep(_) => PartType::StartStep,
            DataStreamPart::FinishStep(_) => PartType::FinishStep,
            DataStreamPart::Start(_) => PartType::Start,
            DataStreamPart::Finish(_) => PartType::Finish,
        }
    }

    #[must_use]
    pub fn text(delta: impl Into<String>) -> Self {
        DataStreamPart::Text(delta.into())
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        DataStreamPart::Error(message.into())
    }

    #[must_use]
    pub fn data(values: Vec<Value>) -> Self {
        DataStreamPart::Data(values)
    }

    /// The payload carried in the `value` field on the wire.
    #[must_use]
    pub fn payload(&self) -> Value {
        fn to_value<T: Serialize>(payload: &T) -> Value {
            // Payload structs hold only strings, numbers and JSON values.
            serde_json::to_value(payload).unwrap_or(Value::Null)
        }

        match self {
            DataStreamPart::Text(text) | DataStreamPart::Error(text) => {
                Value::String(text.clone())
            }
            DataStreamPart::Reasoning(value) => to_value(value),
            DataStreamPart::ReasoningPartFinish => Value::Null,
            DataStreamPart::ToolCall(value) => to_value(value),
            DataStreamPart::ToolCallDelta(value) => to_value(value),
            DataStreamPart::ToolCallStreamingStart(value) => to_value(value),
            DataStreamPart::ToolResult(value) => to_value(value),
            DataStreamPart::Source(value) => to_value(value),
            DataStreamPart::File(value) => to_value(value),
            DataStreamPart::Data(values) | DataStreamPart::MessageAnnotations(values) => {
                Value::Array(values.clone())
            }
            DataStreamPart::MessageMetadata(value) => to_value(value),
            DataStreamPart::StartStep(value) => to_value(value),
            DataStreamPart::FinishStep(value) => to_value(value),
            DataStreamPart::Start(value) => to_value(value),
            DataStreamPart::Finish(value) => to_value(value),
        }
    }
}

fn expect_payload<T: serde::de::DeserializeOwned>(value: Value, message: &str) -> Result<T, String> {
    serde_json::from_value(value).map_err(|err| format!("{message} ({err})"))
}

/// Validate `value` against the payload schema of `part_type`.
///
/// # Errors
///
/// Returns a human-readable reason when the payload does not match.
pub fn decode_payload(part_type: PartType, value: Value) -> Result<DataStreamPart, String> {
    let part = match part_type {
        PartType::Text => DataStreamPart::Text(expect_payload(
            value,
            "\"text\" parts expect a string value.",
        )?),
        PartType::Error => DataStreamPart::Error(expect_payload(
            value,
            "\"error\" parts expect a string value.",
        )?),
        PartType::Data => DataStreamPart::Data(expect_payload(
            value,
            "\"data\" parts expect an array value.",
        )?),
        PartType::MessageAnnotations => DataStreamPart::MessageAnnotations(expect_payload(
            value,
            "\"message-annotations\" parts expect an array value.",
        )?),
        PartType::Reasoning => DataStreamPart::Reasoning(expect_payload(
            value,
            "\"reasoning\" parts expect an object with a \"text\" property.",
        )?),
        PartType::ReasoningPartFinish => DataStreamPart::ReasoningPartFinish,
        PartType::ToolCall => {
            let call: ToolCall = expect_payload(
                value,
                "\"tool-call\" parts expect an object with a \"toolCallId\", \"toolName\", and \"args\" property.",
            )?;
            if !(call.args.is_object() || call.args.is_array()) {
                return Err(
                    "\"tool-call\" parts expect an object with a \"toolCallId\", \"toolName\", and \"args\" property."
                        .to_string(),
                );
            }
            DataStreamPart::ToolCall(call)
        }
        PartType::ToolCallDelta => DataStreamPart::ToolCallDelta(expect_payload(
            value,
            "\"tool-call-delta\" parts expect an object with a \"toolCallId\" and \"argsTextDelta\" property.",
        )?),
        PartType::ToolCallStreamingStart => DataStreamPart::ToolCallStreamingStart(expect_payload(
            value,
            "\"tool-call-streaming-start\" parts expect an object with a \"toolCallId\" and \"toolName\" property.",
        )?),
        PartType::ToolResult => DataStreamPart::ToolResult(expect_payload(
            value,
            "\"tool-result\" parts expect an object with a \"toolCallId\" and a \"result\" property.",
        )?),
        PartType::Source => DataStreamPart::Source(expect_payload(
            value,
            "\"source\" parts expect a Source object.",
        )?),
        PartType::File => DataStreamPart::File(expect_payload(
            value,
            "\"file\" parts expect an object with a \"url\" and \"mediaType\" property.",
        )?),
        PartType::MessageMetadata => {
            DataStreamPart::MessageMetadata(expect_object_or_null(value, part_type)?)
        }
        PartType::StartStep => DataStreamPart::StartStep(expect_object_or_null(value, part_type)?),
        PartType::FinishStep => {
            DataStreamPart::FinishStep(expect_object_or_null(value, part_type)?)
        }
        PartType::Start => DataStreamPart::Start(expect_object_or_null(value, part_type)?),
        PartType::Finish => DataStreamPart::Finish(expect_object_or_null(value, part_type)?),
    };
    Ok(part)
}

/// Step and message boundary payloads are all-optional; `null` means "no fields".
fn expect_object_or_null<T>(value: Value, part_type: PartType) -> Result<T, String>
where
    T: serde::de::DeserializeOwned + Default,
{
    match value {
        Value::Null => Ok(T::default()),
        Value::Object(_) => expect_payload(
            value,
            &format!("\"{part_type}\" parts expect an object value."),
        ),
        _ => Err(format!("\"{part_type}\" parts expect an object value.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_part_type_tags_roundtrip() {
        for part_type in PartType::ALL {
            assert_eq!(PartType::from_tag(part_type.as_str()), Some(part_type));
        }
        assert_eq!(PartType::from_tag("finish-message"), Some(PartType::Finish));
        assert_eq!(PartType::from_tag("nope"), None);
    }

    #[test]
    fn test_decode_text_requires_string() {
        assert_eq!(
            decode_payload(PartType::Text, json!("hi")).unwrap(),
            DataStreamPart::text("hi")
        );
        let err = decode_payload(PartType::Text, json!(1)).unwrap_err();
        assert!(err.starts_with("\"text\" parts expect a string value."));
    }

    #[test]
    fn test_decode_tool_call_requires_object_args() {
        let ok = decode_payload(
            PartType::ToolCall,
            json!({"toolCallId":"c1","toolName":"weather","args":{"city":"SF"}}),
        )
        .unwrap();
        assert!(matches!(ok, DataStreamPart::ToolCall(ref call) if call.tool_name == "weather"));

        assert!(decode_payload(
            PartType::ToolCall,
            json!({"toolCallId":"c1","toolName":"weather","args":"city"}),
        )
        .is_err());
        assert!(decode_payload(
            PartType::ToolCall,
            json!({"toolCallId":"c1","toolName":"weather"}),
        )
        .is_err());
    }

    #[test]
    fn test_decode_tool_result_requires_result() {
        assert!(decode_payload(PartType::ToolResult, json!({"toolCallId":"c1"})).is_err());
        let ok = decode_payload(
            PartType::ToolResult,
            json!({"toolCallId":"c1","result":null}),
        )
        .unwrap();
        assert!(matches!(ok, DataStreamPart::ToolResult(ref r) if r.result.is_null()));
    }

    #[test]
    fn test_decode_finish_step_defaults() {
        let part = decode_payload(
            PartType::FinishStep,
            json!({"finishReason":"stop","usage":{"promptTokens":1,"completionTokens":2}}),
        )
        .unwrap();
        let DataStreamPart::FinishStep(step) = part else {
            panic!("expected finish-step");
        };
        assert_eq!(step.finish_reason, Some(FinishReason::Stop));
        assert!(!step.is_continued);
        assert_eq!(step.usage.map(|u| u.input_tokens), Some(Some(1)));

        assert_eq!(
            decode_payload(PartType::Finish, Value::Null).unwrap(),
            DataStreamPart::Finish(FinishMessage::default())
        );
        assert!(decode_payload(PartType::StartStep, json!("x")).is_err());
    }

    #[test]
    fn test_source_payload_shape() {
        let source = Source::url("s1", "https://example.com", Some("Example".to_string()));
        let part = DataStreamPart::Source(source);
        assert_eq!(
            part.payload(),
            json!({
                "type": "source",
                "sourceType": "url",
                "id": "s1",
                "url": "https://example.com",
                "title": "Example"
            })
        );
    }

    #[test]
    fn test_reasoning_part_finish_payload_is_null() {
        assert_eq!(DataStreamPart::ReasoningPartFinish.payload(), Value::Null);
        assert_eq!(
            decode_payload(PartType::ReasoningPartFinish, json!({})).unwrap(),
            DataStreamPart::ReasoningPartFinish
        );
    }
}
