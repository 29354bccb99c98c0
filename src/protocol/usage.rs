use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
    #[default]
    Unknown,
}

impl FinishReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content-filter",
            FinishReason::ToolCalls => "tool-calls",
            FinishReason::Error => "error",
            FinishReason::Other => "other",
            FinishReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage reported by `finish-step` and `finish` parts.
///
/// Accepts both the current field names and the v1 `promptTokens` /
/// `completionTokens` spelling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageModelUsage {
    #[serde(default, alias = "promptTokens", skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, alias = "completionTokens", skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u64>,
}

impl LanguageModelUsage {
    #[must_use]
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            ..Self::default()
        }
        .normalized()
    }

    /// Fill `total_tokens` from input + output when the producer omitted it.
    /// Sums saturate at `u64::MAX`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.total_tokens.is_none() {
            self.total_tokens = match (self.input_tokens, self.output_tokens) {
                (Some(input), Some(output)) => Some(input.saturating_add(output)),
                (Some(only), None) | (None, Some(only)) => Some(only),
                (None, None) => None,
            };
        }
        self
    }
}

fn add_optional(lhs: &mut Option<u64>, rhs: Option<u64>) {
    if let Some(value) = rhs {
        *lhs = Some(lhs.unwrap_or(0).saturating_add(value));
    }
}

impl AddAssign for LanguageModelUsage {
    fn add_assign(&mut self, rhs: Self) {
        let rhs = rhs.normalized();
        add_optional(&mut self.input_tokens, rhs.input_tokens);
        add_optional(&mut self.output_tokens, rhs.output_tokens);
        add_optional(&mut self.total_tokens, rhs.total_tokens);
        add_optional(&mut self.reasoning_tokens, rhs.reasoning_tokens);
        add_optional(&mut self.cached_input_tokens, rhs.cached_input_tokens);
    }
}
