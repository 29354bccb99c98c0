//! Reconstructed chat messages.

pub mod reducer;

pub use reducer::{
    process_chat_response, ChatFinish, ChatResponseOptions, ChatUpdate, MessageReducer,
    ToolCallHandler,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{ProviderMetadata, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message: ordered parts plus identity and annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiMessage {
    pub id: String,
    pub role: Role,
    /// Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub parts: Vec<UiPart>,
}

impl UiMessage {
    #[must_use]
    pub fn assistant(id: impl Into<String>, created_at: Option<u64>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            created_at,
            annotations: None,
            metadata: None,
            parts: Vec::new(),
        }
    }

    /// Concatenated text of all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                UiPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(|part| match part {
            UiPart::ToolInvocation { tool_invocation } => Some(tool_invocation),
            _ => None,
        })
    }

    /// Largest step among the message's tool invocations.
    #[must_use]
    pub fn max_tool_step(&self) -> Option<u32> {
        self.tool_invocations().map(ToolInvocation::step).max()
    }
}

/// One typed, ordered unit of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiPart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    #[serde(rename_all = "camelCase")]
    ToolInvocation { tool_invocation: ToolInvocation },
    Source {
        source: Source,
    },
    #[serde(rename_all = "camelCase")]
    File {
        media_type: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    StepStart,
}

/// Lifecycle of one tool call: `partial-call -> call -> result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ToolInvocation {
    #[serde(rename_all = "camelCase")]
    PartialCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
        step: u32,
    },
    #[serde(rename_all = "camelCase")]
    Call {
        tool_call_id: String,
        tool_name: String,
        args: Value,
        step: u32,
    },
    #[serde(rename_all = "camelCase")]
    Result {
        tool_call_id: String,
        tool_name: String,
        args: Value,
        result: Value,
        step: u32,
        /// Metadata the producer attached to the `tool-result` part.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
}

impl ToolInvocation {
    #[must_use]
    pub fn tool_call_id(&self) -> &str {
        match self {
            ToolInvocation::PartialCall { tool_call_id, .. }
            | ToolInvocation::Call { tool_call_id, .. }
            | ToolInvocation::Result { tool_call_id, .. } => tool_call_id,
        }
    }

    #[must_use]
    pub fn tool_name(&self) -> &str {
        match self {
            ToolInvocation::PartialCall { tool_name, .. }
            | ToolInvocation::Call { tool_name, .. }
            | ToolInvocation::Result { tool_name, .. } => tool_name,
        }
    }

    #[must_use]
    pub fn step(&self) -> u32 {
        match self {
            ToolInvocation::PartialCall { step, .. }
            | ToolInvocation::Call { step, .. }
            | ToolInvocation::Result { step, .. } => *step,
        }
    }

    #[must_use]
    pub fn state_name(&self) -> &'static str {
        match self {
            ToolInvocation::PartialCall { .. } => "partial-call",
            ToolInvocation::Call { .. } => "call",
            ToolInvocation::Result { .. } => "result",
        }
    }

    /// Position in the lifecycle; transitions never decrease it.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            ToolInvocation::PartialCall { .. } => 0,
            ToolInvocation::Call { .. } => 1,
            ToolInvocation::Result { .. } => 2,
        }
    }

    /// Complete arguments, or the best partial guess so far.
    #[must_use]
    pub fn args(&self) -> Option<&Value> {
        match self {
            ToolInvocation::PartialCall { args, .. } => args.as_ref(),
            ToolInvocation::Call { args, .. } | ToolInvocation::Result { args, .. } => Some(args),
        }
    }
}
