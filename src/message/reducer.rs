//! Folds a data stream into one evolving assistant message.
//!
//! Every state change publishes a deep-copied snapshot through the `update`
//! callback. Published snapshots are never retracted: a later fatal error only
//! means no further snapshots follow.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::AbortRegistration;
use futures_util::stream::{Abortable, Stream};
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Role, ToolInvocation, UiMessage, UiPart};
use crate::error::StreamError;
use crate::json_repair::{parse_partial_json_with, FixJson, JsonRepair, PartialJsonState};
use crate::observability::log_message_complete;
use crate::protocol::{
    FileData, FinishMessage, FinishReason, FinishStep, LanguageModelUsage, MessageMetadata,
    ProviderMetadata, ReasoningDelta, Source, StartMessage, StartStep, ToolCall, ToolCallDelta,
    ToolCallStreamingStart, ToolResult,
};
use crate::stream::dispatch::{process_data_stream, DataStreamHandler};
use crate::stream::parser::{parse_data_stream, Framing};
use crate::util::{merge_json, system_clock, Clock, IdGenerator, RandomIdGenerator};

/// Snapshot handed to the `update` callback after each state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUpdate {
    pub message: UiMessage,
    /// Every `data` value received so far.
    pub data: Vec<Value>,
    /// True when the stream continues the caller's last assistant message.
    pub replace_last_message: bool,
    /// Fresh id per snapshot.
    pub revision_id: String,
}

/// Final state once the byte stream ends cleanly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFinish {
    pub message: UiMessage,
    pub finish_reason: FinishReason,
    pub usage: LanguageModelUsage,
}

/// Client-side tool execution, awaited inline when a `tool-call` arrives.
///
/// Returning `Some(result)` completes the invocation immediately. Dispatch of
/// later parts waits until the handler returns.
#[async_trait]
pub trait ToolCallHandler: Send + Sync {
    async fn call(&self, call: &ToolCall) -> Result<Option<Value>, StreamError>;
}

#[async_trait]
impl<F, Fut> ToolCallHandler for F
where
    F: Fn(ToolCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>, StreamError>> + Send + 'static,
{
    async fn call(&self, call: &ToolCall) -> Result<Option<Value>, StreamError> {
        self(call.clone()).await
    }
}

type UpdateFn = Box<dyn FnMut(ChatUpdate) + Send>;
type FinishFn = Box<dyn FnOnce(&ChatFinish) + Send>;

/// Inputs of [`process_chat_response`].
pub struct ChatResponseOptions {
    update: UpdateFn,
    on_tool_call: Option<Box<dyn ToolCallHandler>>,
    on_finish: Option<FinishFn>,
    last_message: Option<UiMessage>,
    id_generator: Arc<dyn IdGenerator>,
    clock: Clock,
    json_repair: Arc<dyn JsonRepair>,
    framing: Framing,
    abort: Option<AbortRegistration>,
}

impl ChatResponseOptions {
    pub fn new(update: impl FnMut(ChatUpdate) + Send + 'static) -> Self {
        Self {
            update: Box::new(update),
            on_tool_call: None,
            on_finish: None,
            last_message: None,
            id_generator: Arc::new(RandomIdGenerator::default()),
            clock: system_clock(),
            json_repair: Arc::new(FixJson),
            framing: Framing::default(),
            abort: None,
        }
    }

    #[must_use]
    pub fn with_tool_call_handler(mut self, handler: impl ToolCallHandler + 'static) -> Self {
        self.on_tool_call = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn with_on_finish(mut self, on_finish: impl FnOnce(&ChatFinish) + Send + 'static) -> Self {
        self.on_finish = Some(Box::new(on_finish));
        self
    }

    /// Continue `message` instead of starting a new one, if it is an
    /// assistant message.
    #[must_use]
    pub fn with_last_message(mut self, message: Option<UiMessage>) -> Self {
        self.last_message = message;
        self
    }

    #[must_use]
    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_json_repair(mut self, json_repair: Arc<dyn JsonRepair>) -> Self {
        self.json_repair = json_repair;
        self
    }

    #[must_use]
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Stop reading the stream when the paired `AbortHandle` fires.
    #[must_use]
    pub fn with_abort(mut self, registration: AbortRegistration) -> Self {
        self.abort = Some(registration);
        self
    }
}

struct PartialToolCall {
    text: String,
    step: u32,
    tool_name: String,
}

/// The message state machine. Drive it with
/// [`process_data_stream`](crate::stream::process_data_stream) or use
/// [`process_chat_response`].
pub struct MessageReducer {
    message: UiMessage,
    replace_last_message: bool,
    step: u32,
    current_text: Option<usize>,
    current_reasoning: Option<usize>,
    partial_tool_calls: FxHashMap<String, PartialToolCall>,
    data: Vec<Value>,
    annotations: Option<Vec<Value>>,
    usage: LanguageModelUsage,
    finish_reason: FinishReason,
    update: UpdateFn,
    on_tool_call: Option<Box<dyn ToolCallHandler>>,
    id_generator: Arc<dyn IdGenerator>,
    json_repair: Arc<dyn JsonRepair>,
}

impl MessageReducer {
    /// Build the initial state. `on_finish`, framing and abort settings are
    /// ignored here; they belong to [`process_chat_response`].
    #[must_use]
    pub fn new(options: ChatResponseOptions) -> Self {
        let ChatResponseOptions {
            update,
            on_tool_call,
            last_message,
            id_generator,
            clock,
            json_repair,
            ..
        } = options;

        let prior = last_message.filter(|message| message.role == Role::Assistant);
        let replace_last_message = prior.is_some();
        let (message, step, annotations) = match prior {
            Some(message) => {
                let step = 1 + message.max_tool_step().unwrap_or(0);
                let annotations = message.annotations.clone();
                (message, step, annotations)
            }
            None => (
                UiMessage::assistant(id_generator.generate(), Some(clock())),
                0,
                None,
            ),
        };

        Self {
            message,
            replace_last_message,
            step,
            current_text: None,
            current_reasoning: None,
            partial_tool_calls: FxHashMap::default(),
            data: Vec::new(),
            annotations,
            usage: LanguageModelUsage::default(),
            finish_reason: FinishReason::Unknown,
            update,
            on_tool_call,
            id_generator,
            json_repair,
        }
    }

    #[must_use]
    pub fn message(&self) -> &UiMessage {
        &self.message
    }

    #[must_use]
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Consume the reducer into its final message, finish reason and usage.
    #[must_use]
    pub fn finish(mut self) -> ChatFinish {
        self.sync_annotations();
        ChatFinish {
            message: self.message,
            finish_reason: self.finish_reason,
            usage: self.usage.normalized(),
        }
    }

    fn sync_annotations(&mut self) {
        if let Some(annotations) = self.annotations.as_ref().filter(|a| !a.is_empty()) {
            self.message.annotations = Some(annotations.clone());
        }
    }

    fn emit_update(&mut self) {
        self.sync_annotations();
        let update = ChatUpdate {
            message: self.message.clone(),
            data: self.data.clone(),
            replace_last_message: self.replace_last_message,
            revision_id: self.id_generator.generate(),
        };
        (self.update)(update);
    }

    fn open_text_mut(&mut self) -> Option<&mut String> {
        match self.message.parts.get_mut(self.current_text?) {
            Some(UiPart::Text { text }) => Some(text),
            _ => None,
        }
    }

    fn open_reasoning_mut(&mut self) -> Option<(&mut String, &mut Option<ProviderMetadata>)> {
        match self.message.parts.get_mut(self.current_reasoning?) {
            Some(UiPart::Reasoning {
                text,
                provider_metadata,
            }) => Some((text, provider_metadata)),
            _ => None,
        }
    }

    fn find_tool_invocation(&self, tool_call_id: &str) -> Option<&ToolInvocation> {
        self.message
            .tool_invocations()
            .find(|invocation| invocation.tool_call_id() == tool_call_id)
    }

    /// Insert or replace the invocation with the same id. Returns false when
    /// the replacement would move the lifecycle backwards.
    fn upsert_tool_invocation(&mut self, invocation: ToolInvocation) -> bool {
        let existing = self.message.parts.iter_mut().find_map(|part| match part {
            UiPart::ToolInvocation { tool_invocation }
                if tool_invocation.tool_call_id() == invocation.tool_call_id() =>
            {
                Some(tool_invocation)
            }
            _ => None,
        });

        match existing {
            Some(existing) if invocation.rank() < existing.rank() => {
                warn!(
                    tool_call_id = existing.tool_call_id(),
                    from = existing.state_name(),
                    to = invocation.state_name(),
                    "ignoring backwards tool invocation transition"
                );
                false
            }
            Some(existing) => {
                *existing = invocation;
                true
            }
            None => {
                self.message.parts.push(UiPart::ToolInvocation {
                    tool_invocation: invocation,
                });
                true
            }
        }
    }

    fn merge_metadata(&mut self, metadata: Option<Value>) -> bool {
        let Some(metadata) = metadata else {
            return false;
        };
        match self.message.metadata.as_mut() {
            Some(existing) => merge_json(existing, metadata),
            None => self.message.metadata = Some(metadata),
        }
        true
    }

    /// Server-assigned ids win, except when continuing a prior message.
    fn adopt_message_id(&mut self, message_id: Option<String>) -> bool {
        match message_id {
            Some(id) if !self.replace_last_message => {
                self.message.id = id;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl DataStreamHandler for MessageReducer {
    async fn on_text(&mut self, delta: String) -> Result<(), StreamError> {
        if let Some(text) = self.open_text_mut() {
            text.push_str(&delta);
        } else {
            self.current_text = Some(self.message.parts.len());
            self.message.parts.push(UiPart::Text { text: delta });
        }
        self.emit_update();
        Ok(())
    }

    async fn on_reasoning(&mut self, delta: ReasoningDelta) -> Result<(), StreamError> {
        let ReasoningDelta {
            text: delta_text,
            provider_metadata: delta_metadata,
        } = delta;
        if let Some((text, provider_metadata)) = self.open_reasoning_mut() {
            text.push_str(&delta_text);
            *provider_metadata = delta_metadata;
        } else {
            self.current_reasoning = Some(self.message.parts.len());
            self.message.parts.push(UiPart::Reasoning {
                text: delta_text,
                provider_metadata: delta_metadata,
            });
        }
        self.emit_update();
        Ok(())
    }

    async fn on_reasoning_part_finish(&mut self) -> Result<(), StreamError> {
        self.current_reasoning = None;
        Ok(())
    }

    async fn on_file(&mut self, file: FileData) -> Result<(), StreamError> {
        self.message.parts.push(UiPart::File {
            media_type: file.media_type,
            url: file.url,
            filename: file.filename,
        });
        self.emit_update();
        Ok(())
    }

    async fn on_source(&mut self, source: Source) -> Result<(), StreamError> {
        self.message.parts.push(UiPart::Source { source });
        self.emit_update();
        Ok(())
    }

    async fn on_tool_call_streaming_start(
        &mut self,
        start: ToolCallStreamingStart,
    ) -> Result<(), StreamError> {
        let step = self.step;
        self.partial_tool_calls.insert(
            start.tool_call_id.clone(),
            PartialToolCall {
                text: String::new(),
                step,
                tool_name: start.tool_name.clone(),
            },
        );
        let invocation = ToolInvocation::PartialCall {
            tool_call_id: start.tool_call_id,
            tool_name: start.tool_name,
            args: None,
            step,
        };
        if self.upsert_tool_invocation(invocation) {
            self.emit_update();
        }
        Ok(())
    }

    async fn on_tool_call_delta(&mut self, delta: ToolCallDelta) -> Result<(), StreamError> {
        let Some(partial) = self.partial_tool_calls.get_mut(&delta.tool_call_id) else {
            return Err(StreamError::Protocol(format!(
                "tool-call-delta for \"{}\" must be preceded by tool-call-streaming-start",
                delta.tool_call_id
            )));
        };
        partial.text.push_str(&delta.args_text_delta);

        let parsed = parse_partial_json_with(Some(&partial.text), self.json_repair.as_ref());
        if parsed.state == PartialJsonState::FailedParse {
            warn!(
                tool_call_id = %delta.tool_call_id,
                "could not repair partial tool call arguments"
            );
        }
        let invocation = ToolInvocation::PartialCall {
            tool_call_id: delta.tool_call_id,
            tool_name: partial.tool_name.clone(),
            args: parsed.value,
            step: partial.step,
        };
        if self.upsert_tool_invocation(invocation) {
            self.emit_update();
        }
        Ok(())
    }

    async fn on_tool_call(&mut self, call: ToolCall) -> Result<(), StreamError> {
        self.partial_tool_calls.remove(&call.tool_call_id);
        let step = self.step;
        let invocation = ToolInvocation::Call {
            tool_call_id: call.tool_call_id.clone(),
            tool_name: call.tool_name.clone(),
            args: call.args.clone(),
            step,
        };
        if !self.upsert_tool_invocation(invocation) {
            return Ok(());
        }
        self.emit_update();

        let Some(handler) = self.on_tool_call.as_ref() else {
            return Ok(());
        };
        let Some(result) = handler.call(&call).await? else {
            return Ok(());
        };
        let ToolCall {
            tool_call_id,
            tool_name,
            args,
        } = call;
        let invocation = ToolInvocation::Result {
            tool_call_id,
            tool_name,
            args,
            result,
            step,
            provider_metadata: None,
        };
        if self.upsert_tool_invocation(invocation) {
            self.emit_update();
        }
        Ok(())
    }

    async fn on_tool_result(&mut self, result: ToolResult) -> Result<(), StreamError> {
        let Some(existing) = self.find_tool_invocation(&result.tool_call_id) else {
            let reason = if self.message.tool_invocations().next().is_none() {
                "tool_result must be preceded by a tool_call"
            } else {
                "tool_result must be preceded by a tool_call with the same toolCallId"
            };
            return Err(StreamError::Protocol(reason.to_string()));
        };
        let invocation = ToolInvocation::Result {
            tool_name: existing.tool_name().to_string(),
            args: existing.args().cloned().unwrap_or(Value::Null),
            step: existing.step(),
            tool_call_id: result.tool_call_id,
            result: result.result,
            provider_metadata: result.provider_metadata,
        };
        if self.upsert_tool_invocation(invocation) {
            self.emit_update();
        }
        Ok(())
    }

    async fn on_data(&mut self, values: Vec<Value>) -> Result<(), StreamError> {
        self.data.extend(values);
        self.emit_update();
        Ok(())
    }

    async fn on_message_annotations(&mut self, values: Vec<Value>) -> Result<(), StreamError> {
        self.annotations.get_or_insert_with(Vec::new).extend(values);
        self.emit_update();
        Ok(())
    }

    async fn on_message_metadata(&mut self, value: MessageMetadata) -> Result<(), StreamError> {
        if self.merge_metadata(value.metadata) {
            self.emit_update();
        }
        Ok(())
    }

    async fn on_start_step(&mut self, value: StartStep) -> Result<(), StreamError> {
        self.adopt_message_id(value.message_id);
        self.message.parts.push(UiPart::StepStart);
        self.merge_metadata(value.metadata);
        self.emit_update();
        Ok(())
    }

    async fn on_finish_step(&mut self, value: FinishStep) -> Result<(), StreamError> {
        self.step += 1;
        if !value.is_continued {
            self.current_text = None;
        }
        self.current_reasoning = None;

        if let Some(usage) = value.usage {
            self.usage += usage;
        }
        if let Some(finish_reason) = value.finish_reason {
            self.finish_reason = finish_reason;
        }
        if self.merge_metadata(value.metadata) {
            self.emit_update();
        }
        Ok(())
    }

    async fn on_start(&mut self, value: StartMessage) -> Result<(), StreamError> {
        let adopted = self.adopt_message_id(value.message_id);
        let merged = self.merge_metadata(value.metadata);
        if adopted || merged {
            self.emit_update();
        }
        Ok(())
    }

    async fn on_finish(&mut self, value: FinishMessage) -> Result<(), StreamError> {
        if let Some(finish_reason) = value.finish_reason {
            self.finish_reason = finish_reason;
        }
        if let Some(usage) = value.usage {
            self.usage = usage.normalized();
        }
        if self.merge_metadata(value.metadata) {
            self.emit_update();
        }
        Ok(())
    }
}

/// Parse `byte_stream` and fold it into a message.
///
/// Resolves once the stream ends. `on_finish` runs only on clean completion.
///
/// # Errors
///
/// Fails on the first malformed record, `error` part, protocol violation or
/// tool handler error, and with [`StreamError::Aborted`] when aborted.
pub async fn process_chat_response<S, E>(
    byte_stream: S,
    mut options: ChatResponseOptions,
) -> Result<ChatFinish, StreamError>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let start_time = Instant::now();
    let framing = options.framing;
    let abort = options.abort.take();
    let on_finish = options.on_finish.take();
    let mut reducer = MessageReducer::new(options);
    let parts = parse_data_stream(byte_stream, framing);

    match abort {
        Some(registration) => {
            let mut parts = std::pin::pin!(Abortable::new(parts, registration));
            process_data_stream(parts.as_mut(), &mut reducer).await?;
            if parts.is_aborted() {
                debug!(message_id = %reducer.message().id, "chat response aborted");
                return Err(StreamError::Aborted);
            }
        }
        None => process_data_stream(parts, &mut reducer).await?,
    }

    let finish = reducer.finish();
    log_message_complete(
        &finish.message.id,
        finish.message.parts.len(),
        finish.finish_reason,
        &finish.usage,
        start_time,
    );
    if let Some(on_finish) = on_finish {
        on_finish(&finish);
    }
    Ok(finish)
}
