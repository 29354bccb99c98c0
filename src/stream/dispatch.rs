//! Ordered, one-at-a-time dispatch of parsed parts to a handler.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use super::parser::ParseResult;
use crate::error::StreamError;
use crate::protocol::{
    DataStreamPart, FileData, FinishMessage, FinishStep, MessageMetadata, ReasoningDelta, Source,
    StartMessage, StartStep, ToolCall, ToolCallDelta, ToolCallStreamingStart, ToolResult,
};

/// One hook per part type.
///
/// Every hook defaults to a no-op except [`on_error`](Self::on_error), which
/// fails the dispatch with [`StreamError::Stream`].
#[async_trait]
pub trait DataStreamHandler: Send {
    async fn on_text(&mut self, _delta: String) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_reasoning(&mut self, _delta: ReasoningDelta) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_reasoning_part_finish(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_tool_call(&mut self, _call: ToolCall) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_tool_call_delta(&mut self, _delta: ToolCallDelta) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_tool_call_streaming_start(
        &mut self,
        _start: ToolCallStreamingStart,
    ) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_tool_result(&mut self, _result: ToolResult) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_source(&mut self, _source: Source) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_file(&mut self, _file: FileData) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_data(&mut self, _values: Vec<Value>) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_message_annotations(&mut self, _values: Vec<Value>) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_message_metadata(&mut self, _value: MessageMetadata) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_start_step(&mut self, _value: StartStep) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_finish_step(&mut self, _value: FinishStep) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_start(&mut self, _value: StartMessage) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_finish(&mut self, _value: FinishMessage) -> Result<(), StreamError> {
        Ok(())
    }

    async fn on_error(&mut self, message: String) -> Result<(), StreamError> {
        Err(StreamError::Stream(message))
    }
}

/// Route one part to its hook.
///
/// # Errors
///
/// Propagates the hook's error.
pub async fn dispatch_part<H>(handler: &mut H, part: DataStreamPart) -> Result<(), StreamError>
where
    H: DataStreamHandler + ?Sized,
{
    match part {
        DataStreamPart::Text(delta) => handler.on_text(delta).await,
        DataStreamPart::Reasoning(delta) => handler.on_reasoning(delta).await,
        DataStreamPart::ReasoningPartFinish => handler.on_reasoning_part_finish().await,
        DataStreamPart::ToolCall(call) => handler.on_tool_call(call).await,
        DataStreamPart::ToolCallDelta(delta) => handler.on_tool_call_delta(delta).await,
        DataStreamPart::ToolCallStreamingStart(start) => {
            handler.on_tool_call_streaming_start(start).await
        }
        DataStreamPart::ToolResult(result) => handler.on_tool_result(result).await,
        DataStreamPart::Source(source) => handler.on_source(source).await,
        DataStreamPart::File(file) => handler.on_file(file).await,
        DataStreamPart::Error(message) => handler.on_error(message).await,
        DataStreamPart::Data(values) => handler.on_data(values).await,
        DataStreamPart::MessageAnnotations(values) => handler.on_message_annotations(values).await,
        DataStreamPart::MessageMetadata(value) => handler.on_message_metadata(value).await,
        DataStreamPart::StartStep(value) => handler.on_start_step(value).await,
        DataStreamPart::FinishStep(value) => handler.on_finish_step(value).await,
        DataStreamPart::Start(value) => handler.on_start(value).await,
        DataStreamPart::Finish(value) => handler.on_finish(value).await,
    }
}

/// Drive `parts` through `handler` in arrival order, awaiting each hook.
///
/// Fails fast: the first malformed record or failing hook ends dispatch.
///
/// # Errors
///
/// Returns [`StreamError::Parse`] for a malformed record, otherwise the
/// hook's error.
pub async fn process_data_stream<S, H>(parts: S, handler: &mut H) -> Result<(), StreamError>
where
    S: Stream<Item = ParseResult>,
    H: DataStreamHandler + ?Sized,
{
    let mut parts = std::pin::pin!(parts);
    while let Some(result) = parts.next().await {
        let part = result?;
        tracing::debug!(part_type = %part.part_type(), "dispatching data stream part");
        dispatch_part(handler, part).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PartParseError;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
    }

    #[async_trait]
    impl DataStreamHandler for Recorder {
        async fn on_text(&mut self, delta: String) -> Result<(), StreamError> {
            tokio::task::yield_now().await;
            self.seen.push(format!("text:{delta}"));
            Ok(())
        }

        async fn on_finish(&mut self, value: FinishMessage) -> Result<(), StreamError> {
            self.seen.push(format!("finish:{:?}", value.finish_reason));
            Ok(())
        }
    }

    fn parts(items: Vec<ParseResult>) -> impl Stream<Item = ParseResult> {
        futures_util::stream::iter(items)
    }

    #[tokio::test]
    async fn test_dispatches_in_arrival_order() {
        let mut recorder = Recorder::default();
        process_data_stream(
            parts(vec![
                Ok(DataStreamPart::text("a")),
                Ok(DataStreamPart::data(vec![Value::Null])),
                Ok(DataStreamPart::text("b")),
                Ok(DataStreamPart::Finish(FinishMessage::default())),
            ]),
            &mut recorder,
        )
        .await
        .unwrap();
        assert_eq!(recorder.seen, vec!["text:a", "text:b", "finish:None"]);
    }

    #[tokio::test]
    async fn test_unhandled_error_part_fails() {
        let mut recorder = Recorder::default();
        let err = process_data_stream(
            parts(vec![
                Ok(DataStreamPart::text("a")),
                Ok(DataStreamPart::error("boom")),
                Ok(DataStreamPart::text("never")),
            ]),
            &mut recorder,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StreamError::Stream(ref message) if message == "boom"));
        assert_eq!(recorder.seen, vec!["text:a"]);
    }

    #[tokio::test]
    async fn test_parse_failure_is_fatal() {
        let mut recorder = Recorder::default();
        let err = process_data_stream(
            parts(vec![
                Err(PartParseError::json("expected value", "{asd")),
                Ok(DataStreamPart::text("never")),
            ]),
            &mut recorder,
        )
        .await
        .unwrap_err();
        assert!(err.is_parse());
        assert!(recorder.seen.is_empty());
    }
}
