use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use chatstream::error::StreamError;
use chatstream::message::{
    process_chat_response, ChatFinish, ChatResponseOptions, ChatUpdate, ToolInvocation, UiMessage,
    UiPart,
};
use chatstream::protocol::{FinishReason, ToolCall};
use chatstream::stream::Framing;
use chatstream::util::SequentialIdGenerator;
use futures_util::Stream;
use parking_lot::Mutex;
use serde_json::json;

fn wire(records: &[&str]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str("data: ");
        out.push_str(record);
        out.push_str("\n\n");
    }
    out.push_str("data: [DONE]\n\n");
    out
}

/// Split the wire text into deliberately awkward chunk sizes.
fn chunked(text: &str, size: usize) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    let chunks: Vec<Result<Bytes, Infallible>> = text
        .as_bytes()
        .chunks(size)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    futures_util::stream::iter(chunks)
}

fn recording_options(updates: &Arc<Mutex<Vec<ChatUpdate>>>) -> ChatResponseOptions {
    let updates = updates.clone();
    ChatResponseOptions::new(move |update| updates.lock().push(update))
        .with_id_generator(Arc::new(SequentialIdGenerator::new("test")))
        .with_clock(Arc::new(|| 42_u64))
}

async fn reduce(text: &str, chunk_size: usize) -> (Result<ChatFinish, StreamError>, Vec<ChatUpdate>) {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let result = process_chat_response(chunked(text, chunk_size), recording_options(&updates)).await;
    let updates = updates.lock().clone();
    (result, updates)
}

const TOOL_SESSION: &[&str] = &[
    r#"{"type":"start-step","value":{"messageId":"srv-1"}}"#,
    r#"{"type":"reasoning","value":{"text":"The user wants weather."}}"#,
    r#"{"type":"reasoning-part-finish","value":null}"#,
    r#"{"type":"tool-call-streaming-start","value":{"toolCallId":"c1","toolName":"weather"}}"#,
    r#"{"type":"tool-call-delta","value":{"toolCallId":"c1","argsTextDelta":"{\"ci"}}"#,
    r#"{"type":"tool-call-delta","value":{"toolCallId":"c1","argsTextDelta":"ty\":\"Berlin\"}"}}"#,
    r#"{"type":"tool-call","value":{"toolCallId":"c1","toolName":"weather","args":{"city":"Berlin"}}}"#,
    r#"{"type":"tool-result","value":{"toolCallId":"c1","result":{"temp":21}}}"#,
    r#"{"type":"finish-step","value":{"finishReason":"tool-calls","usage":{"inputTokens":10,"outputTokens":4}}}"#,
    r#"{"type":"start-step","value":{}}"#,
    r#"{"type":"text","value":"It is 21 degrees."}"#,
    r#"{"type":"finish-step","value":{"finishReason":"stop","usage":{"inputTokens":20,"outputTokens":6}}}"#,
];

#[tokio::test]
async fn simple_text_scenario_reports_stop_and_total_usage() {
    let text = wire(&[
        r#"{"type":"text","value":"Hello, "}"#,
        r#"{"type":"text","value":"world!"}"#,
        r#"{"type":"finish-step","value":{"finishReason":"stop","usage":{"inputTokens":5,"outputTokens":10},"isContinued":false}}"#,
        r#"{"type":"finish-message","value":{"finishReason":"stop","usage":{"inputTokens":5,"outputTokens":10}}}"#,
    ]);
    let (result, updates) = reduce(&text, 7).await;
    let finish = result.unwrap();

    assert_eq!(
        finish.message.parts,
        vec![UiPart::Text {
            text: "Hello, world!".to_string()
        }]
    );
    assert_eq!(finish.finish_reason, FinishReason::Stop);
    assert_eq!(finish.usage.total_tokens, Some(15));
    assert_eq!(updates.len(), 2);
}

#[tokio::test]
async fn replaying_a_session_is_deterministic_across_chunkings() {
    let text = wire(TOOL_SESSION);
    let (first, _) = reduce(&text, 3).await;
    let (second, _) = reduce(&text, 1024).await;
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.message.id, "srv-1");
    assert_eq!(first.finish_reason, FinishReason::Stop);
    assert_eq!(first.usage.total_tokens, Some(40));
}

#[tokio::test]
async fn tool_invocation_states_only_move_forward() {
    let (result, updates) = reduce(&wire(TOOL_SESSION), 11).await;
    result.unwrap();

    let observed: Vec<&str> = updates
        .iter()
        .filter_map(|update| {
            update
                .message
                .tool_invocations()
                .find(|invocation| invocation.tool_call_id() == "c1")
                .map(ToolInvocation::state_name)
        })
        .collect();
    let mut ranks = observed.iter().map(|state| match *state {
        "partial-call" => 0,
        "call" => 1,
        _ => 2,
    });
    let mut previous = 0;
    assert!(ranks.all(|rank| {
        let ok = rank >= previous;
        previous = rank;
        ok
    }));
    assert_eq!(observed.first(), Some(&"partial-call"));
    assert_eq!(observed.last(), Some(&"result"));
}

#[tokio::test]
async fn final_message_layout_of_tool_session() {
    let (result, _) = reduce(&wire(TOOL_SESSION), 64).await;
    let parts = result.unwrap().message.parts;

    assert_eq!(parts.len(), 5);
    assert_eq!(parts[0], UiPart::StepStart);
    assert!(matches!(&parts[1], UiPart::Reasoning { text, .. } if text == "The user wants weather."));
    assert!(matches!(
        &parts[2],
        UiPart::ToolInvocation { tool_invocation: ToolInvocation::Result { step: 0, result, .. } }
            if *result == json!({"temp": 21})
    ));
    assert_eq!(parts[3], UiPart::StepStart);
    assert_eq!(
        parts[4],
        UiPart::Text {
            text: "It is 21 degrees.".to_string()
        }
    );
}

#[tokio::test]
async fn tool_call_between_and_after_steps_is_numbered() {
    let text = wire(&[
        r#"{"type":"finish-step","value":{"finishReason":"tool-calls"}}"#,
        r#"{"type":"tool-call","value":{"toolCallId":"a","toolName":"t","args":{}}}"#,
        r#"{"type":"finish-step","value":{"finishReason":"tool-calls"}}"#,
        r#"{"type":"tool-call","value":{"toolCallId":"b","toolName":"t","args":{}}}"#,
    ]);
    let (result, _) = reduce(&text, 5).await;
    let steps: Vec<u32> = result
        .unwrap()
        .message
        .tool_invocations()
        .map(ToolInvocation::step)
        .collect();
    assert_eq!(steps, vec![1, 2]);

    let text = wire(&[
        r#"{"type":"tool-call","value":{"toolCallId":"a","toolName":"t","args":{}}}"#,
        r#"{"type":"finish-step","value":{}}"#,
        r#"{"type":"finish-step","value":{}}"#,
        r#"{"type":"tool-call","value":{"toolCallId":"b","toolName":"t","args":{}}}"#,
    ]);
    let (result, _) = reduce(&text, 5).await;
    let steps: Vec<u32> = result
        .unwrap()
        .message
        .tool_invocations()
        .map(ToolInvocation::step)
        .collect();
    assert_eq!(steps, vec![0, 2]);
}

#[tokio::test]
async fn tool_result_for_unknown_call_fails_fast() {
    let text = wire(&[
        r#"{"type":"text","value":"before"}"#,
        r#"{"type":"tool-result","value":{"toolCallId":"ghost","result":1}}"#,
        r#"{"type":"text","value":"after"}"#,
    ]);
    let (result, updates) = reduce(&text, 9).await;

    assert!(matches!(result, Err(StreamError::Protocol(_))));
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].message.text(), "before");
}

#[tokio::test]
async fn continuation_resumes_after_prior_steps() {
    let prior: UiMessage = serde_json::from_value(json!({
        "id": "assistant-1",
        "role": "assistant",
        "createdAt": 7,
        "parts": [
            {"type": "text", "text": "Checking."},
            {"type": "tool-invocation", "toolInvocation": {
                "state": "result", "toolCallId": "old", "toolName": "t",
                "args": {}, "result": "ok", "step": 2
            }}
        ]
    }))
    .unwrap();

    let updates = Arc::new(Mutex::new(Vec::new()));
    let text = wire(&[r#"{"type":"tool-call","value":{"toolCallId":"new","toolName":"t","args":{}}}"#]);
    let finish = process_chat_response(
        chunked(&text, 16),
        recording_options(&updates).with_last_message(Some(prior)),
    )
    .await
    .unwrap();

    assert_eq!(finish.message.id, "assistant-1");
    assert_eq!(finish.message.parts.len(), 3);
    let new_call = finish
        .message
        .tool_invocations()
        .find(|invocation| invocation.tool_call_id() == "new")
        .map(ToolInvocation::step);
    assert_eq!(new_call, Some(3));
    assert!(updates.lock().iter().all(|update| update.replace_last_message));
}

#[tokio::test]
async fn malformed_record_stops_the_reduction() {
    let text = "data: {\"type\":\"text\",\"value\":\"ok\"}\n\ndata: {asd\n\n";
    let (result, updates) = reduce(text, 4).await;
    assert!(matches!(result, Err(StreamError::Parse(_))));
    assert_eq!(updates.len(), 1);
}

#[tokio::test]
async fn error_part_surfaces_its_message() {
    let text = wire(&[r#"{"type":"error","value":"rate limited"}"#]);
    let (result, _) = reduce(&text, 8).await;
    let err = result.unwrap_err();
    assert!(matches!(err, StreamError::Stream(ref message) if message == "rate limited"));
}

#[tokio::test]
async fn legacy_framing_reduces_the_same_message() {
    let legacy = concat!(
        "0:\"Hello, \"\n",
        "0:\"world!\"\n",
        "e:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":5,\"completionTokens\":10},\"isContinued\":false}\n",
        "d:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":5,\"completionTokens\":10}}\n",
    );
    let updates = Arc::new(Mutex::new(Vec::new()));
    let finish = process_chat_response(
        chunked(legacy, 6),
        recording_options(&updates).with_framing(Framing::Legacy),
    )
    .await
    .unwrap();
    assert_eq!(finish.message.text(), "Hello, world!");
    assert_eq!(finish.usage.total_tokens, Some(15));
}

#[tokio::test]
async fn tool_handler_runs_before_later_parts_are_dispatched() {
    let text = wire(&[
        r#"{"type":"tool-call","value":{"toolCallId":"c1","toolName":"add","args":{"a":2,"b":3}}}"#,
        r#"{"type":"text","value":"done"}"#,
    ]);
    let updates = Arc::new(Mutex::new(Vec::new()));
    let finish = process_chat_response(
        chunked(&text, 10),
        recording_options(&updates).with_tool_call_handler(|call: ToolCall| async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let sum = call.args["a"].as_i64().unwrap_or(0) + call.args["b"].as_i64().unwrap_or(0);
            Ok::<_, StreamError>(Some(json!(sum)))
        }),
    )
    .await
    .unwrap();

    let updates = updates.lock();
    let states: Vec<Option<&str>> = updates
        .iter()
        .map(|update| update.message.tool_invocations().next().map(ToolInvocation::state_name))
        .collect();
    assert_eq!(states, vec![Some("call"), Some("result"), Some("result")]);
    assert_eq!(updates[2].message.text(), "done");
    assert!(matches!(
        finish.message.tool_invocations().next(),
        Some(ToolInvocation::Result { result, .. }) if *result == json!(5)
    ));
}

#[tokio::test]
async fn oversized_usage_counts_saturate() {
    let text = wire(&[
        r#"{"type":"finish-step","value":{"finishReason":"stop","usage":{"inputTokens":18446744073709551615,"outputTokens":1}}}"#,
        r#"{"type":"finish-step","value":{"finishReason":"stop","usage":{"inputTokens":1,"outputTokens":1}}}"#,
    ]);
    let (result, _) = reduce(&text, 32).await;
    let usage = result.unwrap().usage;
    assert_eq!(usage.input_tokens, Some(u64::MAX));
    assert_eq!(usage.output_tokens, Some(2));
    assert_eq!(usage.total_tokens, Some(u64::MAX));
}
