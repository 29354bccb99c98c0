//! Byte stream -> data stream parts.
//!
//! Malformed records are reported as `Err` items and parsing continues with
//! the next record. The `[DONE]` terminator ends iteration.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::sse::{LineBuffer, SseParser, SseRecord, Utf8ChunkDecoder, DONE_DATA};
use crate::error::PartParseError;
use crate::protocol::{legacy, parse_json_part, DataStreamPart};

pub type ParseResult = Result<DataStreamPart, PartParseError>;

/// Wire framing of a data stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// `data: {"type":..,"value":..}\n\n` records.
    #[default]
    Sse,
    /// `<code>:<json>\n` lines.
    Legacy,
}

/// Parse a single record. Blank records yield `None`.
#[must_use]
pub fn parse_record(raw: &str, framing: Framing) -> Option<ParseResult> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match framing {
        Framing::Sse => parse_json_part(trimmed),
        Framing::Legacy => legacy::parse_legacy_line(trimmed),
    })
}

enum RecordSplitter {
    Sse {
        parser: SseParser,
        records: Vec<SseRecord>,
    },
    Legacy(LineBuffer),
}

impl RecordSplitter {
    fn new(framing: Framing) -> Self {
        match framing {
            Framing::Sse => RecordSplitter::Sse {
                parser: SseParser::new(),
                records: Vec::with_capacity(8),
            },
            Framing::Legacy => RecordSplitter::Legacy(LineBuffer::new()),
        }
    }

    fn feed(&mut self, text: &str, out: &mut Vec<String>) {
        match self {
            RecordSplitter::Sse { parser, records } => {
                parser.feed_into(text, records);
                out.extend(records.drain(..).map(|record| record.data));
            }
            RecordSplitter::Legacy(lines) => lines.feed(text, |line| out.push(line.to_string())),
        }
    }

    fn finish(&mut self, out: &mut Vec<String>) {
        match self {
            RecordSplitter::Sse { parser, records } => {
                parser.finish_into(records);
                out.extend(records.drain(..).map(|record| record.data));
            }
            RecordSplitter::Legacy(lines) => lines.finish(|line| out.push(line.to_string())),
        }
    }
}

struct ParserState<S> {
    stream: Pin<Box<S>>,
    framing: Framing,
    decoder: Utf8ChunkDecoder,
    splitter: RecordSplitter,
    raw: Vec<String>,
    pending: VecDeque<ParseResult>,
    finished: bool,
}

impl<S> ParserState<S> {
    fn feed(&mut self, bytes: &[u8]) {
        let Self {
            decoder,
            splitter,
            raw,
            ..
        } = self;
        decoder.decode(bytes, |text| splitter.feed(text, raw));
        self.drain_raw();
    }

    fn end_of_input(&mut self) {
        let Self {
            decoder,
            splitter,
            raw,
            ..
        } = self;
        decoder.finish(|text| splitter.feed(text, raw));
        splitter.finish(raw);
        self.drain_raw();
        self.finished = true;
    }

    fn drain_raw(&mut self) {
        for record in self.raw.drain(..) {
            if self.finished {
                continue;
            }
            if record.trim() == DONE_DATA {
                tracing::debug!("data stream terminator received");
                self.finished = true;
                continue;
            }
            if let Some(result) = parse_record(&record, self.framing) {
                if let Err(err) = &result {
                    tracing::debug!(kind = %err.kind, reason = %err.reason, "malformed data stream record");
                }
                self.pending.push_back(result);
            }
        }
    }
}

/// Parse a byte stream into data stream parts.
///
/// A transport error ends the stream after yielding one `Transport` error.
pub fn parse_data_stream<S, E>(byte_stream: S, framing: Framing) -> impl Stream<Item = ParseResult> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = ParserState {
        stream: Box::pin(byte_stream),
        framing,
        decoder: Utf8ChunkDecoder::new(),
        splitter: RecordSplitter::new(framing),
        raw: Vec::with_capacity(8),
        pending: VecDeque::with_capacity(8),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.stream.as_mut().next().await {
                Some(Ok(bytes)) => state.feed(&bytes),
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "data stream transport failed");
                    state.finished = true;
                    state
                        .pending
                        .push_back(Err(PartParseError::transport(err.to_string())));
                }
                None => state.end_of_input(),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;
    use std::convert::Infallible;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        futures_util::stream::iter(
            parts
                .iter()
                .map(|part| Ok::<Bytes, Infallible>(Bytes::from_static(part.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(parts: &[&'static str], framing: Framing) -> Vec<ParseResult> {
        parse_data_stream(chunks(parts), framing).collect().await
    }

    #[tokio::test]
    async fn test_parses_records_split_across_chunks() {
        let results = collect(
            &[
                "data: {\"type\":\"text\",\"val",
                "ue\":\"Hello\"}\n\ndata: {\"type\":\"text\",\"value\":\"!\"}\n\n",
            ],
            Framing::Sse,
        )
        .await;
        let parts: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            parts,
            vec![DataStreamPart::text("Hello"), DataStreamPart::text("!")]
        );
    }

    #[tokio::test]
    async fn test_malformed_record_yields_single_error() {
        let results = collect(&["data: {asd\n\n"], Framing::Sse).await;
        assert_eq!(results.len(), 1);
        let err = results[0].as_ref().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Json);
        assert_eq!(err.raw_value, "{asd");
    }

    #[tokio::test]
    async fn test_malformed_record_does_not_halt_parsing() {
        let results = collect(
            &["data: {asd\n\ndata: {\"type\":\"text\",\"value\":\"ok\"}\n\n"],
            Framing::Sse,
        )
        .await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert_eq!(results[1].as_ref().unwrap(), &DataStreamPart::text("ok"));
    }

    #[tokio::test]
    async fn test_done_terminates_iteration() {
        let results = collect(
            &[
                "data: {\"type\":\"text\",\"value\":\"a\"}\n\n",
                "data: [DONE]\n\n",
                "data: {\"type\":\"text\",\"value\":\"ignored\"}\n\n",
            ],
            Framing::Sse,
        )
        .await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_whitespace_records_are_skipped() {
        let results = collect(&["data:  \n\n", ": ping\n\n"], Framing::Sse).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_framing() {
        let results = collect(&["0:\"Hel", "lo\"\n\n", "d:{\"finishReason\":\"stop\"}"], Framing::Legacy).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &DataStreamPart::text("Hello"));
        assert!(matches!(
            results[1].as_ref().unwrap(),
            DataStreamPart::Finish(_)
        ));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let stream = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"text\",\"value\":\"a\"}\n\n")),
            Err("connection reset"),
            Ok(Bytes::from_static(b"data: {\"type\":\"text\",\"value\":\"b\"}\n\n")),
        ]);
        let results: Vec<_> = parse_data_stream(stream, Framing::Sse).collect().await;
        assert_eq!(results.len(), 2);
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Transport);
        assert_eq!(err.reason, "connection reset");
    }
}
