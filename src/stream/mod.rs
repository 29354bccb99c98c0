//! Streaming plumbing: SSE framing, part parsing, dispatch and the
//! multi-source writer.

pub mod dispatch;
pub mod parser;
pub mod sse;
pub mod writer;

pub use dispatch::{dispatch_part, process_data_stream, DataStreamHandler};
pub use parser::{parse_data_stream, parse_record, Framing, ParseResult};
pub use sse::{SseParser, SseRecord};
pub use writer::{
    create_data_stream, error_message_handler, to_legacy_bytes, to_sse_bytes, DataStream,
    DataStreamWriter, OnError, DEFAULT_ERROR_MESSAGE,
};
