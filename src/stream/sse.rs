/// SSE (Server-Sent Events) record splitting and encoding.
///
/// Bytes arrive in arbitrary chunk boundaries, possibly splitting UTF-8
/// sequences and lines. [`Utf8ChunkDecoder`] carries incomplete code points
/// across chunks, [`LineBuffer`] carries incomplete lines, and [`SseParser`]
/// assembles `data:` lines into records per the
/// [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html).
use bytes::Bytes;
use memchr::memchr_iter;

pub const DONE_DATA: &str = "[DONE]";
const DONE_FRAME: &str = "data: [DONE]\n\n";

/// One complete SSE record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseRecord {
    pub event: Option<String>,
    pub data: String,
}

impl SseRecord {
    /// Whether this is the `[DONE]` terminator.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_DATA
    }
}

// ---------------------------------------------------------------------------
// Utf8ChunkDecoder
// ---------------------------------------------------------------------------

/// Decodes a chunked byte stream as UTF-8 without splitting code points.
///
/// Invalid sequences are replaced with U+FFFD; an incomplete trailing
/// sequence is held back until the next chunk.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    remainder: Vec<u8>,
}

impl Utf8ChunkDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8], mut sink: impl FnMut(&str)) {
        let joined;
        let input: &[u8] = if self.remainder.is_empty() {
            bytes
        } else {
            self.remainder.extend_from_slice(bytes);
            joined = std::mem::take(&mut self.remainder);
            &joined
        };

        let mut rest = input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    if !text.is_empty() {
                        sink(text);
                    }
                    return;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        if !text.is_empty() {
                            sink(text);
                        }
                    }
                    match err.error_len() {
                        Some(len) => {
                            sink("\u{FFFD}");
                            rest = &after[len..];
                        }
                        None => {
                            self.remainder.extend_from_slice(after);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Flush a truncated trailing sequence at end of input.
    pub fn finish(&mut self, mut sink: impl FnMut(&str)) {
        if !self.remainder.is_empty() {
            let tail = std::mem::take(&mut self.remainder);
            sink(&String::from_utf8_lossy(&tail));
        }
    }
}

// ---------------------------------------------------------------------------
// LineBuffer
// ---------------------------------------------------------------------------

/// Splits incremental text into `\n`/`\r\n` terminated lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
    read_offset: usize,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and call `on_line` for every line it completes.
    pub fn feed(&mut self, chunk: &str, mut on_line: impl FnMut(&str)) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &self.buffer[processed_up_to..line_end];
            on_line(line.strip_suffix('\r').unwrap_or(line));
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Emit the unterminated tail, if any.
    pub fn finish(&mut self, mut on_line: impl FnMut(&str)) {
        if self.read_offset < self.buffer.len() {
            let tail = &self.buffer[self.read_offset..];
            on_line(tail.strip_suffix('\r').unwrap_or(tail));
        }
        self.buffer.clear();
        self.read_offset = 0;
    }
}

// ---------------------------------------------------------------------------
// SseParser
// ---------------------------------------------------------------------------

/// Incremental SSE record parser.
///
/// - `data:` lines append to the record (one leading space stripped),
///   multiple lines joined with `\n`
/// - `event:` names the record
/// - blank lines terminate a record
/// - `:` comments and unknown fields are ignored
#[derive(Debug, Default)]
pub struct SseParser {
    lines: LineBuffer,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<SseRecord> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete records into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseRecord>) {
        let Self {
            lines,
            event_type,
            data_buffer,
            has_data,
        } = self;
        lines.feed(chunk, |line| {
            Self::process_line(line, event_type, data_buffer, has_data, out);
        });
    }

    /// End of input: a record missing its closing blank line is still emitted.
    pub fn finish_into(&mut self, out: &mut Vec<SseRecord>) {
        let Self {
            lines,
            event_type,
            data_buffer,
            has_data,
        } = self;
        lines.finish(|line| {
            Self::process_line(line, event_type, data_buffer, has_data, out);
        });
        Self::process_line("", event_type, data_buffer, has_data, out);
    }

    fn process_line(
        line: &str,
        event_type: &mut Option<String>,
        data_buffer: &mut String,
        has_data: &mut bool,
        records: &mut Vec<SseRecord>,
    ) {
        if line.is_empty() {
            if *has_data {
                records.push(SseRecord {
                    event: event_type.take(),
                    data: std::mem::take(data_buffer),
                });
                *has_data = false;
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if *has_data {
                data_buffer.push('\n');
            } else {
                *has_data = true;
            }
            data_buffer.push_str(value);
        } else if let Some(value) = line.strip_prefix("event:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            *event_type = Some(value.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Format a `data:` record carrying `json`.
#[must_use]
pub fn sse_data_frame(json: &str) -> String {
    let mut out = String::with_capacity(8 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME.as_bytes())
}
