use std::fmt;

/// Why a single wire record could not be turned into a [`DataStreamPart`].
///
/// [`DataStreamPart`]: crate::protocol::DataStreamPart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The record payload is not valid JSON.
    Json,
    /// The JSON is well formed but does not match the tagged-union schema.
    Schema,
    /// The underlying byte stream failed before the record was complete.
    Transport,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::Json => write!(f, "json"),
            ParseErrorKind::Schema => write!(f, "schema"),
            ParseErrorKind::Transport => write!(f, "transport"),
        }
    }
}

/// A per-record parse failure. The parser reports these without halting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid data stream part ({kind}): {reason}")]
pub struct PartParseError {
    pub kind: ParseErrorKind,
    pub reason: String,
    /// The raw record text that failed to parse.
    pub raw_value: String,
}

impl PartParseError {
    pub(crate) fn json(reason: impl Into<String>, raw_value: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::Json,
            reason: reason.into(),
            raw_value: raw_value.into(),
        }
    }

    pub(crate) fn schema(reason: impl Into<String>, raw_value: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::Schema,
            reason: reason.into(),
            raw_value: raw_value.into(),
        }
    }

    pub(crate) fn transport(reason: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::Transport,
            reason: reason.into(),
            raw_value: String::new(),
        }
    }
}

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Parse(#[from] PartParseError),
    /// An `error` part arrived on the stream.
    #[error("Stream error: {0}")]
    Stream(String),
    /// The event sequence violates a message invariant.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// A writer execute function or merged source failed.
    #[error("Execute error: {0}")]
    Execute(String),
    #[error("Stream processing aborted")]
    Aborted,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Whether the failure came from the wire format rather than from message state.
    #[must_use]
    pub fn is_parse(&self) -> bool {
        matches!(self, StreamError::Parse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display_includes_kind() {
        let err = PartParseError::json("expected value", "{asd");
        assert_eq!(
            err.to_string(),
            "invalid data stream part (json): expected value"
        );
        assert_eq!(err.raw_value, "{asd");
    }

    #[test]
    fn test_stream_error_from_parse_error() {
        let err: StreamError = PartParseError::schema("unknown type", "{}").into();
        assert!(err.is_parse());
        assert_eq!(err.to_string(), "invalid data stream part (schema): unknown type");
    }

    #[test]
    fn test_stream_error_messages() {
        assert_eq!(
            StreamError::Stream("boom".to_string()).to_string(),
            "Stream error: boom"
        );
        assert!(!StreamError::Aborted.is_parse());
    }
}
