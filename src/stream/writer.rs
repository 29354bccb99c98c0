//! Multi-source data stream writer.
//!
//! One output stream fed by direct writes from an execute function and by any
//! number of merged source streams, attached at any time while the output is
//! open. The output closes once the execute function and every merged source
//! have finished.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::sse::{done_frame, sse_data_frame};
use crate::error::StreamError;
use crate::protocol::{format_json_part, legacy, DataStreamPart, Source};

pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred.";

/// Maps a failure to the message of the `error` part written in its place.
pub type OnError = Arc<dyn Fn(&StreamError) -> String + Send + Sync>;

/// An [`OnError`] that always reports `message`.
#[must_use]
pub fn error_message_handler(message: impl Into<String>) -> OnError {
    let message = message.into();
    Arc::new(move |_err: &StreamError| message.clone())
}

/// Sender plus the number of producers (execute + merged sources) still running.
struct Output {
    tx: Option<mpsc::UnboundedSender<DataStreamPart>>,
    open: usize,
}

/// Handle for writing into a [`DataStream`]. Cheap to clone.
#[derive(Clone)]
pub struct DataStreamWriter {
    output: Arc<Mutex<Output>>,
    on_error: OnError,
}

impl DataStreamWriter {
    /// Enqueue one part. A no-op once the output is closed.
    pub fn write(&self, part: DataStreamPart) {
        let output = self.output.lock();
        if let Some(tx) = output.tx.as_ref() {
            let _ = tx.send(part);
        }
    }

    pub fn write_data(&self, value: Value) {
        self.write(DataStreamPart::Data(vec![value]));
    }

    pub fn write_message_annotation(&self, value: Value) {
        self.write(DataStreamPart::MessageAnnotations(vec![value]));
    }

    pub fn write_source(&self, source: Source) {
        self.write(DataStreamPart::Source(source));
    }

    /// Forward every part of `source` into the output.
    ///
    /// Order within `source` is preserved; parts from different sources
    /// interleave as they become ready. A source error becomes a single
    /// `error` part and ends that source only.
    pub fn merge<S>(&self, source: S)
    where
        S: Stream<Item = Result<DataStreamPart, StreamError>> + Send + 'static,
    {
        if !self.acquire() {
            tracing::debug!("merge after data stream closed; ignoring source");
            return;
        }
        let writer = self.clone();
        self.supervise(async move {
            let mut source = std::pin::pin!(source);
            while let Some(item) = source.next().await {
                match item {
                    Ok(part) => writer.write(part),
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        });
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.output.lock().tx.is_none()
    }

    fn write_error(&self, err: &StreamError) {
        let message = (self.on_error)(err);
        tracing::warn!(error = %err, "data stream producer failed");
        self.write(DataStreamPart::Error(message));
    }

    fn acquire(&self) -> bool {
        let mut output = self.output.lock();
        if output.tx.is_none() {
            return false;
        }
        output.open += 1;
        true
    }

    fn release(&self) {
        let mut output = self.output.lock();
        output.open = output.open.saturating_sub(1);
        if output.open == 0 {
            output.tx = None;
        }
    }

    /// Run one producer on its own task. Its failure (error or panic) is
    /// written as an `error` part before its slot is released.
    fn supervise<F>(&self, producer: F)
    where
        F: Future<Output = Result<(), StreamError>> + Send + 'static,
    {
        let writer = self.clone();
        let handle = tokio::spawn(producer);
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => writer.write_error(&err),
                Err(join_err) => {
                    let err = if join_err.is_panic() {
                        StreamError::Execute("data stream producer panicked".to_string())
                    } else {
                        StreamError::Execute("data stream producer was cancelled".to_string())
                    };
                    writer.write_error(&err);
                }
            }
            writer.release();
        });
    }
}

/// Output of [`create_data_stream`].
pub struct DataStream {
    rx: mpsc::UnboundedReceiver<DataStreamPart>,
}

impl Stream for DataStream {
    type Item = DataStreamPart;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Start `execute` with a writer and return the combined output.
///
/// `on_error` maps execute and merged-source failures to the text of the
/// `error` part; without it every failure reads [`DEFAULT_ERROR_MESSAGE`].
/// Must be called from within a tokio runtime.
pub fn create_data_stream<F, Fut>(execute: F, on_error: Option<OnError>) -> DataStream
where
    F: FnOnce(DataStreamWriter) -> Fut,
    Fut: Future<Output = Result<(), StreamError>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = DataStreamWriter {
        output: Arc::new(Mutex::new(Output {
            tx: Some(tx),
            open: 1,
        })),
        on_error: on_error.unwrap_or_else(|| error_message_handler(DEFAULT_ERROR_MESSAGE)),
    };
    let producer = execute(writer.clone());
    writer.supervise(producer);
    DataStream { rx }
}

/// Encode parts as SSE bytes, ending with `data: [DONE]`.
pub fn to_sse_bytes<S>(parts: S) -> impl Stream<Item = Bytes> + Send
where
    S: Stream<Item = DataStreamPart> + Send + 'static,
{
    parts
        .map(|part| Bytes::from(sse_data_frame(&format_json_part(&part))))
        .chain(futures_util::stream::once(async { done_frame() }))
}

/// Encode parts as legacy `<code>:<json>\n` lines.
///
/// Parts without a legacy code are dropped with a warning.
pub fn to_legacy_bytes<S>(parts: S) -> impl Stream<Item = Bytes> + Send
where
    S: Stream<Item = DataStreamPart> + Send + 'static,
{
    parts.filter_map(|part| async move {
        match legacy::format_legacy_line(&part) {
            Ok(line) => Some(Bytes::from(line)),
            Err(err) => {
                tracing::warn!(error = %err, "dropping part from legacy data stream");
                None
            }
        }
    })
}
