//! Serial job executor: async jobs run one at a time in submission order.

use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::StreamError;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Runs submitted jobs strictly one after another.
///
/// Jobs are queued when [`run`](Self::run) is called, not when its future is
/// first polled, so submission order is call order. A failing or panicking
/// job does not stop the queue.
pub struct SerialJobExecutor {
    queue: mpsc::UnboundedSender<Job>,
    idle: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
}

impl SerialJobExecutor {
    #[must_use]
    pub fn new() -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        Self {
            queue,
            idle: Mutex::new(Some(rx)),
        }
    }

    /// Queue `job` and return a future resolving to its result.
    ///
    /// The first call spawns the drain task, so it must happen inside a tokio
    /// runtime. A panicking job resolves to [`StreamError::Internal`].
    pub fn run<F, T>(&self, job: F) -> impl Future<Output = Result<T, StreamError>> + Send + 'static
    where
        F: Future<Output = Result<T, StreamError>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let queued: Job = Box::pin(async move {
            let _ = done_tx.send(job.await);
        });
        let accepted = self.queue.send(queued).is_ok();
        self.start_draining();

        async move {
            if !accepted {
                return Err(StreamError::Internal("serial job queue is closed".to_string()));
            }
            done_rx.await.unwrap_or_else(|_| {
                Err(StreamError::Internal(
                    "serial job panicked before completing".to_string(),
                ))
            })
        }
    }

    fn start_draining(&self) {
        let Some(mut rx) = self.idle.lock().take() else {
            return;
        };
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // Each job gets its own task so a panic unwinds only that job.
                if let Err(err) = tokio::spawn(job).await {
                    tracing::warn!(error = %err, "serial job failed to complete");
                }
            }
        });
    }
}

impl Default for SerialJobExecutor {
    fn default() -> Self {
        Self::new()
    }
}
