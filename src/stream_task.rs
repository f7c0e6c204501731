//! One running sub-request: drains an opened transport stream into a
//! shared [`MessageBuffer`] until the stream ends, the stream errors, or
//! an external cancel signal fires.

use crate::buffer::MessageBuffer;
use crate::error::EngineError;
use crate::transport::{ResponseStream, TransportError};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Success,
    /// Carries the original [`TransportError`] variant (not just a
    /// stringified message) so the engine can surface `Rejected`/
    /// `Cancelled` with their own stable kind instead of collapsing every
    /// stream failure into a generic transport error.
    Failure(TransportError),
}

/// Drives one sub-request's stream to completion in a spawned task.
/// `messages_received` is readable from outside while the task runs;
/// `result` consumes the task to retrieve its final outcome.
pub struct StreamTask {
    messages_received: Arc<AtomicU64>,
    handle: JoinHandle<StreamOutcome>,
}

impl StreamTask {
    pub fn spawn(
        sub_request_index: usize,
        stream: ResponseStream,
        buffer: Arc<MessageBuffer>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self::spawn_inner(sub_request_index, stream, buffer, cancel, None)
    }

    /// Like [`StreamTask::spawn`], but holds `permit` for the task's
    /// entire lifetime so the owning pool's concurrency bound covers both
    /// the stream's active lifetime and the slot it occupies while
    /// queued to run.
    pub fn spawn_with_permit(
        sub_request_index: usize,
        stream: ResponseStream,
        buffer: Arc<MessageBuffer>,
        cancel: watch::Receiver<bool>,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) -> Self {
        Self::spawn_inner(sub_request_index, stream, buffer, cancel, Some(permit))
    }

    fn spawn_inner(
        sub_request_index: usize,
        mut stream: ResponseStream,
        buffer: Arc<MessageBuffer>,
        mut cancel: watch::Receiver<bool>,
        permit: Option<tokio::sync::OwnedSemaphorePermit>,
    ) -> Self {
        let messages_received = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&messages_received);

        let handle = tokio::spawn(async move {
            let _permit = permit;
            loop {
                tokio::select! {
                    biased;
                    changed = cancel.changed() => {
                        if changed.is_ok() && *cancel.borrow() {
                            debug!(sub_request_index, "stream task observed cancel signal");
                            return StreamOutcome::Failure(TransportError::Cancelled);
                        }
                    }
                    item = stream.next() => {
                        match item {
                            None => return StreamOutcome::Success,
                            Some(Err(e)) => {
                                warn!(sub_request_index, error = %e, "stream task transport error");
                                return StreamOutcome::Failure(e);
                            }
                            Some(Ok(message)) => {
                                counter.fetch_add(1, Ordering::Relaxed);
                                if buffer.push(message).await.is_err() {
                                    return StreamOutcome::Failure(TransportError::Cancelled);
                                }
                            }
                        }
                    }
                }
            }
        });

        Self { messages_received, handle }
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Consumes the task handle, awaiting its completion.
    pub async fn result(self) -> Result<StreamOutcome, EngineError> {
        match self.handle.await {
            Ok(outcome) => Ok(outcome),
            Err(join_err) if join_err.is_cancelled() => Ok(StreamOutcome::Failure(TransportError::Cancelled)),
            Err(join_err) => Err(EngineError::Internal(format!("stream task panicked: {join_err}"))),
        }
    }
}
