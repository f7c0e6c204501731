//! Drains the shared [`MessageBuffer`] into the [`Correlator`], exiting
//! once supply is closed and the buffer is empty, or on external
//! `terminate`.

use crate::buffer::MessageBuffer;
use crate::correlator::Correlator;
use crate::error::EngineError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct TransferTask {
    messages_transferred: Arc<AtomicU64>,
    handle: JoinHandle<Result<(), EngineError>>,
    terminate: watch::Sender<bool>,
}

impl TransferTask {
    pub fn spawn(buffer: Arc<MessageBuffer>, correlator: Arc<Correlator>, poll_timeout: Duration) -> Self {
        let messages_transferred = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&messages_transferred);
        let (terminate_tx, mut terminate_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                if *terminate_rx.borrow() {
                    debug!("transfer task terminated externally");
                    return Err(EngineError::Cancelled);
                }
                tokio::select! {
                    biased;
                    _ = terminate_rx.changed() => {
                        if *terminate_rx.borrow() {
                            debug!("transfer task terminated externally");
                            return Err(EngineError::Cancelled);
                        }
                    }
                    polled = buffer.poll(poll_timeout) => {
                        match polled {
                            Some(message) => {
                                correlator.process(&message).await?;
                                counter.fetch_add(1, Ordering::Relaxed);
                            }
                            None => {
                                if !buffer.supplying() {
                                    debug!("transfer task drained a closed, empty buffer");
                                    return Ok(());
                                }
                            }
                        }
                    }
                }
            }
        });

        Self {
            messages_transferred,
            handle,
            terminate: terminate_tx,
        }
    }

    pub fn messages_transferred(&self) -> u64 {
        self.messages_transferred.load(Ordering::Relaxed)
    }

    /// Signals the task to stop at its next poll iteration, without
    /// waiting for the buffer to drain. Idempotent.
    pub fn terminate(&self) {
        let _ = self.terminate.send(true);
    }

    /// Consumes the task handle, awaiting its completion.
    pub async fn result(self) -> Result<(), EngineError> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => Ok(()),
            Err(join_err) => Err(EngineError::Internal(format!("transfer task panicked: {join_err}"))),
        }
    }
}
