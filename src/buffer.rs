//! `MessageBuffer`: a bounded handoff between stream tasks and the
//! transfer task, with an independent "still supplying" flag so a reader
//! can distinguish "empty, more coming" from "empty, done".

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use wire_protocol::ResponseMessage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("buffer supply has been closed")]
    NotSupplying,
}

/// A bounded channel plus a `supplying` flag. Multiple producers
/// ([`crate::stream_task::StreamTask`]s) push; one consumer
/// ([`crate::transfer_task::TransferTask`]) polls. `close_supply` is
/// idempotent and does not drop messages already queued -- the consumer
/// drains the channel to empty before treating the buffer as exhausted.
pub struct MessageBuffer {
    sender: mpsc::Sender<ResponseMessage>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<ResponseMessage>>,
    supplying: AtomicBool,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            supplying: AtomicBool::new(true),
        }
    }

    /// Blocks while the buffer is full. Fails immediately if supply has
    /// already been closed -- producers must stop offering messages once
    /// `close_supply` has been called.
    pub async fn push(&self, message: ResponseMessage) -> Result<(), BufferError> {
        if !self.supplying() {
            return Err(BufferError::NotSupplying);
        }
        // The sender may still succeed in a narrow race with a concurrent
        // close_supply; that message is simply drained by poll like any
        // other before exhaustion is observed.
        self.sender.send(message).await.map_err(|_| BufferError::NotSupplying)
    }

    /// Waits up to `timeout` for the next message. Returns `None` either
    /// on timeout or once supply is closed and the channel is drained --
    /// callers distinguish the two via [`MessageBuffer::supplying`].
    pub async fn poll(&self, timeout: Duration) -> Option<ResponseMessage> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(message)) => Some(message),
            Ok(None) | Err(_) => None,
        }
    }

    pub fn close_supply(&self) {
        self.supplying.store(false, Ordering::SeqCst);
    }

    pub fn supplying(&self) -> bool {
        self.supplying.load(Ordering::SeqCst)
    }
}
