//! Shared scripted transport for the end-to-end test suite. A thin
//! re-implementation of the crate's own internal test mock, built only
//! against `tsq_core`'s public `TransportFactory` boundary since
//! integration tests cannot reach crate-private items.

use futures_util::stream;
use std::sync::Mutex;
use tsq_core::{RequestSpec, ResponseStream, StreamMode, TransportError, TransportFactory};
use wire_protocol::ResponseMessage;

/// Replays one scripted stream per `open_*` call, in registration order.
/// A call beyond the scripted set fails loudly rather than blocking
/// forever.
pub struct ScriptedTransport {
    scripts: Mutex<Vec<Vec<Result<ResponseMessage, TransportError>>>>,
    opened: Mutex<Vec<(Vec<String>, StreamMode)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, script: Vec<Result<ResponseMessage, TransportError>>) {
        self.scripts.lock().unwrap().push(script);
    }

    /// The `(sources, mode)` of every `open_*` call so far, in order.
    pub fn opened_calls(&self) -> Vec<(Vec<String>, StreamMode)> {
        self.opened.lock().unwrap().clone()
    }

    fn open_as(&self, sub_request: &RequestSpec, mode: StreamMode) -> Result<ResponseStream, TransportError> {
        self.opened
            .lock()
            .unwrap()
            .push((sub_request.sources().iter().cloned().collect(), mode));
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            return Err(TransportError::Transport("no scripted stream left".to_owned()));
        }
        let script = scripts.remove(0);
        Ok(Box::pin(stream::iter(script)))
    }
}

impl TransportFactory for ScriptedTransport {
    fn open_forward(&self, sub_request: &RequestSpec) -> Result<ResponseStream, TransportError> {
        self.open_as(sub_request, StreamMode::Forward)
    }

    fn open_backward(&self, sub_request: &RequestSpec) -> Result<ResponseStream, TransportError> {
        self.open_as(sub_request, StreamMode::Backward)
    }

    fn open_bidirectional(&self, sub_request: &RequestSpec) -> Result<ResponseStream, TransportError> {
        self.open_as(sub_request, StreamMode::Bidirectional)
    }
}
