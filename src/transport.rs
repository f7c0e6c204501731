//! The boundary between this crate and whatever moves bytes over the
//! wire. `TransportFactory` is deliberately synchronous to open a stream
//! (no `async_trait`, to keep the object-safe trait usable with `dyn`):
//! it returns an already-running stream, with connection bootstrap having
//! happened before this call returns or inside the stream's own first
//! poll.

use crate::request::RequestSpec;
use futures_util::Stream;
use std::pin::Pin;
use wire_protocol::ResponseMessage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("remote rejected the request: {0}")]
    Rejected(String),
    #[error("cancelled")]
    Cancelled,
}

/// Which direction a sub-request's stream should be opened in. Distinct
/// from [`crate::request::TransportPreference`]: the preference is a
/// hint on the request, this is the mode the engine actually asked a
/// factory to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Forward,
    Backward,
    Bidirectional,
}

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<ResponseMessage, TransportError>> + Send>>;

/// Supplies opened streams for sub-requests. Implementations own whatever
/// connection pooling, retry, or authentication is needed before the
/// stream starts yielding messages.
///
/// One method per stream mode, statically dispatched per service stub at
/// the boundary (spec §9's "replace reflection-based stub creation with a
/// `TransportFactory` abstraction, one method per stub kind") rather than
/// a single method branching on a mode enum internally -- the engine picks
/// the method via [`TransportFactory::open`]'s default dispatch, but an
/// implementor never has to match on `StreamMode` itself.
pub trait TransportFactory: Send + Sync {
    fn open_forward(&self, sub_request: &RequestSpec) -> Result<ResponseStream, TransportError>;
    fn open_backward(&self, sub_request: &RequestSpec) -> Result<ResponseStream, TransportError>;
    fn open_bidirectional(&self, sub_request: &RequestSpec) -> Result<ResponseStream, TransportError>;

    /// Dispatches to the method matching `mode`. The engine calls this
    /// rather than the three methods directly, so it does not need to
    /// know which stub kind a given sub-request resolved to.
    fn open(&self, sub_request: &RequestSpec, mode: StreamMode) -> Result<ResponseStream, TransportError> {
        match mode {
            StreamMode::Forward => self.open_forward(sub_request),
            StreamMode::Backward => self.open_backward(sub_request),
            StreamMode::Bidirectional => self.open_bidirectional(sub_request),
        }
    }
}
