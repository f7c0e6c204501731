//! Engine-level error surface.
//!
//! Every component owns a small `Error` enum at its boundary (teacher
//! convention: one `thiserror` enum per module, not one god-enum); this
//! module is the point where they all fold into `EngineError`, the type
//! the public API actually returns.

use crate::transport::TransportError;
use crate::value::ValueError;

/// Stable identifiers for the error kinds enumerated in the spec's error
/// handling design. Callers can match on `kind()` without matching the
/// full `EngineError` variant set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Rejected,
    Timeout,
    Cancelled,
    UnsupportedType,
    InvalidBucket,
    DuplicateSource,
    SizeMismatch,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transport error on sub-request {sub_request}: {source}")]
    Transport {
        sub_request: usize,
        #[source]
        source: TransportError,
    },

    #[error("remote rejected sub-request {sub_request}: {message}")]
    Rejected { sub_request: usize, message: String },

    #[error("deadline elapsed: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("unsupported value: {0}")]
    UnsupportedType(#[from] ValueError),

    #[error("invalid bucket: {0}")]
    InvalidBucket(String),

    #[error("duplicate source {source_name} in block")]
    DuplicateSource { source_name: String },

    #[error("column size mismatch: expected {expected}, got {got}")]
    SizeMismatch { expected: u64, got: usize },

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Transport { .. } => ErrorKind::Transport,
            EngineError::Rejected { .. } => ErrorKind::Rejected,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            EngineError::InvalidBucket(_) => ErrorKind::InvalidBucket,
            EngineError::DuplicateSource { .. } => ErrorKind::DuplicateSource,
            EngineError::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Outcome of a non-fatal verification method (`verifySources`,
/// `verifyColumnSizes`, `verifyOrdering`, `verifyDisjointTimeDomains`).
/// Distinct from `EngineError` -- verification failures are for test
/// suites and optional runtime audits, never propagated as request
/// failures.
pub type VerifyResult = Result<(), VerifyFailure>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct VerifyFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl VerifyFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
