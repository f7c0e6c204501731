//! Client-side streaming query engine and time-series correlation core.
//!
//! Decomposes a request over a source set and time interval into
//! sub-requests, streams each sub-request's response messages through a
//! [`transport::TransportFactory`], and correlates the resulting buckets
//! into [`raw_block::RawBlock`]s keyed by equivalent sampling keys.

pub mod buffer;
pub mod config;
pub mod correlator;
pub mod decomposer;
pub mod engine;
pub mod error;
pub mod raw_block;
pub mod request;
pub mod stream_task;
pub mod timestamp;
pub mod transfer_task;
pub mod transport;
pub mod value;

pub use config::EngineConfig;
pub use engine::{Engine, ShutdownMode};
pub use error::{EngineError, ErrorKind, VerifyFailure, VerifyResult};
pub use raw_block::{Bucket, DataColumn, RawBlock};
pub use request::{RequestSpec, RequestSpecError, TransportPreference};
pub use timestamp::{ClockError, SamplingKey, Timestamp, TimestampList, TimestampListError, UniformClock};
pub use transport::{ResponseStream, StreamMode, TransportError, TransportFactory};
pub use value::{Value, ValueError};

pub use wire_protocol;
