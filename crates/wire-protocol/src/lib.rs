// wire-protocol: wire-level message types for the time-series query core.
//
// Mirrors the remote service's response/request envelopes. No async runtime
// dependency -- this crate only ever encodes/decodes values, it never reads
// or writes a socket. The stream transport itself (gRPC, raw frames, ...)
// is a `TransportFactory` implementor's concern in `tsq-core`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Epoch-seconds plus a nanosecond offset, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WireTimestamp {
    pub secs: i64,
    pub nanos: u32,
}

/// A uniform sampling clock: `count` timestamps starting at `epoch_s`/`epoch_ns`,
/// spaced `period_ns` nanoseconds apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingClock {
    pub epoch_s: i64,
    pub epoch_ns: u32,
    pub period_ns: u64,
    pub count: u64,
}

/// An explicit, strictly-increasing list of timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampList {
    pub timestamps: Vec<WireTimestamp>,
}

/// One of the two ways a bucket's samples can be keyed in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireSamplingKey {
    Clock(SamplingClock),
    List(TimestampList),
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// The tagged union of values a bucket's column may carry.
///
/// `Uint32`/`Uint64` exist only on the wire -- the core model (`tsq_core::value`)
/// widens them to signed on ingest per the unsigned-widening design note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireValue {
    Bool(bool),
    Uint32(u32),
    Sint32(i32),
    Uint64(u64),
    Sint64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<WireValue>),
    Struct(Vec<WireStructField>),
    Image { file_type: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireStructField {
    pub name: String,
    pub value: WireValue,
}

// ---------------------------------------------------------------------------
// Buckets and messages
// ---------------------------------------------------------------------------

/// One source's column for one sampling key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDataColumn {
    pub name: String,
    pub values: Vec<WireValue>,
}

/// A single wire bucket: exactly one key, exactly one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBucket {
    pub key: WireSamplingKey,
    pub column: WireDataColumn,
}

/// A streamed response message: a batch of buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResponseMessage {
    pub buckets: Vec<DataBucket>,
}

/// Advisory transport preference carried on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamTypeHint {
    Forward,
    Backward,
    Bidirectional,
}

/// The wire form of a bounded request over a source set and time interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub source_name: Vec<String>,
    pub begin_time: WireTimestamp,
    pub end_time: WireTimestamp,
    pub stream_type: StreamTypeHint,
}
