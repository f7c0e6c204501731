//! The raw data correlator: groups incoming wire buckets into disjoint
//! [`RawBlock`]s, with a concurrency pivot for large block sets.

use crate::raw_block::{Bucket, DataColumn, RawBlock};
use crate::timestamp::SamplingKey;
use crate::value::{self, Value};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use wire_protocol::ResponseMessage;

use crate::error::EngineError;

struct CorrelatorState {
    blocks: Vec<Arc<RawBlock>>,
    pivot_size: usize,
    concurrency_enabled: bool,
    concurrency_workers: usize,
}

/// Inserts incoming buckets into the sorted set of [`RawBlock`]s, choosing
/// a serial or concurrent insertion path based on the current block-set
/// size relative to `pivot_size`.
pub struct Correlator {
    state: Mutex<CorrelatorState>,
    bytes_processed: AtomicU64,
    worker_timeout: Duration,
    max_value_depth: u32,
}

fn block_order(a: &RawBlock, b: &RawBlock) -> Ordering {
    a.start_time().cmp(&b.start_time()).then(a.tiebreak_hash().cmp(&b.tiebreak_hash()))
}

/// Inserts `block` into `blocks`, kept sorted by [`block_order`].
fn insert_sorted(blocks: &mut Vec<Arc<RawBlock>>, block: Arc<RawBlock>) {
    let pos = blocks.partition_point(|b| block_order(b, &block) == Ordering::Less);
    blocks.insert(pos, block);
}

/// Attempts `bucket` against every block in `blocks` in order, inserting a
/// fresh block if none claims it. Mutates `blocks` in place, so it is only
/// used where no other task can be observing the same `Vec` (the serial
/// path, and the single-threaded build of the concurrent path's auxiliary
/// set).
fn insert_serial(blocks: &mut Vec<Arc<RawBlock>>, bucket: Bucket) {
    for block in blocks.iter() {
        if block.try_insert(bucket.clone_bucket()) {
            return;
        }
        if block.key_equivalent_to(&bucket.key) {
            // This block already owns the bucket's key, so `try_insert`
            // failed on a duplicate source, not a key mismatch -- no other
            // block can share that key, so the bucket is dropped rather
            // than spawning a second block with the same key.
            return;
        }
    }
    insert_sorted(blocks, Arc::new(RawBlock::new(bucket)));
}

impl Bucket {
    /// Cheap clone used when a bucket must be offered to more than one
    /// candidate block (the column data itself is duplicated only when a
    /// block actually accepts it, since `try_insert` takes it by value).
    fn clone_bucket(&self) -> Bucket {
        Bucket {
            key: self.key.clone(),
            column: self.column.clone(),
        }
    }
}

fn wire_bucket_to_core(
    bucket: &wire_protocol::DataBucket,
    max_value_depth: u32,
) -> Result<Bucket, EngineError> {
    let key = SamplingKey::try_from(bucket.key.clone()).map_err(EngineError::InvalidBucket)?;
    let mut values = Vec::with_capacity(bucket.column.values.len());
    for v in &bucket.column.values {
        values.push(
            Value::from_wire(v, max_value_depth).map_err(EngineError::UnsupportedType)?,
        );
    }
    Ok(Bucket {
        key,
        column: DataColumn {
            source_name: bucket.column.name.clone(),
            values,
        },
    })
}

impl Correlator {
    pub fn new(pivot_size: usize, concurrency_workers: usize, worker_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(CorrelatorState {
                blocks: Vec::new(),
                pivot_size,
                concurrency_enabled: concurrency_workers > 0,
                concurrency_workers: concurrency_workers.max(1),
            }),
            bytes_processed: AtomicU64::new(0),
            worker_timeout,
            max_value_depth: value::DEFAULT_MAX_DEPTH,
        }
    }

    /// Processes one response message: ingests every bucket, holding the
    /// exclusion lock for the whole message (spec §4.5 step 1). On the
    /// first invalid bucket or unsupported value, processing of the
    /// *remainder* of this message stops and the error propagates --
    /// buckets already applied earlier in the same message are not rolled
    /// back.
    pub async fn process(&self, message: &ResponseMessage) -> Result<(), EngineError> {
        let byte_len = serde_json::to_vec(message)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0);

        let mut state = self.state.lock().await;
        debug!(buckets = message.buckets.len(), byte_len, "correlator processing message");

        let use_concurrent = state.concurrency_enabled && state.blocks.len() >= state.pivot_size;
        if use_concurrent {
            // The concurrent path needs every bucket up front to fan the
            // insertion tasks out, so a conversion failure here aborts
            // before any bucket in this batch is applied -- unlike the
            // serial path below, which applies buckets one at a time and
            // keeps whatever succeeded before the failing one.
            let mut core_buckets = Vec::with_capacity(message.buckets.len());
            for wire_bucket in &message.buckets {
                core_buckets.push(wire_bucket_to_core(wire_bucket, self.max_value_depth)?);
            }
            self.insert_concurrent(&mut state, core_buckets).await?;
        } else {
            for wire_bucket in &message.buckets {
                let bucket = wire_bucket_to_core(wire_bucket, self.max_value_depth)?;
                insert_serial(&mut state.blocks, bucket);
            }
        }

        self.bytes_processed.fetch_add(byte_len, AtomicOrdering::Relaxed);
        Ok(())
    }

    /// The concurrent path (spec §4.5 step 3): one task per bucket walks a
    /// stable snapshot of the current block set; buckets no task claims
    /// ("free buckets") are mutually disjoint from that set by
    /// construction and are folded in with a serial pass.
    async fn insert_concurrent(
        &self,
        state: &mut CorrelatorState,
        buckets: Vec<Bucket>,
    ) -> Result<(), EngineError> {
        let snapshot: Vec<Arc<RawBlock>> = state.blocks.clone();
        let worker_count = state.concurrency_workers.max(1);
        let semaphore = Arc::new(tokio::sync::Semaphore::new(worker_count));

        let mut tasks = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let snapshot = snapshot.clone();
            let semaphore = semaphore.clone();
            tasks.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                for block in &snapshot {
                    if block.try_insert(bucket.clone_bucket()) {
                        return None;
                    }
                    if block.key_equivalent_to(&bucket.key) {
                        // Duplicate source against a block that already
                        // owns this key -- drop it here rather than
                        // reporting it free, which would let the serial
                        // fold below spawn a second block with that key.
                        return None;
                    }
                }
                Some(bucket)
            }));
        }

        let joined = tokio::time::timeout(self.worker_timeout, futures_util::future::join_all(tasks)).await;
        let results = match joined {
            Ok(results) => results,
            Err(_) => {
                warn!(worker_timeout = ?self.worker_timeout, "correlator worker pool timed out");
                return Err(EngineError::Timeout("correlator insertion workers".to_owned()));
            }
        };

        let mut free_buckets = Vec::new();
        for result in results {
            match result {
                Ok(Some(bucket)) => free_buckets.push(bucket),
                Ok(None) => {}
                Err(join_err) => {
                    return Err(EngineError::Internal(format!(
                        "correlator insertion worker panicked: {join_err}"
                    )));
                }
            }
        }

        debug!(free = free_buckets.len(), "concurrent path free buckets, folding serially");
        let mut auxiliary = Vec::new();
        for bucket in free_buckets {
            insert_serial(&mut auxiliary, bucket);
        }
        for block in auxiliary {
            insert_sorted(&mut state.blocks, block);
        }
        Ok(())
    }

    /// The correlator's sorted output, by `key.startTime` (with a stable
    /// secondary tiebreak for coincident start times).
    pub async fn correlated_set(&self) -> Vec<Arc<RawBlock>> {
        self.state.lock().await.blocks.clone()
    }

    /// Clears the block set and resets `bytes_processed` to zero.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.blocks.clear();
        self.bytes_processed.store(0, AtomicOrdering::Relaxed);
    }

    pub async fn enable_concurrency(&self, workers: usize) {
        let mut state = self.state.lock().await;
        state.concurrency_enabled = true;
        state.concurrency_workers = workers.max(1);
    }

    pub async fn disable_concurrency(&self) {
        let mut state = self.state.lock().await;
        state.concurrency_enabled = false;
    }

    pub async fn set_pivot_size(&self, pivot_size: usize) {
        let mut state = self.state.lock().await;
        state.pivot_size = pivot_size;
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(AtomicOrdering::Relaxed)
    }

    /// For every pair of distinct blocks, their sampling keys must not be
    /// equivalent. O(n^2); intended for test suites and optional audits,
    /// not the hot insertion path.
    pub async fn verify_disjoint_time_domains(&self) -> crate::error::VerifyResult {
        let blocks = self.correlated_set().await;
        for i in 0..blocks.len() {
            for j in (i + 1)..blocks.len() {
                if blocks[i].key().equivalent(blocks[j].key()) {
                    return Err(crate::error::VerifyFailure::new(
                        crate::error::ErrorKind::Internal,
                        "two blocks share an equivalent sampling key",
                    ));
                }
            }
        }
        Ok(())
    }

    /// The returned set must be sorted by `key.startTime`.
    pub async fn verify_ordering(&self) -> crate::error::VerifyResult {
        let blocks = self.correlated_set().await;
        for w in blocks.windows(2) {
            if block_order(&w[0], &w[1]) == Ordering::Greater {
                return Err(crate::error::VerifyFailure::new(
                    crate::error::ErrorKind::Internal,
                    "correlated set is not sorted by start time",
                ));
            }
        }
        Ok(())
    }
}
