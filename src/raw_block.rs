//! `RawBlock`: all columns correlated to one equivalent sampling key.

use crate::error::{ErrorKind, VerifyFailure, VerifyResult};
use crate::timestamp::{SamplingKey, Timestamp};
use crate::value::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// One source's values for a block's sampling key.
#[derive(Debug, Clone, PartialEq)]
pub struct DataColumn {
    pub source_name: String,
    pub values: Vec<Value>,
}

/// A bucket as ingested by the correlator: one sampling key, one column.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub key: SamplingKey,
    pub column: DataColumn,
}

/// All columns correlated to one equivalent sampling key.
///
/// Columns are held behind their own [`Mutex`] (not the correlator's
/// coarse lock) so that concurrent insertion workers attempting
/// [`RawBlock::try_insert`] on *different* blocks never contend with each
/// other -- only attempts on the *same* block serialize, and those are
/// rare once the pivot has been crossed.
pub struct RawBlock {
    key: SamplingKey,
    columns: Mutex<Vec<DataColumn>>,
}

impl RawBlock {
    pub fn new(bucket: Bucket) -> Self {
        Self {
            key: bucket.key,
            columns: Mutex::new(vec![bucket.column]),
        }
    }

    pub fn key(&self) -> &SamplingKey {
        &self.key
    }

    /// Whether `key` is equivalent to this block's own key -- used by the
    /// correlator to tell a non-matching block (try this one's neighbors)
    /// apart from a matching block that rejected the bucket only because
    /// its source was already present (drop, never spawn a second block
    /// with the same key).
    pub fn key_equivalent_to(&self, key: &SamplingKey) -> bool {
        self.key.equivalent(key)
    }

    pub fn start_time(&self) -> Timestamp {
        self.key.start_time()
    }

    pub fn time_range(&self) -> (Timestamp, Timestamp) {
        self.key.domain()
    }

    pub fn sample_count(&self) -> u64 {
        self.key.sample_count()
    }

    pub fn column_count(&self) -> usize {
        self.columns.lock().unwrap().len()
    }

    pub fn source_names(&self) -> Vec<String> {
        self.columns.lock().unwrap().iter().map(|c| c.source_name.clone()).collect()
    }

    pub fn columns(&self) -> Vec<DataColumn> {
        self.columns.lock().unwrap().clone()
    }

    /// Atomic on this block. Returns `true` iff `bucket.key` is equivalent
    /// to this block's key *and* the bucket's source is not already
    /// present; in that case the column is appended. Otherwise returns
    /// `false` with no mutation -- including the duplicate-source case,
    /// which is not an error (the spec treats it as silently dropped,
    /// detectable later via [`RawBlock::verify_sources`]).
    pub fn try_insert(&self, bucket: Bucket) -> bool {
        if !self.key.equivalent(&bucket.key) {
            return false;
        }
        let mut columns = self.columns.lock().unwrap();
        if columns.iter().any(|c| c.source_name == bucket.column.source_name) {
            return false;
        }
        columns.push(bucket.column);
        true
    }

    /// `sourceNames.size == columns.size` and no duplicates.
    pub fn verify_sources(&self) -> VerifyResult {
        let columns = self.columns.lock().unwrap();
        let mut seen = std::collections::HashSet::with_capacity(columns.len());
        for c in columns.iter() {
            if !seen.insert(&c.source_name) {
                return Err(VerifyFailure::new(
                    ErrorKind::DuplicateSource,
                    format!("duplicate source {}", c.source_name),
                ));
            }
        }
        Ok(())
    }

    /// Every column has `len == sample_count()`.
    pub fn verify_column_sizes(&self) -> VerifyResult {
        let expected = self.sample_count();
        let columns = self.columns.lock().unwrap();
        for c in columns.iter() {
            if c.values.len() as u64 != expected {
                return Err(VerifyFailure::new(
                    ErrorKind::SizeMismatch,
                    format!(
                        "column {} has {} values, expected {}",
                        c.source_name,
                        c.values.len(),
                        expected
                    ),
                ));
            }
        }
        Ok(())
    }

    /// A deterministic secondary sort key for blocks whose start times
    /// coincide (spec §9 open question: the reference implementation
    /// never returns equal, but does not mandate a particular tiebreak --
    /// a stable hash of the key's wire-equivalent fields is used here so
    /// repeated runs over the same input order blocks identically).
    pub(crate) fn tiebreak_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match &self.key {
            SamplingKey::Clock(c) => {
                0u8.hash(&mut hasher);
                c.start.secs.hash(&mut hasher);
                c.start.nanos.hash(&mut hasher);
                c.period_nanos.hash(&mut hasher);
                c.count.hash(&mut hasher);
            }
            SamplingKey::List(l) => {
                1u8.hash(&mut hasher);
                for t in l.as_slice() {
                    t.secs.hash(&mut hasher);
                    t.nanos.hash(&mut hasher);
                }
            }
        }
        hasher.finish()
    }
}
