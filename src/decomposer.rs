//! Splits a `RequestSpec` along the source axis, the time axis, or a grid
//! of both, producing sub-requests suitable for parallel streaming.
//!
//! Pure and synchronous -- no I/O, no async runtime -- so it is testable
//! without a `tokio` runtime, the same way the wire-format conversions in
//! `timestamp`/`value` are.

use crate::request::RequestSpec;
use crate::timestamp::Timestamp;
use std::collections::BTreeSet;

/// Tunables consulted by [`decompose_preferred`]. Carried by
/// [`crate::config::EngineConfig`]; passed explicitly here so this module
/// has no dependency on engine construction.
#[derive(Debug, Clone, Copy)]
pub struct DecomposerConfig {
    pub max_streams: usize,
    pub min_domain_threshold: u64,
}

/// Partitions `sources` into at most `n` roughly-equal subsets (fewer if
/// there are fewer sources than `n`); the time interval is unchanged in
/// every sub-request.
pub fn decompose_horizontal(spec: &RequestSpec, n: usize) -> Vec<RequestSpec> {
    let n = n.max(1).min(spec.sources().len().max(1));
    let sources: Vec<&String> = spec.sources().iter().collect();
    let (begin, end) = spec.interval();
    chunk_indices(sources.len(), n)
        .into_iter()
        .map(|(start, stop)| {
            let subset: BTreeSet<String> = sources[start..stop].iter().map(|s| (*s).clone()).collect();
            spec.with_sources_and_interval(subset, begin, end)
        })
        .collect()
}

/// Splits `interval` into `n` contiguous sub-intervals of equal duration;
/// the last absorbs any rounding remainder. Sources are unchanged.
pub fn decompose_vertical(spec: &RequestSpec, n: usize) -> Vec<RequestSpec> {
    let n = n.max(1);
    let (begin, end) = spec.interval();
    split_interval(begin, end, n)
        .into_iter()
        .map(|(b, e)| spec.with_sources_and_interval(spec.sources().clone(), b, e))
        .collect()
}

/// A 2-D partition: the two divisors of `n` closest to `sqrt(n)`, used as
/// (horizontal source partitions) x (vertical time partitions).
pub fn decompose_grid(spec: &RequestSpec, n: usize) -> Vec<RequestSpec> {
    let (h, v) = closest_divisor_pair(n.max(1));
    let h = h.min(spec.sources().len().max(1));
    let sources: Vec<&String> = spec.sources().iter().collect();
    let (begin, end) = spec.interval();
    let source_chunks = chunk_indices(sources.len(), h);
    let time_chunks = split_interval(begin, end, v);

    let mut out = Vec::with_capacity(source_chunks.len() * time_chunks.len());
    for (s_start, s_stop) in &source_chunks {
        let subset: BTreeSet<String> = sources[*s_start..*s_stop].iter().map(|s| (*s).clone()).collect();
        for (t_begin, t_end) in &time_chunks {
            out.push(spec.with_sources_and_interval(subset.clone(), *t_begin, *t_end));
        }
    }
    out
}

/// Chooses among the strategies using the request-shape heuristic from
/// the spec's §4.3, ordered:
///
/// 1. `approx_domain_size < min_domain_threshold` -> `[r]`
/// 2. `sources.len() >= max_streams` -> horizontal
/// 3. `approx_domain_size / min_domain_threshold >= max_streams` -> vertical
/// 4. `sources.len() >= max_streams / 2` -> grid
/// 5. otherwise -> `[r]`
pub fn decompose_preferred(spec: &RequestSpec, config: DecomposerConfig) -> Vec<RequestSpec> {
    let threshold = config.min_domain_threshold.max(1);
    if spec.approx_domain_size() < threshold {
        return vec![spec.clone()];
    }
    if spec.sources().len() >= config.max_streams {
        return decompose_horizontal(spec, config.max_streams);
    }
    if spec.approx_domain_size() / threshold >= config.max_streams as u64 {
        return decompose_vertical(spec, config.max_streams);
    }
    if spec.sources().len() >= config.max_streams / 2 {
        return decompose_grid(spec, config.max_streams);
    }
    vec![spec.clone()]
}

/// Divides `len` items into `n` contiguous index ranges, as equal as
/// possible; `n` is clamped to `[1, len]` by callers before this is
/// invoked so every range is non-empty.
fn chunk_indices(len: usize, n: usize) -> Vec<(usize, usize)> {
    let n = n.max(1).min(len.max(1));
    let base = len / n;
    let remainder = len % n;
    let mut out = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let size = base + usize::from(i < remainder);
        let stop = start + size;
        out.push((start, stop));
        start = stop;
    }
    out
}

/// Splits `[begin, end)` into `n` contiguous, non-overlapping sub-intervals
/// whose union is exactly `[begin, end)`. The last interval absorbs the
/// rounding remainder so the split is bit-exact on the boundary.
fn split_interval(begin: Timestamp, end: Timestamp, n: usize) -> Vec<(Timestamp, Timestamp)> {
    let n = n.max(1) as i64;
    let total = end.to_nanos() - begin.to_nanos();
    let base = total / n;
    let mut out = Vec::with_capacity(n as usize);
    let mut cursor = begin.to_nanos();
    for i in 0..n {
        let stop = if i == n - 1 { end.to_nanos() } else { cursor + base };
        out.push((Timestamp::from_nanos(cursor), Timestamp::from_nanos(stop)));
        cursor = stop;
    }
    out
}

/// The pair of divisors `(a, b)` of `n` with `a * b == n`, `a <= b`, and
/// `a` as close to `sqrt(n)` as possible. Falls back to `(1, n)` when `n`
/// has no closer factor pair (e.g. `n` prime).
fn closest_divisor_pair(n: usize) -> (usize, usize) {
    let n = n.max(1);
    let sqrt = (n as f64).sqrt() as usize;
    for a in (1..=sqrt.max(1)).rev() {
        if n % a == 0 {
            return (a, n / a);
        }
    }
    (1, n)
}
