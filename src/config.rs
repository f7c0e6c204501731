//! `EngineConfig`: the tunables gathered in one place so callers building
//! an [`crate::engine::Engine`] don't have to thread a dozen constructor
//! arguments. Serde-derivable so a binary can load it from a file, but
//! this crate does not itself depend on a config-loading crate -- that is
//! the binary's concern.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on the number of sub-requests the decomposer may
    /// produce, and on the number of concurrently running stream tasks.
    pub max_streams: usize,
    /// Below this approximate domain size (`sources * seconds`), the
    /// decomposer returns the request unsplit.
    pub min_domain_threshold: u64,
    /// When true, the engine's transfer task starts alongside the stream
    /// tasks; when false, it waits for every stream task to finish first.
    pub correlate_while_streaming: bool,
    /// When true, the correlator uses its concurrent insertion path once
    /// its block set reaches `pivot_size`.
    pub concurrency_enabled: bool,
    /// Block-set size at which the correlator switches to the concurrent
    /// insertion path.
    pub pivot_size: usize,
    /// Worker pool size for the correlator's concurrent insertion path.
    pub concurrency_workers: usize,
    /// Bound on how long the correlator's concurrent insertion path waits
    /// for its worker pool to finish one message's buckets.
    #[serde(with = "duration_millis")]
    pub worker_timeout: Duration,
    /// How long the transfer task's buffer poll waits before giving the
    /// supply-open/empty check another look.
    #[serde(with = "duration_millis")]
    pub poll_timeout: Duration,
    /// Overall deadline for one `queryCorrelated` call, from decomposition
    /// through drain.
    #[serde(with = "duration_millis")]
    pub overall_deadline: Duration,
    /// Channel capacity backing the message buffer between stream tasks
    /// and the transfer task.
    pub buffer_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_streams: 8,
            min_domain_threshold: 3600,
            correlate_while_streaming: true,
            concurrency_enabled: true,
            pivot_size: 64,
            concurrency_workers: 4,
            worker_timeout: Duration::from_secs(5),
            poll_timeout: Duration::from_millis(200),
            overall_deadline: Duration::from_secs(60),
            buffer_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn with_max_streams(mut self, max_streams: usize) -> Self {
        self.max_streams = max_streams;
        self
    }

    pub fn with_min_domain_threshold(mut self, min_domain_threshold: u64) -> Self {
        self.min_domain_threshold = min_domain_threshold;
        self
    }

    pub fn with_correlate_while_streaming(mut self, enabled: bool) -> Self {
        self.correlate_while_streaming = enabled;
        self
    }

    pub fn with_concurrency_enabled(mut self, enabled: bool) -> Self {
        self.concurrency_enabled = enabled;
        self
    }

    pub fn with_pivot_size(mut self, pivot_size: usize) -> Self {
        self.pivot_size = pivot_size;
        self
    }

    pub fn with_concurrency_workers(mut self, workers: usize) -> Self {
        self.concurrency_workers = workers;
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_overall_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = deadline;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub(crate) fn decomposer_config(&self) -> crate::decomposer::DecomposerConfig {
        crate::decomposer::DecomposerConfig {
            max_streams: self.max_streams,
            min_domain_threshold: self.min_domain_threshold,
        }
    }
}

/// `serde` does not derive `Duration` as a plain integer by default; this
/// module is the teacher-style workaround, millisecond-resolution and
/// good enough for configuration (not used on any hot path).
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn builder_methods_override_one_field_at_a_time() {
        let config = EngineConfig::default().with_max_streams(16).with_pivot_size(128);
        assert_eq!(config.max_streams, 16);
        assert_eq!(config.pivot_size, 128);
        assert_eq!(config.concurrency_workers, EngineConfig::default().concurrency_workers);
    }
}
