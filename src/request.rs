//! `RequestSpec`: an immutable, validated request over a source set and
//! time interval.

use crate::timestamp::Timestamp;
use std::collections::BTreeSet;
use wire_protocol::StreamTypeHint;

/// Advisory transport preference. Never forces a particular decomposition
/// or transport mode; purely a hint to the `TransportFactory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPreference {
    Forward,
    Backward,
    Bidirectional,
}

impl From<TransportPreference> for StreamTypeHint {
    fn from(p: TransportPreference) -> Self {
        match p {
            TransportPreference::Forward => StreamTypeHint::Forward,
            TransportPreference::Backward => StreamTypeHint::Backward,
            TransportPreference::Bidirectional => StreamTypeHint::Bidirectional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestSpecError {
    #[error("interval begin must be strictly before end")]
    EmptyOrInvertedInterval,
    #[error("sources must contain at least one entry")]
    NoSources,
}

/// An immutable request: source set, half-open time interval `[begin, end)`,
/// preferred transport, and the approximate size of the source x time
/// rectangle it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    sources: BTreeSet<String>,
    begin: Timestamp,
    end: Timestamp,
    preferred_transport: TransportPreference,
}

impl RequestSpec {
    pub fn new(
        sources: impl IntoIterator<Item = String>,
        begin: Timestamp,
        end: Timestamp,
        preferred_transport: TransportPreference,
    ) -> Result<Self, RequestSpecError> {
        let sources: BTreeSet<String> = sources.into_iter().collect();
        if sources.is_empty() {
            return Err(RequestSpecError::NoSources);
        }
        if begin.to_nanos() >= end.to_nanos() {
            return Err(RequestSpecError::EmptyOrInvertedInterval);
        }
        Ok(Self {
            sources,
            begin,
            end,
            preferred_transport,
        })
    }

    pub fn sources(&self) -> &BTreeSet<String> {
        &self.sources
    }

    pub fn interval(&self) -> (Timestamp, Timestamp) {
        (self.begin, self.end)
    }

    pub fn preferred_transport(&self) -> TransportPreference {
        self.preferred_transport
    }

    fn interval_seconds(&self) -> u64 {
        let nanos = self.end.to_nanos().saturating_sub(self.begin.to_nanos());
        (nanos.max(0) as u64) / 1_000_000_000
    }

    /// `sources.len() * seconds(interval)`, used by the decomposer's
    /// selection heuristic as a rough cost proxy.
    pub fn approx_domain_size(&self) -> u64 {
        (self.sources.len() as u64).saturating_mul(self.interval_seconds())
    }

    /// Builds a sub-request from a source subset and sub-interval, carrying
    /// forward the original preferred transport. Used exclusively by the
    /// decomposer -- callers outside this crate construct `RequestSpec`
    /// through `new`.
    pub(crate) fn with_sources_and_interval(
        &self,
        sources: BTreeSet<String>,
        begin: Timestamp,
        end: Timestamp,
    ) -> RequestSpec {
        RequestSpec {
            sources,
            begin,
            end,
            preferred_transport: self.preferred_transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_source_set() {
        let err = RequestSpec::new(
            Vec::<String>::new(),
            Timestamp::new(0, 0),
            Timestamp::new(1, 0),
            TransportPreference::Forward,
        )
        .unwrap_err();
        assert_eq!(err, RequestSpecError::NoSources);
    }

    #[test]
    fn rejects_inverted_interval() {
        let err = RequestSpec::new(
            vec!["A".to_owned()],
            Timestamp::new(5, 0),
            Timestamp::new(5, 0),
            TransportPreference::Forward,
        )
        .unwrap_err();
        assert_eq!(err, RequestSpecError::EmptyOrInvertedInterval);
    }

    #[test]
    fn approx_domain_size_multiplies_sources_by_seconds() {
        let spec = RequestSpec::new(
            vec!["A".to_owned(), "B".to_owned()],
            Timestamp::new(0, 0),
            Timestamp::new(10, 0),
            TransportPreference::Forward,
        )
        .unwrap();
        assert_eq!(spec.approx_domain_size(), 20);
    }
}
