//! Uniform clocks and explicit timestamp lists, and the `SamplingKey` union
//! over them.

use wire_protocol::{SamplingClock, WireSamplingKey, WireTimestamp};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Epoch-seconds plus a nanosecond offset. Total ordering by `(secs, nanos)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn new(secs: i64, nanos: u32) -> Self {
        debug_assert!(nanos < NANOS_PER_SEC as u32);
        Self { secs, nanos }
    }

    /// Converts to a single nanosecond scalar, saturating at the `i64`
    /// bounds rather than panicking. This keeps the conversion total, at
    /// the cost of losing round-trip fidelity only outside the
    /// representable range.
    pub fn to_nanos(self) -> i64 {
        let secs_part = self.secs.saturating_mul(NANOS_PER_SEC);
        secs_part.saturating_add(i64::from(self.nanos))
    }

    /// Inverse of [`Timestamp::to_nanos`]; total on the full `i64` domain.
    pub fn from_nanos(nanos: i64) -> Self {
        let secs = nanos.div_euclid(NANOS_PER_SEC);
        let rem = nanos.rem_euclid(NANOS_PER_SEC);
        Self {
            secs,
            nanos: rem as u32,
        }
    }

    /// Adds a (possibly large) nanosecond offset, saturating into the
    /// seconds component on overflow rather than wrapping.
    pub fn add_nanos(self, offset_nanos: u64) -> Self {
        let total = (i128::from(self.nanos) + i128::from(offset_nanos)) as i128;
        let carry_secs = (total / i128::from(NANOS_PER_SEC)) as i64;
        let nanos = (total % i128::from(NANOS_PER_SEC)) as u32;
        Self {
            secs: self.secs.saturating_add(carry_secs),
            nanos,
        }
    }
}

impl From<WireTimestamp> for Timestamp {
    fn from(w: WireTimestamp) -> Self {
        Timestamp::new(w.secs, w.nanos)
    }
}

impl From<Timestamp> for WireTimestamp {
    fn from(t: Timestamp) -> Self {
        WireTimestamp {
            secs: t.secs,
            nanos: t.nanos,
        }
    }
}

/// `(start, period, count)`. Invariant: `count >= 1`, `period_nanos >= 1`,
/// enforced at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformClock {
    pub start: Timestamp,
    pub period_nanos: u64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("uniform clock count must be >= 1")]
    ZeroCount,
    #[error("uniform clock period_nanos must be >= 1")]
    ZeroPeriod,
}

impl UniformClock {
    pub fn new(start: Timestamp, period_nanos: u64, count: u64) -> Result<Self, ClockError> {
        if count == 0 {
            return Err(ClockError::ZeroCount);
        }
        if period_nanos == 0 {
            return Err(ClockError::ZeroPeriod);
        }
        Ok(Self {
            start,
            period_nanos,
            count,
        })
    }

    /// Generates `t_i = start + i * period` for `i in [0, count)`. Never
    /// allocates fewer than `count` timestamps.
    pub fn to_timestamps(&self) -> Vec<Timestamp> {
        (0..self.count)
            .map(|i| self.start.add_nanos(self.period_nanos.saturating_mul(i)))
            .collect()
    }

    pub fn end(&self) -> Timestamp {
        self.start.add_nanos(self.period_nanos.saturating_mul(self.count - 1))
    }
}

impl From<UniformClock> for SamplingClock {
    fn from(c: UniformClock) -> Self {
        SamplingClock {
            epoch_s: c.start.secs,
            epoch_ns: c.start.nanos,
            period_ns: c.period_nanos,
            count: c.count,
        }
    }
}

impl TryFrom<SamplingClock> for UniformClock {
    type Error = ClockError;
    fn try_from(c: SamplingClock) -> Result<Self, ClockError> {
        UniformClock::new(Timestamp::new(c.epoch_s, c.epoch_ns), c.period_ns, c.count)
    }
}

/// An ordered, finite, strictly-increasing sequence of timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampList {
    timestamps: Vec<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampListError {
    #[error("timestamp list must not be empty")]
    Empty,
    #[error("timestamp list must be strictly increasing")]
    NotStrictlyIncreasing,
}

impl TimestampList {
    pub fn new(timestamps: Vec<Timestamp>) -> Result<Self, TimestampListError> {
        if timestamps.is_empty() {
            return Err(TimestampListError::Empty);
        }
        if !timestamps.windows(2).all(|w| w[0] < w[1]) {
            return Err(TimestampListError::NotStrictlyIncreasing);
        }
        Ok(Self { timestamps })
    }

    pub fn as_slice(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        false // construction rejects the empty case
    }

    pub fn first(&self) -> Timestamp {
        self.timestamps[0]
    }

    pub fn last(&self) -> Timestamp {
        self.timestamps[self.timestamps.len() - 1]
    }
}

/// A tagged union: the timestamp specification shared by all columns of a
/// block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplingKey {
    Clock(UniformClock),
    List(TimestampList),
}

impl SamplingKey {
    /// Materializes the full timestamp sequence. Total for both variants.
    pub fn to_timestamps(&self) -> Vec<Timestamp> {
        match self {
            SamplingKey::Clock(c) => c.to_timestamps(),
            SamplingKey::List(l) => l.as_slice().to_vec(),
        }
    }

    /// `[t_first, t_last]`.
    pub fn domain(&self) -> (Timestamp, Timestamp) {
        match self {
            SamplingKey::Clock(c) => (c.start, c.end()),
            SamplingKey::List(l) => (l.first(), l.last()),
        }
    }

    pub fn start_time(&self) -> Timestamp {
        self.domain().0
    }

    pub fn sample_count(&self) -> u64 {
        match self {
            SamplingKey::Clock(c) => c.count,
            SamplingKey::List(l) => l.len() as u64,
        }
    }

    /// Bit-exact equivalence: clocks compare by identical start/period/count,
    /// lists by identical length and pairwise timestamps. Cross-tag pairs
    /// are never equivalent.
    pub fn equivalent(&self, other: &SamplingKey) -> bool {
        match (self, other) {
            (SamplingKey::Clock(a), SamplingKey::Clock(b)) => a == b,
            (SamplingKey::List(a), SamplingKey::List(b)) => a == b,
            _ => false,
        }
    }
}

impl TryFrom<WireSamplingKey> for SamplingKey {
    type Error = String;
    fn try_from(w: WireSamplingKey) -> Result<Self, String> {
        match w {
            WireSamplingKey::Clock(c) => {
                UniformClock::try_from(c).map(SamplingKey::Clock).map_err(|e| e.to_string())
            }
            WireSamplingKey::List(l) => {
                let timestamps = l.timestamps.into_iter().map(Timestamp::from).collect();
                TimestampList::new(timestamps).map(SamplingKey::List).map_err(|e| e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_clock_yields_exactly_count_timestamps_with_step() {
        let c = UniformClock::new(Timestamp::new(1000, 0), 1_000_000_000, 5).unwrap();
        let ts = c.to_timestamps();
        assert_eq!(ts.len(), 5);
        for (i, t) in ts.iter().enumerate() {
            assert_eq!(*t, Timestamp::new(1000 + i as i64, 0));
        }
    }

    #[test]
    fn uniform_clock_rejects_zero_count_and_zero_period() {
        assert_eq!(
            UniformClock::new(Timestamp::new(0, 0), 1, 0),
            Err(ClockError::ZeroCount)
        );
        assert_eq!(
            UniformClock::new(Timestamp::new(0, 0), 0, 1),
            Err(ClockError::ZeroPeriod)
        );
    }

    #[test]
    fn timestamp_list_rejects_non_increasing() {
        let ts = vec![Timestamp::new(1, 0), Timestamp::new(1, 0)];
        assert_eq!(
            TimestampList::new(ts),
            Err(TimestampListError::NotStrictlyIncreasing)
        );
    }

    #[test]
    fn timestamp_round_trips_through_nanos_within_range() {
        let t = Timestamp::new(123_456, 789_000_000);
        assert_eq!(Timestamp::from_nanos(t.to_nanos()), t);
    }

    #[test]
    fn timestamp_to_nanos_saturates_instead_of_overflowing() {
        let t = Timestamp::new(i64::MAX, 999_999_999);
        // must not panic
        let _ = t.to_nanos();
    }

    #[test]
    fn clock_and_list_keys_are_never_equivalent() {
        let clock = SamplingKey::Clock(UniformClock::new(Timestamp::new(0, 0), 1, 1).unwrap());
        let list = SamplingKey::List(TimestampList::new(vec![Timestamp::new(0, 0)]).unwrap());
        assert!(!clock.equivalent(&list));
    }

    #[test]
    fn single_sample_clock_has_one_timestamp_at_start() {
        let c = UniformClock::new(Timestamp::new(5, 0), 1, 1).unwrap();
        assert_eq!(c.to_timestamps(), vec![Timestamp::new(5, 0)]);
        assert_eq!(c.end(), Timestamp::new(5, 0));
    }

    proptest::proptest! {
        #[test]
        fn to_nanos_from_nanos_round_trips_within_i64_range(
            secs in -1_000_000_000_i64..1_000_000_000,
            nanos in 0_u32..1_000_000_000,
        ) {
            let t = Timestamp::new(secs, nanos);
            proptest::prop_assert_eq!(Timestamp::from_nanos(t.to_nanos()), t);
        }

        #[test]
        fn to_nanos_never_panics_across_the_full_i64_secs_range(secs in proptest::prelude::any::<i64>(), nanos in 0_u32..1_000_000_000) {
            let t = Timestamp::new(secs, nanos);
            let _ = t.to_nanos();
        }
    }

    #[test]
    fn list_domain_spans_first_to_last() {
        let list = TimestampList::new(vec![
            Timestamp::new(1000, 0),
            Timestamp::new(1000, 250_000_000),
            Timestamp::new(1000, 600_000_000),
        ])
        .unwrap();
        let key = SamplingKey::List(list);
        assert_eq!(
            key.domain(),
            (Timestamp::new(1000, 0), Timestamp::new(1000, 600_000_000))
        );
        assert_eq!(key.sample_count(), 3);
    }
}
