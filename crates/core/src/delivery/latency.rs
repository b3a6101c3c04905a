use std::time::Duration;

/// Arithmetic mean of duplicate-delivery latency for one (peer, topic) pair.
///
/// Keeps the exact nanosecond sum instead of re-deriving it from the previous
/// mean, so `mean * count` never accumulates truncation error and the result
/// does not depend on the order samples arrive in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunningMean {
    sum_nanos: u128,
    samples: u64,
}

impl RunningMean {
    pub(crate) fn insert(&mut self, sample: Duration) {
        self.sum_nanos += sample.as_nanos();
        self.samples += 1;
    }

    /// Mean of all samples, `Duration::ZERO` before the first one.
    pub fn get(&self) -> Duration {
        if self.samples == 0 {
            return Duration::ZERO;
        }
        let mean = self.sum_nanos / u128::from(self.samples);
        Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX))
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}
