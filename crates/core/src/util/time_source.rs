use std::time::Instant;

#[cfg(any(test, feature = "testing"))]
use std::{sync::Arc, time::Duration};

pub trait TimeSource {
    fn now(&self) -> Instant;
}

/// A simple time source that returns the current time using `Instant::now()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstantTimeSrc(());

impl InstantTimeSrc {
    pub fn new() -> Self {
        InstantTimeSrc(())
    }
}

impl TimeSource for InstantTimeSrc {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock for tests.
///
/// Clones share the same instant, so a test can hand one copy to a tracker and
/// keep another to advance time from the outside.
#[cfg(any(test, feature = "testing"))]
#[derive(Clone, Debug)]
pub struct MockTimeSource {
    current_instant: Arc<parking_lot::Mutex<Instant>>,
}

#[cfg(any(test, feature = "testing"))]
impl MockTimeSource {
    pub fn new(start_instant: Instant) -> Self {
        MockTimeSource {
            current_instant: Arc::new(parking_lot::Mutex::new(start_instant)),
        }
    }

    pub fn advance_time(&self, duration: Duration) {
        *self.current_instant.lock() += duration;
    }
}

#[cfg(any(test, feature = "testing"))]
impl TimeSource for MockTimeSource {
    fn now(&self) -> Instant {
        *self.current_instant.lock()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_mock_clones_share_time() {
        let start = Instant::now();
        let clock = MockTimeSource::new(start);
        let observer = clock.clone();

        clock.advance_time(Duration::from_millis(250));

        assert_eq!(observer.now(), start + Duration::from_millis(250));
    }

    #[test]
    fn test_instant_source_is_monotonic() {
        let src = InstantTimeSrc::new();
        let first = src.now();
        let second = src.now();
        assert!(second >= first);
    }
}
