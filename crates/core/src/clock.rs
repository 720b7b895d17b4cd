//! Time sources.
//!
//! Sessions never call `Utc::now()` directly; they are handed a [`TimeSource`] at
//! construction so that access-log timestamps are reproducible under test.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

pub trait TimeSource: fmt::Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock that starts at a fixed instant and advances by `step` on
/// every reading.
#[derive(Debug)]
pub struct FixedClock {
    start: DateTime<Utc>,
    step: Duration,
    ticks: AtomicI64,
}

impl FixedClock {
    /// A clock that always reads `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self::stepping(at, Duration::zero())
    }

    pub fn stepping(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            start,
            step,
            ticks: AtomicI64::new(0),
        }
    }
}

impl TimeSource for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        // Readings past i32::MAX steps repeat the last one instead of wrapping.
        let tick = i32::try_from(tick).unwrap_or(i32::MAX);
        let offset = self.step.checked_mul(tick).unwrap_or(Duration::zero());
        self.start.checked_add_signed(offset).unwrap_or(self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        "2024-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_fixed_clock_is_constant() {
        let clock = FixedClock::new(epoch());
        assert_eq!(clock.now(), epoch());
        assert_eq!(clock.now(), epoch());
    }

    #[test]
    fn test_stepping_clock_advances_per_reading() {
        let clock = FixedClock::stepping(epoch(), Duration::seconds(1));
        assert_eq!(clock.now(), epoch());
        assert_eq!(clock.now(), epoch() + Duration::seconds(1));
        assert_eq!(clock.now(), epoch() + Duration::seconds(2));
    }

    #[test]
    fn test_stepping_clock_holds_past_tick_range() {
        let clock = FixedClock::stepping(epoch(), Duration::milliseconds(1));
        clock
            .ticks
            .store(i64::from(i32::MAX), Ordering::Relaxed);
        let last = clock.now();
        assert_eq!(last, epoch() + Duration::milliseconds(i64::from(i32::MAX)));

        assert_eq!(clock.now(), last);
        assert_eq!(clock.now(), last);
    }
}
