//! Wall-clock abstraction used for cache timestamps
//!
//! The cache compares stored timestamps against "now". Production code uses
//! [`SystemClock`]; tests use [`ManualClock`] to step time forward without sleeping.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

/// Source of the current time in epoch milliseconds
pub trait Clock: Debug + Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;

    /// Current time as a UTC timestamp
    fn now(&self) -> DateTime<Utc> {
        millis_to_datetime(self.now_millis())
    }
}

/// Clock backed by the system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock
///
/// Clones share the same underlying instant, so a test can hand one clone to a
/// provider and advance the other.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock frozen at the given epoch milliseconds
    pub fn at(millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(millis)),
        }
    }

    /// Creates a clock frozen at the current system time
    pub fn starting_now() -> Self {
        Self::at(Utc::now().timestamp_millis())
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute instant
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Converts epoch milliseconds to a UTC timestamp, clamping out-of-range values to the epoch
pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_shared_state() {
        let clock = ManualClock::at(1_000);
        let handle = clock.clone();

        handle.advance(Duration::from_secs(2));

        assert_eq!(clock.now_millis(), 3_000);
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::at(0);
        clock.set(42);
        assert_eq!(clock.now_millis(), 42);
    }

    #[test]
    fn test_system_clock_is_close_to_now() {
        let before = Utc::now().timestamp_millis();
        let now = SystemClock.now_millis();
        let after = Utc::now().timestamp_millis();

        assert!(now >= before && now <= after);
    }

    #[test]
    fn test_millis_to_datetime() {
        let dt = millis_to_datetime(1_700_000_000_000);
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }
}
