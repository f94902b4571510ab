//! Time source for the guard stores.
//!
//! Production code uses [`SystemClock`]. Tests drive time explicitly with
//! `ManualClock`, available in test builds or with the `test-utils` feature.

use std::fmt::Debug;
use std::time::Instant;

/// Monotonic time source.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-utils"))]
mod manual {
    use super::Clock;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Clock that only moves when told to.
    ///
    /// Clones share the same current time, so a test can hand one clone to a
    /// `RequestPolicy` and keep another to advance time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        current: Arc<Mutex<Instant>>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self::starting_at(Instant::now())
        }

        pub fn starting_at(start: Instant) -> Self {
            Self {
                current: Arc::new(Mutex::new(start)),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut current = self.current.lock().expect("ManualClock mutex poisoned");
            *current += by;
        }

        pub fn advance_ms(&self, ms: u64) {
            self.advance(Duration::from_millis(ms));
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.current.lock().expect("ManualClock mutex poisoned")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_manual_clock_shares_time_across_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let start = clock.now();

        handle.advance_ms(1500);

        assert_eq!(clock.now(), start + Duration::from_millis(1500));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let t1 = clock.now();
        let t2 = clock.now();
        assert!(t2 >= t1);
    }
}
