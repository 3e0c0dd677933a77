//! Minimum-interval pacing for calls into rate-limited collaborators.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Time source used by [`Throttle`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant::now`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Spaces consecutive calls at least `min_interval` apart.
///
/// One instance is shared (via `Arc`) by every caller that must be paced
/// together. Callers queue on the internal lock, so concurrent callers are
/// released one interval apart.
pub struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("min_interval", &self.min_interval)
            .finish_non_exhaustive()
    }
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, Arc::new(SystemClock))
    }

    pub fn with_clock(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
            clock,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until `min_interval` has passed since the previous call.
    ///
    /// Returns how long this call waited.
    pub fn acquire(&self) -> Duration {
        let mut last_call = self
            .last_call
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        let previous = *last_call;
        let wait = previous
            .map(|last| (last + self.min_interval).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);
        if !wait.is_zero() {
            tracing::debug!("throttling call for {:?}", wait);
            self.clock.sleep(wait);
        }
        *last_call = Some(self.clock.now());
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Clock that only moves when told to or when slept on.
    struct FakeClock {
        start: Instant,
        elapsed: Mutex<Duration>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                elapsed: Mutex::new(Duration::ZERO),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        fn advance(&self, by: Duration) {
            *self.elapsed.lock().unwrap() += by;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.start + *self.elapsed.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            self.advance(duration);
        }
    }

    #[test]
    fn first_call_does_not_wait() {
        let clock = Arc::new(FakeClock::new());
        let throttle = Throttle::with_clock(Duration::from_millis(500), clock.clone());
        assert_eq!(throttle.acquire(), Duration::ZERO);
        assert!(clock.sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn back_to_back_calls_wait_out_the_interval() {
        let clock = Arc::new(FakeClock::new());
        let throttle = Throttle::with_clock(Duration::from_millis(500), clock.clone());
        throttle.acquire();
        clock.advance(Duration::from_millis(200));
        assert_eq!(throttle.acquire(), Duration::from_millis(300));
        assert_eq!(throttle.acquire(), Duration::from_millis(500));
        assert_eq!(
            *clock.sleeps.lock().unwrap(),
            vec![Duration::from_millis(300), Duration::from_millis(500)]
        );
    }

    #[test]
    fn idle_time_counts_toward_the_interval() {
        let clock = Arc::new(FakeClock::new());
        let throttle = Throttle::with_clock(Duration::from_secs(1), clock.clone());
        throttle.acquire();
        clock.advance(Duration::from_secs(3));
        assert_eq!(throttle.acquire(), Duration::ZERO);
    }

    #[test]
    fn concurrent_callers_are_serialized() {
        let clock = Arc::new(FakeClock::new());
        let throttle = Arc::new(Throttle::with_clock(Duration::from_millis(100), clock.clone()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let throttle = throttle.clone();
                std::thread::spawn(move || throttle.acquire())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        // Four calls, three of which waited a full interval.
        assert_eq!(*clock.elapsed.lock().unwrap(), Duration::from_millis(300));
    }
}
