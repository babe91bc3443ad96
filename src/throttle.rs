use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Spaces request start times at least `min_interval` apart.
///
/// Each caller reserves the next free slot under the lock and then sleeps
/// outside it, so concurrent callers queue up on start times while their
/// network I/O still overlaps.
#[derive(Debug)]
pub(crate) struct Throttle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Waits until this caller may start and returns the granted start time.
    pub(crate) async fn acquire(&self) -> Instant {
        let start = self.reserve(Instant::now());
        let wait = start.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            #[cfg(feature = "tracing")]
            tracing::debug!(wait_ms = wait.as_millis() as u64, "throttling request");

            sleep_until(start).await;
        }
        start
    }

    fn reserve(&self, now: Instant) -> Instant {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let start = match *last {
            Some(previous) => now.max(previous + self.min_interval),
            None => now,
        };
        *last = Some(start);
        start
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::Instant;

    use super::Throttle;

    #[tokio::test(start_paused = true)]
    async fn first_request_is_not_delayed() {
        let throttle = Throttle::new(Duration::from_millis(500));
        let before = Instant::now();
        let start = throttle.acquire().await;
        assert_eq!(start, before);
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_requests_are_spaced() {
        let throttle = Throttle::new(Duration::from_millis(500));
        let first = throttle.acquire().await;
        let second = throttle.acquire().await;
        let third = throttle.acquire().await;

        assert_eq!(second - first, Duration::from_millis(500));
        assert_eq!(third - second, Duration::from_millis(500));
        assert!(Instant::now() >= third);
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_once_interval_has_passed() {
        let throttle = Throttle::new(Duration::from_millis(100));
        throttle.acquire().await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        let before = Instant::now();
        let start = throttle.acquire().await;
        assert_eq!(start, before);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_get_distinct_slots() {
        let throttle = Arc::new(Throttle::new(Duration::from_millis(200)));
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let throttle = Arc::clone(&throttle);
                tokio::spawn(async move { throttle.acquire().await })
            })
            .collect();

        let mut starts = Vec::new();
        for task in tasks {
            starts.push(task.await.expect("throttle task must not panic"));
        }
        starts.sort();

        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_waits() {
        let throttle = Throttle::new(Duration::ZERO);
        let before = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;
        assert_eq!(Instant::now(), before);
    }
}
