use crate::core::listener::{EntryEvent, EvictionListener};
use crate::metrics::Histogram;
use crate::time::{EpochClock, SystemClock};
use std::sync::Arc;
use tracing::debug;

/// Turns eviction events into delay samples.
///
/// Every evicted entry carries its expected expiry (epoch seconds) as value.
/// The observer subtracts it from the current time and records the result,
/// in seconds, into the shared [`Histogram`].
///
/// The observer holds no state of its own besides the histogram handle, so
/// it can be invoked from any number of event threads at once.
#[derive(Debug, Clone)]
pub struct DelayObserver<C = SystemClock> {
    histogram: Arc<Histogram>,
    clock: C,
}

impl DelayObserver<SystemClock> {
    pub fn new(histogram: Arc<Histogram>) -> Self {
        Self::with_clock(histogram, SystemClock)
    }
}

impl<C> DelayObserver<C>
where
    C: EpochClock,
{
    pub fn with_clock(histogram: Arc<Histogram>, clock: C) -> Self {
        Self { histogram, clock }
    }

    /// Records the delay of an eviction observed now and returns it.
    ///
    /// A negative delay means the notification arrived before the expected
    /// expiry, e.g. because of clock skew. It is recorded unchanged.
    pub fn observe(&self, expected_expiry: i64) -> i64 {
        let delay = self.clock.now_epoch_seconds() - expected_expiry;
        if delay < 0 {
            debug!(delay, expected_expiry, "eviction observed before expected expiry");
        }

        self.histogram.record(delay);
        delay
    }
}

impl<K, C> EvictionListener<K, i64> for DelayObserver<C>
where
    C: EpochClock,
{
    #[inline]
    fn entry_evicted(&self, event: &EntryEvent<K, i64>) {
        self.observe(*event.old_value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    #[test]
    fn test_delay_is_now_minus_expected_expiry() {
        let histogram = Arc::new(Histogram::default());
        let clock = Arc::new(ManualClock::new(1450));
        let observer = DelayObserver::with_clock(Arc::clone(&histogram), Arc::clone(&clock));

        observer.entry_evicted(&EntryEvent::new(Arc::from("timer"), "a1:0", 1001));

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 1);
        assert_eq!(snapshot.min(), 449);
    }

    #[test]
    fn test_early_eviction_is_recorded_as_negative() {
        let histogram = Arc::new(Histogram::default());
        let observer = DelayObserver::with_clock(Arc::clone(&histogram), ManualClock::new(998));

        assert_eq!(observer.observe(1000), -2);
        assert_eq!(observer.observe(998), 0);

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 2);
        assert_eq!(snapshot.negative_count(), 1);
        assert_eq!(snapshot.min(), -2);
    }

    #[test]
    fn test_concurrent_observations() {
        let histogram = Arc::new(Histogram::default());
        let observer = DelayObserver::with_clock(Arc::clone(&histogram), ManualClock::new(100));

        std::thread::scope(|s| {
            for _ in 0..4 {
                let observer = &observer;
                s.spawn(move || {
                    for expected in 0..250 {
                        observer.observe(expected % 100);
                    }
                });
            }
        });

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 1000);
        assert_eq!(snapshot.min(), 1);
        assert_eq!(snapshot.max(), 100);
    }
}
