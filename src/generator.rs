//! Load generation across TTL buckets.
use crate::config::LoadConfig;
use crate::core::map::TimerMap;
use crate::time::{EpochClock, SystemClock};
use std::time::{Duration, Instant};
use tracing::info;

/// Builds the key of the `index`-th entry of the `ttl` bucket.
///
/// The bucket and the index are separated by `:`, so no two (ttl, index)
/// pairs share a key (`a1:10` and `a11:0` differ).
#[inline]
pub fn entry_key(ttl: u64, index: usize) -> String {
    format!("a{ttl}:{index}")
}

/// Epoch second at which an entry inserted at `now` with `ttl` should expire.
#[inline]
pub fn expected_expiry(now: i64, ttl: u64) -> i64 {
    now.saturating_add_unsigned(ttl)
}

/// Fills a [`TimerMap`] with entries whose value is their own expected expiry.
#[derive(Debug, Clone)]
pub struct LoadGenerator<C = SystemClock> {
    config: LoadConfig,
    clock: C,
}

impl LoadGenerator<SystemClock> {
    pub fn new(config: LoadConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C> LoadGenerator<C>
where
    C: EpochClock,
{
    pub fn with_clock(config: LoadConfig, clock: C) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Submits every (ttl, index) entry and returns how many were submitted.
    ///
    /// Puts are fire-and-forget: nothing is awaited, so the generator's own
    /// pace does not leak into the measured delays. The clock is read again
    /// for every entry because submission of a bucket may span seconds.
    pub fn run<M>(&self, map: &M) -> usize
    where
        M: TimerMap<String, i64>,
    {
        let started = Instant::now();
        let mut submitted = 0;

        for ttl in self.config.ttl_seconds.clone() {
            for index in 0..self.config.repetitions {
                let now = self.clock.now_epoch_seconds();
                map.put_with_expiry(
                    entry_key(ttl, index),
                    expected_expiry(now, ttl),
                    Duration::from_secs(ttl),
                );
                submitted += 1;
            }
        }

        info!(submitted, elapsed = ?started.elapsed(), "load generation finished");
        submitted
    }
}
