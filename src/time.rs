//! Wall-clock sources in whole epoch seconds.

use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering::Relaxed;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current time in whole seconds since the Unix epoch.
pub trait EpochClock: Send + Sync {
    fn now_epoch_seconds(&self) -> i64;
}

/// Reads the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl EpochClock for SystemClock {
    #[inline]
    fn now_epoch_seconds(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_secs() as i64,
            // clock set before 1970
            Err(err) => -(err.duration().as_secs() as i64),
        }
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Relaxed);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Relaxed);
    }
}

impl EpochClock for ManualClock {
    #[inline]
    fn now_epoch_seconds(&self) -> i64 {
        self.now.load(Relaxed)
    }
}

impl<C> EpochClock for Arc<C>
where
    C: EpochClock + ?Sized,
{
    #[inline]
    fn now_epoch_seconds(&self) -> i64 {
        self.as_ref().now_epoch_seconds()
    }
}
