//! # Sharded Delay Histogram
//!
//! A lock-free, sharded histogram for delay samples recorded concurrently by
//! eviction listeners running on several event threads.
//!
//! ## Design Principles
//! 1. **Contention Mitigation:** Uses `THREAD_ID` based sharding so that
//!    concurrent recorders likely hit different cache lines.
//! 2. **False Sharing Prevention:** Every shard is wrapped in [`CachePadded`].
//! 3. **Non-Blocking Writes:** Counters use `Relaxed` atomics and reservoirs are
//!    wait-free, so recording never stalls the notification threads.
//! 4. **Exact Moments, Sampled Percentiles:** count, min, max, mean and
//!    standard deviation are computed over every sample; percentiles are
//!    estimated from bounded [`Reservoir`]s.
use crate::config::HistogramConfig;
use crate::reservoir::{Reservoir, WeightedSample};
use crossbeam::utils::CachePadded;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    /// Each thread is assigned a unique ID on its first record call to
    /// determine its shard affinity.
    static THREAD_ID: usize = NEXT_ID.fetch_add(1, Relaxed);
}

/// Computes the shard index for the current thread.
///
/// Uses a bitwise AND mask, requiring `shards` to be a power of two.
#[inline]
fn get_shard_index(shards: usize) -> usize {
    let thread_id = THREAD_ID.with(|id| *id);
    let mask = shards - 1;
    thread_id & mask
}

/// Thread-safe aggregator of delay samples.
///
/// `Histogram` is shared behind an `Arc` between the eviction observer, which
/// records into it from the grid's event threads, and the reporter, which
/// snapshots it on a timer. All methods take `&self`.
///
/// # Operational Profile
/// - **Wait-Free Writes:** [`record`](Self::record) is $O(1)$ and never blocks.
/// - **Eventually Consistent Snapshots:** [`snapshot`](Self::snapshot) reads
///   the shards one after another without a global lock, so a snapshot taken
///   during heavy recording may not correspond to a single instant.
#[derive(Debug)]
pub struct Histogram {
    shards: Vec<CachePadded<HistogramShard>>,
    config: HistogramConfig,
}

impl Histogram {
    /// Initializes a histogram with sharded storage.
    pub fn new(config: HistogramConfig) -> Self {
        let shards = (0..config.shards())
            .map(|_| CachePadded::new(HistogramShard::new(&config)))
            .collect::<Vec<_>>();

        Self { shards, config }
    }

    /// Records one sample into the current thread's shard.
    ///
    /// Negative values are kept as they are and counted separately in
    /// [`Snapshot::negative_count`].
    #[inline]
    pub fn record(&self, value: i64) {
        let shard_index = get_shard_index(self.config.shards());
        self.shards[shard_index].record(value);
    }

    /// Total number of samples recorded so far.
    pub fn count(&self) -> u64 {
        self.shards
            .iter()
            .map(|shard| shard.count.load(Relaxed))
            .fold(0u64, u64::saturating_add)
    }

    /// Aggregates every shard into a [`Snapshot`].
    ///
    /// # Performance
    /// $O(S + R)$ where $S$ is the shard count and $R$ the total reservoir
    /// capacity. Meant to be called from the reporter, not from a hot path.
    pub fn snapshot(&self) -> Snapshot {
        let mut count = 0u64;
        let mut sum = 0i64;
        let mut sum_of_squares = 0u64;
        let mut negative_count = 0u64;
        let mut min = i64::MAX;
        let mut max = i64::MIN;
        let mut samples = Vec::with_capacity(self.shards.len() * self.reservoir_capacity());

        for shard in &self.shards {
            count = count.saturating_add(shard.count.load(Relaxed));
            sum = sum.saturating_add(shard.sum.load(Relaxed));
            sum_of_squares = sum_of_squares.saturating_add(shard.sum_of_squares.load(Relaxed));
            negative_count = negative_count.saturating_add(shard.negative_count.load(Relaxed));
            min = min.min(shard.min.load(Relaxed));
            max = max.max(shard.max.load(Relaxed));

            shard.reservoir.write_samples(&mut samples);
        }

        if count == 0 || min > max {
            return Snapshot::default();
        }

        let n = count as f64;
        let mean = sum as f64 / n;
        let stddev = if count > 1 {
            let variance = (sum_of_squares as f64 - (sum as f64 * sum as f64) / n) / (n - 1.0);
            variance.max(0.0).sqrt()
        } else {
            0.0
        };

        Snapshot {
            count,
            min,
            max,
            mean,
            stddev,
            negative_count,
            percentiles: estimate_percentiles(&samples, min, max),
        }
    }

    fn reservoir_capacity(&self) -> usize {
        self.shards
            .first()
            .map(|shard| shard.reservoir.capacity())
            .unwrap_or_default()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Histogram::new(HistogramConfig::default())
    }
}

/// Percentiles reported for the delay distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Percentile {
    /// The median.
    P50,
    P75,
    P95,
    P98,
    P99,
    /// The 99.9th percentile (extreme tail).
    P999,
}

impl Percentile {
    /// Every percentile in ascending order.
    pub const ALL: [Percentile; 6] = [
        Self::P50,
        Self::P75,
        Self::P95,
        Self::P98,
        Self::P99,
        Self::P999,
    ];

    /// Returns the quantile (0.0 - 1.0) required by HdrHistogram.
    pub fn as_quantile(&self) -> f64 {
        match self {
            Self::P50 => 0.50,
            Self::P75 => 0.75,
            Self::P95 => 0.95,
            Self::P98 => 0.98,
            Self::P99 => 0.99,
            Self::P999 => 0.999,
        }
    }

    #[inline]
    fn index(&self) -> usize {
        *self as usize
    }
}

/// Estimates every [`Percentile`] from reservoir samples.
///
/// Samples are shifted by their minimum before being fed to HdrHistogram so
/// that negative delays are supported, and every estimate is clamped into
/// `[min, max]` of the exact statistics. With three significant figures,
/// values below 2048 are recorded without any bucketing error.
fn estimate_percentiles(samples: &[WeightedSample], min: i64, max: i64) -> [f64; 6] {
    let Some(base) = samples.iter().map(|sample| sample.value).min() else {
        return [min as f64; 6];
    };

    let mut histogram =
        hdrhistogram::Histogram::<u64>::new(3).expect("three significant figures are supported");

    for sample in samples {
        let _ = histogram.record_n(sample.value.abs_diff(base), sample.weight);
    }

    Percentile::ALL.map(|percentile| {
        let offset = histogram.value_at_quantile(percentile.as_quantile());
        let value = base.saturating_add_unsigned(offset);
        value.clamp(min, max) as f64
    })
}

/// A read-only, point-in-time view of a [`Histogram`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    count: u64,
    min: i64,
    max: i64,
    mean: f64,
    stddev: f64,
    negative_count: u64,
    percentiles: [f64; 6],
}

impl Snapshot {
    /// Number of samples recorded.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Smallest sample, `0` when empty.
    #[inline]
    pub fn min(&self) -> i64 {
        self.min
    }

    /// Largest sample, `0` when empty.
    #[inline]
    pub fn max(&self) -> i64 {
        self.max
    }

    /// Arithmetic mean of every sample.
    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample standard deviation, `0.0` below two samples.
    #[inline]
    pub fn stddev(&self) -> f64 {
        self.stddev
    }

    /// Number of samples below zero, i.e. evictions observed before the
    /// expected expiry.
    #[inline]
    pub fn negative_count(&self) -> u64 {
        self.negative_count
    }

    /// Shorthand for [`Percentile::P50`].
    #[inline]
    pub fn median(&self) -> f64 {
        self.percentile(Percentile::P50)
    }

    /// Returns the estimate for `percentile`, `0.0` when empty.
    #[inline]
    pub fn percentile(&self, percentile: Percentile) -> f64 {
        self.percentiles[percentile.index()]
    }
}

impl From<&Histogram> for Snapshot {
    fn from(histogram: &Histogram) -> Self {
        histogram.snapshot()
    }
}

/// Internal container for a single shard's statistics.
#[derive(Debug)]
struct HistogramShard {
    count: CachePadded<AtomicU64>,
    sum: AtomicI64,
    sum_of_squares: AtomicU64,
    negative_count: AtomicU64,
    min: AtomicI64,
    max: AtomicI64,
    reservoir: Box<dyn Reservoir>,
}

impl HistogramShard {
    fn new(config: &HistogramConfig) -> Self {
        Self {
            count: CachePadded::new(AtomicU64::new(0)),
            sum: AtomicI64::new(0),
            sum_of_squares: AtomicU64::new(0),
            negative_count: AtomicU64::new(0),
            min: AtomicI64::new(i64::MAX),
            max: AtomicI64::new(i64::MIN),
            reservoir: config.reservoir().build(),
        }
    }

    #[inline]
    fn record(&self, value: i64) {
        self.sum.fetch_add(value, Relaxed);
        self.sum_of_squares
            .fetch_add(value.unsigned_abs().saturating_mul(value.unsigned_abs()), Relaxed);
        self.min.fetch_min(value, Relaxed);
        self.max.fetch_max(value, Relaxed);
        if value < 0 {
            self.negative_count.fetch_add(1, Relaxed);
        }
        self.reservoir.update(value);
        self.count.fetch_add(1, Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservoir::{ReservoirConfig, UniformReservoir, WEIGHT_SCALE};
    use std::sync::Barrier;
    use std::thread;

    fn assert_monotonic(snapshot: &Snapshot) {
        let values = Percentile::ALL.map(|p| snapshot.percentile(p));
        for pair in values.windows(2) {
            assert!(pair[0] <= pair[1], "{values:?} is not monotonic");
        }
        assert!(values[5] <= snapshot.max() as f64);
        assert!(values[0] >= snapshot.min() as f64);
    }

    /// Ensures that no update is lost when many threads record at once.
    #[test]
    fn test_multithreaded_count() {
        let histogram = Histogram::default();
        let num_threads = 8;
        let barrier = Barrier::new(num_threads);

        thread::scope(|s| {
            for t in 0..num_threads {
                let histogram = &histogram;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    for i in 0..1000 {
                        histogram.record((t * 1000 + i) as i64 % 500);
                    }
                });
            }
        });

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 8000);
        assert_eq!(histogram.count(), 8000);
        assert_eq!(snapshot.min(), 0);
        assert_eq!(snapshot.max(), 499);
        assert_monotonic(&snapshot);
    }

    #[test]
    fn test_single_sample() {
        let histogram = Histogram::default();
        histogram.record(450);

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 1);
        assert_eq!(snapshot.min(), 450);
        assert_eq!(snapshot.max(), 450);
        assert_eq!(snapshot.mean(), 450.0);
        assert_eq!(snapshot.stddev(), 0.0);
        for percentile in Percentile::ALL {
            assert_eq!(snapshot.percentile(percentile), 450.0);
        }
    }

    #[test]
    fn test_moments() {
        let histogram = Histogram::new(HistogramConfig::new(1, ReservoirConfig::default()));
        for value in [2, 4, 4, 4, 5, 5, 7, 9] {
            histogram.record(value);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.mean(), 5.0);
        // sample variance of the set is 32 / 7
        assert!((snapshot.stddev() - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_logic() {
        let histogram = Histogram::new(HistogramConfig::new(1, ReservoirConfig::default()));
        for value in 1..=100 {
            histogram.record(value);
        }

        let snapshot = histogram.snapshot();
        assert!((49.0..=51.0).contains(&snapshot.median()));
        assert!((74.0..=76.0).contains(&snapshot.percentile(Percentile::P75)));
        assert!((98.0..=100.0).contains(&snapshot.percentile(Percentile::P99)));
        assert_monotonic(&snapshot);
    }

    #[test]
    fn test_percentiles_beyond_reservoir_capacity() {
        let histogram = Histogram::new(HistogramConfig::new(
            1,
            ReservoirConfig::Uniform { size: 1028 },
        ));
        for value in 0..100_000 {
            histogram.record(value % 1000);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 100_000);
        // uniform reservoir error stays within a few percent of the range
        assert!((430.0..=570.0).contains(&snapshot.median()), "{}", snapshot.median());
        assert!(snapshot.percentile(Percentile::P95) >= 900.0);
        assert_monotonic(&snapshot);
    }

    /// Shards with unequal traffic keep their exact share once merged.
    #[test]
    fn test_merge_of_unequally_loaded_shards() {
        let busy = UniformReservoir::new(1028);
        let quiet = UniformReservoir::new(1028);
        // 38.49 and 1.5 observations per retained sample
        for _ in 0..39_568 {
            busy.update(0);
        }
        for _ in 0..1_542 {
            quiet.update(100);
        }

        let mut samples = Vec::new();
        busy.write_samples(&mut samples);
        quiet.write_samples(&mut samples);

        let total = samples.iter().map(|s| s.weight).sum::<u64>();
        let zeros = samples
            .iter()
            .filter(|s| s.value == 0)
            .map(|s| s.weight)
            .sum::<u64>();
        let share = zeros as f64 / total as f64;
        let exact = 39_568.0 / (39_568.0 + 1_542.0);
        assert!((share - exact).abs() < 1e-4, "share {share}, exact {exact}");
        assert_eq!(total.div_ceil(WEIGHT_SCALE), 39_568 + 1_542);

        let percentiles = estimate_percentiles(&samples, 0, 100);
        // 96.25% of the observations are zero
        assert_eq!(percentiles[Percentile::P95.index()], 0.0);
        assert_eq!(percentiles[Percentile::P99.index()], 100.0);
    }

    #[test]
    fn test_negative_samples_are_kept() {
        let histogram = Histogram::default();
        histogram.record(-2);
        histogram.record(0);
        histogram.record(3);

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.negative_count(), 1);
        assert_eq!(snapshot.min(), -2);
        assert_eq!(snapshot.max(), 3);
        assert!(snapshot.median() >= -2.0 && snapshot.median() <= 3.0);
        assert_monotonic(&snapshot);
    }

    #[test]
    fn test_sliding_window_percentiles() {
        let histogram = Histogram::new(HistogramConfig::new(
            1,
            ReservoirConfig::SlidingWindow { size: 16 },
        ));
        for value in 0..1000 {
            histogram.record(value);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 1000);
        assert_eq!(snapshot.min(), 0);
        // only the 16 most recent values feed the percentiles
        assert!(snapshot.median() >= 984.0);
        assert_monotonic(&snapshot);
    }

    /// Taking a snapshot when nothing was recorded must not panic or yield NaN.
    #[test]
    fn test_empty_snapshot_safety() {
        let snapshot = Histogram::default().snapshot();

        assert_eq!(snapshot.count(), 0);
        assert_eq!(snapshot.min(), 0);
        assert_eq!(snapshot.max(), 0);
        assert_eq!(snapshot.mean(), 0.0);
        assert_eq!(snapshot.stddev(), 0.0);
        assert_eq!(snapshot.median(), 0.0);
    }

    /// Snapshots are independent views and do not reset the histogram.
    #[test]
    fn test_snapshot_independence() {
        let histogram = Histogram::default();

        histogram.record(1);
        let first = histogram.snapshot();

        histogram.record(5);
        let second = Snapshot::from(&histogram);

        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 2);
        assert_eq!(second.max(), 5);
    }
}
