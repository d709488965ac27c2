//! Bounded-memory sampling strategies behind the delay histogram.
//!
//! A reservoir keeps a fixed number of samples out of an unbounded stream so
//! percentiles can be estimated without retaining every value. Two strategies
//! are provided:
//!
//! - [`UniformReservoir`]: every value seen so far has the same chance of
//!   being retained (Vitter's Algorithm R). Percentiles describe the whole run.
//! - [`SlidingWindowReservoir`]: only the most recent `N` values are retained.
//!   Percentiles describe the recent past.
//!
//! Both are **wait-free** for writers: a value is stored with one
//! `fetch_add` on a cursor and one atomic store into a slot. Samples are
//! packed into a single `u64` so a reader never observes half a write.
//!
//! # Slot Layout
//! - **Bits 63-48 (16 bits):** occupancy / generation tag. `0` means empty.
//! - **Bits 47-0 (48 bits):** value, offset by $2^{47}$ so negative delays fit.
use crossbeam::utils::CachePadded;
use std::fmt::Debug;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::atomic::{AtomicU64, AtomicUsize};

/// Default number of samples retained per reservoir.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

const TAG_SHIFT: u32 = 48;
const VALUE_MASK: u64 = (1 << TAG_SHIFT) - 1;
const VALUE_BIAS: i64 = 1 << (TAG_SHIFT - 1);
/// Number of distinct non-zero generation tags.
const TAG_SPAN: usize = 0xFFFF;

/// Weight of a sample standing for exactly one observation.
///
/// Weights are fixed point so that fractional `seen / retained` ratios of
/// different shards stay comparable once merged.
pub const WEIGHT_SCALE: u64 = 1024;

/// A retained sample and the number of observations it stands for, in
/// units of `1 / WEIGHT_SCALE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightedSample {
    pub value: i64,
    pub weight: u64,
}

/// A concurrent, bounded sampling strategy.
pub trait Reservoir: Send + Sync + Debug {
    /// Offers a value to the reservoir. Never blocks.
    fn update(&self, value: i64);

    /// Appends every retained sample to `samples`.
    ///
    /// The read is not linearizable with concurrent updates; a sample being
    /// written while the reservoir is read may or may not be included.
    fn write_samples(&self, samples: &mut Vec<WeightedSample>);

    /// Maximum number of samples retained.
    fn capacity(&self) -> usize;
}

/// Selects and sizes the [`Reservoir`] used by each histogram shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservoirConfig {
    /// Uniform sample over the whole stream.
    Uniform { size: usize },
    /// The most recent `size` values.
    SlidingWindow { size: usize },
}

impl ReservoirConfig {
    /// Creates a fresh reservoir described by this configuration.
    #[must_use]
    pub fn build(&self) -> Box<dyn Reservoir> {
        match *self {
            Self::Uniform { size } => Box::new(UniformReservoir::new(size)),
            Self::SlidingWindow { size } => Box::new(SlidingWindowReservoir::new(size)),
        }
    }
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self::Uniform {
            size: DEFAULT_RESERVOIR_SIZE,
        }
    }
}

/// Clamps `value` into the 48-bit window and offsets it to be non-negative.
#[inline]
fn encode(value: i64) -> u64 {
    (value.clamp(-VALUE_BIAS, VALUE_BIAS - 1) + VALUE_BIAS) as u64
}

#[inline]
fn decode(packed: u64) -> i64 {
    (packed & VALUE_MASK) as i64 - VALUE_BIAS
}

#[inline]
fn tag(packed: u64) -> u64 {
    packed >> TAG_SHIFT
}

/// Lock-free uniform reservoir (Vitter's Algorithm R).
///
/// The first `capacity` values fill the slots in order. The `n`-th value after
/// that replaces a random slot with probability `capacity / n`, which keeps
/// every value seen so far equally likely to be retained.
///
/// # Concurrency
/// The stream position is claimed with a single `fetch_add` and the slot is
/// written with a single store, so concurrent writers never wait on each
/// other. Two writers that draw the same slot race and one of them wins,
/// which does not bias the sample.
#[derive(Debug)]
pub struct UniformReservoir {
    slots: Box<[AtomicU64]>,
    seen: CachePadded<AtomicU64>,
}

impl UniformReservoir {
    /// Creates an empty reservoir holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity.max(1))
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            seen: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Number of values offered so far.
    #[inline]
    pub fn seen(&self) -> u64 {
        self.seen.load(Relaxed)
    }
}

impl Reservoir for UniformReservoir {
    #[inline]
    fn update(&self, value: i64) {
        let position = self.seen.fetch_add(1, Relaxed);
        let capacity = self.slots.len() as u64;
        let packed = (1 << TAG_SHIFT) | encode(value);

        if position < capacity {
            self.slots[position as usize].store(packed, Relaxed);
            return;
        }

        let index = fastrand::u64(..=position);
        if index < capacity {
            self.slots[index as usize].store(packed, Relaxed);
        }
    }

    fn write_samples(&self, samples: &mut Vec<WeightedSample>) {
        let start = samples.len();
        let seen = self.seen();

        for slot in self.slots.iter() {
            let packed = slot.load(Relaxed);
            if tag(packed) != 0 {
                samples.push(WeightedSample {
                    value: decode(packed),
                    weight: WEIGHT_SCALE,
                });
            }
        }

        let retained = (samples.len() - start) as u64;
        if retained == 0 || seen <= retained {
            return;
        }

        // Each retained value stands in for seen / retained observations, so
        // shards that saw more traffic weigh more once merged.
        let weight = (u128::from(seen) * u128::from(WEIGHT_SCALE) + u128::from(retained / 2))
            / u128::from(retained);
        let weight = u64::try_from(weight).unwrap_or(u64::MAX);
        for sample in &mut samples[start..] {
            sample.weight = weight;
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// A wait-free, lossy ring buffer retaining the most recent values.
///
/// Once the ring is full the `head` index wraps around and new values
/// overwrite the oldest ones. Every slot is tagged with the generation (lap)
/// it was written in, so a reader can tell which slots belong to the current
/// window and which hold ghost values from an earlier lap.
///
/// Indexing uses `head & mask`, which requires a power-of-two capacity; the
/// requested capacity is rounded up.
#[derive(Debug)]
pub struct SlidingWindowReservoir {
    samples: Box<[AtomicU64]>,
    /// Monotonic write cursor, padded away from the samples.
    head: CachePadded<AtomicUsize>,
    mask: usize,
}

impl SlidingWindowReservoir {
    /// Creates a ring with a capacity rounded up to a power of two.
    pub fn new(capacity: usize) -> Self {
        let len = capacity.max(1).next_power_of_two();
        let samples = (0..len)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            samples,
            head: CachePadded::new(AtomicUsize::new(0)),
            mask: len - 1,
        }
    }

    /// Tag written into slots during `lap`; never zero.
    #[inline]
    fn generation(&self, lap: usize) -> u64 {
        ((lap % TAG_SPAN) + 1) as u64
    }
}

impl Reservoir for SlidingWindowReservoir {
    #[inline]
    fn update(&self, value: i64) {
        let head = self.head.fetch_add(1, Relaxed);
        let index = head & self.mask;
        let lap = head / self.samples.len();

        let packed = (self.generation(lap) << TAG_SHIFT) | encode(value);
        self.samples[index].store(packed, Relaxed);
    }

    fn write_samples(&self, samples: &mut Vec<WeightedSample>) {
        let head = self.head.load(Relaxed);
        let cursor = head & self.mask;
        let lap = head / self.samples.len();

        for (index, slot) in self.samples.iter().enumerate() {
            // Slots behind the cursor were written during the current lap,
            // the rest during the previous one.
            let expected = if index < cursor {
                self.generation(lap)
            } else {
                match lap.checked_sub(1) {
                    Some(previous) => self.generation(previous),
                    None => continue,
                }
            };

            let packed = slot.load(Relaxed);
            if tag(packed) == expected {
                samples.push(WeightedSample {
                    value: decode(packed),
                    weight: WEIGHT_SCALE,
                });
            }
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn values(reservoir: &dyn Reservoir) -> Vec<i64> {
        let mut samples = Vec::new();
        reservoir.write_samples(&mut samples);
        let mut values = samples.iter().map(|s| s.value).collect::<Vec<_>>();
        values.sort_unstable();
        values
    }

    #[test]
    fn test_encoding_keeps_sign() {
        for value in [-5, -1, 0, 1, 450, 1 << 40] {
            assert_eq!(decode(encode(value)), value);
        }
        assert_eq!(decode(encode(i64::MAX)), VALUE_BIAS - 1);
        assert_eq!(decode(encode(i64::MIN)), -VALUE_BIAS);
    }

    #[test]
    fn test_uniform_keeps_everything_below_capacity() {
        let reservoir = UniformReservoir::new(16);
        for value in [3, 0, -2, 7] {
            reservoir.update(value);
        }

        assert_eq!(values(&reservoir), vec![-2, 0, 3, 7]);
    }

    #[test]
    fn test_uniform_is_bounded_and_weighted() {
        let reservoir = UniformReservoir::new(100);
        for value in 0..10_000 {
            reservoir.update(value);
        }

        let mut samples = Vec::new();
        reservoir.write_samples(&mut samples);

        assert_eq!(samples.len(), 100);
        assert!(samples.iter().all(|s| s.weight == 100 * WEIGHT_SCALE));
        assert!(samples.iter().all(|s| (0..10_000).contains(&s.value)));
    }

    #[test]
    fn test_uniform_samples_across_the_whole_stream() {
        let reservoir = UniformReservoir::new(1000);
        for value in 0..100_000 {
            reservoir.update(value);
        }

        let retained = values(&reservoir);
        let early = retained.iter().filter(|v| **v < 50_000).count();

        // A uniform sample keeps roughly half of its values from each half.
        assert!((350..=650).contains(&early), "early = {early}");
    }

    #[test]
    fn test_uniform_weight_keeps_fractional_ratio() {
        let reservoir = UniformReservoir::new(1028);
        for _ in 0..1542 {
            reservoir.update(100);
        }

        let mut samples = Vec::new();
        reservoir.write_samples(&mut samples);

        // 1542 / 1028 is exactly 1.5
        assert_eq!(samples.len(), 1028);
        assert!(samples.iter().all(|s| s.weight == WEIGHT_SCALE * 3 / 2));
    }

    #[test]
    fn test_sliding_window_keeps_recent_values() {
        let reservoir = SlidingWindowReservoir::new(4);
        for value in 1..=10 {
            reservoir.update(value);
        }

        assert_eq!(values(&reservoir), vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_sliding_window_partial_first_lap() {
        let reservoir = SlidingWindowReservoir::new(8);
        reservoir.update(0);
        reservoir.update(-3);

        assert_eq!(reservoir.capacity(), 8);
        assert_eq!(values(&reservoir), vec![-3, 0]);
    }

    #[test]
    fn test_concurrent_updates_stay_bounded() {
        let reservoir = UniformReservoir::new(64);

        thread::scope(|s| {
            for t in 0..8 {
                let reservoir = &reservoir;
                s.spawn(move || {
                    for i in 0..1000 {
                        reservoir.update(t * 1000 + i);
                    }
                });
            }
        });

        assert_eq!(reservoir.seen(), 8000);
        assert_eq!(values(&reservoir).len(), 64);
    }

    #[test]
    fn test_config_builds_requested_strategy() {
        let uniform = ReservoirConfig::Uniform { size: 10 }.build();
        let window = ReservoirConfig::SlidingWindow { size: 10 }.build();

        assert_eq!(uniform.capacity(), 10);
        assert_eq!(window.capacity(), 16);
    }
}
