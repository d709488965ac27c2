//! Configuration of the probe and of the grid node it runs against.
//!
//! Every `Default` matches the parameters of the reference experiment: TTL
//! buckets of 1 to 10 seconds, 10 000 entries per bucket and a report every
//! five seconds.

use crate::reservoir::ReservoirConfig;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Default name of the map the probe writes to.
pub const DEFAULT_MAP_NAME: &str = "timer";

/// Default number of partitions a map is split into.
pub const DEFAULT_PARTITION_COUNT: usize = 271;

/// Default number of histogram shards.
pub const DEFAULT_SHARDS: usize = 4;

/// Default interval between two console reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Top-level configuration consumed by [`Probe::launch`](crate::Probe::launch).
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Name of the grid map holding the timed entries.
    pub map_name: String,
    /// Grid node parameters.
    pub grid: GridConfig,
    /// Load generation parameters.
    pub load: LoadConfig,
    /// Delay histogram parameters.
    pub histogram: HistogramConfig,
    /// Console reporter parameters.
    pub reporter: ReporterConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            map_name: DEFAULT_MAP_NAME.to_string(),
            grid: GridConfig::default(),
            load: LoadConfig::default(),
            histogram: HistogramConfig::default(),
            reporter: ReporterConfig::default(),
        }
    }
}

/// Parameters of the in-process grid node.
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Number of partitions every map is split into.
    pub partition_count: usize,
    /// Threads applying asynchronous put operations.
    pub operation_threads: usize,
    /// Threads delivering eviction events to listeners.
    pub event_threads: usize,
    /// Period of the expiration sweeper.
    pub sweep_interval: Duration,
    /// Partitions visited by one sweep; the sweeper walks them round robin.
    pub partitions_per_sweep: usize,
    /// Prefix of every thread name spawned by the node.
    pub thread_prefix: String,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            partition_count: DEFAULT_PARTITION_COUNT,
            operation_threads: 4,
            event_threads: 4,
            sweep_interval: Duration::from_secs(1),
            partitions_per_sweep: DEFAULT_PARTITION_COUNT,
            thread_prefix: "grid".to_string(),
        }
    }
}

/// Shape of the generated load.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// TTL buckets in seconds, both ends included.
    pub ttl_seconds: RangeInclusive<u64>,
    /// Entries inserted per TTL bucket.
    pub repetitions: usize,
}

impl LoadConfig {
    /// Total number of entries one run submits.
    pub fn total_entries(&self) -> usize {
        self.ttl_seconds.clone().count() * self.repetitions
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 1..=10,
            repetitions: 10_000,
        }
    }
}

/// Parameters of the sharded delay [`Histogram`](crate::metrics::Histogram).
#[derive(Debug, Clone)]
pub struct HistogramConfig {
    /// Number of shards. Always a power of two.
    pub(crate) shards: usize,
    /// Sampling strategy of every shard.
    pub(crate) reservoir: ReservoirConfig,
}

impl HistogramConfig {
    /// Creates a configuration, rounding `shards` up to the next power of two.
    #[inline]
    pub fn new(shards: usize, reservoir: ReservoirConfig) -> Self {
        Self {
            shards: shards.max(1).next_power_of_two(),
            reservoir,
        }
    }

    /// Returns the power-of-two shard count.
    #[inline]
    pub fn shards(&self) -> usize {
        self.shards
    }

    /// Returns the reservoir strategy.
    #[inline]
    pub fn reservoir(&self) -> &ReservoirConfig {
        &self.reservoir
    }
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS, ReservoirConfig::default())
    }
}

/// Parameters of the console reporter.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Time between two reports.
    pub interval: Duration,
    /// Name printed above the statistics block.
    pub name: String,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REPORT_INTERVAL,
            name: DEFAULT_MAP_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_rounding() {
        let config = HistogramConfig::new(7, ReservoirConfig::default());
        assert_eq!(config.shards(), 8);

        let config = HistogramConfig::new(0, ReservoirConfig::default());
        assert_eq!(config.shards(), 1);
    }

    #[test]
    fn test_default_load_matches_experiment() {
        let load = LoadConfig::default();

        assert_eq!(load.ttl_seconds.clone().count(), 10);
        assert_eq!(load.total_entries(), 100_000);
    }
}
