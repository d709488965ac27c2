//! An in-process data grid node with TTL maps and eviction events.
//!
//! The node owns three groups of threads shared by all of its maps:
//!
//! ```text
//! put_with_expiry ──▶ operation stripes ──▶ partitions
//!                                              │
//!                       expiration sweeper ────┘ (bounded window per tick)
//!                                              │
//!                          event stripes ◀─────┘ ──▶ EvictionListener
//! ```
//!
//! Stripes are selected from the partition id, so operations and events for
//! one key are always handled by the same thread, in order.
use crate::config::GridConfig;
use crate::error::GridError;
use crate::grid::executor::StripedExecutor;
use crate::grid::map::Expirable;
use crate::grid::sweeper::Sweeper;
use dashmap::DashMap;
use std::any::Any;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{AcqRel, Acquire};
use tracing::info;

mod executor;
mod map;
mod partition;
mod sweeper;

pub use map::ExpiringMap;

/// A registered map: the typed handle for lookups by name and the
/// type-erased view for the sweeper.
pub(crate) struct MapSlot {
    handle: Box<dyn Any + Send + Sync>,
    expirable: Arc<dyn Expirable>,
}

pub(crate) type MapRegistry = Arc<DashMap<String, MapSlot>>;

impl GridConfig {
    /// Rejects configurations the node cannot run with.
    pub fn validate(&self) -> Result<(), GridError> {
        if self.partition_count == 0 {
            return Err(GridError::InvalidConfig("partition count must be positive"));
        }
        if self.operation_threads == 0 {
            return Err(GridError::InvalidConfig("operation threads must be positive"));
        }
        if self.event_threads == 0 {
            return Err(GridError::InvalidConfig("event threads must be positive"));
        }
        if self.sweep_interval.is_zero() {
            return Err(GridError::InvalidConfig("sweep interval must be positive"));
        }
        if self.partitions_per_sweep == 0 {
            return Err(GridError::InvalidConfig(
                "partitions per sweep must be positive",
            ));
        }
        Ok(())
    }
}

/// A running grid node.
///
/// Dropping the node shuts it down; see [`shutdown`](Self::shutdown).
pub struct GridNode {
    config: GridConfig,
    maps: MapRegistry,
    operations: Arc<StripedExecutor>,
    events: Arc<StripedExecutor>,
    sweeper: Sweeper,
    running: AtomicBool,
}

impl GridNode {
    /// Validates `config` and starts every node thread.
    pub fn start(config: GridConfig) -> Result<Self, GridError> {
        config.validate()?;

        let prefix = &config.thread_prefix;
        let maps: MapRegistry = Arc::new(DashMap::new());
        let operations = Arc::new(StripedExecutor::start(
            prefix,
            "operation",
            config.operation_threads,
        )?);
        let events = Arc::new(StripedExecutor::start(
            prefix,
            "event",
            config.event_threads,
        )?);
        let sweeper = Sweeper::start(
            format!("{prefix}-sweeper"),
            config.sweep_interval,
            config.partitions_per_sweep,
            config.partition_count,
            Arc::clone(&maps),
        )?;

        info!(
            partitions = config.partition_count,
            operation_threads = config.operation_threads,
            event_threads = config.event_threads,
            sweep_interval = ?config.sweep_interval,
            partitions_per_sweep = config.partitions_per_sweep,
            "grid node started"
        );

        Ok(Self {
            config,
            maps,
            operations,
            events,
            sweeper,
            running: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Returns the map called `name`, creating it on first use.
    ///
    /// Fails with [`GridError::MapTypeMismatch`] if the map exists with other
    /// key or value types, and with [`GridError::Shutdown`] once the node
    /// is stopped.
    pub fn map<K, V>(&self, name: &str) -> Result<ExpiringMap<K, V>, GridError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        if !self.running.load(Acquire) {
            return Err(GridError::Shutdown);
        }

        let slot = self.maps.entry(name.to_string()).or_insert_with(|| {
            let map = ExpiringMap::<K, V>::new(
                name,
                self.config.partition_count,
                Arc::clone(&self.operations),
                Arc::clone(&self.events),
            );
            info!(map = name, "map created");

            MapSlot {
                expirable: map.expirable(),
                handle: Box::new(map),
            }
        });

        slot.handle
            .downcast_ref::<ExpiringMap<K, V>>()
            .cloned()
            .ok_or_else(|| GridError::MapTypeMismatch(name.to_string()))
    }

    /// Stops the sweeper, then drains and joins the operation and event
    /// threads. Puts issued afterwards are dropped. Idempotent.
    pub fn shutdown(&self) {
        if !self.running.swap(false, AcqRel) {
            return;
        }

        self.sweeper.stop();
        self.operations.shutdown();
        self.events.shutdown();

        info!("grid node stopped");
    }
}

impl Drop for GridNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}
