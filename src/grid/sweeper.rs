//! Periodic expiration of timed entries.
//!
//! The sweeper does not scan the whole node on every tick. Like the
//! expiration managers of real data grids, it visits a bounded window of
//! partitions per tick and walks the partition space round robin, so an
//! expired entry is evicted somewhere between zero and
//! `ceil(partition_count / partitions_per_sweep)` ticks after its deadline.
use crate::error::GridError;
use crate::grid::MapRegistry;
use crate::grid::map::Expirable;
use crossbeam::channel::{Receiver, Sender, bounded, select, tick};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

pub(crate) struct Sweeper {
    shutdown: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    pub(crate) fn start(
        name: String,
        interval: Duration,
        window: usize,
        partition_count: usize,
        maps: MapRegistry,
    ) -> Result<Self, GridError> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(interval, window, partition_count, &maps, shutdown_rx))
            .map_err(|source| GridError::Spawn { name, source })?;

        Ok(Self {
            shutdown: Mutex::new(Some(shutdown_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stops the sweeper and waits for the current sweep to finish.
    pub(crate) fn stop(&self) {
        drop(
            self.shutdown
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("expiration sweeper terminated with a panic");
            }
        }
    }
}

fn run(
    interval: Duration,
    window: usize,
    partition_count: usize,
    maps: &MapRegistry,
    shutdown: Receiver<()>,
) {
    let ticker = tick(interval);
    let mut cursor = 0;

    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(ticker) -> _ => {
                let partitions = next_window(&mut cursor, window, partition_count);
                sweep(maps, &partitions, Instant::now());
            }
        }
    }

    debug!("expiration sweeper stopped");
}

/// Evicts expired entries of `partitions` in every registered map.
pub(crate) fn sweep(maps: &MapRegistry, partitions: &[usize], now: Instant) -> usize {
    // snapshot the registry so map creation is never blocked by a sweep
    let expirables = maps
        .iter()
        .map(|slot| Arc::clone(&slot.expirable))
        .collect::<Vec<Arc<dyn Expirable>>>();

    let mut total = 0;
    for map in expirables {
        let evicted = map.evict_expired(partitions, now);
        if evicted > 0 {
            debug!(map = map.name(), evicted, from = ?partitions.first(), "expired entries evicted");
        }
        total += evicted;
    }

    total
}

/// Returns the next `width` partition ids, wrapping around `count`.
pub(crate) fn next_window(cursor: &mut usize, width: usize, count: usize) -> Vec<usize> {
    let width = width.min(count);
    let partitions = (0..width).map(|i| (*cursor + i) % count).collect();
    *cursor = (*cursor + width) % count;
    partitions
}
