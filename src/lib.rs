//! # ttl-probe
//!
//! Measures how late TTL eviction notifications arrive, to find out whether a
//! data grid's expiry mechanism is precise enough to drive a distributed timer.
//!
//! The probe inserts many entries whose value is their own expected expiry
//! (epoch seconds), listens for eviction events and records
//! `observed - expected` into a sharded histogram that is printed on a fixed
//! interval.
//!
//! ```text
//! LoadGenerator ──put_with_expiry──▶ ExpiringMap ──sweeper──▶ event stripes
//!                                                                 │
//!                           ConsoleReporter ◀── Histogram ◀── DelayObserver
//! ```
//!
//! Everything is wired by [`Probe`], usually from a configuration built with
//! the [`probe!`] macro:
//!
//! ```ignore
//! use std::time::Duration;
//! use ttl_probe::{Probe, probe};
//!
//! let config = probe!(
//!     map: "timer",
//!     grid: {
//!         partitions: 271,
//!         operation_threads: 4,
//!         event_threads: 4,
//!         sweep: { interval: Duration::from_secs(1), partitions: 28 }
//!     },
//!     load: { ttl: 1..=10, repetitions: 10_000 },
//!     histogram: { shards: 4, reservoir: Uniform { size: 1028 } },
//!     report: { interval: Duration::from_secs(5) }
//! );
//!
//! let probe = Probe::launch(config, std::io::stdout())?;
//! probe.generate();
//! probe.wait();
//! ```
extern crate self as ttl_probe;

pub use crate::config::{GridConfig, HistogramConfig, LoadConfig, ProbeConfig, ReporterConfig};
pub use crate::error::{GridError, ProbeError};
pub use crate::probe::Probe;
pub use macros::probe;

pub mod config;
pub mod core;
pub mod error;
pub mod generator;
pub mod grid;
pub mod metrics;
pub mod observer;
pub mod probe;
pub mod reporter;
pub mod reservoir;
pub mod time;

#[cfg(test)]
mod testing;
