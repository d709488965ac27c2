//! Periodic console report of the delay histogram.
//!
//! The output mirrors a classic console metrics reporter:
//!
//! ```text
//! 10/17/26, 03:04:05 PM ===============================================
//!
//! -- Histograms ---------------------------------------------------------
//! timer
//!              count = 1
//!                min = 450
//!                max = 450
//!               mean = 450.00
//!             stddev = 0.00
//!             median = 450.00
//!               75% <= 450.00
//!               95% <= 450.00
//!               98% <= 450.00
//!               99% <= 450.00
//!             99.9% <= 450.00
//! ```
//!
//! All values are in seconds.
use crate::metrics::{Histogram, Percentile, Snapshot};
use chrono::{DateTime, Local};
use crossbeam::channel::tick;
use std::fmt::Display;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, warn};

const BANNER_WIDTH: usize = 80;
const LABEL_WIDTH: usize = 19;

/// Writes one statistics block for `snapshot` under the heading `name`.
pub fn write_snapshot<W>(out: &mut W, name: &str, snapshot: &Snapshot) -> io::Result<()>
where
    W: Write + ?Sized,
{
    writeln!(out, "{name}")?;
    write_line(out, "count", "=", snapshot.count())?;
    write_line(out, "min", "=", snapshot.min())?;
    write_line(out, "max", "=", snapshot.max())?;
    write_line(out, "mean", "=", format_args!("{:.2}", snapshot.mean()))?;
    write_line(out, "stddev", "=", format_args!("{:.2}", snapshot.stddev()))?;
    write_line(out, "median", "=", format_args!("{:.2}", snapshot.median()))?;

    for percentile in &Percentile::ALL[1..] {
        let value = snapshot.percentile(*percentile);
        write_line(out, label(*percentile), "<=", format_args!("{value:.2}"))?;
    }

    Ok(())
}

fn write_line<W>(out: &mut W, label: &str, operator: &str, value: impl Display) -> io::Result<()>
where
    W: Write + ?Sized,
{
    writeln!(out, "{label:>width$} {operator} {value}", width = LABEL_WIDTH)
}

fn label(percentile: Percentile) -> &'static str {
    match percentile {
        Percentile::P50 => "50%",
        Percentile::P75 => "75%",
        Percentile::P95 => "95%",
        Percentile::P98 => "98%",
        Percentile::P99 => "99%",
        Percentile::P999 => "99.9%",
    }
}

fn write_banner<W>(out: &mut W, at: DateTime<Local>) -> io::Result<()>
where
    W: Write + ?Sized,
{
    let stamp = at.format("%D, %r").to_string();
    let fill = BANNER_WIDTH.saturating_sub(stamp.len() + 1);
    writeln!(out, "{stamp} {}", "=".repeat(fill))?;
    writeln!(out)?;

    let section = "-- Histograms ";
    writeln!(
        out,
        "{section}{}",
        "-".repeat(BANNER_WIDTH.saturating_sub(section.len()))
    )
}

/// Prints snapshots of a [`Histogram`] to a writer.
pub struct ConsoleReporter<W> {
    name: String,
    histogram: Arc<Histogram>,
    out: W,
    reported_negative: u64,
}

impl<W> ConsoleReporter<W>
where
    W: Write,
{
    pub fn new(name: impl Into<String>, histogram: Arc<Histogram>, out: W) -> Self {
        Self {
            name: name.into(),
            histogram,
            out,
            reported_negative: 0,
        }
    }

    /// Snapshots the histogram and writes one full report.
    pub fn report(&mut self) -> io::Result<()> {
        let snapshot = self.histogram.snapshot();

        if snapshot.negative_count() > self.reported_negative {
            warn!(
                histogram = %self.name,
                negative = snapshot.negative_count(),
                "evictions observed before their expected expiry"
            );
            self.reported_negative = snapshot.negative_count();
        }

        write_banner(&mut self.out, Local::now())?;
        write_snapshot(&mut self.out, &self.name, &snapshot)?;
        writeln!(self.out)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W> ConsoleReporter<W>
where
    W: Write + Send + 'static,
{
    /// Spawns a thread that reports every `interval`, first after one interval.
    ///
    /// The thread runs until the process exits, or stops after logging the
    /// error if writing a report fails.
    pub fn start(mut self, interval: Duration) -> io::Result<ReporterHandle> {
        let handle = thread::Builder::new()
            .name("reporter".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                while ticker.recv().is_ok() {
                    if let Err(err) = self.report() {
                        error!(%err, histogram = %self.name, "failed to write report");
                        break;
                    }
                }
            })?;

        Ok(ReporterHandle { handle })
    }
}

/// Handle to a running reporter thread.
#[derive(Debug)]
pub struct ReporterHandle {
    handle: JoinHandle<()>,
}

impl ReporterHandle {
    /// Blocks until the reporter thread ends, which for a healthy reporter
    /// means forever.
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("reporter terminated with a panic");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
