use crate::config::{LoadConfig, ProbeConfig};
use crate::core::map::TimerMap;
use crate::error::ProbeError;
use crate::generator::LoadGenerator;
use crate::grid::{ExpiringMap, GridNode};
use crate::metrics::Histogram;
use crate::observer::DelayObserver;
use crate::reporter::{ConsoleReporter, ReporterHandle};
use std::io::Write;
use std::sync::Arc;
use tracing::info;

/// A wired probe: grid node, timer map, delay histogram, eviction observer
/// and a running console reporter.
///
/// The only state the components share is the [`Histogram`].
pub struct Probe {
    node: GridNode,
    map: ExpiringMap<String, i64>,
    histogram: Arc<Histogram>,
    generator: LoadGenerator,
    reporter: ReporterHandle,
}

impl Probe {
    /// Starts the grid node, subscribes the observer to the timer map and
    /// starts reporting to `out`.
    ///
    /// No entry is inserted yet; call [`generate`](Self::generate).
    pub fn launch<W>(config: ProbeConfig, out: W) -> Result<Self, ProbeError>
    where
        W: Write + Send + 'static,
    {
        let ProbeConfig {
            map_name,
            grid,
            load,
            histogram,
            reporter,
        } = config;

        let node = GridNode::start(grid)?;
        let map = node.map::<String, i64>(&map_name)?;

        let histogram = Arc::new(Histogram::new(histogram));
        let listener = map.subscribe_local_eviction(DelayObserver::new(Arc::clone(&histogram)));

        let reporter = ConsoleReporter::new(reporter.name, Arc::clone(&histogram), out)
            .start(reporter.interval)
            .map_err(ProbeError::Reporter)?;

        info!(map = %map_name, %listener, entries = load.total_entries(), "probe launched");

        Ok(Self {
            node,
            map,
            histogram,
            generator: LoadGenerator::new(load),
            reporter,
        })
    }

    /// Inserts the configured load and returns the number of submitted puts.
    pub fn generate(&self) -> usize {
        self.generator.run(&self.map)
    }

    pub fn load(&self) -> &LoadConfig {
        self.generator.config()
    }

    pub fn histogram(&self) -> &Arc<Histogram> {
        &self.histogram
    }

    pub fn map(&self) -> &ExpiringMap<String, i64> {
        &self.map
    }

    pub fn node(&self) -> &GridNode {
        &self.node
    }

    /// Blocks on the reporter thread. It only returns if reporting fails,
    /// after which the grid node is shut down.
    pub fn wait(self) {
        self.reporter.join();
        self.node.shutdown();
    }
}
