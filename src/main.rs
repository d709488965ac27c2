use std::io;
use std::time::Duration;
use tracing::{Level, info};
use ttl_probe::{Probe, ProbeError, probe};

fn main() -> Result<(), ProbeError> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::INFO)
        .init();

    let config = probe!(
        map: "timer",
        grid: {
            partitions: 271,
            operation_threads: 4,
            event_threads: 4,
            sweep: { interval: Duration::from_secs(1), partitions: 28 }
        },
        load: { ttl: 1..=10, repetitions: 10_000 },
        histogram: { shards: 4, reservoir: Uniform { size: 1028 } },
        report: { interval: Duration::from_secs(5) }
    );

    let probe = Probe::launch(config, io::stdout())?;
    let submitted = probe.generate();
    info!(submitted, "waiting for evictions");

    probe.wait();
    Ok(())
}
