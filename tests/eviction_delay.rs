use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use ttl_probe::config::{GridConfig, LoadConfig};
use ttl_probe::core::TimerMap;
use ttl_probe::generator::LoadGenerator;
use ttl_probe::grid::GridNode;
use ttl_probe::metrics::{Histogram, Percentile};
use ttl_probe::observer::DelayObserver;
use ttl_probe::reporter::write_snapshot;
use ttl_probe::time::ManualClock;

fn grid_config() -> GridConfig {
    GridConfig {
        partition_count: 16,
        operation_threads: 2,
        event_threads: 2,
        sweep_interval: Duration::from_millis(20),
        partitions_per_sweep: 4,
        thread_prefix: "it-grid".to_string(),
    }
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn single_late_eviction_is_reported_exactly() {
    let node = GridNode::start(grid_config()).expect("node starts");
    let map = node.map::<String, i64>("timer").expect("map is created");

    let histogram = Arc::new(Histogram::default());
    let clock = Arc::new(ManualClock::new(1450));
    map.subscribe_local_eviction(DelayObserver::with_clock(
        Arc::clone(&histogram),
        Arc::clone(&clock),
    ));

    map.put_with_expiry("a1:0".to_string(), 1000, Duration::from_millis(30));

    assert!(wait_until(Duration::from_secs(5), || histogram.count() == 1));

    let snapshot = histogram.snapshot();
    assert_eq!(snapshot.min(), 450);
    assert_eq!(snapshot.max(), 450);
    assert_eq!(snapshot.mean(), 450.0);
    for percentile in Percentile::ALL {
        assert_eq!(snapshot.percentile(percentile), 450.0);
    }

    let mut out = Vec::new();
    write_snapshot(&mut out, "timer", &snapshot).unwrap();
    let report = String::from_utf8(out).unwrap();

    assert!(report.contains("count = 1\n"));
    assert!(report.contains("min = 450\n"));
    assert!(report.contains("mean = 450.00\n"));
    assert!(report.contains("99.9% <= 450.00\n"));
}

#[test]
fn generated_entry_expected_at_insert_plus_ttl() {
    let node = GridNode::start(grid_config()).expect("node starts");
    let map = node.map::<String, i64>("timer").expect("map is created");

    let histogram = Arc::new(Histogram::default());
    let clock = Arc::new(ManualClock::new(1000));
    map.subscribe_local_eviction(DelayObserver::with_clock(
        Arc::clone(&histogram),
        Arc::clone(&clock),
    ));

    let load = LoadConfig {
        ttl_seconds: 1..=1,
        repetitions: 1,
    };
    let generator = LoadGenerator::with_clock(load, Arc::clone(&clock));
    assert_eq!(generator.run(&map), 1);
    // inserted at 1000 with ttl 1, so expected at 1001
    clock.set(1450);

    assert!(wait_until(Duration::from_secs(5), || histogram.count() == 1));

    let snapshot = histogram.snapshot();
    assert_eq!(snapshot.min(), 449);
    assert_eq!(snapshot.max(), 449);
    assert_eq!(snapshot.median(), 449.0);
}

#[test]
fn generated_load_is_observed_once_per_entry() {
    let node = GridNode::start(grid_config()).expect("node starts");
    let map = node.map::<String, i64>("timer").expect("map is created");

    let histogram = Arc::new(Histogram::default());
    let clock = Arc::new(ManualClock::new(1000));
    map.subscribe_local_eviction(DelayObserver::with_clock(
        Arc::clone(&histogram),
        Arc::clone(&clock),
    ));

    let load = LoadConfig {
        ttl_seconds: 1..=2,
        repetitions: 25,
    };
    let generator = LoadGenerator::with_clock(load, Arc::clone(&clock));
    // expected expiries are 1001 and 1002, observed at 1003
    clock.set(1000);
    assert_eq!(generator.run(&map), 50);
    clock.set(1003);

    assert!(wait_until(Duration::from_secs(10), || histogram.count() == 50));
    thread::sleep(Duration::from_millis(100));

    let snapshot = histogram.snapshot();
    assert_eq!(snapshot.count(), 50);
    assert_eq!(snapshot.min(), 1);
    assert_eq!(snapshot.max(), 2);
    assert_eq!(snapshot.mean(), 1.5);
    assert_eq!(snapshot.negative_count(), 0);
    assert!(map.is_empty());
}

#[test]
fn clock_skew_produces_negative_samples() {
    let node = GridNode::start(grid_config()).expect("node starts");
    let map = node.map::<String, i64>("timer").expect("map is created");

    let histogram = Arc::new(Histogram::default());
    map.subscribe_local_eviction(DelayObserver::with_clock(
        Arc::clone(&histogram),
        ManualClock::new(995),
    ));

    map.put_with_expiry("a5:0".to_string(), 1000, Duration::from_millis(10));
    map.put_with_expiry("a5:1".to_string(), 990, Duration::from_millis(10));

    assert!(wait_until(Duration::from_secs(5), || histogram.count() == 2));

    let snapshot = histogram.snapshot();
    assert_eq!(snapshot.negative_count(), 1);
    assert_eq!(snapshot.min(), -5);
    assert_eq!(snapshot.max(), 5);
    assert_eq!(snapshot.mean(), 0.0);
}
