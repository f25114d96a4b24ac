/// Integration tests for the simulation engine.
use lbsim_core::config::SimConfig;
use lbsim_core::Simulation;

/// One source, one server, 100 ms network, no jitter, nothing emitted
/// unless a test asks for it.
fn single_link_config() -> SimConfig {
    SimConfig::from_str(
        r#"
[simulation]
name = "integration-test"
seed = 42
emit_paused = true

[sources]
count = 1
work = { kind = "constant", value = 50.0 }

[servers]
count = 1
latency_jitter_ms = 0

[network]
delay_ms = 100
"#,
    )
    .unwrap()
}

fn production_config() -> SimConfig {
    SimConfig::from_str(
        r#"
[simulation]
name = "integration-test"
seed = 7
duration_ms = 20000

[sources]
count = 5
global_rps = 60
work = { kind = "uniform", min = 20.0, max = 80.0 }

[servers]
count = 10
latency_jitter_ms = 100

[servers.gc]
interval_ms = 2000
pause_ms = 400

[network]
delay_ms = 50

[balancer]
policy = "aperture"
"#,
    )
    .unwrap()
}

#[test]
fn test_single_request_round_trip() {
    let mut sim = Simulation::new(single_link_config()).unwrap();
    sim.emit_request().unwrap();

    sim.run_until(249.0);
    assert_eq!(sim.collector().completed_count(), 0);
    assert_eq!(sim.sources()[0].load()[0], 1);

    sim.run_until(250.0);
    assert_eq!(sim.collector().completed_count(), 1);
    let record = &sim.collector().records()[0];
    assert_eq!(record.completed_ms, 250.0);
    assert_eq!(record.latency_ms, 250.0);

    let source = &sim.sources()[0];
    assert_eq!(source.load()[0], 0);
    assert_eq!(source.stats()[0].outstanding(), 0);
    assert_eq!(source.stats()[0].median(), 250.0);

    // 250 ms lands in the 10 ms bucket 25.
    assert_eq!(sim.histogram().aggregate_bucket(25), 1);
    assert_eq!(sim.histogram().max_value(), Some(25));
    assert_eq!(sim.latency_series().len(), 1);
    assert_eq!(sim.in_flight(), 0);
    assert_eq!(sim.servers()[0].served, 1);
}

#[test]
fn test_queued_request_waits_for_head() {
    let mut sim = Simulation::new(single_link_config()).unwrap();
    sim.emit_request();
    sim.emit_request();
    sim.run_until(1_000.0);

    let records = sim.collector().records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].request_id, 0);
    assert_eq!(records[0].completed_ms, 250.0);
    assert_eq!(records[0].latency_ms, 250.0);
    // Second request is served 50 ms after the first.
    assert_eq!(records[1].request_id, 1);
    assert_eq!(records[1].completed_ms, 300.0);
    assert_eq!(records[1].latency_ms, 300.0);
    assert_eq!(sim.servers()[0].queue.len(), 0);
}

#[test]
fn test_equal_time_events_are_fifo() {
    let mut config = single_link_config();
    config.servers.count = 3;
    config.balancer.policy = "roundrobin".parse().unwrap();
    let mut sim = Simulation::new(config).unwrap();
    for _ in 0..3 {
        sim.emit_request();
    }
    sim.run_until(1_000.0);
    let ids: Vec<u64> = sim
        .collector()
        .records()
        .iter()
        .map(|r| r.request_id)
        .collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn test_full_simulation_completes_requests() {
    let config = production_config();
    let metrics = lbsim_core::run_simulation(config).unwrap();

    assert_eq!(metrics.policy, "aperture");
    assert_eq!(metrics.duration_ms, 20_000);
    assert!(metrics.emitted_requests > 500);
    assert!(metrics.completed_requests > 0);
    assert!(metrics.completed_requests <= metrics.emitted_requests);
    assert_eq!(
        metrics.completed_requests + metrics.in_flight_requests,
        metrics.emitted_requests
    );
    assert_eq!(metrics.rejected_requests, 0);
    assert!(metrics.end_to_end_latency.p50 > 100.0);
    assert!(metrics.end_to_end_latency.p99 >= metrics.end_to_end_latency.p50);
    assert!(metrics.windowed_p99_ms > 0.0);
    assert!(metrics.custom_metrics.contains_key("aperture_size"));
}

#[test]
fn test_deterministic_with_seed() {
    let run = || {
        let mut sim = Simulation::new(production_config()).unwrap();
        sim.start();
        sim.run_until(5_000.0);
        sim.snapshot()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_different_seeds_diverge() {
    let mut other = production_config();
    other.simulation.seed = 8;
    let a = lbsim_core::run_simulation(production_config()).unwrap();
    let b = lbsim_core::run_simulation(other).unwrap();
    assert_ne!(a.per_server_requests, b.per_server_requests);
}

#[test]
fn test_run_for_advances_clock_without_events() {
    let mut sim = Simulation::new(single_link_config()).unwrap();
    sim.start();
    assert_eq!(sim.run_for(500.0), 0);
    assert_eq!(sim.now_ms(), 500.0);
    sim.run_for(250.5);
    assert_eq!(sim.now_ms(), 750.5);
}

#[test]
fn test_snapshot_serializes_to_json() {
    let mut sim = Simulation::new(production_config()).unwrap();
    sim.start();
    sim.run_until(3_000.0);
    let snapshot = sim.snapshot();
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["policy"], "aperture");
    assert_eq!(json["servers"].as_array().unwrap().len(), 10);
    assert_eq!(json["sources"].as_array().unwrap().len(), 5);
    let in_subset = snapshot.sources[0]
        .links
        .iter()
        .filter(|l| l.in_subset)
        .count();
    assert!((3..=10).contains(&in_subset));
}

#[test]
fn test_histogram_window_ages_out() {
    let mut sim = Simulation::new(single_link_config()).unwrap();
    sim.emit_request();
    sim.run_until(1_000.0);
    assert_eq!(sim.snapshot().histogram.total, 1);

    // 20 slots of 1 s: the sample is gone once the window has moved past it.
    sim.run_until(25_000.0);
    let snapshot = sim.snapshot();
    assert_eq!(snapshot.histogram.total, 0);
    assert!(snapshot.histogram.buckets.is_empty());
}

#[test]
fn test_latency_series_window_trims() {
    let mut sim = Simulation::new(single_link_config()).unwrap();
    sim.emit_request();
    sim.run_until(1_000.0);
    assert_eq!(sim.snapshot().latency.len(), 1);
    sim.run_until(40_000.0);
    assert!(sim.snapshot().latency.is_empty());
}

#[test]
fn test_completion_records_are_bounded() {
    let mut config = single_link_config();
    config.simulation.max_records = 2;
    let mut sim = Simulation::new(config).unwrap();
    for _ in 0..9 {
        sim.emit_request();
    }
    sim.run_until(5_000.0);

    let collector = sim.collector();
    assert_eq!(collector.completed_count(), 9);
    assert!(collector.records().len() < 4);
    assert_eq!(collector.records().last().map(|r| r.request_id), Some(8));
    assert_eq!(sim.metrics().completed_requests, 9);
}
