/// Integration tests for resizing the fleet while a simulation runs.
use lbsim_core::config::SimConfig;
use lbsim_core::{Simulation, CANCEL_PENALTY_MS};

fn paused_config(sources: usize, servers: usize, policy: &str) -> SimConfig {
    SimConfig::from_str(&format!(
        r#"
[simulation]
name = "topology-test"
seed = 42
emit_paused = true

[sources]
count = {sources}

[servers]
count = {servers}
latency_jitter_ms = 0

[network]
delay_ms = 100

[balancer]
policy = "{policy}"
"#
    ))
    .unwrap()
}

#[test]
fn test_removed_server_cancels_request_on_wire() {
    let mut sim = Simulation::new(paused_config(1, 2, "leastloaded")).unwrap();
    // Least-loaded spreads the first two requests over both servers.
    sim.emit_request();
    sim.emit_request();
    assert_eq!(sim.sources()[0].load(), &[1, 1]);

    sim.set_server_count(1);
    assert_eq!(sim.server_count(), 1);
    assert_eq!(sim.in_flight(), 1);
    assert_eq!(sim.collector().cancelled_count(), 1);

    let source = &sim.sources()[0];
    assert_eq!(source.load()[1], 0);
    assert_eq!(source.stats()[1].outstanding(), 0);
    assert_eq!(source.stats()[1].median(), CANCEL_PENALTY_MS);

    sim.run_until(1_000.0);
    assert_eq!(sim.collector().completed_count(), 1);
    assert_eq!(sim.collector().records()[0].server, 0);
    assert_eq!(sim.in_flight(), 0);
}

#[test]
fn test_removed_server_cancels_queued_request() {
    let mut sim = Simulation::new(paused_config(1, 2, "leastloaded")).unwrap();
    sim.emit_request();
    sim.emit_request();
    // Both requests are sitting in server queues.
    sim.run_until(120.0);
    assert_eq!(sim.in_flight(), 0);
    assert_eq!(sim.servers()[1].queue.len(), 1);

    sim.set_server_count(1);
    assert_eq!(sim.collector().cancelled_count(), 1);
    assert_eq!(sim.sources()[0].stats()[1].outstanding(), 0);

    // The dead server's processing timer must not fire into anything.
    sim.run_until(1_000.0);
    assert_eq!(sim.collector().completed_count(), 1);
}

#[test]
fn test_removed_server_cancels_response_on_wire() {
    let mut sim = Simulation::new(paused_config(1, 2, "leastloaded")).unwrap();
    sim.emit_request();
    sim.emit_request();
    // Processed at 150, responses land at 250.
    sim.run_until(200.0);
    assert_eq!(sim.in_flight(), 2);

    sim.set_server_count(1);
    assert_eq!(sim.in_flight(), 1);
    assert_eq!(sim.collector().cancelled_count(), 1);
    sim.run_until(1_000.0);
    assert_eq!(sim.collector().completed_count(), 1);
    assert_eq!(sim.sources()[0].load(), &[0, 0]);
}

#[test]
fn test_regrown_server_starts_fresh() {
    let mut sim = Simulation::new(paused_config(1, 3, "leastloaded")).unwrap();
    for _ in 0..3 {
        sim.emit_request();
    }
    sim.run_until(120.0);
    sim.set_server_count(1);
    sim.set_server_count(3);

    assert_eq!(sim.servers().len(), 3);
    assert!(sim.servers().iter().all(|s| s.active));
    assert_eq!(sim.servers()[2].queue.len(), 0);
    assert_eq!(sim.servers()[2].request_count, 0);
    let source = &sim.sources()[0];
    assert_eq!(source.load()[2], 0);
    assert_eq!(source.stats()[2].median(), 0.0);

    sim.run_until(1_000.0);
    for _ in 0..9 {
        sim.emit_request();
    }
    sim.run_until(2_000.0);
    for server in sim.servers() {
        assert!(server.served > 0, "server {} never served", server.id);
    }
}

#[test]
fn test_shrink_keeps_routing_in_range() {
    for policy in lbsim_algorithms::available_policies() {
        let mut sim = Simulation::new(paused_config(3, 10, policy)).unwrap();
        for _ in 0..20 {
            sim.emit_request();
        }
        sim.run_until(500.0);
        sim.set_server_count(2);
        let before = sim.collector().completed_count() as usize;
        for _ in 0..50 {
            sim.emit_request();
        }
        sim.run_until(10_000.0);

        let records = sim.collector().records();
        assert!(records.len() > before, "{policy} completed nothing");
        for record in &records[before..] {
            assert!(record.server < 2, "{policy} routed to {}", record.server);
        }
    }
}

#[test]
fn test_removed_source_drops_its_requests() {
    let mut sim = Simulation::new(paused_config(2, 1, "random")).unwrap();
    for _ in 0..10 {
        sim.emit_request();
    }
    // Everything is queued at the single server.
    sim.run_until(120.0);
    sim.set_source_count(1);
    assert_eq!(sim.sources().len(), 1);

    sim.run_until(10_000.0);
    let collector = sim.collector();
    assert_eq!(collector.completed_count() + collector.dropped_count(), 10);
    assert!(collector.records().iter().all(|r| r.source == 0));
    assert_eq!(sim.servers()[0].queue.len(), 0);
}

#[test]
fn test_removed_source_drops_requests_on_wire() {
    let mut sim = Simulation::new(paused_config(2, 2, "roundrobin")).unwrap();
    for _ in 0..10 {
        sim.emit_request();
    }
    sim.set_source_count(1);
    let collector = sim.collector();
    assert_eq!(collector.dropped_count() as usize + sim.in_flight(), 10);

    sim.run_until(10_000.0);
    let collector = sim.collector();
    assert_eq!(collector.completed_count() + collector.dropped_count(), 10);
}

#[test]
fn test_reactivated_source_gets_new_generation() {
    let mut sim = Simulation::new(paused_config(2, 2, "roundrobin")).unwrap();
    sim.set_source_count(1);
    sim.set_source_count(2);
    let source = &sim.sources()[1];
    assert!(source.active);
    assert_eq!(source.generation, 1);
    assert_eq!(source.load(), &[0, 0]);
    assert_eq!(source.emitted, 0);
}

#[test]
fn test_new_source_sees_every_server_slot() {
    let mut sim = Simulation::new(paused_config(1, 4, "leastloaded")).unwrap();
    sim.set_server_count(2);
    sim.set_source_count(3);
    assert_eq!(sim.sources()[2].load().len(), 4);
    sim.set_server_count(4);
    assert!(sim.sources().iter().all(|s| s.load().len() == 4));
}

#[test]
fn test_reconfigure_applies_counts() {
    let config = paused_config(2, 4, "aperture");
    let mut sim = Simulation::new(config.clone()).unwrap();
    for _ in 0..8 {
        sim.emit_request();
    }

    let mut smaller = config;
    smaller.servers.count = 2;
    smaller.sources.count = 3;
    sim.reconfigure(smaller).unwrap();

    assert_eq!(sim.server_count(), 2);
    assert_eq!(sim.source_count(), 3);
    for source in sim.sources() {
        let subset = source.balancer().subset().unwrap();
        assert!(subset.iter().all(|&s| s < 2));
    }
    sim.run_until(10_000.0);
    let c = sim.collector();
    assert_eq!(c.completed_count() + c.cancelled_count(), 8);
}
