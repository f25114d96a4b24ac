/// Integration tests for load-balancing policies in a simulation context.
use lbsim_algorithms::*;
use lbsim_core::config::SimConfig;
use lbsim_core::Simulation;

fn small_config(policy: &str) -> SimConfig {
    SimConfig::from_str(&format!(
        r#"
[simulation]
name = "algo-test"
seed = 42
duration_ms = 10000

[sources]
count = 3
global_rps = 40

[servers]
count = 8
latency_jitter_ms = 50

[network]
delay_ms = 20

[balancer]
policy = "{policy}"
"#
    ))
    .unwrap()
}

#[test]
fn test_every_policy_runs() {
    for name in available_policies() {
        let metrics = lbsim_core::run_simulation(small_config(name)).unwrap();
        assert_eq!(metrics.policy, name);
        assert!(metrics.completed_requests > 0, "{name} completed nothing");
        assert_eq!(metrics.rejected_requests, 0, "{name} rejected requests");
        assert_eq!(metrics.per_server_requests.len(), 8);
    }
}

#[test]
fn test_round_robin_is_fair() {
    let metrics = lbsim_core::run_simulation(small_config("roundrobin")).unwrap();
    assert!(
        metrics.jains_fairness_index > 0.95,
        "jain's index {}",
        metrics.jains_fairness_index
    );
    assert!(metrics.per_server_requests.iter().all(|&n| n > 0));
}

#[test]
fn test_least_loaded_uses_every_server() {
    let metrics = lbsim_core::run_simulation(small_config("leastloaded")).unwrap();
    assert!(metrics.per_server_requests.iter().all(|&n| n > 0));
    assert!(metrics.jains_fairness_index > 0.8);
}

#[test]
fn test_aperture_reports_subset_size() {
    for name in ["aperture", "aperture-random", "aperture-static"] {
        let metrics = lbsim_core::run_simulation(small_config(name)).unwrap();
        let size = metrics.custom_metrics["aperture_size"];
        assert!((3.0..=8.0).contains(&size), "{name} aperture size {size}");
    }
}

#[test]
fn test_static_aperture_never_rotates() {
    let metrics = lbsim_core::run_simulation(small_config("aperture-static")).unwrap();
    assert_eq!(metrics.custom_metrics["aperture_rotations"], 0.0);

    let metrics = lbsim_core::run_simulation(small_config("aperture")).unwrap();
    assert!(metrics.custom_metrics["aperture_rotations"] > 0.0);
}

#[test]
fn test_aperture_sources_stay_in_subset() {
    let mut config = small_config("aperture-static");
    config.servers.count = 20;
    // Light enough that the subset never grows.
    config.sources.global_rps = 10.0;
    let mut sim = Simulation::new(config).unwrap();
    sim.start();
    sim.run_until(5_000.0);

    for source in sim.sources() {
        let subset = source.balancer().subset().unwrap().to_vec();
        for (server, &load) in source.load().iter().enumerate() {
            if !subset.contains(&server) {
                assert_eq!(load, 0, "source {} has load outside its subset", source.id);
            }
        }
    }
}

#[test]
fn test_compare_policies_preserves_order() {
    let config = small_config("random");
    let results =
        lbsim_core::compare_policies(&config, &["leastloaded", "random", "aperture"]).unwrap();
    let names: Vec<&str> = results.iter().map(|m| m.policy.as_str()).collect();
    assert_eq!(names, vec!["leastloaded", "random", "aperture"]);
}

#[test]
fn test_policy_names_parse_from_config() {
    for name in available_policies() {
        let config = small_config(name);
        assert_eq!(config.balancer.policy.name(), name);
    }
    assert!(SimConfig::from_str("[balancer]\npolicy = \"fastest\"\n").is_err());
}
