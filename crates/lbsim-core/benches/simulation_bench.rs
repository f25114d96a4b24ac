use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lbsim_core::config::SimConfig;

fn bench_config(policy: &str, servers: usize) -> SimConfig {
    SimConfig::from_str(&format!(
        r#"
[simulation]
name = "bench"
seed = 42
duration_ms = 60000

[sources]
count = 10
global_rps = 200

[servers]
count = {}
latency_jitter_ms = 100

[network]
delay_ms = 50

[balancer]
policy = "{}"
"#,
        servers, policy
    ))
    .unwrap()
}

fn bench_policy(c: &mut Criterion, policy: &str) {
    let config = bench_config(policy, 20);

    c.bench_function(&format!("simulate_60s_200rps_20_servers_{policy}"), |b| {
        b.iter(|| lbsim_core::run_simulation(black_box(config.clone())).unwrap())
    });
}

fn bench_round_robin(c: &mut Criterion) {
    bench_policy(c, "roundrobin");
}

fn bench_least_loaded(c: &mut Criterion) {
    bench_policy(c, "leastloaded");
}

fn bench_aperture(c: &mut Criterion) {
    bench_policy(c, "aperture");
}

criterion_group!(benches, bench_round_robin, bench_least_loaded, bench_aperture);
criterion_main!(benches);
