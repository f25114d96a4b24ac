//! lbsim: discrete-event simulator for client/server load balancing.
//!
//! This crate provides the core simulation engine: sources emitting
//! requests, servers with FIFO queues, GC pauses and a latency model, and
//! the network legs in between. Load-balancing policies from
//! `lbsim-algorithms` pick a server for each request, one balancer instance
//! per source.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  route   ┌───────────┐  complete  ┌──────────────┐
//! │ Sources  │─────────▶│  Engine   │───────────▶│  Histogram / │
//! │ Stats[]  │◀─────────│ (Events)  │            │  Metrics     │
//! │ Balancer │  RTT     └─────┬─────┘            └──────────────┘
//! └──────────┘                │ network delay
//!          ┌──────────────────┼──────────────────┐
//!          ▼                  ▼                  ▼
//!    ┌──────────┐       ┌──────────┐       ┌──────────┐
//!    │ Server 0 │       │ Server 1 │       │ Server N │
//!    │  Queue   │       │  Queue   │       │  Queue   │
//!    │  GC      │       │  GC      │       │  GC      │
//!    └──────────┘       └──────────┘       └──────────┘
//! ```

pub mod clock;
pub mod config;
pub mod distributions;
pub mod engine;
pub mod histogram;
pub mod latency_series;
pub mod logging;
pub mod metrics;
pub mod request;
pub mod scheduler;
pub mod server;
pub mod snapshot;
pub mod source;

// Re-export key types for convenience.
pub use clock::SimClock;
pub use config::{ConfigError, SimConfig};
pub use distributions::{LatencyModel, WorkDistribution};
pub use engine::{SimEvent, Simulation, CANCEL_PENALTY_MS};
pub use histogram::{Histogram, HistogramError, WindowedHistogram};
pub use latency_series::{LatencyPoint, LatencySeries};
pub use logging::init_logging;
pub use metrics::{MetricsCollector, SimulationMetrics};
pub use request::{Direction, Request};
pub use server::Server;
pub use snapshot::SimulationSnapshot;
pub use source::Source;

use lbsim_algorithms::Policy;

/// Run a complete simulation for `[simulation].duration_ms` of virtual time.
pub fn run_simulation(config: SimConfig) -> Result<SimulationMetrics, ConfigError> {
    let duration = config.simulation.duration_ms as f64;
    let mut sim = Simulation::new(config)?;
    sim.start();
    sim.run_until(duration);
    Ok(sim.shutdown())
}

/// Run the same config under each named policy. Unknown names are skipped.
pub fn compare_policies(
    config: &SimConfig,
    policy_names: &[&str],
) -> Result<Vec<SimulationMetrics>, ConfigError> {
    let mut results = Vec::new();
    for name in policy_names {
        let Ok(policy) = name.parse::<Policy>() else {
            tracing::warn!(policy = %name, "Skipping unknown policy");
            continue;
        };
        let mut cfg = config.clone();
        cfg.balancer.policy = policy;
        results.push(run_simulation(cfg)?);
    }
    Ok(results)
}
