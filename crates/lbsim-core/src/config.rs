//! TOML configuration parsing for lbsim.
//!
//! Defines the configuration schema for a simulation run: topology, traffic,
//! network, balancing policy and the shape of the latency collectors. Every
//! section and field has a default, so an empty file is a valid config.

use crate::distributions::{LatencyModel, WorkDistribution};
use lbsim_algorithms::{ApertureConfig, Policy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub sources: SourcesSection,
    #[serde(default)]
    pub servers: ServersSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub balancer: BalancerSection,
    #[serde(default)]
    pub predictive: PredictiveSection,
    #[serde(default)]
    pub histogram: HistogramSection,
    #[serde(default)]
    pub latency_series: LatencySeriesSection,
}

/// General simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Human-readable name for this simulation.
    #[serde(default = "default_sim_name")]
    pub name: String,
    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Virtual run length for `run`, in model milliseconds.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Speed multiplier: every model duration is divided by this.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    /// Stop emitting new requests.
    #[serde(default)]
    pub emit_paused: bool,
    /// Most recent per-request records kept for end-of-run percentiles.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

fn default_sim_name() -> String {
    "simulation".to_string()
}
fn default_seed() -> u64 {
    42
}
fn default_duration_ms() -> u64 {
    60_000
}
fn default_time_scale() -> f64 {
    1.0
}
fn default_max_records() -> usize {
    100_000
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            name: default_sim_name(),
            seed: default_seed(),
            duration_ms: default_duration_ms(),
            time_scale: default_time_scale(),
            emit_paused: false,
            max_records: default_max_records(),
        }
    }
}

/// Traffic sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesSection {
    #[serde(default = "default_count")]
    pub count: usize,
    /// Requests per second emitted across all sources.
    #[serde(default = "default_global_rps")]
    pub global_rps: f64,
    /// Work amount carried by each request.
    #[serde(default)]
    pub work: WorkDistribution,
}

fn default_count() -> usize {
    1
}
fn default_global_rps() -> f64 {
    5.0
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            count: default_count(),
            global_rps: default_global_rps(),
            work: WorkDistribution::default(),
        }
    }
}

/// Server fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServersSection {
    #[serde(default = "default_count")]
    pub count: usize,
    /// Scale of the random term added to processing latency.
    #[serde(default = "default_latency_jitter_ms")]
    pub latency_jitter_ms: f64,
    #[serde(default)]
    pub gc: GcSection,
}

fn default_latency_jitter_ms() -> f64 {
    100.0
}

impl Default for ServersSection {
    fn default() -> Self {
        Self {
            count: default_count(),
            latency_jitter_ms: default_latency_jitter_ms(),
            gc: GcSection::default(),
        }
    }
}

/// Periodic GC pauses on a random server. Disabled when `interval_ms` is 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcSection {
    #[serde(default)]
    pub interval_ms: f64,
    #[serde(default = "default_gc_pause_ms")]
    pub pause_ms: f64,
}

fn default_gc_pause_ms() -> f64 {
    500.0
}

impl Default for GcSection {
    fn default() -> Self {
        Self {
            interval_ms: 0.0,
            pause_ms: default_gc_pause_ms(),
        }
    }
}

impl GcSection {
    pub fn enabled(&self) -> bool {
        self.interval_ms > 0.0 && self.pause_ms > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSection {
    /// One-way network delay in model milliseconds.
    #[serde(default = "default_network_delay_ms")]
    pub delay_ms: f64,
}

fn default_network_delay_ms() -> f64 {
    750.0
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            delay_ms: default_network_delay_ms(),
        }
    }
}

/// Load balancing policy selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalancerSection {
    /// `random`, `roundrobin`, `leastloaded`, `aperture`,
    /// `aperture-random` or `aperture-static`.
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub aperture: ApertureSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApertureSection {
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_min_ratio")]
    pub min_ratio: f64,
    #[serde(default = "default_max_ratio")]
    pub max_ratio: f64,
    #[serde(default = "default_refresh_period_ms")]
    pub refresh_period_ms: f64,
    #[serde(default = "default_min_refresh_period_ms")]
    pub min_refresh_period_ms: f64,
}

fn default_min_connections() -> usize {
    3
}
fn default_max_connections() -> usize {
    20
}
fn default_min_ratio() -> f64 {
    1.0
}
fn default_max_ratio() -> f64 {
    2.0
}
fn default_refresh_period_ms() -> f64 {
    3000.0
}
fn default_min_refresh_period_ms() -> f64 {
    1000.0
}

impl Default for ApertureSection {
    fn default() -> Self {
        Self {
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            min_ratio: default_min_ratio(),
            max_ratio: default_max_ratio(),
            refresh_period_ms: default_refresh_period_ms(),
            min_refresh_period_ms: default_min_refresh_period_ms(),
        }
    }
}

impl From<ApertureSection> for ApertureConfig {
    fn from(s: ApertureSection) -> Self {
        ApertureConfig {
            min_connections: s.min_connections,
            max_connections: s.max_connections,
            min_ratio: s.min_ratio,
            max_ratio: s.max_ratio,
            refresh_period_ms: s.refresh_period_ms,
            min_refresh_period_ms: s.min_refresh_period_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveSection {
    /// Idle time after which a link's median latency starts decaying.
    #[serde(default = "default_inactivity_period_ms")]
    pub inactivity_period_ms: f64,
}

fn default_inactivity_period_ms() -> f64 {
    1000.0
}

impl Default for PredictiveSection {
    fn default() -> Self {
        Self {
            inactivity_period_ms: default_inactivity_period_ms(),
        }
    }
}

/// Shape of the windowed latency histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSection {
    #[serde(default = "default_bucket_ms")]
    pub bucket_ms: f64,
    /// Latencies at or above this are dropped.
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: f64,
    #[serde(default = "default_slots")]
    pub slots: usize,
    #[serde(default = "default_period_ms")]
    pub period_ms: f64,
}

fn default_bucket_ms() -> f64 {
    10.0
}
fn default_max_duration_ms() -> f64 {
    60_000.0
}
fn default_slots() -> usize {
    20
}
fn default_period_ms() -> f64 {
    1000.0
}

impl Default for HistogramSection {
    fn default() -> Self {
        Self {
            bucket_ms: default_bucket_ms(),
            max_duration_ms: default_max_duration_ms(),
            slots: default_slots(),
            period_ms: default_period_ms(),
        }
    }
}

/// Rolling latency series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySeriesSection {
    #[serde(default = "default_window_ms")]
    pub window_ms: f64,
    #[serde(default = "default_median_window")]
    pub median_window: usize,
    /// Time constant of the smoothing average.
    #[serde(default = "default_smoothing_ms")]
    pub smoothing_ms: f64,
}

fn default_window_ms() -> f64 {
    30_000.0
}
fn default_median_window() -> usize {
    16
}
fn default_smoothing_ms() -> f64 {
    75.0
}

impl Default for LatencySeriesSection {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            median_window: default_median_window(),
            smoothing_ms: default_smoothing_ms(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Validation(msg));

        if !(self.simulation.time_scale > 0.0 && self.simulation.time_scale.is_finite()) {
            return invalid(format!(
                "time_scale must be > 0, got {}",
                self.simulation.time_scale
            ));
        }
        if self.simulation.max_records == 0 {
            return invalid("max_records must be > 0".to_string());
        }
        if !(self.sources.global_rps >= 0.0 && self.sources.global_rps.is_finite()) {
            return invalid(format!(
                "global_rps must be >= 0, got {}",
                self.sources.global_rps
            ));
        }
        if let Err(msg) = self.sources.work.check() {
            return invalid(msg);
        }
        if self.servers.latency_jitter_ms.is_nan() || self.servers.latency_jitter_ms < 0.0 {
            return invalid("latency_jitter_ms must be >= 0".to_string());
        }
        if self.servers.gc.interval_ms < 0.0 || self.servers.gc.pause_ms < 0.0 {
            return invalid("gc interval_ms and pause_ms must be >= 0".to_string());
        }
        if !(self.network.delay_ms >= 0.0 && self.network.delay_ms.is_finite()) {
            return invalid(format!(
                "network delay_ms must be >= 0, got {}",
                self.network.delay_ms
            ));
        }

        let ap = &self.balancer.aperture;
        if ap.min_connections > ap.max_connections {
            return invalid(format!(
                "aperture min_connections ({}) must be <= max_connections ({})",
                ap.min_connections, ap.max_connections
            ));
        }
        if ap.min_ratio > ap.max_ratio {
            return invalid(format!(
                "aperture min_ratio ({}) must be <= max_ratio ({})",
                ap.min_ratio, ap.max_ratio
            ));
        }
        if ap.refresh_period_ms < 0.0 || ap.min_refresh_period_ms < 0.0 {
            return invalid("aperture refresh periods must be >= 0".to_string());
        }

        if self.predictive.inactivity_period_ms < 0.0 {
            return invalid("inactivity_period_ms must be >= 0".to_string());
        }

        let h = &self.histogram;
        if h.bucket_ms <= 0.0 {
            return invalid("histogram bucket_ms must be > 0".to_string());
        }
        if h.max_duration_ms < h.bucket_ms {
            return invalid(format!(
                "histogram max_duration_ms ({}) must be >= bucket_ms ({})",
                h.max_duration_ms, h.bucket_ms
            ));
        }
        if h.slots == 0 {
            return invalid("histogram slots must be > 0".to_string());
        }
        if h.period_ms <= 0.0 {
            return invalid("histogram period_ms must be > 0".to_string());
        }

        if self.latency_series.median_window == 0 {
            return invalid("latency_series median_window must be > 0".to_string());
        }
        if self.latency_series.window_ms <= 0.0 {
            return invalid("latency_series window_ms must be > 0".to_string());
        }
        Ok(())
    }

    pub fn aperture_config(&self) -> ApertureConfig {
        self.balancer.aperture.clone().into()
    }

    pub fn latency_model(&self) -> LatencyModel {
        LatencyModel::new(self.servers.latency_jitter_ms)
    }
}
