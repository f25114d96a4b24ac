//! Read-only views of simulation state for external consumers.
//!
//! Renderers and dashboards poll these; nothing here holds a reference back
//! into the simulation.

use crate::latency_series::LatencyPoint;
use serde::Serialize;

/// One server's queue and GC state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerSnapshot {
    pub id: usize,
    pub queue_len: usize,
    pub active: bool,
    /// A GC pause is pending or in progress.
    pub gc: bool,
    pub request_count: u64,
    pub served: u64,
}

/// One source→server link as seen by the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkSnapshot {
    pub server: usize,
    pub load: u32,
    pub outstanding: u32,
    pub median_ms: f64,
    pub predictive_load: f64,
    /// The server is inside the source's aperture (always true for
    /// policies without a subset).
    pub in_subset: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSnapshot {
    pub id: usize,
    pub emitted: u64,
    pub links: Vec<LinkSnapshot>,
}

/// Aggregate view of the windowed latency histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub bucket_ms: f64,
    /// Aggregated counts up to the highest nonzero bucket.
    pub buckets: Vec<u64>,
    pub max_count: u64,
    pub total: u64,
    pub p50_ms: f64,
    pub p99_ms: f64,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSnapshot {
    pub now_ms: f64,
    pub policy: String,
    pub in_flight: usize,
    pub servers: Vec<ServerSnapshot>,
    pub sources: Vec<SourceSnapshot>,
    pub histogram: HistogramSnapshot,
    pub latency: Vec<LatencyPoint>,
    pub smoothed_median_ms: f64,
}
