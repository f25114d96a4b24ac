//! Metrics collection and aggregation for simulation runs.
//!
//! Tracks per-request end-to-end latency and round-trip time, request
//! outcome counts, throughput and how evenly servers shared the work.

use crate::server::Server;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-request completion record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetric {
    pub request_id: u64,
    pub source: usize,
    pub server: usize,
    /// Virtual time the request left its source (ms).
    pub send_ms: f64,
    /// Virtual time the response landed (ms).
    pub completed_ms: f64,
    /// Model latency: network both ways, processing and queueing (ms).
    pub latency_ms: f64,
}

impl RequestMetric {
    /// Virtual round-trip time as seen by the source.
    pub fn rtt_ms(&self) -> f64 {
        (self.completed_ms - self.send_ms).max(0.0)
    }
}

/// Percentile values for a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Percentiles {
    /// Compute percentiles from a slice of values.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                p50: 0.0,
                p75: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;

        Self {
            p50: percentile_sorted(&sorted, 50.0),
            p75: percentile_sorted(&sorted, 75.0),
            p90: percentile_sorted(&sorted, 90.0),
            p95: percentile_sorted(&sorted, 95.0),
            p99: percentile_sorted(&sorted, 99.0),
            min: sorted[0],
            max: sorted[n - 1],
            mean,
        }
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Aggregated metrics for an entire simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationMetrics {
    /// Policy name.
    pub policy: String,
    /// Virtual time covered by the run in ms.
    pub duration_ms: u64,
    /// Requests sent by sources.
    pub emitted_requests: u64,
    /// Responses that made it back to their source.
    pub completed_requests: u64,
    /// Requests the balancer could not place.
    pub rejected_requests: u64,
    /// Requests lost because their server was removed.
    pub cancelled_requests: u64,
    /// Requests discarded because their source was removed.
    pub dropped_requests: u64,
    /// Requests still on the wire or queued when the run ended.
    pub in_flight_requests: u64,

    // Latency
    pub end_to_end_latency: Percentiles,
    pub round_trip: Percentiles,
    pub windowed_p50_ms: f64,
    pub windowed_p99_ms: f64,

    // Throughput
    pub requests_per_sec: f64,

    // Fairness
    pub per_server_requests: Vec<u64>,
    pub load_cv: f64,
    pub jains_fairness_index: f64,
    pub max_min_queue_ratio: f64,

    // Custom policy metrics
    pub custom_metrics: HashMap<String, f64>,
}

/// Collector that accumulates per-request metrics during simulation.
///
/// Outcome counts are exact for the whole run. Per-request records are
/// bounded: once `2 * record_limit` pile up, the oldest are discarded so
/// at least the latest `record_limit` survive, and latency percentiles are
/// computed over what is retained.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    records: Vec<RequestMetric>,
    record_limit: usize,
    completed: u64,
    emitted: u64,
    rejected: u64,
    cancelled: u64,
    dropped: u64,
}

/// End-of-run state the collector cannot see on its own.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub duration_ms: u64,
    pub in_flight: u64,
    pub windowed_p50_ms: f64,
    pub windowed_p99_ms: f64,
    pub custom_metrics: HashMap<String, f64>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_record_limit(DEFAULT_RECORD_LIMIT)
    }
}

/// Records retained by [`MetricsCollector::new`].
pub const DEFAULT_RECORD_LIMIT: usize = 100_000;

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record_limit(limit: usize) -> Self {
        Self {
            records: Vec::new(),
            record_limit: limit.max(1),
            completed: 0,
            emitted: 0,
            rejected: 0,
            cancelled: 0,
            dropped: 0,
        }
    }

    /// Record a completed request.
    pub fn record(&mut self, metric: RequestMetric) {
        self.completed += 1;
        self.records.push(metric);
        if self.records.len() >= 2 * self.record_limit {
            let excess = self.records.len() - self.record_limit;
            self.records.drain(..excess);
        }
    }

    pub fn record_emitted(&mut self) {
        self.emitted += 1;
    }

    /// Record a rejected request.
    pub fn record_rejection(&mut self) {
        self.rejected += 1;
    }

    pub fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    pub fn record_dropped(&mut self) {
        self.dropped += 1;
    }

    /// Number of completed requests over the whole run.
    pub fn completed_count(&self) -> u64 {
        self.completed
    }

    pub fn emitted_count(&self) -> u64 {
        self.emitted
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    pub fn cancelled_count(&self) -> u64 {
        self.cancelled
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Retained completion records, oldest first.
    pub fn records(&self) -> &[RequestMetric] {
        &self.records
    }

    pub fn record_limit(&self) -> usize {
        self.record_limit
    }

    /// Aggregate all metrics into a summary over the active `servers`.
    pub fn aggregate(&self, policy: &str, servers: &[Server], run: RunSummary) -> SimulationMetrics {
        let latency_values: Vec<f64> = self.records.iter().map(|r| r.latency_ms).collect();
        let rtt_values: Vec<f64> = self.records.iter().map(RequestMetric::rtt_ms).collect();

        let completed = self.completed;
        let duration_sec = run.duration_ms as f64 / 1000.0;

        let per_server_requests: Vec<u64> = servers.iter().map(|s| s.served).collect();
        let load_cv = coefficient_of_variation(&per_server_requests);
        let jains = jains_fairness_index(&per_server_requests);
        let max_queue = servers.iter().map(|s| s.queue.len()).max().unwrap_or(0) as f64;
        let min_queue = servers
            .iter()
            .map(|s| s.queue.len())
            .min()
            .unwrap_or(0)
            .max(1) as f64;

        SimulationMetrics {
            policy: policy.to_string(),
            duration_ms: run.duration_ms,
            emitted_requests: self.emitted,
            completed_requests: completed,
            rejected_requests: self.rejected,
            cancelled_requests: self.cancelled,
            dropped_requests: self.dropped,
            in_flight_requests: run.in_flight,
            end_to_end_latency: Percentiles::from_values(&latency_values),
            round_trip: Percentiles::from_values(&rtt_values),
            windowed_p50_ms: run.windowed_p50_ms,
            windowed_p99_ms: run.windowed_p99_ms,
            requests_per_sec: if duration_sec > 0.0 {
                completed as f64 / duration_sec
            } else {
                0.0
            },
            per_server_requests,
            load_cv,
            jains_fairness_index: jains,
            max_min_queue_ratio: if max_queue == 0.0 {
                1.0 // All queues empty means perfectly balanced
            } else {
                max_queue / min_queue
            },
            custom_metrics: run.custom_metrics,
        }
    }
}

/// Coefficient of variation (std / mean).
pub fn coefficient_of_variation(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<u64>() as f64 / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt() / mean
}

/// Jain's fairness index: (sum(x_i))^2 / (n * sum(x_i^2)).
pub fn jains_fairness_index(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    let sum_sq: f64 = values.iter().map(|&v| (v as f64).powi(2)).sum();
    if sum_sq == 0.0 {
        return 1.0;
    }
    (sum * sum) / (n * sum_sq)
}

/// Format metrics as a pretty-printed table string.
pub fn format_table(metrics: &SimulationMetrics) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{:=<70}\n",
        format!("  {} Results  ", metrics.policy)
    ));
    out.push_str(&format!(
        "  Duration: {:.1}s | Emitted: {} | Completed: {} | In flight: {}\n",
        metrics.duration_ms as f64 / 1000.0,
        metrics.emitted_requests,
        metrics.completed_requests,
        metrics.in_flight_requests,
    ));
    out.push_str(&format!(
        "  Rejected: {} | Cancelled: {} | Dropped: {}\n",
        metrics.rejected_requests, metrics.cancelled_requests, metrics.dropped_requests
    ));
    out.push_str(&format!("{:-<70}\n", "  Latency  "));
    out.push_str(&format!(
        "  E2E (ms)        P50={:>8.1}  P90={:>8.1}  P99={:>8.1}\n",
        metrics.end_to_end_latency.p50,
        metrics.end_to_end_latency.p90,
        metrics.end_to_end_latency.p99
    ));
    out.push_str(&format!(
        "  RTT (ms)        P50={:>8.1}  P90={:>8.1}  P99={:>8.1}\n",
        metrics.round_trip.p50, metrics.round_trip.p90, metrics.round_trip.p99
    ));
    out.push_str(&format!(
        "  Window (ms)     P50={:>8.1}  P99={:>8.1}\n",
        metrics.windowed_p50_ms, metrics.windowed_p99_ms
    ));
    out.push_str(&format!("{:-<70}\n", "  Throughput  "));
    out.push_str(&format!(
        "  Requests/sec: {:.2}\n",
        metrics.requests_per_sec
    ));
    out.push_str(&format!("{:-<70}\n", "  Fairness  "));
    out.push_str(&format!(
        "  Load CV: {:.3}  Jain's index: {:.4}  Max/min queue: {:.1}\n",
        metrics.load_cv, metrics.jains_fairness_index, metrics.max_min_queue_ratio,
    ));
    if !metrics.custom_metrics.is_empty() {
        out.push_str(&format!("{:-<70}\n", "  Policy  "));
        let mut keys: Vec<_> = metrics.custom_metrics.keys().collect();
        keys.sort();
        for key in keys {
            out.push_str(&format!("  {}: {:.2}\n", key, metrics.custom_metrics[key]));
        }
    }
    out.push_str(&format!("{:=<70}\n", ""));
    out
}

/// Format a comparison table of multiple policy results.
pub fn format_comparison_table(results: &[SimulationMetrics]) -> String {
    if results.is_empty() {
        return String::from("No results to compare.\n");
    }

    let mut out = String::new();
    out.push_str(&format!("\n{:=<90}\n", "  Policy Comparison  "));
    out.push_str(&format!(
        "{:<18} {:>9} {:>9} {:>9} {:>9} {:>9} {:>8} {:>8}\n",
        "Policy", "E2E p50", "E2E p99", "Win p99", "Req/s", "Rejected", "Load CV", "Jain's"
    ));
    out.push_str(&format!("{:-<90}\n", ""));

    for m in results {
        out.push_str(&format!(
            "{:<18} {:>9.1} {:>9.1} {:>9.1} {:>9.2} {:>9} {:>8.3} {:>8.4}\n",
            m.policy,
            m.end_to_end_latency.p50,
            m.end_to_end_latency.p99,
            m.windowed_p99_ms,
            m.requests_per_sec,
            m.rejected_requests,
            m.load_cv,
            m.jains_fairness_index,
        ));
    }
    out.push_str(&format!("{:=<90}\n", ""));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::LatencyModel;

    fn metric(id: u64, latency: f64) -> RequestMetric {
        RequestMetric {
            request_id: id,
            source: 0,
            server: 0,
            send_ms: 0.0,
            completed_ms: latency,
            latency_ms: latency,
        }
    }

    #[test]
    fn test_percentiles_empty() {
        let p = Percentiles::from_values(&[]);
        assert_eq!(p.p50, 0.0);
        assert_eq!(p.mean, 0.0);
    }

    #[test]
    fn test_percentiles_distribution() {
        let values: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let p = Percentiles::from_values(&values);
        assert!((p.p50 - 50.0).abs() < 2.0);
        assert!((p.p99 - 99.0).abs() < 2.0);
        assert_eq!(p.min, 1.0);
        assert_eq!(p.max, 100.0);
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation(&[]), 0.0);
        assert_eq!(coefficient_of_variation(&[5, 5, 5, 5]), 0.0);
        assert!(coefficient_of_variation(&[1, 2, 3, 4, 5]) > 0.0);
    }

    #[test]
    fn test_jains_fairness() {
        assert!((jains_fairness_index(&[100, 100, 100, 100]) - 1.0).abs() < 0.001);
        assert!(jains_fairness_index(&[100, 0, 0, 0]) < 0.5);
    }

    #[test]
    fn test_aggregate_counts_and_throughput() {
        let mut c = MetricsCollector::new();
        for i in 0..10 {
            c.record_emitted();
            c.record(metric(i, 100.0 + i as f64));
        }
        c.record_emitted();
        c.record_rejection();
        c.record_cancelled();
        c.record_dropped();

        let mut servers = vec![
            Server::new(0, LatencyModel::default()),
            Server::new(1, LatencyModel::default()),
        ];
        servers[0].served = 6;
        servers[1].served = 4;

        let m = c.aggregate(
            "leastloaded",
            &servers,
            RunSummary {
                duration_ms: 2000,
                ..RunSummary::default()
            },
        );
        assert_eq!(m.policy, "leastloaded");
        assert_eq!(m.emitted_requests, 11);
        assert_eq!(m.completed_requests, 10);
        assert_eq!(m.rejected_requests, 1);
        assert_eq!(m.cancelled_requests, 1);
        assert_eq!(m.dropped_requests, 1);
        assert_eq!(m.requests_per_sec, 5.0);
        assert_eq!(m.per_server_requests, vec![6, 4]);
        assert_eq!(m.end_to_end_latency.min, 100.0);
        assert_eq!(m.max_min_queue_ratio, 1.0);
    }

    #[test]
    fn test_records_are_bounded() {
        let mut c = MetricsCollector::with_record_limit(4);
        for i in 0..7 {
            c.record(metric(i, i as f64));
        }
        assert_eq!(c.records().len(), 7);

        c.record(metric(7, 7.0));
        assert_eq!(c.completed_count(), 8);
        let ids: Vec<u64> = c.records().iter().map(|r| r.request_id).collect();
        assert_eq!(ids, vec![4, 5, 6, 7]);

        for i in 8..1000 {
            c.record(metric(i, i as f64));
        }
        assert!(c.records().len() < 8);
        assert_eq!(c.records().last().map(|r| r.request_id), Some(999));

        let m = c.aggregate("random", &[], RunSummary::default());
        assert_eq!(m.completed_requests, 1000);
        assert!(m.end_to_end_latency.min >= 992.0);
    }

    #[test]
    fn test_zero_record_limit_keeps_latest() {
        let mut c = MetricsCollector::with_record_limit(0);
        assert_eq!(c.record_limit(), 1);
        c.record(metric(0, 1.0));
        c.record(metric(1, 2.0));
        assert_eq!(c.records().len(), 1);
        assert_eq!(c.records()[0].request_id, 1);
        assert_eq!(c.completed_count(), 2);
    }

    #[test]
    fn test_format_tables_no_panic() {
        let c = MetricsCollector::new();
        let mut m = c.aggregate("random", &[], RunSummary::default());
        m.custom_metrics.insert("aperture_size".into(), 3.0);
        let table = format_table(&m);
        assert!(table.contains("random"));
        assert!(table.contains("E2E"));
        assert!(table.contains("aperture_size"));
        let cmp = format_comparison_table(&[m]);
        assert!(cmp.contains("Policy Comparison"));
        assert_eq!(format_comparison_table(&[]), "No results to compare.\n");
    }
}
