//! Rolling end-to-end latency series.
//!
//! Every completed request appends a point carrying its raw latency and a
//! smoothed median: a [`SlidingMedian`] of recent latencies fed through an
//! exponentially weighted moving average whose weight decays with the
//! virtual time between samples.

use lbsim_algorithms::SlidingMedian;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One completed request in the series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyPoint {
    /// Completion time (virtual ms).
    pub t: f64,
    /// Raw end-to-end latency (ms).
    pub latency: f64,
    /// Smoothed median latency at `t` (ms).
    pub median: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySeries {
    window_ms: f64,
    smoothing_ms: f64,
    median: SlidingMedian,
    ewma: f64,
    prev_t: Option<f64>,
    points: VecDeque<LatencyPoint>,
}

impl LatencySeries {
    pub fn new(window_ms: f64, median_window: usize, smoothing_ms: f64) -> Self {
        Self {
            window_ms,
            smoothing_ms,
            median: SlidingMedian::new(median_window),
            ewma: 0.0,
            prev_t: None,
            points: VecDeque::new(),
        }
    }

    /// Append a latency observed at virtual time `t`.
    pub fn add(&mut self, t: f64, latency: f64) {
        self.median.insert(latency);
        let m = self.median.estimate();

        let dt = self.prev_t.map_or(f64::INFINITY, |p| (t - p).max(0.0));
        self.prev_t = Some(t);
        let w = if self.smoothing_ms > 0.0 {
            (-dt / self.smoothing_ms).exp()
        } else {
            0.0
        };
        self.ewma = w * self.ewma + (1.0 - w) * m;

        self.points.push_back(LatencyPoint {
            t,
            latency,
            median: self.ewma,
        });
        self.trim(t);
    }

    /// Drop points at or before `now - window`.
    pub fn trim(&mut self, now: f64) {
        let cutoff = now - self.window_ms;
        while self.points.front().is_some_and(|p| p.t <= cutoff) {
            self.points.pop_front();
        }
    }

    pub fn points(&self) -> impl Iterator<Item = &LatencyPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Latest smoothed median, or 0 before any sample.
    pub fn smoothed_median(&self) -> f64 {
        self.ewma
    }

    /// Raw latency at the `q` quantile of retained points (nearest rank).
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        let mut values: Vec<f64> = self.points.iter().map(|p| p.latency).collect();
        values.sort_by(f64::total_cmp);
        let k = ((values.len() as f64 * q).floor() as usize).min(values.len() - 1);
        Some(values[k])
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.ewma = 0.0;
        self.prev_t = None;
    }
}
