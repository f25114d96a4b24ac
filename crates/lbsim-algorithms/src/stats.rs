//! Per-link predictive load estimator.
//!
//! One [`Stats`] exists for every (source, server) pair. It tracks how many
//! requests the source has outstanding on that server, a streaming median of
//! completed round-trip times, and the integral of the outstanding count over
//! time ("instantaneous duration"). [`Stats::predictive_load`] combines these
//! into a single score that load-aware policies rank servers by.
//!
//! All timestamps are virtual milliseconds supplied by the caller.

use crate::sliding_median::{SlidingMedian, DEFAULT_MEDIAN_WINDOW};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weight given to a link that has outstanding requests but no completed
/// round trip yet. Large enough to steer traffic to proven links, while
/// `+ outstanding` still orders unproven links by pending load.
pub const STARTUP_PENALTY: f64 = 100_000.0 / 2.0 - 1.0;

/// Factor applied to the median when an idle link decays.
pub const DECAY_FACTOR: f64 = 0.9;

/// Default inactivity threshold before an idle link's median decays.
pub const DEFAULT_INACTIVITY_PERIOD_MS: f64 = 1000.0;

/// Running statistics for one source→server link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    outstanding: u32,
    instantaneous_duration: f64,
    /// Last time a request was sent on this link.
    last_send_ms: f64,
    /// Last time a request was sent or a response received.
    last_event_ms: f64,
    inactivity_period_ms: f64,
    median: SlidingMedian,
}

impl Stats {
    pub fn new(now_ms: f64, inactivity_period_ms: f64) -> Self {
        Self {
            outstanding: 0,
            instantaneous_duration: 0.0,
            last_send_ms: now_ms,
            last_event_ms: now_ms,
            inactivity_period_ms,
            median: SlidingMedian::new(DEFAULT_MEDIAN_WINDOW),
        }
    }

    /// Record a request sent on this link.
    pub fn on_send(&mut self, now_ms: f64) {
        self.accumulate(now_ms);
        self.outstanding += 1;
        self.last_send_ms = now_ms;
        self.last_event_ms = now_ms;
    }

    /// Record a response for a request originally sent at `original_send_ms`.
    ///
    /// Returns the round-trip time that was fed into the median.
    pub fn on_complete(&mut self, now_ms: f64, original_send_ms: f64) -> f64 {
        let rtt = (now_ms - original_send_ms).max(0.0);
        self.accumulate(now_ms);
        self.instantaneous_duration = (self.instantaneous_duration - rtt).max(0.0);
        // Servers can disappear with requests in flight.
        self.outstanding = self.outstanding.saturating_sub(1);
        self.last_event_ms = now_ms;
        self.median.insert(rtt);
        rtt
    }

    /// Score used to rank this link; lower is better.
    ///
    /// This is a query with a side effect: when the link has been idle for
    /// longer than the inactivity period, the median is decayed by inserting
    /// an artificial lower sample and the stamps are refreshed. A slow link
    /// therefore recovers its ranking after it stops being used.
    pub fn predictive_load(&mut self, now_ms: f64) -> f64 {
        let prediction = self.median.estimate();
        let since_send = now_ms - self.last_send_ms;
        let outstanding = f64::from(self.outstanding);

        let weight = if prediction == 0.0 {
            if self.outstanding == 0 {
                0.0
            } else {
                STARTUP_PENALTY + outstanding
            }
        } else if self.outstanding == 0 && since_send > self.inactivity_period_ms {
            let lower = prediction * DECAY_FACTOR;
            self.median.insert(lower);
            self.last_send_ms = now_ms;
            self.last_event_ms = now_ms;
            debug!(from = prediction, to = lower, "decaying idle link median");
            self.median.estimate()
        } else {
            let predicted = prediction * outstanding;
            let instant = self.instant_duration_at(now_ms);
            if self.outstanding != 0 && predicted < instant {
                instant / outstanding
            } else {
                prediction
            }
        };

        weight * (outstanding + 1.0)
    }

    /// Instantaneous duration including the interval since the last event.
    pub fn instant_duration_at(&self, now_ms: f64) -> f64 {
        self.instantaneous_duration + (now_ms - self.last_event_ms).max(0.0) * f64::from(self.outstanding)
    }

    pub fn median(&self) -> f64 {
        self.median.estimate()
    }

    pub fn outstanding(&self) -> u32 {
        self.outstanding
    }

    pub fn instantaneous_duration(&self) -> f64 {
        self.instantaneous_duration
    }

    pub fn inactivity_period_ms(&self) -> f64 {
        self.inactivity_period_ms
    }

    pub fn set_inactivity_period_ms(&mut self, ms: f64) {
        self.inactivity_period_ms = ms;
    }

    pub fn last_send_ms(&self) -> f64 {
        self.last_send_ms
    }

    fn accumulate(&mut self, now_ms: f64) {
        let elapsed = now_ms - self.last_event_ms;
        self.instantaneous_duration =
            (self.instantaneous_duration + elapsed * f64::from(self.outstanding)).max(0.0);
    }
}
