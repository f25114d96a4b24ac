//! Virtual clock for discrete-event simulation.
//!
//! The [`SimClock`] only moves when the driver pops an event, so a run is
//! deterministic for a given seed regardless of host speed. Time is kept in
//! whole microseconds; the per-link estimators and histograms read it as
//! fractional milliseconds.

use serde::{Deserialize, Serialize};

/// Convert a (possibly fractional) millisecond duration to microseconds,
/// rounding to the nearest microsecond and clamping negatives to zero.
pub fn ms_to_us(ms: f64) -> u64 {
    if ms.is_finite() && ms > 0.0 {
        (ms * 1000.0).round() as u64
    } else {
        0
    }
}

/// Virtual simulation clock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimClock {
    /// Current simulation time in microseconds.
    current_us: u64,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    pub fn new() -> Self {
        Self { current_us: 0 }
    }

    /// Current time in whole milliseconds (truncated).
    pub fn now_ms(&self) -> u64 {
        self.current_us / 1000
    }

    /// Current time in fractional milliseconds.
    pub fn now_ms_f64(&self) -> f64 {
        self.current_us as f64 / 1000.0
    }

    /// Current time in microseconds.
    pub fn now_us(&self) -> u64 {
        self.current_us
    }

    /// Advance the clock to a specific time in microseconds.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if `us` is in the past.
    pub fn advance_to_us(&mut self, us: u64) {
        debug_assert!(
            us >= self.current_us,
            "Cannot move clock backwards: current={}us, target={}us",
            self.current_us,
            us,
        );
        self.current_us = us;
    }
}
