//! Streaming median over a bounded, sorted sample buffer.
//!
//! The estimator keeps at most `capacity` samples. When a new sample pushes
//! the buffer over capacity, one element is evicted from the side of the
//! pre-insertion median opposite to the new sample, so the buffer stays
//! balanced around the running median instead of simply forgetting the
//! oldest values.

use serde::{Deserialize, Serialize};

/// Default capacity used by per-link [`Stats`](crate::Stats).
pub const DEFAULT_MEDIAN_WINDOW: usize = 8;

/// Fixed-capacity streaming median estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlidingMedian {
    capacity: usize,
    /// Samples sorted ascending.
    buffer: Vec<f64>,
}

impl SlidingMedian {
    /// Create an estimator holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: Vec::with_capacity(capacity + 1),
        }
    }

    /// Insert a sample.
    pub fn insert(&mut self, x: f64) {
        if self.buffer.is_empty() {
            self.buffer.push(x);
            return;
        }

        let median = self.estimate();
        let pos = self.buffer.partition_point(|v| v.total_cmp(&x).is_le());
        self.buffer.insert(pos, x);

        if self.buffer.len() > self.capacity {
            if x <= median {
                self.buffer.pop();
            } else {
                self.buffer.remove(0);
            }
        }
    }

    /// Current median estimate, or 0 when no samples have been inserted.
    ///
    /// Even-sized buffers report the upper of the two middle elements
    /// (index `len / 2`).
    pub fn estimate(&self) -> f64 {
        if self.buffer.is_empty() {
            return 0.0;
        }
        self.buffer[self.buffer.len() / 2]
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained samples in ascending order.
    pub fn samples(&self) -> &[f64] {
        &self.buffer
    }
}

impl Default for SlidingMedian {
    fn default() -> Self {
        Self::new(DEFAULT_MEDIAN_WINDOW)
    }
}
