//! Fixed-bucket latency histograms.
//!
//! [`Histogram`] counts samples in equal-width buckets covering `[0, max)`.
//! [`WindowedHistogram`] keeps a ring of them, one per time period, so that
//! aggregate queries only see the most recent `slots × period` of samples.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistogramError {
    #[error(
        "histogram shape mismatch: {left_buckets} buckets of {left_size}ms vs {right_buckets} buckets of {right_size}ms"
    )]
    ShapeMismatch {
        left_buckets: usize,
        left_size: f64,
        right_buckets: usize,
        right_size: f64,
    },
}

/// Equal-width histogram over `[0, bucket_size × bucket_count)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    bucket_size: f64,
    buckets: Vec<u64>,
    max_count: u64,
    /// Highest bucket index holding a sample.
    max_index: Option<usize>,
}

impl Histogram {
    /// Create a histogram with `floor(max_duration / bucket_size)` buckets.
    pub fn new(bucket_size: f64, max_duration: f64) -> Self {
        let count = if bucket_size > 0.0 {
            (max_duration / bucket_size).floor().max(0.0) as usize
        } else {
            0
        };
        Self {
            bucket_size,
            buckets: vec![0; count],
            max_count: 0,
            max_index: None,
        }
    }

    /// Record a sample. Samples outside `[0, max)` are dropped and `false` is
    /// returned.
    pub fn add(&mut self, x: f64) -> bool {
        if x.is_nan() || x < 0.0 || x >= self.max() {
            return false;
        }
        let idx = (x / self.bucket_size).floor() as usize;
        let Some(bucket) = self.buckets.get_mut(idx) else {
            return false;
        };
        *bucket += 1;
        self.max_count = self.max_count.max(*bucket);
        self.max_index = Some(self.max_index.map_or(idx, |m| m.max(idx)));
        true
    }

    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(|b| *b = 0);
        self.max_count = 0;
        self.max_index = None;
    }

    /// Bucket-wise sum of two histograms of the same shape.
    pub fn merge(&self, other: &Histogram) -> Result<Histogram, HistogramError> {
        if self.buckets.len() != other.buckets.len() || self.bucket_size != other.bucket_size {
            return Err(HistogramError::ShapeMismatch {
                left_buckets: self.buckets.len(),
                left_size: self.bucket_size,
                right_buckets: other.buckets.len(),
                right_size: other.bucket_size,
            });
        }
        let buckets: Vec<u64> = self
            .buckets
            .iter()
            .zip(&other.buckets)
            .map(|(a, b)| a + b)
            .collect();
        let max_count = buckets.iter().copied().max().unwrap_or(0);
        let max_index = buckets.iter().rposition(|&b| b > 0);
        Ok(Histogram {
            bucket_size: self.bucket_size,
            buckets,
            max_count,
            max_index,
        })
    }

    /// Exclusive upper bound of recordable samples.
    pub fn max(&self) -> f64 {
        self.bucket_size * self.buckets.len() as f64
    }

    pub fn bucket_size(&self) -> f64 {
        self.bucket_size
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    pub fn bucket(&self, i: usize) -> u64 {
        self.buckets.get(i).copied().unwrap_or(0)
    }

    pub fn max_count(&self) -> u64 {
        self.max_count
    }

    pub fn max_index(&self) -> Option<usize> {
        self.max_index
    }

    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }
}

/// Ring of per-period histograms.
///
/// Slot `floor(now / period) mod K` receives samples recorded at `now`.
/// Moving into a new period clears every slot skipped since the last
/// recorded period, so stale data ages out after `K` periods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowedHistogram {
    slots: Vec<Histogram>,
    period_ms: f64,
    /// Absolute period index of the most recent advance.
    last_period: Option<u64>,
}

impl WindowedHistogram {
    pub fn new(slot_count: usize, period_ms: f64, bucket_size: f64, max_duration: f64) -> Self {
        let slot_count = slot_count.max(1);
        Self {
            slots: vec![Histogram::new(bucket_size, max_duration); slot_count],
            period_ms,
            last_period: None,
        }
    }

    fn period_of(&self, now_ms: f64) -> u64 {
        if self.period_ms > 0.0 && now_ms > 0.0 {
            (now_ms / self.period_ms).floor() as u64
        } else {
            0
        }
    }

    /// Move the window to `now_ms`, clearing slots for skipped periods.
    /// Returns the slot index for `now_ms`.
    pub fn advance(&mut self, now_ms: f64) -> usize {
        let k = self.slots.len();
        let current = self.period_of(now_ms);
        match self.last_period {
            Some(last) if current > last => {
                let skipped = (current - last).min(k as u64);
                for p in (current + 1 - skipped)..=current {
                    self.slots[(p % k as u64) as usize].clear();
                }
                self.last_period = Some(current);
            }
            Some(_) => {}
            None => self.last_period = Some(current),
        }
        (current % k as u64) as usize
    }

    /// Record a sample at `now_ms`.
    pub fn add(&mut self, x: f64, now_ms: f64) -> bool {
        let slot = self.advance(now_ms);
        self.slots[slot].add(x)
    }

    /// Count in bucket `i` summed across all slots.
    pub fn aggregate_bucket(&self, i: usize) -> u64 {
        self.slots.iter().map(|s| s.bucket(i)).sum()
    }

    /// Highest bucket index holding a sample in any slot.
    pub fn max_value(&self) -> Option<usize> {
        self.slots.iter().filter_map(Histogram::max_index).max()
    }

    /// Aggregated buckets up to and including the highest nonzero one.
    pub fn data(&self) -> Vec<u64> {
        match self.max_value() {
            Some(max) => (0..=max).map(|i| self.aggregate_bucket(i)).collect(),
            None => Vec::new(),
        }
    }

    /// Highest aggregated bucket count.
    pub fn max_count(&self) -> u64 {
        self.data().into_iter().max().unwrap_or(0)
    }

    /// Highest bucket count within any single slot.
    pub fn max_individual_count(&self) -> u64 {
        self.slots.iter().map(Histogram::max_count).max().unwrap_or(0)
    }

    /// Fractional bucket index below which a `q` share of samples fall.
    ///
    /// Interpolates linearly inside the bucket where the running count first
    /// exceeds `q × total`. Returns the last index when that never happens
    /// (`q ≥ 1`), and 0 when empty.
    pub fn percentile(&self, q: f64) -> f64 {
        percentile_of(&self.data(), q)
    }

    /// [`percentile`](Self::percentile) scaled to milliseconds.
    pub fn percentile_ms(&self, q: f64) -> f64 {
        self.percentile(q) * self.bucket_size()
    }

    pub fn total(&self) -> u64 {
        self.slots.iter().map(Histogram::total).sum()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(Histogram::clear);
        self.last_period = None;
    }

    pub fn slot(&self, i: usize) -> Option<&Histogram> {
        self.slots.get(i)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn period_ms(&self) -> f64 {
        self.period_ms
    }

    pub fn bucket_size(&self) -> f64 {
        self.slots.first().map_or(0.0, Histogram::bucket_size)
    }
}

/// Interpolated percentile over bucket counts. `q` is clamped to `[0, 1]`;
/// the fractional part is how far into the bucket the target rank falls.
pub fn percentile_of(data: &[u64], q: f64) -> f64 {
    let total: u64 = data.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let q = if q.is_nan() { 0.0 } else { q.clamp(0.0, 1.0) };
    let target = q * total as f64;
    let mut sum = 0u64;
    for (i, &count) in data.iter().enumerate() {
        let before = sum as f64;
        sum += count;
        if sum as f64 > target {
            return i as f64 + (target - before) / count as f64;
        }
    }
    (data.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_count_and_placement() {
        let mut h = Histogram::new(10.0, 100.0);
        assert_eq!(h.buckets().len(), 10);
        assert!(h.add(95.0));
        assert_eq!(h.bucket(9), 1);
        assert_eq!(h.max_index(), Some(9));
        assert_eq!(h.max_count(), 1);
    }

    #[test]
    fn test_sample_at_max_is_dropped() {
        let mut h = Histogram::new(10.0, 100.0);
        assert!(!h.add(100.0));
        assert!(!h.add(250.0));
        assert!(!h.add(-1.0));
        assert_eq!(h.total(), 0);
        assert_eq!(h.max_index(), None);
    }

    #[test]
    fn test_clear() {
        let mut h = Histogram::new(10.0, 100.0);
        h.add(5.0);
        h.add(5.0);
        h.clear();
        assert_eq!(h.total(), 0);
        assert_eq!(h.max_count(), 0);
    }

    #[test]
    fn test_merge_sums_buckets() {
        let mut a = Histogram::new(10.0, 100.0);
        let mut b = Histogram::new(10.0, 100.0);
        a.add(5.0);
        b.add(5.0);
        b.add(42.0);
        let m = a.merge(&b).unwrap();
        assert_eq!(m.bucket(0), 2);
        assert_eq!(m.bucket(4), 1);
        assert_eq!(m.max_count(), 2);
        assert_eq!(m.max_index(), Some(4));
    }

    #[test]
    fn test_merge_rejects_shape_mismatch() {
        let a = Histogram::new(10.0, 100.0);
        let b = Histogram::new(5.0, 100.0);
        assert!(matches!(
            a.merge(&b),
            Err(HistogramError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_window_clears_only_skipped_slots() {
        let mut w = WindowedHistogram::new(4, 1000.0, 10.0, 1000.0);
        w.add(15.0, 0.0); // slot 0
        w.add(25.0, 1000.0); // slot 1
        w.add(35.0, 2000.0); // slot 2
        assert_eq!(w.total(), 3);

        // period 5 -> slot 1; skipped periods 3,4,5 clear slots 3,0,1
        w.add(45.0, 5000.0);
        assert_eq!(w.slot(2).map(Histogram::total), Some(1));
        assert_eq!(w.slot(0).map(Histogram::total), Some(0));
        assert_eq!(w.slot(1).map(Histogram::total), Some(1));
        assert_eq!(w.aggregate_bucket(2), 0);
        assert_eq!(w.aggregate_bucket(3), 1);
        assert_eq!(w.aggregate_bucket(4), 1);
    }

    #[test]
    fn test_long_gap_clears_everything_once() {
        let mut w = WindowedHistogram::new(3, 100.0, 10.0, 1000.0);
        w.add(15.0, 0.0);
        w.add(15.0, 150.0);
        w.add(15.0, 1_000_000.0);
        assert_eq!(w.total(), 1);
    }

    #[test]
    fn test_same_period_accumulates() {
        let mut w = WindowedHistogram::new(3, 100.0, 10.0, 1000.0);
        w.add(15.0, 10.0);
        w.add(15.0, 90.0);
        assert_eq!(w.aggregate_bucket(1), 2);
        assert_eq!(w.max_individual_count(), 2);
    }

    #[test]
    fn test_data_ends_at_max_value() {
        let mut w = WindowedHistogram::new(2, 1000.0, 10.0, 1000.0);
        w.add(5.0, 0.0);
        w.add(33.0, 1000.0);
        assert_eq!(w.max_value(), Some(3));
        assert_eq!(w.data(), vec![1, 0, 0, 1]);
        assert_eq!(w.max_count(), 1);
    }

    #[test]
    fn test_percentile_one_returns_last_index() {
        let mut w = WindowedHistogram::new(2, 1000.0, 10.0, 1000.0);
        for x in [5.0, 15.0, 15.0, 73.0] {
            w.add(x, 0.0);
        }
        assert_eq!(w.percentile(1.0), 7.0);
    }

    #[test]
    fn test_percentile_interpolates_within_bucket() {
        let mut w = WindowedHistogram::new(1, 1000.0, 10.0, 1000.0);
        for _ in 0..4 {
            w.add(25.0, 0.0);
        }
        // all four samples in bucket 2; median lands halfway through it
        assert_eq!(w.percentile(0.5), 2.5);
        assert_eq!(w.percentile_ms(0.5), 25.0);
    }

    #[test]
    fn test_percentile_interpolates_across_buckets() {
        let mut w = WindowedHistogram::new(1, 1000.0, 10.0, 1000.0);
        for (x, n) in [(5.0, 2), (15.0, 6), (25.0, 4)] {
            for _ in 0..n {
                w.add(x, 0.0);
            }
        }
        // rank 10.8 of 12: 2.8 samples into bucket 2, which holds 4
        assert!((w.percentile(0.9) - 2.7).abs() < 1e-9);
        // rank 3: one sample into bucket 1, which holds 6
        assert!((w.percentile(0.25) - (1.0 + 1.0 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_clamps_quantile() {
        let mut w = WindowedHistogram::new(1, 1000.0, 10.0, 1000.0);
        w.add(35.0, 0.0);
        w.add(45.0, 0.0);
        // bucket 0 is empty, so the lowest rank is the start of bucket 3
        assert_eq!(w.percentile(0.0), 3.0);
        assert_eq!(w.percentile(-0.1), 3.0);
        assert_eq!(w.percentile(f64::NAN), 3.0);
        assert_eq!(w.percentile(1.5), w.percentile(1.0));
        assert_eq!(percentile_of(&[0, 0, 5], -1.0), 2.0);
    }

    #[test]
    fn test_percentile_of_empty_is_zero() {
        let w = WindowedHistogram::new(4, 1000.0, 10.0, 1000.0);
        assert_eq!(w.percentile(0.99), 0.0);
        assert!(w.data().is_empty());
    }
}
