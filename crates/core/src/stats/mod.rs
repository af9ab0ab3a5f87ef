use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Mean and population standard deviation of the samples currently held by a
/// [`RollingStats`] window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// Fixed-capacity streaming mean/std accumulator over the most recent samples.
///
/// The running sum and sum of squares are updated incrementally on every
/// push. Subtracting evicted values lets rounding error creep in, so both
/// sums are recomputed from the live window once every `capacity` evictions,
/// and immediately when the evicted sample outweighs everything left.
#[derive(Debug, Clone)]
pub struct RollingStats {
    capacity: usize,
    values: VecDeque<f64>,
    sum: f64,
    sum_squares: f64,
    evictions_since_resync: usize,
}

impl RollingStats {
    /// Creates an empty window. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
            sum: 0.0,
            sum_squares: 0.0,
            evictions_since_resync: 0,
        }
    }

    /// Appends a sample, evicting the oldest one once the window is full.
    /// Non-finite samples are folded in as `0.0`.
    pub fn push(&mut self, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };

        self.values.push_back(value);
        self.sum += value;
        self.sum_squares += value * value;

        if self.values.len() > self.capacity {
            if let Some(removed) = self.values.pop_front() {
                self.sum -= removed;
                self.sum_squares -= removed * removed;
                self.evictions_since_resync += 1;

                // the subtraction error now dwarfs the remaining samples
                if removed * removed > self.sum_squares {
                    self.resync();
                }
            }
        }

        if self.evictions_since_resync >= self.capacity {
            self.resync();
        }
    }

    /// Returns `(0, 0)` for an empty window.
    pub fn stats(&self) -> WindowStats {
        let len = self.values.len();
        if len == 0 {
            return WindowStats::default();
        }

        let len = len as f64;
        let mean = self.sum / len;
        let variance = (self.sum_squares / len - mean * mean).max(0.0);
        WindowStats {
            mean,
            std_dev: variance.sqrt(),
        }
    }

    /// Number of samples currently in the window.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Maximum number of samples the window holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every sample and zeroes the running sums.
    pub fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
        self.sum_squares = 0.0;
        self.evictions_since_resync = 0;
    }

    fn resync(&mut self) {
        self.sum = self.values.iter().sum();
        self.sum_squares = self.values.iter().map(|value| value * value).sum();
        self.evictions_since_resync = 0;
    }
}

impl Default for RollingStats {
    fn default() -> Self {
        Self::new(128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_stats(values: &[f64]) -> (f64, f64) {
        let len = values.len() as f64;
        let mean = values.iter().sum::<f64>() / len;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / len;
        (mean, variance.sqrt())
    }

    #[test]
    fn empty_window_reports_zero() {
        let stats = RollingStats::new(8).stats();
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn sliding_window_only_sees_latest_values() {
        let capacity = 16;
        let mut window = RollingStats::new(capacity);
        let samples: Vec<f64> = (0..=capacity).map(|i| (i * i) as f64 * 0.25).collect();
        for &value in &samples {
            window.push(value);
        }

        assert_eq!(window.len(), capacity);
        let (mean, std_dev) = direct_stats(&samples[1..]);
        let stats = window.stats();
        assert!((stats.mean - mean).abs() < 1e-9);
        assert!((stats.std_dev - std_dev).abs() < 1e-9);
    }

    #[test]
    fn constant_input_never_yields_negative_or_nan_std() {
        let mut window = RollingStats::new(32);
        for _ in 0..1000 {
            window.push(0.1);
            let stats = window.stats();
            assert!(stats.std_dev >= 0.0);
            assert!(!stats.std_dev.is_nan());
        }
    }

    #[test]
    fn resync_removes_drift_after_large_values_leave() {
        let mut window = RollingStats::new(128);
        for _ in 0..128 {
            window.push(1e8);
        }
        for _ in 0..10_000 {
            window.push(1.0);
        }

        let stats = window.stats();
        assert!((stats.mean - 1.0).abs() < 1e-9);
        assert!(stats.std_dev < 1e-6);
    }

    #[test]
    fn lone_spike_leaving_a_quiet_window_keeps_the_spread() {
        let capacity = 128;
        let mut window = RollingStats::new(capacity);
        let quiet = |i: usize| 1e-9 * (0.8 + (i % 5) as f64 * 0.1);
        let mut pushed = Vec::new();

        for i in 0..40 {
            pushed.push(quiet(i));
        }
        pushed.push(0.3);
        for i in 0..200 {
            pushed.push(quiet(i));
        }

        for (index, &value) in pushed.iter().enumerate() {
            window.push(value);
            let start = (index + 1).saturating_sub(capacity);
            let (mean, std_dev) = direct_stats(&pushed[start..=index]);
            let stats = window.stats();
            assert!((stats.mean - mean).abs() <= mean * 1e-6, "mean at {index}");
            assert!(
                (stats.std_dev - std_dev).abs() <= std_dev * 1e-3,
                "std at {index}: {} vs {std_dev}",
                stats.std_dev
            );
        }
    }

    #[test]
    fn non_finite_values_count_as_zero() {
        let mut window = RollingStats::new(4);
        window.push(f64::NAN);
        window.push(f64::INFINITY);
        window.push(2.0);

        let stats = window.stats();
        assert_eq!(window.len(), 3);
        assert!((stats.mean - 2.0 / 3.0).abs() < 1e-12);
        assert!(stats.std_dev.is_finite());
    }

    #[test]
    fn reset_empties_the_window() {
        let mut window = RollingStats::new(4);
        window.push(3.0);
        window.push(5.0);
        window.reset();

        assert!(window.is_empty());
        assert_eq!(window.stats(), WindowStats::default());
        window.push(7.0);
        assert_eq!(window.stats().mean, 7.0);
    }
}
