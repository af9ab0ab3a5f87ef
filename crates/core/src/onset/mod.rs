use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{config::DetectorConfig, stats::RollingStats};

/// Bounded FIFO of strictly increasing timestamps in milliseconds.
#[derive(Debug, Clone)]
pub struct TimestampBuffer {
    capacity: usize,
    timestamps: VecDeque<f64>,
}

impl TimestampBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            timestamps: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends `timestamp_ms`, evicting the oldest entry when full.
    ///
    /// Returns `false` and leaves the buffer untouched when the timestamp is
    /// not finite or not strictly after the newest entry.
    pub fn push(&mut self, timestamp_ms: f64) -> bool {
        if !timestamp_ms.is_finite() {
            return false;
        }
        if self.last().is_some_and(|last| timestamp_ms <= last) {
            return false;
        }

        self.timestamps.push_back(timestamp_ms);
        if self.timestamps.len() > self.capacity {
            self.timestamps.pop_front();
        }
        true
    }

    /// Owned copy of the current contents, oldest first. Estimators work on
    /// snapshots so later pushes cannot invalidate what they read.
    pub fn snapshot(&self) -> Vec<f64> {
        self.timestamps.iter().copied().collect()
    }

    /// Newest timestamp, if any.
    pub fn last(&self) -> Option<f64> {
        self.timestamps.back().copied()
    }

    /// Number of timestamps held.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Maximum number of timestamps kept before the oldest is evicted.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes every timestamp.
    pub fn clear(&mut self) {
        self.timestamps.clear();
    }
}

/// Detector life cycle. Only a reset leads back to [`DetectorState::Warming`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorState {
    /// Not enough history for a stable baseline; onsets are suppressed.
    Warming,
    Armed,
}

/// Adaptive-threshold onset detector over a stream of scalar features.
///
/// Each frame the feature joins a rolling window and the threshold becomes
/// `mean + std * sensitivity`. An onset fires when the detector is armed, the
/// feature exceeds the threshold and the refractory interval since the last
/// onset has elapsed.
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    stats: RollingStats,
    warmup_samples: usize,
    sensitivity: f64,
    min_interval_ms: f64,
    state: DetectorState,
    threshold: f64,
    last_frame_ms: Option<f64>,
    onsets: TimestampBuffer,
}

impl OnsetDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            stats: RollingStats::new(config.window_size),
            warmup_samples: config.warmup_samples,
            sensitivity: config.effective_sensitivity(),
            min_interval_ms: config.min_interval_ms,
            state: DetectorState::Warming,
            threshold: 0.0,
            last_frame_ms: None,
            onsets: TimestampBuffer::new(config.onset_history),
        }
    }

    /// Feeds one analysis frame and returns the onset timestamp if one fired.
    ///
    /// Frames with a non-finite timestamp or one earlier than the previous
    /// frame are dropped entirely. Non-finite feature values count as `0.0`.
    pub fn process(&mut self, value: f64, now_ms: f64) -> Option<f64> {
        if !now_ms.is_finite() || self.last_frame_ms.is_some_and(|last| now_ms < last) {
            tracing::debug!(now_ms, last_frame_ms = ?self.last_frame_ms, "dropping out-of-order frame");
            return None;
        }
        self.last_frame_ms = Some(now_ms);

        let value = if value.is_finite() { value } else { 0.0 };
        self.stats.push(value);
        if self.state == DetectorState::Warming && self.stats.len() > self.warmup_samples {
            self.state = DetectorState::Armed;
            tracing::debug!(samples = self.stats.len(), "onset detector armed");
        }

        let stats = self.stats.stats();
        self.threshold = stats.mean + stats.std_dev * self.sensitivity;
        tracing::trace!(value, threshold = self.threshold, "frame");

        if self.state != DetectorState::Armed || value <= self.threshold {
            return None;
        }
        if self
            .onsets
            .last()
            .is_some_and(|last| now_ms - last <= self.min_interval_ms)
        {
            return None;
        }

        if !self.onsets.push(now_ms) {
            return None;
        }
        tracing::debug!(now_ms, value, threshold = self.threshold, "onset");
        Some(now_ms)
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Threshold computed for the most recent frame.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn onsets(&self) -> &TimestampBuffer {
        &self.onsets
    }

    pub fn last_onset_ms(&self) -> Option<f64> {
        self.onsets.last()
    }

    /// Number of feature samples currently in the threshold window.
    pub fn history_len(&self) -> usize {
        self.stats.len()
    }

    pub fn reset(&mut self) {
        self.stats.reset();
        self.onsets.clear();
        self.state = DetectorState::Warming;
        self.threshold = 0.0;
        self.last_frame_ms = None;
    }
}
