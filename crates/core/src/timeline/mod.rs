use serde::{Deserialize, Serialize};

use crate::{BeatPulseError, Result};

/// Monotonic millisecond timestamps for a fixed analysis cadence.
///
/// Hosts that replay audio offline (or tests) have no wall clock to stamp
/// frames with; the clock derives each timestamp from the frame index so it
/// never drifts over long runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameClock {
    frame_rate_hz: f64,
    origin_ms: f64,
    next_frame: u64,
}

impl FrameClock {
    pub fn new(frame_rate_hz: f64) -> Result<Self> {
        Self::with_origin(frame_rate_hz, 0.0)
    }

    /// Clock whose first frame is stamped `origin_ms`.
    pub fn with_origin(frame_rate_hz: f64, origin_ms: f64) -> Result<Self> {
        if !frame_rate_hz.is_finite() || frame_rate_hz <= 0.0 {
            return Err(BeatPulseError::config(format!(
                "frame rate must be positive, got {frame_rate_hz}"
            )));
        }
        if !origin_ms.is_finite() {
            return Err(BeatPulseError::config("clock origin must be finite"));
        }
        Ok(Self {
            frame_rate_hz,
            origin_ms,
            next_frame: 0,
        })
    }

    /// Clock for frames of `hop_size` samples at `sample_rate`.
    pub fn for_hop(sample_rate: u32, hop_size: usize) -> Result<Self> {
        if hop_size == 0 {
            return Err(BeatPulseError::config("hop size must be positive"));
        }
        Self::new(f64::from(sample_rate) / hop_size as f64)
    }

    pub fn frame_rate_hz(&self) -> f64 {
        self.frame_rate_hz
    }

    pub fn frame_duration_ms(&self) -> f64 {
        1000.0 / self.frame_rate_hz
    }

    pub fn timestamp_of(&self, frame: u64) -> f64 {
        self.origin_ms + frame as f64 * self.frame_duration_ms()
    }

    /// Stamps the next frame and advances the clock.
    pub fn tick(&mut self) -> f64 {
        let timestamp = self.timestamp_of(self.next_frame);
        self.next_frame += 1;
        timestamp
    }

    /// Number of frames stamped so far.
    pub fn frames(&self) -> u64 {
        self.next_frame
    }

    pub fn reset(&mut self) {
        self.next_frame = 0;
    }
}
