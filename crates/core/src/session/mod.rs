use serde::{Deserialize, Serialize};

use crate::{
    config::{DetectorConfig, SessionConfig},
    onset::{OnsetDetector, TimestampBuffer},
    Result, TempoStrategy,
};

/// Logical timestamp streams tracked by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamId {
    /// Onsets detected in the audio feature stream.
    Track,
    /// User taps that landed close after a track onset.
    MatchedTap,
    /// Every user tap, regardless of the track.
    FreeTap,
}

/// Event record for sinks that store what a session emits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BeatEvent {
    Onset { stream: StreamId, timestamp_ms: f64 },
    BpmLocked { stream: StreamId, bpm: f64 },
    BpmUpdated { stream: StreamId, bpm: f64 },
}

/// Receiver for the events a session emits while it processes input.
pub trait BeatEventSink {
    fn on_onset(&mut self, stream: StreamId, timestamp_ms: f64);

    /// Fired once per lock transition.
    fn on_bpm_locked(&mut self, stream: StreamId, bpm: f64);

    /// Fired whenever an unlocked tap stream produces a new estimate.
    fn on_bpm_updated(&mut self, _stream: StreamId, _bpm: f64) {}
}

impl BeatEventSink for Vec<BeatEvent> {
    fn on_onset(&mut self, stream: StreamId, timestamp_ms: f64) {
        self.push(BeatEvent::Onset {
            stream,
            timestamp_ms,
        });
    }

    fn on_bpm_locked(&mut self, stream: StreamId, bpm: f64) {
        self.push(BeatEvent::BpmLocked { stream, bpm });
    }

    fn on_bpm_updated(&mut self, stream: StreamId, bpm: f64) {
        self.push(BeatEvent::BpmUpdated { stream, bpm });
    }
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl BeatEventSink for NullSink {
    fn on_onset(&mut self, _stream: StreamId, _timestamp_ms: f64) {}

    fn on_bpm_locked(&mut self, _stream: StreamId, _bpm: f64) {}
}

/// How a registered tap relates to the track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TapOutcome {
    /// The tap followed the last track onset within the match window.
    Matched { offset_ms: f64 },
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    All,
    Stream(StreamId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BpmLock {
    Unlocked,
    Locked(f64),
}

/// Per-stream beat tracking state: one track detector whose tempo locks on
/// the first successful estimate, plus the two tap streams whose tempo keeps
/// following the user.
#[derive(Debug, Clone)]
pub struct BeatTrackingSession {
    config: SessionConfig,
    tempo: TempoStrategy,
    detector: OnsetDetector,
    track_lock: BpmLock,
    matched_taps: TimestampBuffer,
    free_taps: TimestampBuffer,
    matched_bpm: Option<f64>,
    free_bpm: Option<f64>,
}

impl BeatTrackingSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tempo: config.detector.tempo_strategy(),
            detector: OnsetDetector::new(&config.detector),
            track_lock: BpmLock::Unlocked,
            matched_taps: TimestampBuffer::new(config.taps.matched_history),
            free_taps: TimestampBuffer::new(config.taps.free_history),
            matched_bpm: None,
            free_bpm: None,
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn detector(&self) -> &OnsetDetector {
        &self.detector
    }

    /// Replaces the detector settings and restarts the track stream.
    ///
    /// Invalid settings are rejected and leave the session untouched.
    pub fn configure(&mut self, detector: DetectorConfig) -> Result<()> {
        detector.validate()?;
        tracing::info!(
            mode = ?detector.mode,
            window_size = detector.window_size,
            sensitivity = detector.effective_sensitivity(),
            min_interval_ms = detector.min_interval_ms,
            "reconfiguring track detector"
        );

        self.tempo = detector.tempo_strategy();
        self.detector = OnsetDetector::new(&detector);
        self.track_lock = BpmLock::Unlocked;
        self.config.detector = detector;
        Ok(())
    }

    /// Feeds one track feature frame. Returns the onset timestamp when the
    /// frame was declared an onset.
    pub fn process_feature_frame<S>(
        &mut self,
        value: f64,
        timestamp_ms: f64,
        sink: &mut S,
    ) -> Option<f64>
    where
        S: BeatEventSink + ?Sized,
    {
        let onset = self.detector.process(value, timestamp_ms)?;
        sink.on_onset(StreamId::Track, onset);

        if self.track_lock == BpmLock::Unlocked {
            let onsets = self.detector.onsets().snapshot();
            if let Some(bpm) = self.tempo.estimate(&onsets) {
                self.track_lock = BpmLock::Locked(bpm);
                tracing::info!(bpm, onsets = onsets.len(), "track tempo locked");
                sink.on_bpm_locked(StreamId::Track, bpm);
            }
        }

        Some(onset)
    }

    /// Registers a user tap on both tap streams.
    ///
    /// Returns `None` when the timestamp is not finite or does not follow the
    /// previous tap.
    pub fn register_tap<S>(&mut self, timestamp_ms: f64, sink: &mut S) -> Option<TapOutcome>
    where
        S: BeatEventSink + ?Sized,
    {
        if !self.free_taps.push(timestamp_ms) {
            tracing::debug!(timestamp_ms, "ignoring out-of-order tap");
            return None;
        }
        sink.on_onset(StreamId::FreeTap, timestamp_ms);

        if self.free_taps.len() >= 2 {
            if let Some(bpm) = TempoStrategy::Interval.estimate(&self.free_taps.snapshot()) {
                self.free_bpm = Some(bpm);
                sink.on_bpm_updated(StreamId::FreeTap, bpm);
            }
        }

        let offset_ms = self
            .detector
            .last_onset_ms()
            .map(|onset| timestamp_ms - onset)
            .filter(|offset| (0.0..=self.config.taps.match_window_ms).contains(offset));

        match offset_ms {
            Some(offset_ms) => {
                // only reachable after a free-tap reset rewound the tap clock
                if !self.matched_taps.push(timestamp_ms) {
                    self.matched_taps.clear();
                    self.matched_taps.push(timestamp_ms);
                }
                sink.on_onset(StreamId::MatchedTap, timestamp_ms);
                if let Some(bpm) =
                    TempoStrategy::Interval.estimate(&self.matched_taps.snapshot())
                {
                    self.matched_bpm = Some(bpm);
                    sink.on_bpm_updated(StreamId::MatchedTap, bpm);
                }
                Some(TapOutcome::Matched { offset_ms })
            }
            None => {
                self.matched_taps.clear();
                Some(TapOutcome::Missed)
            }
        }
    }

    /// Latest estimate for `stream`. The track only reports its locked value.
    pub fn current_bpm(&self, stream: StreamId) -> Option<f64> {
        match stream {
            StreamId::Track => match self.track_lock {
                BpmLock::Locked(bpm) => Some(bpm),
                BpmLock::Unlocked => None,
            },
            StreamId::MatchedTap => self.matched_bpm,
            StreamId::FreeTap => self.free_bpm,
        }
    }

    /// Only the track stream ever locks.
    pub fn is_locked(&self, stream: StreamId) -> bool {
        stream == StreamId::Track && matches!(self.track_lock, BpmLock::Locked(_))
    }

    pub fn reset(&mut self, scope: ResetScope) {
        tracing::debug!(?scope, "resetting session");
        match scope {
            ResetScope::All => {
                self.reset_track();
                self.reset_matched_taps();
                self.reset_free_taps();
            }
            ResetScope::Stream(StreamId::Track) => self.reset_track(),
            ResetScope::Stream(StreamId::MatchedTap) => self.reset_matched_taps(),
            ResetScope::Stream(StreamId::FreeTap) => self.reset_free_taps(),
        }
    }

    fn reset_track(&mut self) {
        self.detector.reset();
        self.track_lock = BpmLock::Unlocked;
    }

    fn reset_matched_taps(&mut self) {
        self.matched_taps.clear();
        self.matched_bpm = None;
    }

    fn reset_free_taps(&mut self) {
        self.free_taps.clear();
        self.free_bpm = None;
    }
}
