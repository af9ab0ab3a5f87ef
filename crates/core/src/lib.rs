//! Core library for Beat Pulse: real-time onset detection and tempo
//! estimation.
//!
//! A host computes one scalar feature per analysis frame (signal energy or
//! spectral flux, see [`SpectralFeatureExtractor`]) and hands it to a
//! [`BeatTrackingSession`] together with a monotonic timestamp. The session
//! runs an adaptive-threshold [`OnsetDetector`], turns the resulting onset
//! timestamps into a tempo with one of the [`TempoStrategy`] variants and
//! reports onsets and tempo locks to a caller-supplied [`BeatEventSink`].
//! User taps feed two further streams through the same session.
//!
//! The per-frame path never blocks and never fails: missing estimates are
//! `None`.

pub mod config;
pub mod error;
pub mod features;
pub mod onset;
pub mod session;
pub mod shared;
pub mod stats;
pub mod tempo;
pub mod timeline;

pub use config::{
    DetectorConfig, FeatureMode, FrequencyBand, MagnitudeScale, SessionConfig, SpectrumConfig,
    TapConfig,
};
pub use error::{BeatPulseError, Result};
pub use features::SpectralFeatureExtractor;
pub use onset::{DetectorState, OnsetDetector, TimestampBuffer};
pub use session::{
    BeatEvent, BeatEventSink, BeatTrackingSession, NullSink, ResetScope, StreamId, TapOutcome,
};
pub use shared::SharedSession;
pub use stats::{RollingStats, WindowStats};
pub use tempo::{histogram_bpm, interval_bpm, normalize_bpm, TempoStrategy};
pub use timeline::FrameClock;
