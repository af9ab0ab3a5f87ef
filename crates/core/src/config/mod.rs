use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{BeatPulseError, Result, TempoStrategy};

/// Top-level configuration structure for a tracking session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub detector: DetectorConfig,
    pub taps: TapConfig,
    pub spectrum: SpectrumConfig,
}

impl SessionConfig {
    /// Parses a (possibly partial) JSON document and validates the result.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        self.taps.validate()?;
        self.spectrum.validate()
    }
}

/// Which scalar feature feeds the onset detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureMode {
    /// Mean squared amplitude of the time-domain frame.
    Energy,
    /// Weighted positive band increase between spectrum frames.
    #[default]
    Flux,
}

impl FeatureMode {
    /// Threshold multiplier applied to the window's standard deviation. The
    /// flux baseline is noisier and needs the extra margin.
    pub fn default_sensitivity(self) -> f64 {
        match self {
            Self::Energy => 1.6,
            Self::Flux => 1.7,
        }
    }

    pub fn default_tempo_strategy(self) -> TempoStrategy {
        match self {
            Self::Energy => TempoStrategy::Interval,
            Self::Flux => TempoStrategy::HistogramWithFallback,
        }
    }
}

/// Settings for the track onset detector and its tempo estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Number of recent feature samples the adaptive threshold is built from.
    pub window_size: usize,
    /// Samples the window must exceed before onsets may fire.
    pub warmup_samples: usize,
    /// `None` picks [`FeatureMode::default_sensitivity`].
    pub sensitivity: Option<f64>,
    /// Refractory gap between two onsets.
    pub min_interval_ms: f64,
    pub mode: FeatureMode,
    /// `None` picks [`FeatureMode::default_tempo_strategy`].
    pub tempo: Option<TempoStrategy>,
    /// Capacity of the track onset timestamp buffer.
    pub onset_history: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 128,
            warmup_samples: 32,
            sensitivity: None,
            min_interval_ms: 320.0,
            mode: FeatureMode::default(),
            tempo: None,
            onset_history: 32,
        }
    }
}

impl DetectorConfig {
    pub fn energy() -> Self {
        Self {
            mode: FeatureMode::Energy,
            ..Self::default()
        }
    }

    pub fn flux() -> Self {
        Self {
            mode: FeatureMode::Flux,
            ..Self::default()
        }
    }

    pub fn effective_sensitivity(&self) -> f64 {
        self.sensitivity
            .unwrap_or_else(|| self.mode.default_sensitivity())
    }

    pub fn tempo_strategy(&self) -> TempoStrategy {
        self.tempo
            .unwrap_or_else(|| self.mode.default_tempo_strategy())
    }

    pub fn validate(&self) -> Result<()> {
        if self.warmup_samples == 0 {
            return Err(BeatPulseError::config("detector.warmup_samples must be positive"));
        }
        if self.window_size <= self.warmup_samples {
            return Err(BeatPulseError::config(format!(
                "detector.window_size ({}) must exceed detector.warmup_samples ({})",
                self.window_size, self.warmup_samples
            )));
        }
        if let Some(sensitivity) = self.sensitivity {
            if !sensitivity.is_finite() || sensitivity <= 0.0 {
                return Err(BeatPulseError::config(format!(
                    "detector.sensitivity must be a positive number, got {sensitivity}"
                )));
            }
        }
        if !self.min_interval_ms.is_finite() || self.min_interval_ms < 0.0 {
            return Err(BeatPulseError::config(format!(
                "detector.min_interval_ms must be non-negative, got {}",
                self.min_interval_ms
            )));
        }
        if self.onset_history == 0 {
            return Err(BeatPulseError::config("detector.onset_history must be positive"));
        }
        Ok(())
    }
}

/// Settings for the user tap streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    /// A tap this close after the last track onset counts as matched.
    pub match_window_ms: f64,
    pub matched_history: usize,
    pub free_history: usize,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            match_window_ms: 1000.0,
            matched_history: 16,
            free_history: 32,
        }
    }
}

impl TapConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.match_window_ms.is_finite() || self.match_window_ms < 0.0 {
            return Err(BeatPulseError::config(format!(
                "taps.match_window_ms must be non-negative, got {}",
                self.match_window_ms
            )));
        }
        if self.matched_history == 0 || self.free_history == 0 {
            return Err(BeatPulseError::config("tap histories must be positive"));
        }
        Ok(())
    }
}

/// How spectrum magnitudes are expressed by the upstream analyser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MagnitudeScale {
    #[default]
    Decibels,
    Linear,
}

/// Inclusive frequency range in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub min_hz: f32,
    pub max_hz: f32,
}

impl FrequencyBand {
    pub const fn new(min_hz: f32, max_hz: f32) -> Self {
        Self { min_hz, max_hz }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let finite = self.min_hz.is_finite() && self.max_hz.is_finite();
        if !finite || self.min_hz < 0.0 || self.min_hz >= self.max_hz {
            return Err(BeatPulseError::config(format!(
                "spectrum.{name} must satisfy 0 <= min_hz < max_hz, got {}..{}",
                self.min_hz, self.max_hz
            )));
        }
        Ok(())
    }
}

/// Settings for the spectral feature extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub low_band: FrequencyBand,
    pub high_band: FrequencyBand,
    pub band_smoothing: f32,
    pub flux_smoothing: f32,
    pub low_weight: f32,
    pub high_weight: f32,
    /// Smoothing applied to the display level meter.
    pub level_smoothing: f32,
    pub scale: MagnitudeScale,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            low_band: FrequencyBand::new(40.0, 200.0),
            high_band: FrequencyBand::new(2000.0, 5000.0),
            band_smoothing: 0.3,
            flux_smoothing: 0.5,
            low_weight: 0.65,
            high_weight: 0.35,
            level_smoothing: 0.18,
            scale: MagnitudeScale::default(),
        }
    }
}

impl SpectrumConfig {
    pub fn validate(&self) -> Result<()> {
        self.low_band.validate("low_band")?;
        self.high_band.validate("high_band")?;

        for (name, value) in [
            ("band_smoothing", self.band_smoothing),
            ("flux_smoothing", self.flux_smoothing),
            ("level_smoothing", self.level_smoothing),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(BeatPulseError::config(format!(
                    "spectrum.{name} must lie in (0, 1], got {value}"
                )));
            }
        }

        for (name, value) in [
            ("low_weight", self.low_weight),
            ("high_weight", self.high_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BeatPulseError::config(format!(
                    "spectrum.{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}
