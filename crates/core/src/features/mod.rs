//! Reduction of a raw analysis frame to the scalar fed to the onset detector.

use crate::config::{FrequencyBand, MagnitudeScale, SpectrumConfig};

/// Gain applied to the frame RMS before it is clamped into the level meter.
const ENERGY_LEVEL_GAIN: f64 = 8.0;

/// Stateful per-frame feature extractor.
///
/// Energy mode is stateless apart from the display level. Flux mode keeps a
/// smoothed level per frequency band and reports the weighted positive change
/// of those levels between consecutive frames, so sustained loud passages and
/// decays do not register as onsets.
#[derive(Debug, Clone)]
pub struct SpectralFeatureExtractor {
    config: SpectrumConfig,
    low_level: f32,
    high_level: f32,
    flux: f64,
    display_level: f64,
}

impl SpectralFeatureExtractor {
    pub fn new(config: SpectrumConfig) -> Self {
        Self {
            config,
            low_level: 0.0,
            high_level: 0.0,
            flux: 0.0,
            display_level: 0.0,
        }
    }

    /// Band layout and smoothing in use.
    pub fn config(&self) -> &SpectrumConfig {
        &self.config
    }

    /// Mean squared amplitude of a normalized `[-1, 1]` waveform frame.
    pub fn waveform_energy(&mut self, waveform: &[f32]) -> f64 {
        let energy = mean_square(waveform.iter().map(|&sample| f64::from(sample)));
        self.update_energy_level(energy);
        energy
    }

    /// Same as [`Self::waveform_energy`] for unsigned 8-bit frames centred on
    /// 128, as produced by byte time-domain analysers.
    pub fn byte_waveform_energy(&mut self, waveform: &[u8]) -> f64 {
        let energy = mean_square(
            waveform
                .iter()
                .map(|&byte| (f64::from(byte) - 128.0) / 128.0),
        );
        self.update_energy_level(energy);
        energy
    }

    /// Smoothed spectral flux of one spectrum frame.
    ///
    /// `bin_width_hz` is the analyser's sample rate divided by its transform
    /// size. Magnitudes are interpreted according to the configured
    /// [`MagnitudeScale`].
    pub fn spectral_flux(&mut self, magnitudes: &[f32], bin_width_hz: f32) -> f64 {
        let low_raw = self.band_amplitude(magnitudes, self.config.low_band, bin_width_hz);
        let high_raw = self.band_amplitude(magnitudes, self.config.high_band, bin_width_hz);

        let smoothing = self.config.band_smoothing;
        let low_level = self.low_level + smoothing * (low_raw - self.low_level);
        let high_level = self.high_level + smoothing * (high_raw - self.high_level);

        let low_rise = (low_level - self.low_level).max(0.0);
        let high_rise = (high_level - self.high_level).max(0.0);
        let raw_flux =
            f64::from(low_rise * self.config.low_weight + high_rise * self.config.high_weight);

        self.low_level = low_level;
        self.high_level = high_level;
        self.flux += f64::from(self.config.flux_smoothing) * (raw_flux - self.flux);

        let level = f64::from(
            (self.config.low_weight * low_level + self.config.high_weight * high_level).min(1.0),
        );
        self.smooth_display_level(level);

        self.flux
    }

    /// Smoothed `[0, 1]` meter value for visual feedback. It plays no part in
    /// detection.
    pub fn display_level(&self) -> f64 {
        self.display_level
    }

    /// Current smoothed `(low, high)` band levels.
    pub fn band_levels(&self) -> (f32, f32) {
        (self.low_level, self.high_level)
    }

    /// Zeroes the band levels, flux and meter.
    pub fn reset(&mut self) {
        self.low_level = 0.0;
        self.high_level = 0.0;
        self.flux = 0.0;
        self.display_level = 0.0;
    }

    fn update_energy_level(&mut self, energy: f64) {
        let level = (energy.sqrt() * ENERGY_LEVEL_GAIN).min(1.0);
        self.smooth_display_level(level);
    }

    fn smooth_display_level(&mut self, level: f64) {
        let smoothing = f64::from(self.config.level_smoothing);
        self.display_level = self.display_level * (1.0 - smoothing) + level * smoothing;
    }

    /// Mean linear amplitude of the bins inside `band`, or `0.0` when the
    /// band falls outside the buffer. Bins that are not finite once converted
    /// are skipped.
    fn band_amplitude(&self, magnitudes: &[f32], band: FrequencyBand, bin_width_hz: f32) -> f32 {
        if magnitudes.is_empty() || !(bin_width_hz.is_finite() && bin_width_hz > 0.0) {
            return 0.0;
        }

        let last = magnitudes.len() - 1;
        let low = (band.min_hz / bin_width_hz).floor().max(0.0) as usize;
        let high = ((band.max_hz / bin_width_hz).ceil().max(0.0) as usize).min(last);
        if high < low {
            return 0.0;
        }

        let (sum, count) = magnitudes[low..=high]
            .iter()
            .map(|&magnitude| self.to_linear(magnitude))
            .filter(|amplitude| amplitude.is_finite())
            .fold((0.0f64, 0usize), |(sum, count), amplitude| {
                (sum + f64::from(amplitude), count + 1)
            });

        if count == 0 {
            return 0.0;
        }
        let mean = (sum / count as f64) as f32;
        if mean.is_finite() {
            mean
        } else {
            0.0
        }
    }

    fn to_linear(&self, magnitude: f32) -> f32 {
        match self.config.scale {
            MagnitudeScale::Decibels => 10f32.powf(magnitude / 20.0),
            MagnitudeScale::Linear => magnitude,
        }
    }
}

impl Default for SpectralFeatureExtractor {
    fn default() -> Self {
        Self::new(SpectrumConfig::default())
    }
}

fn mean_square(samples: impl ExactSizeIterator<Item = f64>) -> f64 {
    let len = samples.len();
    if len == 0 {
        return 0.0;
    }
    let sum: f64 = samples
        .filter(|sample| sample.is_finite())
        .map(|sample| sample * sample)
        .sum();
    sum / len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIN_WIDTH: f32 = 10.0;

    fn flat_spectrum(db: f32) -> Vec<f32> {
        vec![db; 1024]
    }

    #[test]
    fn waveform_energy_is_mean_square() {
        let mut extractor = SpectralFeatureExtractor::default();
        assert_eq!(extractor.waveform_energy(&[]), 0.0);

        let energy = extractor.waveform_energy(&[1.0, -1.0, 0.5, -0.5]);
        assert!((energy - 0.625).abs() < 1e-9);
        assert!(extractor.display_level() > 0.0);
    }

    #[test]
    fn byte_waveform_is_centred_on_128() {
        let mut extractor = SpectralFeatureExtractor::default();
        assert_eq!(extractor.byte_waveform_energy(&[128; 64]), 0.0);

        let energy = extractor.byte_waveform_energy(&[0, 0, 0, 0]);
        assert!((energy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn first_loud_frame_produces_weighted_flux() {
        let mut extractor = SpectralFeatureExtractor::default();
        let flux = extractor.spectral_flux(&flat_spectrum(0.0), BIN_WIDTH);

        // both band levels rise by 0.3, weights sum to 1, flux smoothing halves it
        assert!((flux - 0.15).abs() < 1e-6);
        let (low, high) = extractor.band_levels();
        assert!((low - 0.3).abs() < 1e-6);
        assert!((high - 0.3).abs() < 1e-6);
        // meter: 0.65 * 0.3 + 0.35 * 0.3, smoothed by 0.18
        assert!((extractor.display_level() - 0.3 * 0.18).abs() < 1e-6);
    }

    #[test]
    fn display_level_is_capped_at_one() {
        let config = SpectrumConfig {
            scale: MagnitudeScale::Linear,
            ..SpectrumConfig::default()
        };
        let mut extractor = SpectralFeatureExtractor::new(config);
        for _ in 0..200 {
            extractor.spectral_flux(&vec![10.0; 1024], BIN_WIDTH);
        }
        assert!((extractor.display_level() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn overflowing_magnitudes_do_not_poison_the_levels() {
        for (scale, huge) in [
            (MagnitudeScale::Linear, f32::MAX),
            (MagnitudeScale::Decibels, 1_000.0),
        ] {
            let config = SpectrumConfig {
                scale,
                ..SpectrumConfig::default()
            };
            let mut extractor = SpectralFeatureExtractor::new(config);
            let mut fluxes = vec![extractor.spectral_flux(&vec![huge; 1024], BIN_WIDTH)];
            for _ in 0..3 {
                fluxes.push(extractor.spectral_flux(&vec![1.0; 1024], BIN_WIDTH));
            }

            assert!(fluxes.iter().all(|flux| flux.is_finite()), "{fluxes:?}");
            let (low, high) = extractor.band_levels();
            assert!(low.is_finite() && high.is_finite());
            assert!(extractor.display_level().is_finite());
        }
    }

    #[test]
    fn decreasing_levels_contribute_nothing() {
        let mut extractor = SpectralFeatureExtractor::default();
        let loud = flat_spectrum(0.0);
        let silent = flat_spectrum(f32::NEG_INFINITY);

        let mut flux = 0.0;
        for _ in 0..5 {
            flux = extractor.spectral_flux(&loud, BIN_WIDTH);
        }
        let after_silence = extractor.spectral_flux(&silent, BIN_WIDTH);
        assert!((after_silence - flux * 0.5).abs() < 1e-9);

        let (low, _) = extractor.band_levels();
        assert!(low > 0.0);
    }

    #[test]
    fn only_low_band_contributes_when_high_band_is_out_of_range() {
        let mut extractor = SpectralFeatureExtractor::default();
        // 8 bins of 100 Hz: the high band (2-5 kHz) starts past the last bin.
        let flux = extractor.spectral_flux(&[0.0; 8], 100.0);

        assert!((flux - 0.5 * 0.65 * 0.3).abs() < 1e-6);
        assert_eq!(extractor.band_levels().1, 0.0);
    }

    #[test]
    fn invalid_bin_width_yields_zero() {
        let mut extractor = SpectralFeatureExtractor::default();
        assert_eq!(extractor.spectral_flux(&flat_spectrum(0.0), 0.0), 0.0);
        assert_eq!(extractor.spectral_flux(&flat_spectrum(0.0), f32::NAN), 0.0);
    }

    #[test]
    fn linear_scale_skips_decibel_conversion() {
        let config = SpectrumConfig {
            scale: MagnitudeScale::Linear,
            ..SpectrumConfig::default()
        };
        let mut extractor = SpectralFeatureExtractor::new(config);
        extractor.spectral_flux(&vec![2.0; 1024], BIN_WIDTH);

        let (low, high) = extractor.band_levels();
        assert!((low - 0.6).abs() < 1e-6);
        assert!((high - 0.6).abs() < 1e-6);
    }

    #[test]
    fn reset_clears_smoothing_state() {
        let mut extractor = SpectralFeatureExtractor::default();
        extractor.spectral_flux(&flat_spectrum(0.0), BIN_WIDTH);
        extractor.reset();

        assert_eq!(extractor.band_levels(), (0.0, 0.0));
        assert_eq!(extractor.display_level(), 0.0);
    }
}
