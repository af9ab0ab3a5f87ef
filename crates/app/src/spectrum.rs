use std::{f32::consts::PI, fmt, sync::Arc};

use beat_pulse_core::{BeatPulseError, Result};
use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

/// Floor for empty bins, matching what browser analysers report as silence.
const MIN_DECIBELS: f32 = -160.0;

/// Hann-windowed magnitude spectrum in decibels, the upstream step that flux
/// mode expects its input from.
pub struct SpectrumAnalyzer {
    sample_rate: u32,
    planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
    decibels: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            planner: RealFftPlanner::new(),
            fft: None,
            decibels: Vec::new(),
        }
    }

    /// Width of one output bin for frames of `frame_len` samples.
    pub fn bin_width_hz(&self, frame_len: usize) -> f32 {
        self.sample_rate as f32 / frame_len.max(1) as f32
    }

    /// Magnitudes of `frame` in dBFS, one value per bin up to Nyquist.
    pub fn decibels(&mut self, frame: &[f32]) -> Result<&[f32]> {
        if frame.len() < 2 {
            return Err(BeatPulseError::msg(
                "spectrum analysis requires frames with at least two samples",
            ));
        }

        let len = frame.len();
        let fft = prepare_fft(&mut self.fft, &mut self.planner, len);
        for (index, (slot, sample)) in fft.input.iter_mut().zip(frame).enumerate() {
            *slot = sample * hann_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| BeatPulseError::msg(format!("fft failed: {err}")))?;

        let scale = len as f32;
        self.decibels.clear();
        self.decibels.extend(fft.spectrum.iter().map(|bin| {
            let magnitude = bin.norm() / scale;
            if magnitude > 0.0 {
                (20.0 * magnitude.log10()).max(MIN_DECIBELS)
            } else {
                MIN_DECIBELS
            }
        }));
        Ok(&self.decibels)
    }
}

/// Returns the cached transform for `size`, planning a new one on size change.
fn prepare_fft<'a>(
    slot: &'a mut Option<FftResources>,
    planner: &mut RealFftPlanner<f32>,
    size: usize,
) -> &'a mut FftResources {
    if slot.as_ref().map_or(true, |fft| fft.size != size) {
        *slot = None;
    }

    slot.get_or_insert_with(|| {
        tracing::debug!(size, "planning forward fft");
        let plan = planner.plan_fft_forward(size);
        FftResources {
            size,
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    })
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("sample_rate", &self.sample_rate)
            .field("fft_size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
