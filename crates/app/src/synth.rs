use std::f32::consts::PI;

/// Length of each synthesized hit.
const HIT_SECONDS: f32 = 0.25;
const KICK_HZ: f32 = 60.0;
const HAT_HZ: [f32; 2] = [3_100.0, 4_300.0];
const PAD_HZ: f32 = 440.0;

/// Renders a mono click track: a decaying low kick plus a short bright hat on
/// every beat, over a quiet sustained pad.
pub fn click_track(sample_rate: u32, bpm: f64, seconds: f64) -> Vec<f32> {
    let rate = sample_rate as f32;
    let total = (seconds * f64::from(sample_rate)).max(0.0) as usize;
    let beat_samples = if bpm > 0.0 {
        (60.0 / bpm * f64::from(sample_rate)) as usize
    } else {
        0
    };

    (0..total)
        .map(|index| {
            let t = index as f32 / rate;
            let mut sample = 0.03 * (2.0 * PI * PAD_HZ * t).sin();

            if beat_samples > 0 {
                let since_beat = (index % beat_samples) as f32 / rate;
                if since_beat < HIT_SECONDS {
                    let kick = (2.0 * PI * KICK_HZ * since_beat).sin() * (-since_beat / 0.08).exp();
                    let hat: f32 = HAT_HZ
                        .iter()
                        .map(|hz| (2.0 * PI * hz * since_beat).sin())
                        .sum::<f32>()
                        * (-since_beat / 0.02).exp();
                    sample += 0.7 * kick + 0.1 * hat;
                }
            }

            sample.clamp(-1.0, 1.0)
        })
        .collect()
}
