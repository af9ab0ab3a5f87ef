//! Tempo estimation from a snapshot of onset timestamps (milliseconds).
//!
//! Every estimate is folded into the canonical octave by [`normalize_bpm`];
//! `None` means no trustworthy tempo could be derived.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const MIN_NORMALIZED_BPM: f64 = 70.0;
pub const MAX_NORMALIZED_BPM: f64 = 200.0;

const MS_PER_MINUTE: f64 = 60_000.0;

/// Intervals further than this fraction from the median are discarded.
const INTERVAL_TOLERANCE: f64 = 0.25;
/// Share of all intervals that must survive the median filter.
const MIN_AGREEING_SHARE: f64 = 0.6;
const MAX_INTERVAL_JITTER_MS: f64 = 45.0;

/// Lags shorter than this (faster than 240 BPM) are ignored.
const MIN_LAG_MS: f64 = MS_PER_MINUTE / 240.0;
/// Lags longer than this (slower than 40 BPM) end the scan.
const MAX_LAG_MS: f64 = MS_PER_MINUTE / 40.0;
const LAG_BIN_MS: f64 = 10.0;
const MIN_HISTOGRAM_SCORE: f64 = 2.0;

/// Selects how a buffer of onsets is turned into a tempo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoStrategy {
    /// Median-filtered inter-onset intervals only.
    Interval,
    /// Lag histogram voting, falling back to [`TempoStrategy::Interval`] when
    /// the histogram has no corroborated winner.
    HistogramWithFallback,
}

impl TempoStrategy {
    pub fn estimate(self, onsets_ms: &[f64]) -> Option<f64> {
        match self {
            Self::Interval => interval_bpm(onsets_ms),
            Self::HistogramWithFallback => {
                histogram_bpm(onsets_ms).or_else(|| interval_bpm(onsets_ms))
            }
        }
    }
}

/// Doubles or halves `bpm` until it lies in the canonical octave.
///
/// Zero, negative and non-finite candidates are unavailable.
pub fn normalize_bpm(bpm: f64) -> Option<f64> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return None;
    }

    let mut normalized = bpm;
    while normalized < MIN_NORMALIZED_BPM {
        normalized *= 2.0;
    }
    while normalized > MAX_NORMALIZED_BPM {
        normalized /= 2.0;
    }
    Some(normalized)
}

/// Tempo from the average of the inter-onset intervals that agree with the
/// median interval.
///
/// Needs at least three onsets. Returns `None` when fewer than
/// `max(2, ceil(0.6 * n))` intervals sit within 25% of the median, or when the
/// surviving intervals still jitter by more than 45 ms.
pub fn interval_bpm(onsets_ms: &[f64]) -> Option<f64> {
    if onsets_ms.len() < 3 {
        return None;
    }

    let mut intervals: Vec<f64> = onsets_ms
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .collect();
    intervals.sort_by(f64::total_cmp);

    let median = intervals[intervals.len() / 2];
    if !median.is_finite() || median <= 0.0 {
        return None;
    }

    let filtered: Vec<f64> = intervals
        .iter()
        .copied()
        .filter(|interval| (interval - median).abs() <= median * INTERVAL_TOLERANCE)
        .collect();
    let required = ((intervals.len() as f64 * MIN_AGREEING_SHARE).ceil() as usize).max(2);
    if filtered.len() < required {
        return None;
    }

    let count = filtered.len() as f64;
    let average = filtered.iter().sum::<f64>() / count;
    let variance = filtered
        .iter()
        .map(|interval| (interval - average).powi(2))
        .sum::<f64>()
        / count;
    if variance.sqrt() > MAX_INTERVAL_JITTER_MS {
        return None;
    }

    normalize_bpm(MS_PER_MINUTE / average)
}

/// Tempo from a histogram of pairwise onset lags.
///
/// Every pair of onsets whose lag lies in the 40..=240 BPM range votes for
/// its 10 ms lag bin, weighted so that pairs anchored on recent onsets count
/// more. Needs at least four onsets and a winning bin score of at least 2.
pub fn histogram_bpm(onsets_ms: &[f64]) -> Option<f64> {
    let total = onsets_ms.len();
    if total < 4 {
        return None;
    }

    // keyed by bin index so iteration runs from the shortest lag upward
    let mut histogram: BTreeMap<i64, f64> = BTreeMap::new();
    for (age, newer) in (0..total).rev().enumerate() {
        let weight = 1.0 - age as f64 / total as f64;
        for older in (0..newer).rev() {
            let lag = onsets_ms[newer] - onsets_ms[older];
            if lag < MIN_LAG_MS {
                continue;
            }
            // lags only grow from here on
            if lag > MAX_LAG_MS {
                break;
            }
            let bin = (lag / LAG_BIN_MS).round() as i64;
            *histogram.entry(bin).or_insert(0.0) += weight;
        }
    }

    // ties keep the shortest lag
    let (best_bin, best_score) = histogram
        .into_iter()
        .fold(None, |best: Option<(i64, f64)>, (bin, score)| match best {
            Some((_, best_score)) if score <= best_score => best,
            _ => Some((bin, score)),
        })?;

    if best_score < MIN_HISTOGRAM_SCORE || best_bin <= 0 {
        return None;
    }

    normalize_bpm(MS_PER_MINUTE / (best_bin as f64 * LAG_BIN_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular_train(count: usize, spacing_ms: f64) -> Vec<f64> {
        (0..count).map(|i| 1_000.0 + i as f64 * spacing_ms).collect()
    }

    fn assert_bpm(actual: Option<f64>, expected: f64) {
        let bpm = actual.expect("tempo should be available");
        assert!(
            (bpm - expected).abs() < 1e-6,
            "expected {expected} BPM, got {bpm}"
        );
    }

    #[test]
    fn normalization_folds_into_canonical_octave() {
        assert_bpm(normalize_bpm(35.0), 140.0);
        assert_bpm(normalize_bpm(280.0), 140.0);
        assert_bpm(normalize_bpm(120.0), 120.0);
        assert_bpm(normalize_bpm(70.0), 70.0);
        assert_eq!(normalize_bpm(0.0), None);
        assert_eq!(normalize_bpm(-90.0), None);
        assert_eq!(normalize_bpm(f64::NAN), None);
        assert_eq!(normalize_bpm(f64::INFINITY), None);
    }

    #[test]
    fn interval_strategy_on_regular_spacing() {
        assert_bpm(interval_bpm(&[0.0, 500.0, 1000.0, 1500.0]), 120.0);
    }

    #[test]
    fn interval_strategy_needs_three_onsets() {
        assert_eq!(interval_bpm(&[]), None);
        assert_eq!(interval_bpm(&[0.0]), None);
        assert_eq!(interval_bpm(&[0.0, 500.0]), None);
    }

    #[test]
    fn interval_strategy_ignores_a_wild_outlier() {
        assert_bpm(interval_bpm(&[0.0, 500.0, 1000.0, 1500.0, 6500.0]), 120.0);
    }

    #[test]
    fn interval_strategy_rejects_erratic_timing() {
        // intervals 300, 500, 800, 1300: nothing else lies near the 800 ms median
        assert_eq!(interval_bpm(&[0.0, 300.0, 800.0, 1600.0, 2900.0]), None);
    }

    #[test]
    fn interval_strategy_rejects_jitter_inside_tolerance() {
        // 400/500/600 ms intervals all pass the 25% filter but deviate by ~82 ms
        let onsets = [0.0, 400.0, 900.0, 1500.0, 1900.0, 2400.0, 3000.0];
        assert_eq!(interval_bpm(&onsets), None);
    }

    #[test]
    fn interval_strategy_folds_slow_taps() {
        // 1500 ms spacing is 40 BPM, folded up to 80
        assert_bpm(interval_bpm(&regular_train(5, 1500.0)), 80.0);
    }

    #[test]
    fn histogram_strategy_on_regular_spacing() {
        assert_bpm(histogram_bpm(&regular_train(8, 500.0)), 120.0);
        assert_bpm(histogram_bpm(&[0.0, 500.0, 1000.0, 1500.0]), 120.0);
    }

    #[test]
    fn histogram_strategy_favours_the_recent_tempo() {
        // four 600 ms gaps, then three 500 ms gaps: equal votes would pick 600
        let onsets = [0.0, 600.0, 1200.0, 1800.0, 2400.0, 2900.0, 3400.0, 3900.0];
        assert_bpm(histogram_bpm(&onsets), 120.0);
    }

    #[test]
    fn histogram_strategy_needs_four_onsets() {
        assert_eq!(histogram_bpm(&[0.0, 500.0, 1000.0]), None);
    }

    #[test]
    fn histogram_strategy_needs_corroborating_pairs() {
        // a single pair reaches the 250 ms minimum lag
        assert_eq!(histogram_bpm(&[0.0, 100.0, 200.0, 300.0]), None);
        // widely spaced onsets: each lag bin gets a single vote
        assert_eq!(histogram_bpm(&[0.0, 700.0, 1600.0, 2100.0]), None);
    }

    #[test]
    fn strategies_agree_on_clean_data() {
        for spacing in [400.0, 500.0, 600.0] {
            let onsets = regular_train(12, spacing);
            let histogram = histogram_bpm(&onsets).unwrap();
            let interval = interval_bpm(&onsets).unwrap();
            assert!((histogram - interval).abs() < 1e-6);
        }
    }

    #[test]
    fn fallback_uses_intervals_when_histogram_is_empty() {
        let onsets = [0.0, 500.0, 1000.0];
        assert_eq!(histogram_bpm(&onsets), None);
        assert_bpm(TempoStrategy::HistogramWithFallback.estimate(&onsets), 120.0);
        assert_bpm(TempoStrategy::Interval.estimate(&onsets), 120.0);
    }
}
