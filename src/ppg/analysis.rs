//! PPG signal analysis
//!
//! Pure functions over an immutable sample slice:
//! - Bandpass filtering with two cascaded moving averages
//! - Min-max normalization
//! - Peak detection and median-interval heart rate
//! - Confidence scoring

use crate::types::{PpgResult, PpgSample, QualityTier};

/// Lower edge of the pulse band (42 BPM)
pub const LOW_CUTOFF_HZ: f64 = 0.7;
/// Upper edge of the pulse band (210 BPM)
pub const HIGH_CUTOFF_HZ: f64 = 3.5;
/// Assumed camera frame rate when timestamps cannot tell
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 30.0;

pub const PEAK_THRESHOLD: f64 = 0.5;
/// A peak must be more than this many samples after the previous one
pub const MIN_PEAK_DISTANCE: usize = 5;
pub const MIN_PEAKS: usize = 3;
pub const MIN_INTERVAL_MS: f64 = 300.0;
pub const MAX_INTERVAL_MS: f64 = 2000.0;

/// Brightness variance treated as full finger contact
pub const VARIANCE_CEILING: f64 = 10.0;
pub const TARGET_PEAKS: usize = 10;

/// Samples used by the live estimate
pub const QUICK_WINDOW: usize = 90;

/// Sample rate implied by the first and last timestamps
pub fn estimate_sample_rate(samples: &[PpgSample]) -> f64 {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) if last.timestamp_ms > first.timestamp_ms => {
            let span_s = (last.timestamp_ms - first.timestamp_ms) as f64 / 1000.0;
            (samples.len() - 1) as f64 / span_s
        }
        _ => DEFAULT_SAMPLE_RATE_HZ,
    }
}

/// Centered moving average; the window shrinks at the edges
pub fn moving_average(signal: &[f64], window: usize) -> Vec<f64> {
    let half = window.max(1) / 2;
    (0..signal.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(signal.len());
            let slice = &signal[start..end];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Keep the 0.7-3.5 Hz pulse band.
///
/// Low-pass with a short moving average, then remove the trend estimated by a
/// second, wider moving average.
pub fn bandpass_filter(signal: &[f64], sample_rate: f64) -> Vec<f64> {
    let lowpass_window = ((sample_rate / HIGH_CUTOFF_HZ / 2.0).round() as usize).max(1);
    let trend_window = ((sample_rate / LOW_CUTOFF_HZ).round() as usize).max(1);

    let smoothed = moving_average(signal, lowpass_window);
    let trend = moving_average(&smoothed, trend_window);
    smoothed.iter().zip(&trend).map(|(s, t)| s - t).collect()
}

/// Min-max scale to [0, 1]; a flat signal maps to all zeros
pub fn normalize(signal: &[f64]) -> Vec<f64> {
    let min = signal.iter().copied().fold(f64::INFINITY, f64::min);
    let max = signal.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range <= f64::EPSILON {
        return vec![0.0; signal.len()];
    }
    signal.iter().map(|v| (v - min) / range).collect()
}

/// Indices of local maxima above the threshold
pub fn detect_peaks(normalized: &[f64]) -> Vec<usize> {
    let mut peaks: Vec<usize> = Vec::new();
    if normalized.len() < 5 {
        return peaks;
    }
    for i in 2..normalized.len() - 2 {
        let v = normalized[i];
        if v <= PEAK_THRESHOLD {
            continue;
        }
        let is_max = v > normalized[i - 1]
            && v > normalized[i - 2]
            && v > normalized[i + 1]
            && v > normalized[i + 2];
        if !is_max {
            continue;
        }
        if let Some(&last) = peaks.last() {
            if i - last <= MIN_PEAK_DISTANCE {
                continue;
            }
        }
        peaks.push(i);
    }
    peaks
}

/// Peak-to-peak intervals in milliseconds, restricted to 30-200 BPM
pub fn peak_intervals(peaks: &[usize], samples: &[PpgSample]) -> Vec<f64> {
    peaks
        .windows(2)
        .filter_map(|pair| {
            let a = samples.get(pair[0])?.timestamp_ms;
            let b = samples.get(pair[1])?.timestamp_ms;
            Some(b.saturating_sub(a) as f64)
        })
        .filter(|ms| (MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(ms))
        .collect()
}

/// Heart rate from the median peak interval; 0 when there is not enough to go on
pub fn calculate_bpm(peaks: &[usize], samples: &[PpgSample]) -> f64 {
    if peaks.len() < MIN_PEAKS {
        return 0.0;
    }
    match median(&peak_intervals(peaks, samples)) {
        Some(interval) if interval > 0.0 => 60_000.0 / interval,
        _ => 0.0,
    }
}

/// Weighted confidence in [0, 1]:
/// 30% brightness variance, 50% interval regularity, 20% peak count
pub fn score_confidence(brightness: &[f64], intervals: &[f64], peak_count: usize) -> f64 {
    let variance_score = (variance(brightness) / VARIANCE_CEILING).min(1.0);

    let regularity_score = if intervals.len() >= 2 {
        let mean = mean(intervals);
        if mean > 0.0 {
            (1.0 - variance(intervals).sqrt() / mean).clamp(0.0, 1.0)
        } else {
            0.0
        }
    } else {
        0.0
    };

    let peak_score = (peak_count as f64 / TARGET_PEAKS as f64).min(1.0);

    (0.3 * variance_score + 0.5 * regularity_score + 0.2 * peak_score).clamp(0.0, 1.0)
}

/// Full analysis of one measurement
pub fn analyze_signal(samples: &[PpgSample]) -> PpgResult {
    let brightness: Vec<f64> = samples.iter().map(|s| s.brightness).collect();
    let sample_rate = estimate_sample_rate(samples);

    let filtered = bandpass_filter(&brightness, sample_rate);
    let normalized = normalize(&filtered);
    let peaks = detect_peaks(&normalized);
    let intervals = peak_intervals(&peaks, samples);
    let bpm = calculate_bpm(&peaks, samples);

    let confidence = if bpm > 0.0 {
        score_confidence(&brightness, &intervals, peaks.len())
    } else {
        0.0
    };

    let duration_seconds = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => {
            last.timestamp_ms.saturating_sub(first.timestamp_ms) as f64 / 1000.0
        }
        _ => 0.0,
    };

    PpgResult {
        bpm,
        confidence,
        quality_tier: QualityTier::from_confidence(confidence),
        duration_seconds,
        sample_count: samples.len(),
    }
}

/// Live estimate over the trailing window (filter, normalize, peaks, bpm)
pub fn quick_estimate(samples: &[PpgSample]) -> f64 {
    let window = &samples[samples.len().saturating_sub(QUICK_WINDOW)..];
    let brightness: Vec<f64> = window.iter().map(|s| s.brightness).collect();
    let filtered = bandpass_filter(&brightness, estimate_sample_rate(window));
    let peaks = detect_peaks(&normalize(&filtered));
    calculate_bpm(&peaks, window)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
