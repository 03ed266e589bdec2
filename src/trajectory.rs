//! Health trajectory prediction
//!
//! Turns a subject's canonical metric history into a composite score, a risk
//! level and a 24-hour projected trajectory:
//! - Banded sub-scores per metric type (mean of the trailing window)
//! - Composite = unweighted mean of the sub-scores that have data
//! - Confidence grows with the number of observations, capped at 0.95
//! - Hourly trajectory = composite + circadian term + trend term + noise
//!
//! Only the noise terms are random, and they come from the caller's RNG.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use rand::Rng;
use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::config::PredictorConfig;
use crate::types::{
    CanonicalMetric, DataSource, MetricType, RiskLevel, SubScore, TrajectoryPoint,
    TrajectoryPrediction, Trend,
};

pub const HORIZON_HOURS: i64 = 24;
pub const TRAJECTORY_MIN: f64 = 0.15;
pub const TRAJECTORY_MAX: f64 = 0.98;

/// Composite used when no scored metric type has data
pub const NEUTRAL_SCORE: f64 = 0.65;
pub const SIMULATED_CONFIDENCE: f64 = 0.42;
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Change between first and last value that counts as a trend
pub const TREND_THRESHOLD: f64 = 5.0;

const LIVE_CIRCADIAN_AMPLITUDE: f64 = 0.06;
const LIVE_NOISE: f64 = 0.02;
const TREND_SCALE: f64 = 0.001;
const SIMULATED_CIRCADIAN_AMPLITUDE: f64 = 0.08;
const SIMULATED_NOISE: f64 = 0.03;
const SIMULATED_DRIFT: f64 = 0.002;

/// Metric types that carry a sub-score, in reporting order
pub const SCORED_TYPES: [MetricType; 6] = [
    MetricType::HeartRate,
    MetricType::BloodPressureSystolic,
    MetricType::Glucose,
    MetricType::SleepDuration,
    MetricType::Steps,
    MetricType::OxygenSaturation,
];

/// `sin((hour - 6) π / 12)`: peaks at noon, bottoms out at midnight
pub fn circadian(hour: u32) -> f64 {
    ((f64::from(hour) - 6.0) * PI / 12.0).sin()
}

/// Confidence from the number of observations in the window
pub fn confidence_for(metric_count: usize) -> f64 {
    (0.5 + metric_count as f64 / 100.0 * 0.45).min(MAX_CONFIDENCE)
}

/// Band a metric average into (score, description); `None` for unscored types
pub fn band_score(metric_type: MetricType, average: f64) -> Option<(f64, &'static str)> {
    let band = match metric_type {
        MetricType::HeartRate => {
            if (60.0..=80.0).contains(&average) {
                (0.9, "in the optimal range")
            } else if (50.0..=100.0).contains(&average) {
                (0.7, "within normal limits")
            } else {
                (0.4, "outside the typical range")
            }
        }
        MetricType::BloodPressureSystolic => {
            if average < 120.0 {
                (0.9, "in the optimal range")
            } else if average < 130.0 {
                (0.75, "slightly elevated")
            } else if average < 140.0 {
                (0.6, "elevated")
            } else {
                (0.35, "high")
            }
        }
        MetricType::Glucose => {
            if (70.0..=100.0).contains(&average) {
                (0.9, "in the optimal range")
            } else if average > 100.0 && average <= 125.0 {
                (0.7, "elevated")
            } else {
                (0.4, "outside the healthy range")
            }
        }
        MetricType::SleepDuration => {
            if (7.0..=9.0).contains(&average) {
                (0.9, "in the optimal range")
            } else if (6.0..=10.0).contains(&average) {
                (0.7, "close to the recommended range")
            } else {
                (0.4, "outside the recommended range")
            }
        }
        MetricType::Steps => {
            if average >= 10_000.0 {
                (0.95, "meeting the daily goal")
            } else if average >= 7_000.0 {
                (0.8, "active")
            } else if average >= 4_000.0 {
                (0.6, "moderately active")
            } else {
                (0.4, "low")
            }
        }
        MetricType::OxygenSaturation => {
            if average >= 95.0 {
                (0.9, "in the optimal range")
            } else if average >= 90.0 {
                (0.6, "slightly low")
            } else {
                (0.3, "low")
            }
        }
        _ => return None,
    };
    Some(band)
}

fn label(metric_type: MetricType) -> &'static str {
    match metric_type {
        MetricType::HeartRate => "Heart rate",
        MetricType::BloodPressureSystolic => "Systolic blood pressure",
        MetricType::Glucose => "Glucose",
        MetricType::SleepDuration => "Sleep",
        MetricType::Steps => "Daily steps",
        MetricType::OxygenSaturation => "Oxygen saturation",
        other => other.as_str(),
    }
}

fn trend_of(values: &[f64]) -> Trend {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if last - first > TREND_THRESHOLD => Trend::Up,
        (Some(first), Some(last)) if last - first < -TREND_THRESHOLD => Trend::Down,
        _ => Trend::Stable,
    }
}

fn format_value(metric_type: MetricType, value: f64) -> String {
    match metric_type {
        MetricType::Steps => format!("{value:.0}"),
        _ => format!("{value:.1}"),
    }
}

/// Sub-score of one metric type; `values` are in time order
fn sub_score(metric_type: MetricType, values: &[f64]) -> Option<SubScore> {
    let latest = *values.last()?;
    let average = values.iter().sum::<f64>() / values.len() as f64;
    let (score, band) = band_score(metric_type, average)?;
    let trend = trend_of(values);

    let trend_text = match trend {
        Trend::Up => "trending up",
        Trend::Down => "trending down",
        Trend::Stable => "stable",
    };
    let unit = metric_type.unit();
    let factor = format!(
        "{} averaging {} {unit} is {band} (latest {} {unit}, {trend_text})",
        label(metric_type),
        format_value(metric_type, average),
        format_value(metric_type, latest),
    );

    Some(SubScore {
        metric_type,
        score,
        average,
        latest,
        trend,
        factor,
    })
}

/// Sum of step counts per calendar day (UTC), in day order
fn daily_totals(steps: &[&CanonicalMetric]) -> Vec<f64> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for metric in steps {
        *days.entry(metric.recorded_at.date_naive()).or_insert(0.0) += metric.value;
    }
    days.into_values().collect()
}

/// Relative change across the most recent observations of the newest type
fn recent_relative_change(window: &[&CanonicalMetric], trend_window: usize) -> f64 {
    let Some(newest) = window.last() else {
        return 0.0;
    };
    let recent: Vec<f64> = window
        .iter()
        .rev()
        .filter(|m| m.metric_type == newest.metric_type)
        .take(trend_window.max(2))
        .map(|m| m.value)
        .collect();

    // `recent` is newest first
    match (recent.last(), recent.first()) {
        (Some(&oldest), Some(&latest)) if recent.len() >= 2 && oldest.abs() > f64::EPSILON => {
            ((latest - oldest) / oldest.abs()).clamp(-1.0, 1.0)
        }
        _ => 0.0,
    }
}

/// Read-only predictor; safe to share between callers
#[derive(Debug, Clone, Default)]
pub struct TrajectoryPredictor {
    config: PredictorConfig,
}

impl TrajectoryPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Predict from the metrics recorded in the trailing window ending at `now`
    pub fn predict<R: Rng + ?Sized>(
        &self,
        history: &[CanonicalMetric],
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> TrajectoryPrediction {
        let since = now - Duration::days(self.config.lookback_days);
        let mut window: Vec<&CanonicalMetric> = history
            .iter()
            .filter(|m| m.recorded_at >= since && m.recorded_at <= now)
            .collect();

        if window.is_empty() {
            return self.simulated(now, rng);
        }
        window.sort_by_key(|m| m.recorded_at);

        let mut groups: BTreeMap<MetricType, Vec<&CanonicalMetric>> = BTreeMap::new();
        for metric in &window {
            groups.entry(metric.metric_type).or_default().push(*metric);
        }

        let sub_scores: Vec<SubScore> = SCORED_TYPES
            .iter()
            .filter_map(|&metric_type| {
                let group = groups.get(&metric_type)?;
                let values = if metric_type == MetricType::Steps {
                    daily_totals(group)
                } else {
                    group.iter().map(|m| m.value).collect()
                };
                sub_score(metric_type, &values)
            })
            .collect();

        let mut contributing_factors: Vec<String> =
            sub_scores.iter().map(|s| s.factor.clone()).collect();

        let composite = if sub_scores.is_empty() {
            contributing_factors.push(
                "Recorded metrics do not include scored vitals yet; using a neutral baseline"
                    .to_string(),
            );
            NEUTRAL_SCORE
        } else {
            sub_scores.iter().map(|s| s.score).sum::<f64>() / sub_scores.len() as f64
        };

        let relative_change = recent_relative_change(&window, self.config.trend_window);
        let trajectory = (1..=HORIZON_HOURS)
            .map(|h| {
                let timestamp = now + Duration::hours(h);
                let noise = rng.gen_range(-LIVE_NOISE..=LIVE_NOISE) * self.config.noise_scale;
                let value = composite
                    + circadian(timestamp.hour()) * LIVE_CIRCADIAN_AMPLITUDE
                    + relative_change * TREND_SCALE * h as f64
                    + noise;
                TrajectoryPoint {
                    timestamp,
                    value: value.clamp(TRAJECTORY_MIN, TRAJECTORY_MAX),
                }
            })
            .collect();

        tracing::debug!(
            metrics = window.len(),
            sub_scores = sub_scores.len(),
            composite,
            "trajectory predicted"
        );

        TrajectoryPrediction {
            predicted_value: composite,
            confidence: confidence_for(window.len()),
            risk_level: RiskLevel::from_score(composite),
            contributing_factors,
            trajectory,
            data_source: DataSource::Live,
            metrics_used: window.len(),
            sub_scores,
            generated_at: now,
        }
    }

    fn simulated<R: Rng + ?Sized>(&self, now: DateTime<Utc>, rng: &mut R) -> TrajectoryPrediction {
        let trajectory = (1..=HORIZON_HOURS)
            .map(|h| {
                let timestamp = now + Duration::hours(h);
                let noise =
                    rng.gen_range(-SIMULATED_NOISE..=SIMULATED_NOISE) * self.config.noise_scale;
                let value = NEUTRAL_SCORE
                    + SIMULATED_DRIFT * h as f64
                    + circadian(timestamp.hour()) * SIMULATED_CIRCADIAN_AMPLITUDE
                    + noise;
                TrajectoryPoint {
                    timestamp,
                    value: value.clamp(TRAJECTORY_MIN, TRAJECTORY_MAX),
                }
            })
            .collect();

        TrajectoryPrediction {
            predicted_value: NEUTRAL_SCORE,
            confidence: SIMULATED_CONFIDENCE,
            risk_level: RiskLevel::Low,
            contributing_factors: vec![
                "No health data recorded yet".to_string(),
                "This trajectory is simulated from typical daily rhythms".to_string(),
                "Record vitals or activity to get a personalized prediction".to_string(),
            ],
            trajectory,
            data_source: DataSource::Simulated,
            metrics_used: 0,
            sub_scores: Vec::new(),
            generated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap()
    }

    fn metric(metric_type: MetricType, value: f64, hours_ago: i64) -> CanonicalMetric {
        CanonicalMetric::canonical(metric_type, value, now() - Duration::hours(hours_ago), "test")
            .unwrap()
    }

    fn predict(history: &[CanonicalMetric]) -> TrajectoryPrediction {
        TrajectoryPredictor::default().predict(history, now(), &mut StdRng::seed_from_u64(7))
    }

    fn assert_trajectory_shape(prediction: &TrajectoryPrediction) {
        assert_eq!(prediction.trajectory.len(), 24);
        for (i, point) in prediction.trajectory.iter().enumerate() {
            assert!((TRAJECTORY_MIN..=TRAJECTORY_MAX).contains(&point.value));
            assert_eq!(point.timestamp, now() + Duration::hours(i as i64 + 1));
        }
    }

    #[test]
    fn test_empty_history_is_simulated() {
        let prediction = predict(&[]);
        assert_eq!(prediction.data_source, DataSource::Simulated);
        assert_eq!(prediction.confidence, 0.42);
        assert_eq!(prediction.metrics_used, 0);
        assert_eq!(prediction.risk_level, RiskLevel::Low);
        assert!(!prediction.contributing_factors.is_empty());
        assert_trajectory_shape(&prediction);
    }

    #[test]
    fn test_heart_rate_only_history() {
        let history: Vec<_> = [68.0, 72.0, 70.0, 69.0, 71.0]
            .iter()
            .enumerate()
            .map(|(i, v)| metric(MetricType::HeartRate, *v, 10 - i as i64))
            .collect();
        let prediction = predict(&history);

        assert_eq!(prediction.data_source, DataSource::Live);
        assert_eq!(prediction.sub_scores.len(), 1);
        assert_eq!(prediction.sub_scores[0].score, 0.9);
        assert_eq!(prediction.predicted_value, 0.9);
        assert_eq!(prediction.risk_level, RiskLevel::Low);
        assert!(prediction.contributing_factors[0].contains("optimal range"));
        assert_eq!(prediction.metrics_used, 5);
        assert!((prediction.confidence - (0.5 + 0.05 * 0.45)).abs() < 1e-12);
        assert_trajectory_shape(&prediction);
    }

    #[test]
    fn test_composite_is_mean_of_available_scores() {
        let base = vec![
            metric(MetricType::HeartRate, 90.0, 5),
            metric(MetricType::BloodPressureSystolic, 135.0, 4),
        ];
        let prediction = predict(&base);
        assert!((prediction.predicted_value - (0.7 + 0.6) / 2.0).abs() < 1e-12);
        assert_eq!(prediction.risk_level, RiskLevel::Moderate);

        // A type without a band must not move the composite
        let mut with_weight = base.clone();
        with_weight.push(metric(MetricType::Weight, 80.0, 3));
        let other = predict(&with_weight);
        assert_eq!(other.predicted_value, prediction.predicted_value);
        assert_eq!(other.metrics_used, 3);
    }

    #[test]
    fn test_unscored_history_falls_back_to_neutral() {
        let prediction = predict(&[metric(MetricType::Weight, 80.0, 1)]);
        assert_eq!(prediction.predicted_value, NEUTRAL_SCORE);
        assert!(prediction.sub_scores.is_empty());
        assert_eq!(prediction.contributing_factors.len(), 1);
        assert_eq!(prediction.data_source, DataSource::Live);
    }

    #[test]
    fn test_steps_scored_on_daily_totals() {
        // Two days of 6000 + 5000 and 4000 + 8000 steps
        let history = vec![
            metric(MetricType::Steps, 6000.0, 30),
            metric(MetricType::Steps, 5000.0, 28),
            metric(MetricType::Steps, 4000.0, 2),
            metric(MetricType::Steps, 8000.0, 1),
        ];
        let prediction = predict(&history);
        let steps = &prediction.sub_scores[0];
        assert_eq!(steps.metric_type, MetricType::Steps);
        assert_eq!(steps.average, 11_500.0);
        assert_eq!(steps.score, 0.95);
        assert_eq!(steps.trend, Trend::Up);
    }

    #[test]
    fn test_trend_threshold() {
        let history = vec![
            metric(MetricType::BloodPressureSystolic, 130.0, 48),
            metric(MetricType::BloodPressureSystolic, 124.0, 24),
            metric(MetricType::BloodPressureSystolic, 118.0, 1),
        ];
        let prediction = predict(&history);
        assert_eq!(prediction.sub_scores[0].trend, Trend::Down);
        assert!(prediction.contributing_factors[0].contains("trending down"));

        let flat = predict(&[
            metric(MetricType::HeartRate, 70.0, 2),
            metric(MetricType::HeartRate, 74.0, 1),
        ]);
        assert_eq!(flat.sub_scores[0].trend, Trend::Stable);
    }

    #[test]
    fn test_old_metrics_ignored() {
        let prediction = predict(&[metric(MetricType::HeartRate, 70.0, 24 * 31)]);
        assert_eq!(prediction.data_source, DataSource::Simulated);
    }

    #[test]
    fn test_confidence_caps() {
        assert_eq!(confidence_for(0), 0.5);
        assert!((confidence_for(50) - 0.725).abs() < 1e-12);
        assert_eq!(confidence_for(100), 0.95);
        assert_eq!(confidence_for(1000), 0.95);
    }

    #[test]
    fn test_noise_free_trajectory_is_deterministic() {
        let predictor = TrajectoryPredictor::new(PredictorConfig {
            noise_scale: 0.0,
            ..PredictorConfig::default()
        });
        let history = vec![metric(MetricType::HeartRate, 70.0, 1)];
        let a = predictor.predict(&history, now(), &mut StdRng::seed_from_u64(1));
        let b = predictor.predict(&history, now(), &mut StdRng::seed_from_u64(2));
        assert_eq!(a.trajectory, b.trajectory);

        // 12:00 is the circadian peak
        let peak = &a.trajectory[2];
        assert_eq!(peak.timestamp.hour(), 12);
        assert!((peak.value - (0.9 + 0.06)).abs() < 1e-9);
    }

    #[test]
    fn test_extreme_scores_are_clamped() {
        let history: Vec<_> = (0..10)
            .map(|i| metric(MetricType::OxygenSaturation, 80.0, i))
            .collect();
        let prediction = predict(&history);
        assert_eq!(prediction.risk_level, RiskLevel::Critical);
        assert_trajectory_shape(&prediction);
    }
}
