//! Core types for the vitaltrace pipeline
//!
//! This module defines the records that flow between components: PPG samples
//! and results, motion samples and activity sessions, canonical metrics, and
//! trajectory predictions. Device readings live in [`crate::devices`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::VitalsError;

/// Canonical metric kinds with a fixed unit and physiological bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    HeartRate,
    RrInterval,
    EnergyExpended,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    MeanArterialPressure,
    Weight,
    Bmi,
    Height,
    Glucose,
    Hba1c,
    OxygenSaturation,
    PulseAmplitudeIndex,
    Temperature,
    Steps,
    Distance,
    CaloriesBurned,
    SleepDuration,
    StressLevel,
    MoodScore,
}

impl MetricType {
    pub const ALL: [MetricType; 20] = [
        MetricType::HeartRate,
        MetricType::RrInterval,
        MetricType::EnergyExpended,
        MetricType::BloodPressureSystolic,
        MetricType::BloodPressureDiastolic,
        MetricType::MeanArterialPressure,
        MetricType::Weight,
        MetricType::Bmi,
        MetricType::Height,
        MetricType::Glucose,
        MetricType::Hba1c,
        MetricType::OxygenSaturation,
        MetricType::PulseAmplitudeIndex,
        MetricType::Temperature,
        MetricType::Steps,
        MetricType::Distance,
        MetricType::CaloriesBurned,
        MetricType::SleepDuration,
        MetricType::StressLevel,
        MetricType::MoodScore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::HeartRate => "heart_rate",
            MetricType::RrInterval => "rr_interval",
            MetricType::EnergyExpended => "energy_expended",
            MetricType::BloodPressureSystolic => "blood_pressure_systolic",
            MetricType::BloodPressureDiastolic => "blood_pressure_diastolic",
            MetricType::MeanArterialPressure => "mean_arterial_pressure",
            MetricType::Weight => "weight",
            MetricType::Bmi => "bmi",
            MetricType::Height => "height",
            MetricType::Glucose => "glucose",
            MetricType::Hba1c => "hba1c",
            MetricType::OxygenSaturation => "oxygen_saturation",
            MetricType::PulseAmplitudeIndex => "pulse_amplitude_index",
            MetricType::Temperature => "temperature",
            MetricType::Steps => "steps",
            MetricType::Distance => "distance",
            MetricType::CaloriesBurned => "calories_burned",
            MetricType::SleepDuration => "sleep_duration",
            MetricType::StressLevel => "stress_level",
            MetricType::MoodScore => "mood_score",
        }
    }

    /// The single unit every metric of this type is stored in
    pub fn unit(&self) -> &'static str {
        match self {
            MetricType::HeartRate => "bpm",
            MetricType::RrInterval => "ms",
            MetricType::EnergyExpended => "kJ",
            MetricType::BloodPressureSystolic
            | MetricType::BloodPressureDiastolic
            | MetricType::MeanArterialPressure => "mmHg",
            MetricType::Weight => "kg",
            MetricType::Bmi => "kg/m2",
            MetricType::Height => "m",
            MetricType::Glucose => "mg/dL",
            MetricType::Hba1c | MetricType::OxygenSaturation | MetricType::PulseAmplitudeIndex => {
                "%"
            }
            MetricType::Temperature => "celsius",
            MetricType::Steps => "steps",
            MetricType::Distance => "meters",
            MetricType::CaloriesBurned => "kcal",
            MetricType::SleepDuration => "hours",
            MetricType::StressLevel | MetricType::MoodScore => "score",
        }
    }

    /// Inclusive physiological bounds (min, max) in the type's unit
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            MetricType::HeartRate => (20.0, 250.0),
            MetricType::RrInterval => (200.0, 3000.0),
            MetricType::EnergyExpended => (0.0, 65_535.0),
            MetricType::BloodPressureSystolic => (50.0, 300.0),
            MetricType::BloodPressureDiastolic => (20.0, 200.0),
            MetricType::MeanArterialPressure => (30.0, 250.0),
            MetricType::Weight => (1.0, 500.0),
            MetricType::Bmi => (5.0, 100.0),
            MetricType::Height => (0.3, 2.8),
            MetricType::Glucose => (10.0, 1000.0),
            MetricType::Hba1c => (2.0, 20.0),
            MetricType::OxygenSaturation => (50.0, 100.0),
            MetricType::PulseAmplitudeIndex => (0.0, 100.0),
            MetricType::Temperature => (25.0, 45.0),
            MetricType::Steps => (0.0, 200_000.0),
            MetricType::Distance => (0.0, 1_000_000.0),
            MetricType::CaloriesBurned => (0.0, 20_000.0),
            MetricType::SleepDuration => (0.0, 24.0),
            MetricType::StressLevel | MetricType::MoodScore => (0.0, 10.0),
        }
    }

    pub fn in_bounds(&self, value: f64) -> bool {
        let (min, max) = self.bounds();
        value.is_finite() && value >= min && value <= max
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = VitalsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| VitalsError::ParseError(format!("unknown metric type '{s}'")))
    }
}

/// The single record shape every upstream component produces.
///
/// Serialized with the persistence row names (`metric_type`, `metric_value`,
/// `metric_unit`, `recorded_at`, `source`). Deserialized rows go through
/// [`CanonicalMetric::new`], so bounds and unit hold for every input path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMetricRow")]
pub struct CanonicalMetric {
    #[serde(rename = "metric_type")]
    pub metric_type: MetricType,
    #[serde(rename = "metric_value")]
    pub value: f64,
    #[serde(rename = "metric_unit")]
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
    /// Producer of the value, e.g. "ble:heart_rate", "camera_ppg", "text"
    pub source: String,
}

impl CanonicalMetric {
    /// Build a metric, rejecting non-finite or out-of-bounds values and unit mismatches
    pub fn new(
        metric_type: MetricType,
        value: f64,
        unit: &str,
        recorded_at: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Result<Self, VitalsError> {
        if !value.is_finite() {
            return Err(VitalsError::Validation(format!(
                "{metric_type} value is not finite"
            )));
        }
        if unit != metric_type.unit() {
            return Err(VitalsError::Validation(format!(
                "{metric_type} must be recorded in {}, got {unit}",
                metric_type.unit()
            )));
        }
        if !metric_type.in_bounds(value) {
            let (min, max) = metric_type.bounds();
            return Err(VitalsError::Validation(format!(
                "{metric_type} value {value} outside [{min}, {max}] {unit}"
            )));
        }
        Ok(Self {
            metric_type,
            value,
            unit: unit.to_string(),
            recorded_at,
            source: source.into(),
        })
    }

    /// Build a metric in the type's canonical unit
    pub fn canonical(
        metric_type: MetricType,
        value: f64,
        recorded_at: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Result<Self, VitalsError> {
        Self::new(metric_type, value, metric_type.unit(), recorded_at, source)
    }
}

/// Persistence row as read, before validation
#[derive(Deserialize)]
struct RawMetricRow {
    metric_type: MetricType,
    metric_value: f64,
    metric_unit: String,
    recorded_at: DateTime<Utc>,
    source: String,
}

impl TryFrom<RawMetricRow> for CanonicalMetric {
    type Error = VitalsError;

    fn try_from(row: RawMetricRow) -> Result<Self, Self::Error> {
        CanonicalMetric::new(
            row.metric_type,
            row.metric_value,
            &row.metric_unit,
            row.recorded_at,
            row.source,
        )
    }
}

/// One brightness reading from the optical sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PpgSample {
    /// Mean frame brightness (camera units, typically 0-255)
    pub brightness: f64,
    /// Capture time in milliseconds since the start of the capture clock
    pub timestamp_ms: u64,
}

/// Signal quality classification of a PPG measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.8 {
            QualityTier::Excellent
        } else if confidence > 0.6 {
            QualityTier::Good
        } else if confidence > 0.4 {
            QualityTier::Fair
        } else {
            QualityTier::Poor
        }
    }
}

/// Terminal value of one PPG measurement session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpgResult {
    /// Heart rate estimate; 0 when fewer than three peaks were found
    pub bpm: f64,
    /// Confidence in the estimate (0-1)
    pub confidence: f64,
    pub quality_tier: QualityTier,
    pub duration_seconds: f64,
    pub sample_count: usize,
}

impl PpgResult {
    pub fn is_valid(&self) -> bool {
        self.bpm > 0.0
    }
}

/// One accelerometer reading, already reduced to vector magnitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// |a| in m/s², gravity included
    pub accel_magnitude: f64,
    pub timestamp_ms: u64,
}

/// One positioning fix in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub lat: f64,
    pub lon: f64,
    pub timestamp_ms: u64,
}

/// Activity classification used for calorie estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Run,
    Walk,
    General,
}

impl ActivityType {
    /// Metabolic equivalent of the activity
    pub fn met(&self) -> f64 {
        match self {
            ActivityType::Run => 8.0,
            ActivityType::Walk => 3.5,
            ActivityType::General => 4.0,
        }
    }

    /// Typical speed (m/s) used to turn distance into duration
    pub fn assumed_speed_mps(&self) -> f64 {
        match self {
            ActivityType::Run => 2.8,
            ActivityType::Walk | ActivityType::General => 1.4,
        }
    }

    /// Typical cadence (steps/min) used to turn steps into duration
    pub fn assumed_cadence(&self) -> f64 {
        match self {
            ActivityType::Run => 160.0,
            ActivityType::Walk | ActivityType::General => 100.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Run => "run",
            ActivityType::Walk => "walk",
            ActivityType::General => "general",
        }
    }
}

/// Aggregated motion session; immutable once `is_active` is false
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySession {
    pub id: Uuid,
    pub activity: ActivityType,
    pub steps: u32,
    pub distance_meters: f64,
    /// Estimated kcal, computed when the session stops
    pub calories: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Risk classification derived from the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            RiskLevel::Low
        } else if score >= 0.6 {
            RiskLevel::Moderate
        } else if score >= 0.4 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// Whether a prediction was computed from recorded metrics or simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Simulated,
}

/// Direction of change between the first and last value of a metric group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// Banded score of one metric type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub metric_type: MetricType,
    /// Score in [0, 1]
    pub score: f64,
    /// Mean of the scored values (daily totals for steps)
    pub average: f64,
    pub latest: f64,
    pub trend: Trend,
    /// Human-readable explanation
    pub factor: String,
}

/// One hourly point of the projected trajectory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Forward-looking health estimate recomputed from the metric history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPrediction {
    /// Composite score in [0, 1]
    pub predicted_value: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub contributing_factors: Vec<String>,
    /// Exactly 24 hourly points, values in [0.15, 0.98]
    pub trajectory: Vec<TrajectoryPoint>,
    pub data_source: DataSource,
    pub metrics_used: usize,
    #[serde(default)]
    pub sub_scores: Vec<SubScore>,
    pub generated_at: DateTime<Utc>,
}

/// Producer metadata stamped on every encoded prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Versioned envelope handed to transport or an external cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionPayload {
    pub schema_version: String,
    pub producer: PayloadProducer,
    pub subject_id: String,
    /// RFC 3339
    pub computed_at_utc: String,
    pub prediction: TrajectoryPrediction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_type_round_trip_names() {
        for t in MetricType::ALL {
            assert_eq!(t.as_str().parse::<MetricType>().unwrap(), t);
        }
        assert!("blood_sugar".parse::<MetricType>().is_err());
    }

    #[test]
    fn test_canonical_metric_validation() {
        let now = Utc::now();
        assert!(CanonicalMetric::canonical(MetricType::HeartRate, 72.0, now, "test").is_ok());
        assert!(matches!(
            CanonicalMetric::canonical(MetricType::HeartRate, f64::NAN, now, "test"),
            Err(VitalsError::Validation(_))
        ));
        assert!(matches!(
            CanonicalMetric::canonical(MetricType::HeartRate, 400.0, now, "test"),
            Err(VitalsError::Validation(_))
        ));
        assert!(matches!(
            CanonicalMetric::new(MetricType::Weight, 80.0, "lb", now, "test"),
            Err(VitalsError::Validation(_))
        ));
    }

    #[test]
    fn test_metric_row_serialization() {
        let now = Utc::now();
        let metric = CanonicalMetric::canonical(MetricType::Glucose, 95.0, now, "text").unwrap();
        let json = serde_json::to_value(&metric).unwrap();
        assert_eq!(json["metric_type"], "glucose");
        assert_eq!(json["metric_value"], 95.0);
        assert_eq!(json["metric_unit"], "mg/dL");
        assert_eq!(json["source"], "text");

        let back: CanonicalMetric = serde_json::from_value(json).unwrap();
        assert_eq!(back, metric);
    }

    #[test]
    fn test_deserialized_row_is_validated() {
        let row = |value: f64, unit: &str| {
            serde_json::json!({
                "metric_type": "heart_rate",
                "metric_value": value,
                "metric_unit": unit,
                "recorded_at": "2024-01-01T00:00:00Z",
                "source": "import",
            })
        };

        assert!(serde_json::from_value::<CanonicalMetric>(row(64.0, "bpm")).is_ok());

        let err = serde_json::from_value::<CanonicalMetric>(row(5000.0, "bpm")).unwrap_err();
        assert!(err.to_string().contains("outside [20, 250]"));
        let err = serde_json::from_value::<CanonicalMetric>(row(64.0, "kg")).unwrap_err();
        assert!(err.to_string().contains("must be recorded in bpm"));
        assert!(serde_json::from_value::<Vec<CanonicalMetric>>(serde_json::json!([
            row(64.0, "bpm"),
            row(5000.0, "kg"),
        ]))
        .is_err());
    }

    #[test]
    fn test_quality_tier_thresholds() {
        assert_eq!(QualityTier::from_confidence(0.81), QualityTier::Excellent);
        assert_eq!(QualityTier::from_confidence(0.8), QualityTier::Good);
        assert_eq!(QualityTier::from_confidence(0.61), QualityTier::Good);
        assert_eq!(QualityTier::from_confidence(0.5), QualityTier::Fair);
        assert_eq!(QualityTier::from_confidence(0.4), QualityTier::Poor);
    }

    #[test]
    fn test_risk_level_thresholds() {
        assert_eq!(RiskLevel::from_score(0.8), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.79), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(0.4), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.39), RiskLevel::Critical);
    }
}
