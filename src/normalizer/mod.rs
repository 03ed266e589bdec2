//! Metric normalization
//!
//! This module maps every upstream shape onto [`CanonicalMetric`] records:
//! - Decoded device readings (unit conversion to the canonical table)
//! - PPG results
//! - Finished activity sessions
//! - Free text, through [`TextExtractor`]

mod text;

pub use text::TextExtractor;

use chrono::{DateTime, Utc};

use crate::devices::{MassUnit, PressureUnit, TemperatureUnit, TypedReading};
use crate::error::VitalsError;
use crate::types::{ActivitySession, CanonicalMetric, MetricType, PpgResult};

pub const KPA_TO_MMHG: f64 = 7.50062;
pub const LB_TO_KG: f64 = 0.45359237;
pub const INCH_TO_M: f64 = 0.0254;

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Source tag for metrics derived from camera PPG
pub const PPG_SOURCE: &str = "camera_ppg";

/// Normalizer for converting typed inputs to canonical metrics
pub struct Normalizer;

impl Normalizer {
    /// Canonical metrics carried by one decoded frame.
    ///
    /// The device timestamp is used when the frame has one, `received_at`
    /// otherwise. Optional fields the device reported as special values
    /// (NaN, NRes, ±INF) are left out; any other value that fails validation
    /// fails the whole reading.
    pub fn from_reading(
        reading: &TypedReading,
        received_at: DateTime<Utc>,
    ) -> Result<Vec<CanonicalMetric>, VitalsError> {
        let at = reading.device_timestamp().unwrap_or(received_at);
        let source = format!("ble:{}", reading.kind());
        let mut metrics = Vec::new();
        let mut push = |metric_type: MetricType, value: f64| -> Result<(), VitalsError> {
            metrics.push(CanonicalMetric::canonical(metric_type, value, at, source.as_str())?);
            Ok(())
        };

        match reading {
            TypedReading::HeartRate(r) => {
                push(MetricType::HeartRate, f64::from(r.bpm))?;
                if let Some(energy) = r.energy_expended_kj {
                    push(MetricType::EnergyExpended, f64::from(energy))?;
                }
                if !r.rr_intervals_ms.is_empty() {
                    let total: f64 = r.rr_intervals_ms.iter().sum();
                    let mean = total / r.rr_intervals_ms.len() as f64;
                    push(MetricType::RrInterval, mean)?;
                }
            }
            TypedReading::BloodPressure(r) => {
                let scale = match r.unit {
                    PressureUnit::MmHg => 1.0,
                    PressureUnit::KPa => KPA_TO_MMHG,
                };
                push(MetricType::BloodPressureSystolic, r.systolic * scale)?;
                push(MetricType::BloodPressureDiastolic, r.diastolic * scale)?;
                if r.mean_arterial_pressure.is_finite() {
                    push(MetricType::MeanArterialPressure, r.mean_arterial_pressure * scale)?;
                }
                if let Some(pulse) = r.pulse_rate.filter(|p| p.is_finite()) {
                    push(MetricType::HeartRate, pulse)?;
                }
            }
            TypedReading::WeightScale(r) => {
                let (mass_scale, length_scale) = match r.unit {
                    MassUnit::Kilograms => (1.0, 1.0),
                    MassUnit::Pounds => (LB_TO_KG, INCH_TO_M),
                };
                push(MetricType::Weight, r.weight * mass_scale)?;
                if let Some(bmi) = r.bmi {
                    push(MetricType::Bmi, bmi)?;
                }
                if let Some(height) = r.height {
                    push(MetricType::Height, height * length_scale)?;
                }
            }
            TypedReading::PulseOximeter(r) => {
                push(MetricType::OxygenSaturation, r.spo2)?;
                if r.pulse_rate.is_finite() {
                    push(MetricType::HeartRate, r.pulse_rate)?;
                }
                if let Some(pai) = r.pulse_amplitude_index.filter(|p| p.is_finite()) {
                    push(MetricType::PulseAmplitudeIndex, pai)?;
                }
            }
            TypedReading::Glucose(r) => {
                push(MetricType::Glucose, r.concentration_mg_dl)?;
            }
            TypedReading::Thermometer(r) => {
                let celsius = match r.unit {
                    TemperatureUnit::Celsius => r.temperature,
                    TemperatureUnit::Fahrenheit => fahrenheit_to_celsius(r.temperature),
                };
                push(MetricType::Temperature, celsius)?;
            }
        }

        Ok(metrics)
    }

    /// Heart rate from a PPG measurement; a zero reading asks the caller to retry
    pub fn from_ppg(result: &PpgResult, at: DateTime<Utc>) -> Result<CanonicalMetric, VitalsError> {
        if !result.is_valid() {
            return Err(VitalsError::InsufficientSignal(format!(
                "no pulse found in {} samples",
                result.sample_count
            )));
        }
        CanonicalMetric::canonical(MetricType::HeartRate, result.bpm, at, PPG_SOURCE)
    }

    /// Steps, distance and calories of a finished session, stamped at its end
    pub fn from_activity(session: &ActivitySession) -> Result<Vec<CanonicalMetric>, VitalsError> {
        let ended_at = match (session.is_active, session.ended_at) {
            (false, Some(ended_at)) => ended_at,
            _ => {
                return Err(VitalsError::Validation(format!(
                    "activity session {} is still active",
                    session.id
                )))
            }
        };
        let source = format!("motion:{}", session.activity.as_str());

        Ok(vec![
            CanonicalMetric::canonical(
                MetricType::Steps,
                f64::from(session.steps),
                ended_at,
                source.as_str(),
            )?,
            CanonicalMetric::canonical(
                MetricType::Distance,
                session.distance_meters,
                ended_at,
                source.as_str(),
            )?,
            CanonicalMetric::canonical(
                MetricType::CaloriesBurned,
                session.calories,
                ended_at,
                source,
            )?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{decode, test_frames, BloodPressureReading, DeviceKind, WeightReading};
    use crate::types::{ActivityType, QualityTier};
    use uuid::Uuid;

    fn value_of(metrics: &[CanonicalMetric], metric_type: MetricType) -> Option<f64> {
        metrics.iter().find(|m| m.metric_type == metric_type).map(|m| m.value)
    }

    #[test]
    fn test_heart_rate_frame() {
        let reading = decode(DeviceKind::HeartRate, &[0x10, 64, 0x00, 0x04]).unwrap();
        let metrics = Normalizer::from_reading(&reading, Utc::now()).unwrap();
        assert_eq!(value_of(&metrics, MetricType::HeartRate), Some(64.0));
        assert_eq!(value_of(&metrics, MetricType::RrInterval), Some(1000.0));
        assert!(metrics.iter().all(|m| m.source == "ble:heart_rate"));
    }

    #[test]
    fn test_kpa_converted_to_mmhg() {
        let reading = TypedReading::BloodPressure(BloodPressureReading {
            systolic: 16.0,
            diastolic: 10.7,
            mean_arterial_pressure: f64::NAN,
            unit: PressureUnit::KPa,
            pulse_rate: None,
            user_id: None,
            measurement_status: None,
            timestamp: None,
        });
        let metrics = Normalizer::from_reading(&reading, Utc::now()).unwrap();
        let systolic = value_of(&metrics, MetricType::BloodPressureSystolic).unwrap();
        assert!((systolic - 120.00992).abs() < 1e-6);
        assert!(value_of(&metrics, MetricType::MeanArterialPressure).is_none());
        assert!(metrics.iter().all(|m| m.unit == m.metric_type.unit()));
    }

    #[test]
    fn test_pounds_converted_to_kg() {
        let reading = TypedReading::WeightScale(WeightReading {
            weight: 154.32,
            unit: MassUnit::Pounds,
            bmi: Some(22.9),
            height: Some(69.0),
            user_id: None,
            timestamp: None,
        });
        let metrics = Normalizer::from_reading(&reading, Utc::now()).unwrap();
        assert!((value_of(&metrics, MetricType::Weight).unwrap() - 69.998).abs() < 0.01);
        assert!((value_of(&metrics, MetricType::Height).unwrap() - 1.7526).abs() < 1e-9);
    }

    #[test]
    fn test_fahrenheit_converted() {
        let mut frame = vec![0x01];
        frame.extend_from_slice(&test_frames::float32(986, -1));
        let reading = decode(DeviceKind::Thermometer, &frame).unwrap();
        let metrics = Normalizer::from_reading(&reading, Utc::now()).unwrap();
        assert!((metrics[0].value - 37.0).abs() < 1e-9);
        assert_eq!(metrics[0].unit, "celsius");
    }

    #[test]
    fn test_device_timestamp_preferred() {
        let mut frame = vec![0x02];
        frame.extend_from_slice(&test_frames::float32(3700, -2));
        frame.extend(test_frames::date_time(2024, 5, 4, 3, 2, 1));
        let reading = decode(DeviceKind::Thermometer, &frame).unwrap();
        let metrics = Normalizer::from_reading(&reading, Utc::now()).unwrap();
        assert_eq!(metrics[0].recorded_at.to_rfc3339(), "2024-05-04T03:02:01+00:00");
    }

    #[test]
    fn test_out_of_bounds_reading_rejected() {
        // A heart rate of zero means the strap lost contact
        let reading = decode(DeviceKind::HeartRate, &[0x00, 0]).unwrap();
        assert!(matches!(
            Normalizer::from_reading(&reading, Utc::now()),
            Err(VitalsError::Validation(_))
        ));
    }

    #[test]
    fn test_ppg_result() {
        let now = Utc::now();
        let mut result = PpgResult {
            bpm: 71.5,
            confidence: 0.7,
            quality_tier: QualityTier::Good,
            duration_seconds: 30.0,
            sample_count: 900,
        };
        let metric = Normalizer::from_ppg(&result, now).unwrap();
        assert_eq!(metric.metric_type, MetricType::HeartRate);
        assert_eq!(metric.source, PPG_SOURCE);

        result.bpm = 0.0;
        let err = Normalizer::from_ppg(&result, now).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_activity_session() {
        let now = Utc::now();
        let mut session = ActivitySession {
            id: Uuid::new_v4(),
            activity: ActivityType::Walk,
            steps: 1200,
            distance_meters: 850.0,
            calories: 41.6,
            started_at: now,
            ended_at: None,
            is_active: true,
        };
        assert!(matches!(
            Normalizer::from_activity(&session),
            Err(VitalsError::Validation(_))
        ));

        session.is_active = false;
        session.ended_at = Some(now);
        let metrics = Normalizer::from_activity(&session).unwrap();
        assert_eq!(metrics.len(), 3);
        assert_eq!(value_of(&metrics, MetricType::Steps), Some(1200.0));
        assert_eq!(metrics[0].source, "motion:walk");
    }
}
