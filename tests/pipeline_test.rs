use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::f64::consts::PI;
use std::sync::Arc;

use vitaltrace::capture::{ChannelSource, StopHandle};
use vitaltrace::devices::{Float32, Sfloat};
use vitaltrace::ppg::PpgState;
use vitaltrace::types::{
    ActivityType, DataSource, MotionSample, PositionFix, PpgSample, RiskLevel,
};
use vitaltrace::{
    DeviceKind, InMemoryMetricStore, MetricStore, MetricType, VitalsError, VitalsProcessor,
};

fn sfloat(mantissa: i32, exponent: i32) -> [u8; 2] {
    Sfloat::encode(mantissa, exponent).0.to_le_bytes()
}

fn pulse_wave(seconds: f64) -> Vec<PpgSample> {
    let rate = 30.0;
    (0..(rate * seconds) as usize)
        .map(|i| {
            let t = i as f64 / rate;
            PpgSample {
                brightness: 140.0 + 6.0 * (2.0 * PI * 1.2 * t).sin(),
                timestamp_ms: (t * 1000.0).round() as u64,
            }
        })
        .collect()
}

#[test]
fn test_full_day_of_inputs() {
    let store = Arc::new(InMemoryMetricStore::new());
    let mut processor = VitalsProcessor::new("subject-42", store.clone()).unwrap();
    let earlier = Utc::now() - Duration::hours(3);

    // Heart-rate strap, 16-bit value
    processor
        .ingest_frame_at(DeviceKind::HeartRate, &[0x01, 70, 0x00], earlier)
        .unwrap();

    // Blood-pressure cuff, mmHg
    let mut bp = vec![0x00];
    bp.extend_from_slice(&sfloat(118, 0));
    bp.extend_from_slice(&sfloat(76, 0));
    bp.extend_from_slice(&sfloat(90, 0));
    processor
        .ingest_frame_at(DeviceKind::BloodPressure, &bp, earlier)
        .unwrap();

    // Glucose meter, 0.00095 kg/L
    let mut glucose = vec![0x00, 0x07, 0x00];
    glucose.extend_from_slice(&sfloat(95, -5));
    let stored = processor
        .ingest_frame_at(DeviceKind::Glucose, &glucose, earlier)
        .unwrap();
    assert!((stored[0].value - 95.0).abs() < 1e-6);

    // Thermometer, not scored by the predictor
    let mut thermo = vec![0x00];
    thermo.extend_from_slice(&Float32::encode(3690, -2).0.to_le_bytes());
    processor
        .ingest_frame_at(DeviceKind::Thermometer, &thermo, earlier)
        .unwrap();

    // Journal entry
    let from_text = processor
        .ingest_text("slept 7.5 hours, walked 12,000 steps", Utc::now())
        .unwrap();
    assert_eq!(from_text.len(), 2);

    // Camera PPG; the source closes after the recorded samples
    let (tx, mut camera) = ChannelSource::channel(2048);
    for sample in pulse_wave(20.0) {
        tx.send(sample).unwrap();
    }
    drop(tx);
    let pulse = processor.measure_pulse(&mut camera).unwrap().unwrap();
    assert!((pulse.value - 72.0).abs() <= 3.0);
    assert_eq!(processor.ppg().state(), PpgState::Completed);
    assert!(!camera.is_open());
    assert!(!camera.torch_on());

    // A short walk
    processor.start_activity(ActivityType::Walk).unwrap();
    let (motion_tx, mut accelerometer) = ChannelSource::channel(64);
    let (position_tx, mut gps) = ChannelSource::channel(8);
    for i in 0..10u64 {
        let magnitude = if i % 2 == 0 { 9.8 } else { 11.5 };
        motion_tx
            .send(MotionSample {
                accel_magnitude: magnitude,
                timestamp_ms: i * 300,
            })
            .unwrap();
    }
    position_tx
        .send(PositionFix { lat: 0.0, lon: 0.0, timestamp_ms: 0 })
        .unwrap();
    position_tx
        .send(PositionFix { lat: 0.0, lon: 0.001, timestamp_ms: 3000 })
        .unwrap();
    drop(motion_tx);
    drop(position_tx);

    let session = processor
        .capture_activity(&mut accelerometer, &mut gps, &StopHandle::new(), None)
        .unwrap();
    assert_eq!(session.steps, 5);
    assert!((session.distance_meters - 111.195).abs() < 1.5);
    assert!(session.calories > 0.0);
    assert!(!accelerometer.is_open() && !gps.is_open());

    // 1 HR + 3 BP + 1 glucose + 1 temperature + 2 text + 1 PPG + 3 activity
    assert_eq!(store.len("subject-42").unwrap(), 12);

    let now = Utc::now() + Duration::minutes(1);
    let prediction = processor
        .predict(now, &mut StdRng::seed_from_u64(11))
        .unwrap();

    assert_eq!(prediction.data_source, DataSource::Live);
    assert_eq!(prediction.metrics_used, 12);
    assert!((prediction.confidence - (0.5 + 0.12 * 0.45)).abs() < 1e-9);

    let scored: Vec<MetricType> = prediction.sub_scores.iter().map(|s| s.metric_type).collect();
    assert_eq!(
        scored,
        vec![
            MetricType::HeartRate,
            MetricType::BloodPressureSystolic,
            MetricType::Glucose,
            MetricType::SleepDuration,
            MetricType::Steps,
        ]
    );
    // Four vitals in their optimal band, steps over the daily goal
    assert!((prediction.predicted_value - (0.9 * 4.0 + 0.95) / 5.0).abs() < 1e-9);
    assert_eq!(prediction.risk_level, RiskLevel::Low);
    assert_eq!(prediction.trajectory.len(), 24);
    assert!(prediction
        .trajectory
        .iter()
        .all(|p| (0.15..=0.98).contains(&p.value)));
}

#[test]
fn test_history_snapshot_reproduces_prediction() {
    let store = Arc::new(InMemoryMetricStore::new());
    let processor = VitalsProcessor::new("subject-7", store.clone()).unwrap();
    let base = Utc::now() - Duration::days(2);
    for (i, bpm) in [66u8, 71, 75, 69].iter().enumerate() {
        processor
            .ingest_frame_at(DeviceKind::HeartRate, &[0x00, *bpm], base + Duration::hours(i as i64))
            .unwrap();
    }
    processor.ingest_text("SpO2 97%", base).unwrap();

    let restored = Arc::new(InMemoryMetricStore::from_json(&store.to_json().unwrap()).unwrap());
    let replica = VitalsProcessor::new("subject-7", restored).unwrap();

    let now = Utc::now();
    let a = processor.predict(now, &mut StdRng::seed_from_u64(5)).unwrap();
    let b = replica.predict(now, &mut StdRng::seed_from_u64(5)).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.metrics_used, 5);
}

#[test]
fn test_unavailable_camera_fails_fast() {
    let mut processor = VitalsProcessor::in_memory("subject-1").unwrap();
    let mut camera: ChannelSource<PpgSample> =
        ChannelSource::unavailable("camera permission denied");

    let err = processor.measure_pulse(&mut camera).unwrap_err();
    assert!(matches!(err, VitalsError::CaptureUnavailable(_)));
    assert!(!err.is_retryable());
    assert_eq!(processor.ppg().state(), PpgState::Idle);
}

#[test]
fn test_malformed_frame_leaves_history_untouched() {
    let store = Arc::new(InMemoryMetricStore::new());
    let processor = VitalsProcessor::new("subject-1", store.clone()).unwrap();

    // Pulse-rate flag set but the pulse SFLOAT is missing
    let mut bp = vec![0x04];
    bp.extend_from_slice(&sfloat(120, 0));
    bp.extend_from_slice(&sfloat(80, 0));
    bp.extend_from_slice(&sfloat(93, 0));
    assert!(matches!(
        processor.ingest_frame(DeviceKind::BloodPressure, &bp),
        Err(VitalsError::MalformedFrame { .. })
    ));
    assert!(store
        .range("subject-1", Utc::now() - Duration::days(1), Utc::now())
        .unwrap()
        .is_empty());

    let prediction = processor.predict(Utc::now(), &mut StdRng::seed_from_u64(1)).unwrap();
    assert_eq!(prediction.data_source, DataSource::Simulated);
    assert_eq!(prediction.confidence, 0.42);
}
