//! Pipeline orchestration
//!
//! This module provides the public API for vitaltrace. Data flows one way:
//! raw frame / sensor samples / text → canonical metrics → metric history →
//! trajectory prediction.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::capture::{CaptureSource, StopHandle};
use crate::config::VitalsConfig;
use crate::devices::{self, DeviceKind};
use crate::encoder::PredictionEncoder;
use crate::error::VitalsError;
use crate::history::{InMemoryMetricStore, MetricStore};
use crate::motion::MotionAggregator;
use crate::normalizer::{Normalizer, TextExtractor};
use crate::ppg::PpgEngine;
use crate::trajectory::TrajectoryPredictor;
use crate::types::{
    ActivitySession, ActivityType, CanonicalMetric, MotionSample, PositionFix, PpgResult,
    PpgSample, TrajectoryPrediction,
};

/// Decode one device frame straight into canonical metrics.
///
/// # Example
/// ```ignore
/// let metrics = frame_to_metrics(DeviceKind::HeartRate, &[0x00, 72], Utc::now())?;
/// ```
pub fn frame_to_metrics(
    kind: DeviceKind,
    frame: &[u8],
    received_at: DateTime<Utc>,
) -> Result<Vec<CanonicalMetric>, VitalsError> {
    let reading = devices::decode(kind, frame)?;
    Normalizer::from_reading(&reading, received_at)
}

/// Extract canonical metrics from free text.
///
/// Compiles the pattern set on every call; hold a [`TextExtractor`] (or a
/// [`VitalsProcessor`]) when extracting repeatedly.
pub fn text_to_metrics(text: &str, at: DateTime<Utc>) -> Result<Vec<CanonicalMetric>, VitalsError> {
    Ok(TextExtractor::new()?.extract(text, at))
}

/// Predict a trajectory from a metric history with default settings.
///
/// A `seed` makes the noise terms reproducible.
pub fn predict_trajectory(
    history: &[CanonicalMetric],
    now: DateTime<Utc>,
    seed: Option<u64>,
) -> TrajectoryPrediction {
    let predictor = TrajectoryPredictor::default();
    match seed {
        Some(seed) => predictor.predict(history, now, &mut StdRng::seed_from_u64(seed)),
        None => predictor.predict(history, now, &mut rand::thread_rng()),
    }
}

/// Stateful processor for one subject.
///
/// Owns the subject's PPG engine and motion aggregator, so at most one
/// capture session per modality runs at a time. Metrics are appended to a
/// shared [`MetricStore`]; predictions read it back.
pub struct VitalsProcessor {
    subject_id: String,
    config: VitalsConfig,
    store: Arc<dyn MetricStore>,
    ppg: PpgEngine,
    motion: MotionAggregator,
    text: TextExtractor,
    predictor: TrajectoryPredictor,
    encoder: PredictionEncoder,
}

impl VitalsProcessor {
    /// Create a processor with default settings and the given store
    pub fn new(
        subject_id: impl Into<String>,
        store: Arc<dyn MetricStore>,
    ) -> Result<Self, VitalsError> {
        Self::with_config(subject_id, VitalsConfig::default(), store)
    }

    /// Create a processor backed by a fresh in-memory store
    pub fn in_memory(subject_id: impl Into<String>) -> Result<Self, VitalsError> {
        Self::new(subject_id, Arc::new(InMemoryMetricStore::new()))
    }

    pub fn with_config(
        subject_id: impl Into<String>,
        config: VitalsConfig,
        store: Arc<dyn MetricStore>,
    ) -> Result<Self, VitalsError> {
        let subject_id = subject_id.into();
        if subject_id.trim().is_empty() {
            return Err(VitalsError::Validation(
                "subject id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            subject_id,
            ppg: PpgEngine::new(config.ppg.clone()),
            motion: MotionAggregator::new(config.motion.clone()),
            text: TextExtractor::new()?,
            predictor: TrajectoryPredictor::new(config.predictor.clone()),
            encoder: PredictionEncoder::new(),
            store,
            config,
        })
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn config(&self) -> &VitalsConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    pub fn ppg(&self) -> &PpgEngine {
        &self.ppg
    }

    /// Handle that stops a running pulse measurement from another thread
    pub fn ppg_stop_handle(&self) -> StopHandle {
        self.ppg.stop_handle()
    }

    fn store_all(
        &self,
        metrics: Vec<CanonicalMetric>,
    ) -> Result<Vec<CanonicalMetric>, VitalsError> {
        self.store.append_all(&self.subject_id, metrics.clone())?;
        Ok(metrics)
    }

    /// Decode, normalize and store one device frame received now
    pub fn ingest_frame(
        &self,
        kind: DeviceKind,
        frame: &[u8],
    ) -> Result<Vec<CanonicalMetric>, VitalsError> {
        self.ingest_frame_at(kind, frame, Utc::now())
    }

    pub fn ingest_frame_at(
        &self,
        kind: DeviceKind,
        frame: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<Vec<CanonicalMetric>, VitalsError> {
        let metrics = frame_to_metrics(kind, frame, received_at)?;
        tracing::debug!(
            subject = %self.subject_id,
            kind = %kind,
            metrics = metrics.len(),
            "device frame ingested"
        );
        self.store_all(metrics)
    }

    /// Store the heart rate of a finished PPG measurement
    pub fn ingest_ppg(
        &self,
        result: &PpgResult,
        at: DateTime<Utc>,
    ) -> Result<CanonicalMetric, VitalsError> {
        let metric = Normalizer::from_ppg(result, at)?;
        self.store.append(&self.subject_id, metric.clone())?;
        Ok(metric)
    }

    /// Store steps, distance and calories of a finished session
    pub fn ingest_activity(
        &self,
        session: &ActivitySession,
    ) -> Result<Vec<CanonicalMetric>, VitalsError> {
        let metrics = Normalizer::from_activity(session)?;
        self.store_all(metrics)
    }

    /// Extract and store the metrics mentioned in free text
    pub fn ingest_text(
        &self,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<CanonicalMetric>, VitalsError> {
        let metrics = self.text.extract(text, at);
        self.store_all(metrics)
    }

    /// Run one pulse measurement and store its heart rate.
    ///
    /// `Ok(None)` when the measurement was aborted before enough samples
    /// arrived; `InsufficientSignal` when it completed without a pulse.
    pub fn measure_pulse<S>(
        &mut self,
        source: &mut S,
    ) -> Result<Option<CanonicalMetric>, VitalsError>
    where
        S: CaptureSource<Sample = PpgSample> + ?Sized,
    {
        match self.ppg.measure_default(source)? {
            Some(result) => self.ingest_ppg(&result, Utc::now()).map(Some),
            None => Ok(None),
        }
    }

    pub fn start_activity(&mut self, activity: ActivityType) -> Result<Uuid, VitalsError> {
        self.motion.start(activity, Utc::now())
    }

    pub fn record_motion(&mut self, sample: &MotionSample) -> Result<bool, VitalsError> {
        self.motion.record_motion(sample)
    }

    pub fn record_position(&mut self, fix: &PositionFix) -> Result<f64, VitalsError> {
        self.motion.record_position(fix)
    }

    /// Active session so far, if any
    pub fn activity_snapshot(&self) -> Option<ActivitySession> {
        self.motion.snapshot()
    }

    /// End the active session and store its metrics
    pub fn stop_activity(&mut self) -> Result<ActivitySession, VitalsError> {
        let session = self.motion.stop(Utc::now())?;
        self.ingest_activity(&session)?;
        Ok(session)
    }

    /// Drive the active session from live sources, then end it and store its metrics
    pub fn capture_activity<M, P>(
        &mut self,
        motion_source: &mut M,
        position_source: &mut P,
        stop: &StopHandle,
        deadline: Option<Instant>,
    ) -> Result<ActivitySession, VitalsError>
    where
        M: CaptureSource<Sample = MotionSample> + ?Sized,
        P: CaptureSource<Sample = PositionFix> + ?Sized,
    {
        let session = self
            .motion
            .capture(motion_source, position_source, stop, deadline)?;
        self.ingest_activity(&session)?;
        Ok(session)
    }

    /// The subject's metrics inside the predictor's lookback window ending at `now`
    pub fn history(&self, now: DateTime<Utc>) -> Result<Vec<CanonicalMetric>, VitalsError> {
        let since = now - Duration::days(self.config.predictor.lookback_days);
        self.store.range(&self.subject_id, since, now)
    }

    /// Predict from the stored history
    pub fn predict<R: Rng + ?Sized>(
        &self,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<TrajectoryPrediction, VitalsError> {
        let history = self.history(now)?;
        Ok(self.predictor.predict(&history, now, rng))
    }

    /// Predict and encode the result as a JSON payload
    pub fn predict_json<R: Rng + ?Sized>(
        &self,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<String, VitalsError> {
        let prediction = self.predict(now, rng)?;
        self.encoder.encode_to_json(&self.subject_id, &prediction)
    }
}
