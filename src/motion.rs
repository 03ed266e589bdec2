//! Motion and position aggregation
//!
//! Steps come from a rising-edge detector over the acceleration magnitude,
//! distance from the great-circle length between consecutive position fixes.
//! One [`MotionAggregator`] owns at most one active [`ActivitySession`].

use chrono::{DateTime, Utc};
use std::time::Instant;
use uuid::Uuid;

use crate::capture::{CaptureEvent, CaptureGuard, CaptureSource, StopHandle};
use crate::config::MotionConfig;
use crate::error::VitalsError;
use crate::types::{ActivitySession, ActivityType, MotionSample, PositionFix};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two fixes in meters
pub fn haversine_distance(a: &PositionFix, b: &PositionFix) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push near-antipodal pairs just past 1
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// MET-based calorie estimate (kcal).
///
/// Duration comes from distance at the activity's assumed speed, or from
/// steps at its assumed cadence when no distance was covered.
pub fn estimate_calories(
    activity: ActivityType,
    steps: u32,
    distance_m: f64,
    weight_kg: f64,
) -> f64 {
    let hours = if distance_m > 0.0 {
        distance_m / activity.assumed_speed_mps() / 3600.0
    } else {
        f64::from(steps) / activity.assumed_cadence() / 60.0
    };
    activity.met() * weight_kg * hours
}

/// Rising-edge step detector with a minimum interval between steps
#[derive(Debug, Clone)]
pub struct StepDetector {
    threshold: f64,
    gravity: f64,
    min_interval_ms: u64,
    above: bool,
    last_step_ms: Option<u64>,
    steps: u32,
}

impl StepDetector {
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            threshold: config.step_threshold,
            gravity: config.gravity,
            min_interval_ms: config.min_step_interval_ms,
            above: false,
            last_step_ms: None,
            steps: 0,
        }
    }

    /// Feed one sample; returns true when it registered a step
    pub fn process(&mut self, sample: &MotionSample) -> bool {
        if !sample.accel_magnitude.is_finite() {
            return false;
        }
        let dynamic = sample.accel_magnitude - self.gravity;
        let above = dynamic > self.threshold;
        let rising = above && !self.above;
        self.above = above;

        if !rising {
            return false;
        }
        let debounced = self
            .last_step_ms
            .is_some_and(|last| sample.timestamp_ms.saturating_sub(last) < self.min_interval_ms);
        if debounced {
            return false;
        }
        self.last_step_ms = Some(sample.timestamp_ms);
        self.steps += 1;
        true
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn reset(&mut self) {
        self.above = false;
        self.last_step_ms = None;
        self.steps = 0;
    }
}

impl Default for StepDetector {
    fn default() -> Self {
        Self::new(&MotionConfig::default())
    }
}

/// Accumulates steps, distance and calories for one subject
pub struct MotionAggregator {
    config: MotionConfig,
    detector: StepDetector,
    session: Option<ActivitySession>,
    last_fix: Option<PositionFix>,
}

impl MotionAggregator {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            detector: StepDetector::new(&config),
            config,
            session: None,
            last_fix: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Begin a session; fails with `SessionActive` if one is already running
    pub fn start(
        &mut self,
        activity: ActivityType,
        at: DateTime<Utc>,
    ) -> Result<Uuid, VitalsError> {
        if self.session.is_some() {
            return Err(VitalsError::SessionActive("motion".to_string()));
        }
        let id = Uuid::new_v4();
        self.detector.reset();
        self.last_fix = None;
        self.session = Some(ActivitySession {
            id,
            activity,
            steps: 0,
            distance_meters: 0.0,
            calories: 0.0,
            started_at: at,
            ended_at: None,
            is_active: true,
        });
        tracing::info!(session = %id, activity = activity.as_str(), "activity session started");
        Ok(id)
    }

    /// Feed one acceleration sample; returns true when it was a step
    pub fn record_motion(&mut self, sample: &MotionSample) -> Result<bool, VitalsError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| VitalsError::NoActiveSession("motion".to_string()))?;
        let step = self.detector.process(sample);
        session.steps = self.detector.steps();
        Ok(step)
    }

    /// Feed one position fix; returns the distance it added in meters.
    /// Fixes with impossible coordinates are ignored.
    pub fn record_position(&mut self, fix: &PositionFix) -> Result<f64, VitalsError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| VitalsError::NoActiveSession("motion".to_string()))?;

        let valid = fix.lat.is_finite()
            && fix.lon.is_finite()
            && fix.lat.abs() <= 90.0
            && fix.lon.abs() <= 180.0;
        if !valid {
            tracing::warn!(lat = fix.lat, lon = fix.lon, "rejected position fix");
            return Ok(0.0);
        }

        let added = self
            .last_fix
            .map(|prev| haversine_distance(&prev, fix))
            .unwrap_or(0.0);
        session.distance_meters += added;
        self.last_fix = Some(*fix);
        Ok(added)
    }

    /// Copy of the running session
    pub fn snapshot(&self) -> Option<ActivitySession> {
        self.session.clone()
    }

    /// End the session, compute calories and hand back the immutable record
    pub fn stop(&mut self, at: DateTime<Utc>) -> Result<ActivitySession, VitalsError> {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| VitalsError::NoActiveSession("motion".to_string()))?;
        self.last_fix = None;

        session.calories = estimate_calories(
            session.activity,
            session.steps,
            session.distance_meters,
            self.config.assumed_weight_kg,
        );
        session.ended_at = Some(at);
        session.is_active = false;

        tracing::info!(
            session = %session.id,
            steps = session.steps,
            distance_m = session.distance_meters,
            calories = session.calories,
            "activity session stopped"
        );
        Ok(session)
    }

    /// Drive the active session from live sources until `stop` is raised, the
    /// deadline passes or both sources close, then end the session.
    ///
    /// Both sources are opened before anything is admitted and are closed on
    /// every exit path.
    pub fn capture<M, P>(
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
        if self.session.is_none() {
            return Err(VitalsError::NoActiveSession("motion".to_string()));
        }

        let mut motion = CaptureGuard::acquire(motion_source)?;
        let mut position = CaptureGuard::acquire(position_source)?;
        let poll_interval = self.config.poll_interval();
        let (mut motion_open, mut position_open) = (true, true);

        loop {
            if stop.is_stopped() {
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            if !motion_open && !position_open {
                tracing::warn!("motion capture sources lost");
                break;
            }

            if motion_open {
                match motion.poll(poll_interval / 2) {
                    CaptureEvent::Sample(sample) => {
                        if stop.is_stopped() {
                            break;
                        }
                        self.record_motion(&sample)?;
                    }
                    CaptureEvent::Idle => {}
                    CaptureEvent::Closed => motion_open = false,
                }
            }
            if position_open {
                match position.poll(poll_interval / 2) {
                    CaptureEvent::Sample(fix) => {
                        if stop.is_stopped() {
                            break;
                        }
                        self.record_position(&fix)?;
                    }
                    CaptureEvent::Idle => {}
                    CaptureEvent::Closed => position_open = false,
                }
            }
        }
        drop(position);
        drop(motion);

        self.stop(Utc::now())
    }
}

impl Default for MotionAggregator {
    fn default() -> Self {
        Self::new(MotionConfig::default())
    }
}
