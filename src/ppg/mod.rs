//! Optical pulse extraction
//!
//! [`PpgEngine`] runs one camera measurement at a time: it opens the capture
//! source with the torch on, admits brightness samples in arrival order until
//! the window elapses or the caller stops it, and analyzes the collected
//! samples once at the end. The live estimate and the final analysis are the
//! pure functions in [`analysis`], each called on an immutable slice.

pub mod analysis;

pub use analysis::{analyze_signal, quick_estimate};

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::capture::{CaptureEvent, CaptureGuard, CaptureSource, StopHandle};
use crate::config::PpgConfig;
use crate::error::VitalsError;
use crate::types::{PpgResult, PpgSample};

/// Lifecycle of the engine's current measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PpgState {
    Idle,
    Measuring,
    Completed,
    Aborted,
}

/// Live progress reported while measuring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PpgProgress {
    pub sample_count: usize,
    /// Fraction of the measurement window that has elapsed (0-1)
    pub elapsed_fraction: f64,
    /// Estimate over the most recent samples; 0 until enough peaks are seen
    pub live_bpm: f64,
}

/// Why the capture loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    WindowElapsed,
    Stopped,
    SourceLost,
}

/// Camera pulse measurement for one subject
pub struct PpgEngine {
    config: PpgConfig,
    state: PpgState,
    stop: StopHandle,
    last_result: Option<PpgResult>,
}

impl PpgEngine {
    pub fn new(config: PpgConfig) -> Self {
        Self {
            config,
            state: PpgState::Idle,
            stop: StopHandle::new(),
            last_result: None,
        }
    }

    pub fn state(&self) -> PpgState {
        self.state
    }

    pub fn config(&self) -> &PpgConfig {
        &self.config
    }

    /// Result of the most recent completed measurement
    pub fn last_result(&self) -> Option<&PpgResult> {
        self.last_result.as_ref()
    }

    /// Handle that ends the running measurement early; safe to move to another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run one measurement over the configured window
    pub fn measure_default<S>(
        &mut self,
        source: &mut S,
    ) -> Result<Option<PpgResult>, VitalsError>
    where
        S: CaptureSource<Sample = PpgSample> + ?Sized,
    {
        let duration = self.config.measurement_duration;
        self.measure(source, duration, |_| {})
    }

    /// Run one measurement.
    ///
    /// Returns `Ok(Some(result))` when the window elapsed, or when the session
    /// was stopped or lost its source after at least `min_samples` samples.
    /// A shorter session is aborted and returns `Ok(None)`. A source that
    /// cannot be opened fails with `CaptureUnavailable` and leaves the engine
    /// in its previous state. A stop requested before the call is cleared.
    pub fn measure<S, F>(
        &mut self,
        source: &mut S,
        duration: Duration,
        mut on_progress: F,
    ) -> Result<Option<PpgResult>, VitalsError>
    where
        S: CaptureSource<Sample = PpgSample> + ?Sized,
        F: FnMut(&PpgProgress),
    {
        self.stop.reset();
        let mut guard = CaptureGuard::acquire_with_torch(source)?;

        self.state = PpgState::Measuring;
        tracing::info!(duration_secs = duration.as_secs_f64(), "ppg measurement started");

        let started = Instant::now();
        let poll_interval = self.config.poll_interval();
        let progress_every = self.config.progress_every.max(1);
        let mut samples: Vec<PpgSample> = Vec::new();

        let end = loop {
            if self.stop.is_stopped() {
                break LoopEnd::Stopped;
            }
            let elapsed = started.elapsed();
            if elapsed >= duration {
                break LoopEnd::WindowElapsed;
            }

            match guard.poll((duration - elapsed).min(poll_interval)) {
                CaptureEvent::Sample(sample) => {
                    // A stop issued while we were blocked wins over the sample
                    if self.stop.is_stopped() {
                        break LoopEnd::Stopped;
                    }
                    if !sample.brightness.is_finite() {
                        tracing::warn!(
                            timestamp_ms = sample.timestamp_ms,
                            "rejected non-finite ppg sample"
                        );
                        continue;
                    }
                    samples.push(sample);

                    if samples.len() % progress_every == 0 {
                        let window_start = samples.len().saturating_sub(self.config.live_window);
                        let progress = PpgProgress {
                            sample_count: samples.len(),
                            elapsed_fraction: fraction(started.elapsed(), duration),
                            live_bpm: quick_estimate(&samples[window_start..]),
                        };
                        on_progress(&progress);
                    }
                }
                CaptureEvent::Idle => {}
                CaptureEvent::Closed => break LoopEnd::SourceLost,
            }
        };
        drop(guard);

        if end == LoopEnd::SourceLost {
            tracing::warn!(samples = samples.len(), "ppg capture source lost");
        }

        let enough = samples.len() >= self.config.min_samples;
        if end != LoopEnd::WindowElapsed && !enough {
            self.state = PpgState::Aborted;
            tracing::info!(samples = samples.len(), "ppg measurement aborted");
            return Ok(None);
        }

        let result = analyze_signal(&samples);
        self.state = PpgState::Completed;
        tracing::info!(
            bpm = result.bpm,
            confidence = result.confidence,
            samples = result.sample_count,
            "ppg measurement completed"
        );
        self.last_result = Some(result.clone());
        Ok(Some(result))
    }

    /// Back to `Idle`, forgetting the last result
    pub fn reset(&mut self) {
        self.state = PpgState::Idle;
        self.last_result = None;
        self.stop.reset();
    }
}

impl Default for PpgEngine {
    fn default() -> Self {
        Self::new(PpgConfig::default())
    }
}

fn fraction(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
}
