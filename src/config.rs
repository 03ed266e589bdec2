//! Configuration for vitaltrace.
//!
//! Every field has a default, and every section is `#[serde(default)]`, so a
//! config file only needs to name the values it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::VitalsError;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalsConfig {
    pub ppg: PpgConfig,
    pub motion: MotionConfig,
    pub predictor: PredictorConfig,
}

impl VitalsConfig {
    pub fn from_json(json: &str) -> Result<Self, VitalsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, VitalsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load configuration from a file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VitalsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| VitalsError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), VitalsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VitalsError::Config(e.to_string()))?;
        }
        std::fs::write(path, self.to_json()?)
            .map_err(|e| VitalsError::Config(format!("{}: {e}", path.display())))
    }
}

/// Optical pulse measurement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpgConfig {
    /// Length of one measurement window
    #[serde(with = "duration_serde")]
    pub measurement_duration: Duration,

    /// Samples needed for an early stop to still produce a result
    pub min_samples: usize,

    /// Trailing samples used by the live estimate
    pub live_window: usize,

    /// Emit a progress callback every N admitted samples
    pub progress_every: usize,

    /// Upper bound on one blocking poll of the capture source
    pub poll_interval_ms: u64,
}

impl Default for PpgConfig {
    fn default() -> Self {
        Self {
            measurement_duration: Duration::from_secs(30),
            min_samples: 60,
            live_window: 90,
            progress_every: 15,
            poll_interval_ms: 100,
        }
    }
}

impl PpgConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Step detection and activity aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Dynamic acceleration (m/s²) that counts as a step
    pub step_threshold: f64,

    /// Gravitational baseline subtracted from the magnitude
    pub gravity: f64,

    /// Debounce between two registered steps
    pub min_step_interval_ms: u64,

    /// Body weight used for calorie estimates when none is known
    pub assumed_weight_kg: f64,

    pub poll_interval_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            step_threshold: 1.2,
            gravity: 9.81,
            min_step_interval_ms: 250,
            assumed_weight_kg: 70.0,
            poll_interval_ms: 100,
        }
    }
}

impl MotionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Trajectory prediction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// History window considered by a prediction
    pub lookback_days: i64,

    /// Most recent observations used for the trajectory trend term
    pub trend_window: usize,

    /// Scale the noise terms; 0 makes the trajectory fully deterministic
    pub noise_scale: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            trend_window: 12,
            noise_scale: 1.0,
        }
    }
}

/// Durations are written as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
