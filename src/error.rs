//! Error types for vitaltrace

use thiserror::Error;

/// Errors that can occur while decoding, measuring, normalizing or predicting
#[derive(Debug, Error)]
pub enum VitalsError {
    /// Frame shorter than its profile requires, or flags that contradict the layout
    #[error("Malformed {profile} frame: {reason}")]
    MalformedFrame { profile: String, reason: String },

    /// No camera, sensor or permission to open it
    #[error("Capture source unavailable: {0}")]
    CaptureUnavailable(String),

    /// Not enough samples or peaks to produce a reading; the caller may retry
    #[error("Insufficient signal: {0}")]
    InsufficientSignal(String),

    /// A derived metric value is non-finite, out of bounds, or carries the wrong unit
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("A {0} session is already active")]
    SessionActive(String),

    #[error("No active {0} session")]
    NoActiveSession(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl VitalsError {
    pub(crate) fn malformed(profile: &str, reason: impl Into<String>) -> Self {
        VitalsError::MalformedFrame {
            profile: profile.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the caller should prompt the user to try again rather than fail
    pub fn is_retryable(&self) -> bool {
        matches!(self, VitalsError::InsufficientSignal(_))
    }
}
