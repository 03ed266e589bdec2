//! Prediction encoding
//!
//! This module wraps trajectory predictions in a versioned payload carrying
//! producer metadata, ready for transport or an external snapshot cache.

use crate::error::VitalsError;
use crate::types::{PayloadProducer, PredictionPayload, TrajectoryPrediction};
use crate::{PRODUCER_NAME, VERSION};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Current payload schema version
pub const PAYLOAD_SCHEMA_VERSION: &str = "1.0.0";

/// Encoder for prediction payloads
pub struct PredictionEncoder {
    instance_id: String,
}

impl Default for PredictionEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Encode a prediction for one subject, stamped with the current time
    pub fn encode(
        &self,
        subject_id: &str,
        prediction: &TrajectoryPrediction,
    ) -> Result<PredictionPayload, VitalsError> {
        self.encode_at(subject_id, prediction, Utc::now())
    }

    /// Encode with an explicit computation time
    pub fn encode_at(
        &self,
        subject_id: &str,
        prediction: &TrajectoryPrediction,
        computed_at: DateTime<Utc>,
    ) -> Result<PredictionPayload, VitalsError> {
        if subject_id.trim().is_empty() {
            return Err(VitalsError::Validation(
                "subject id must not be empty".to_string(),
            ));
        }
        if prediction.trajectory.len() != crate::trajectory::HORIZON_HOURS as usize {
            return Err(VitalsError::Validation(format!(
                "trajectory has {} points, expected {}",
                prediction.trajectory.len(),
                crate::trajectory::HORIZON_HOURS
            )));
        }

        Ok(PredictionPayload {
            schema_version: PAYLOAD_SCHEMA_VERSION.to_string(),
            producer: PayloadProducer {
                name: PRODUCER_NAME.to_string(),
                version: VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            subject_id: subject_id.to_string(),
            computed_at_utc: computed_at.to_rfc3339(),
            prediction: prediction.clone(),
        })
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(
        &self,
        subject_id: &str,
        prediction: &TrajectoryPrediction,
    ) -> Result<String, VitalsError> {
        let payload = self.encode(subject_id, prediction)?;
        Ok(serde_json::to_string_pretty(&payload)?)
    }
}
