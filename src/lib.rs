//! vitaltrace - On-device pipeline from raw health-sensor data to health trajectories
//!
//! vitaltrace turns noisy sensor and device data into normalized physiological
//! measurements through a one-way pipeline: device frame / camera PPG / motion
//! samples / free text → canonical metrics → per-subject history → trajectory
//! prediction.
//!
//! ## Modules
//!
//! - **Device frames**: Decode standard GATT measurement frames ([`devices`])
//! - **PPG**: Heart rate from camera brightness samples ([`ppg`])
//! - **Motion**: Steps, distance and calories from accelerometer and position ([`motion`])
//! - **Normalizer**: Canonical metrics from every upstream shape ([`normalizer`])
//! - **Trajectory**: Composite score, risk and 24-hour projection ([`trajectory`])

pub mod capture;
pub mod config;
pub mod devices;
pub mod encoder;
pub mod error;
pub mod history;
pub mod motion;
pub mod normalizer;
pub mod pipeline;
pub mod ppg;
pub mod trajectory;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::VitalsConfig;
pub use devices::{decode, DeviceKind, TypedReading};
pub use error::VitalsError;
pub use history::{InMemoryMetricStore, MetricStore};
pub use pipeline::{frame_to_metrics, predict_trajectory, text_to_metrics, VitalsProcessor};
pub use trajectory::TrajectoryPredictor;
pub use types::{CanonicalMetric, MetricType, TrajectoryPrediction};

/// Library version embedded in all prediction payloads
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for prediction payloads
pub const PRODUCER_NAME: &str = "vitaltrace";
