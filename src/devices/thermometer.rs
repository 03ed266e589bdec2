//! Temperature Measurement (0x2A1C)
//!
//! ```text
//! flags | temperature FLOAT | [timestamp 7] | [temperature type]
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{check_reserved_bits, DeviceKind, FrameCursor, FrameDecoder, TypedReading};
use crate::error::VitalsError;

const FLAG_FAHRENHEIT: u8 = 0x01;
const FLAG_TIMESTAMP: u8 = 0x02;
const FLAG_TYPE: u8 = 0x04;
const RESERVED: u8 = 0xF8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "celsius",
            TemperatureUnit::Fahrenheit => "fahrenheit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub temperature: f64,
    pub unit: TemperatureUnit,
    /// Body site code (armpit, ear, mouth, ...)
    pub temperature_type: Option<u8>,
    pub timestamp: Option<DateTime<Utc>>,
}

pub struct ThermometerDecoder;

impl FrameDecoder for ThermometerDecoder {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Thermometer
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<TypedReading, VitalsError> {
        let mut cursor = FrameCursor::new(self.kind(), frame);
        let flags = cursor.u8("flags")?;
        check_reserved_bits(self.kind(), flags, RESERVED)?;

        let unit = if flags & FLAG_FAHRENHEIT != 0 {
            TemperatureUnit::Fahrenheit
        } else {
            TemperatureUnit::Celsius
        };
        let temperature = cursor.float32("temperature")?;
        let timestamp = if flags & FLAG_TIMESTAMP != 0 {
            cursor.date_time("timestamp")?
        } else {
            None
        };
        let temperature_type = if flags & FLAG_TYPE != 0 {
            Some(cursor.u8("temperature type")?)
        } else {
            None
        };

        Ok(TypedReading::Thermometer(TemperatureReading {
            temperature,
            unit,
            temperature_type,
            timestamp,
        }))
    }
}
