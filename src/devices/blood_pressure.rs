//! Blood Pressure Measurement (0x2A35)
//!
//! ```text
//! flags | systolic | diastolic | MAP | [timestamp 7] | [pulse] | [user id] | [status u16]
//! ```
//! Pressures and pulse are SFLOAT.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{check_reserved_bits, DeviceKind, FrameCursor, FrameDecoder, TypedReading};
use crate::error::VitalsError;

const FLAG_KPA: u8 = 0x01;
const FLAG_TIMESTAMP: u8 = 0x02;
const FLAG_PULSE_RATE: u8 = 0x04;
const FLAG_USER_ID: u8 = 0x08;
const FLAG_STATUS: u8 = 0x10;
const RESERVED: u8 = 0xE0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureUnit {
    MmHg,
    KPa,
}

impl PressureUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PressureUnit::MmHg => "mmHg",
            PressureUnit::KPa => "kPa",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodPressureReading {
    pub systolic: f64,
    pub diastolic: f64,
    pub mean_arterial_pressure: f64,
    pub unit: PressureUnit,
    /// Pulse rate in beats per minute
    pub pulse_rate: Option<f64>,
    pub user_id: Option<u8>,
    /// Raw measurement status bit field (body movement, cuff fit, ...)
    pub measurement_status: Option<u16>,
    pub timestamp: Option<DateTime<Utc>>,
}

pub struct BloodPressureDecoder;

impl FrameDecoder for BloodPressureDecoder {
    fn kind(&self) -> DeviceKind {
        DeviceKind::BloodPressure
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<TypedReading, VitalsError> {
        let mut cursor = FrameCursor::new(self.kind(), frame);
        let flags = cursor.u8("flags")?;
        check_reserved_bits(self.kind(), flags, RESERVED)?;

        let unit = if flags & FLAG_KPA != 0 {
            PressureUnit::KPa
        } else {
            PressureUnit::MmHg
        };

        let systolic = cursor.sfloat("systolic")?;
        let diastolic = cursor.sfloat("diastolic")?;
        let mean_arterial_pressure = cursor.sfloat("mean arterial pressure")?;

        let timestamp = if flags & FLAG_TIMESTAMP != 0 {
            cursor.date_time("timestamp")?
        } else {
            None
        };
        let pulse_rate = if flags & FLAG_PULSE_RATE != 0 {
            Some(cursor.sfloat("pulse rate")?)
        } else {
            None
        };
        let user_id = if flags & FLAG_USER_ID != 0 {
            Some(cursor.u8("user id")?)
        } else {
            None
        };
        let measurement_status = if flags & FLAG_STATUS != 0 {
            Some(cursor.u16("measurement status")?)
        } else {
            None
        };

        Ok(TypedReading::BloodPressure(BloodPressureReading {
            systolic,
            diastolic,
            mean_arterial_pressure,
            unit,
            pulse_rate,
            user_id,
            measurement_status,
            timestamp,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::decode;
    use crate::devices::test_frames::{date_time, sfloat};

    fn blood_pressure(frame: &[u8]) -> BloodPressureReading {
        match decode(DeviceKind::BloodPressure, frame).unwrap() {
            TypedReading::BloodPressure(r) => r,
            other => panic!("unexpected reading {other:?}"),
        }
    }

    fn base_frame(flags: u8) -> Vec<u8> {
        let mut frame = vec![flags];
        frame.extend_from_slice(&sfloat(120, 0));
        frame.extend_from_slice(&sfloat(80, 0));
        frame.extend_from_slice(&sfloat(93, 0));
        frame
    }

    #[test]
    fn test_mmhg_reading() {
        let r = blood_pressure(&base_frame(0x00));
        assert_eq!(r.unit, PressureUnit::MmHg);
        assert_eq!(r.systolic, 120.0);
        assert_eq!(r.diastolic, 80.0);
        assert_eq!(r.mean_arterial_pressure, 93.0);
        assert!(r.pulse_rate.is_none());
    }

    #[test]
    fn test_kpa_with_pulse_rate() {
        let mut frame = vec![FLAG_KPA | FLAG_PULSE_RATE];
        frame.extend_from_slice(&sfloat(160, -1));
        frame.extend_from_slice(&sfloat(107, -1));
        frame.extend_from_slice(&sfloat(124, -1));
        frame.extend_from_slice(&sfloat(68, 0));
        let r = blood_pressure(&frame);
        assert_eq!(r.unit, PressureUnit::KPa);
        assert!((r.systolic - 16.0).abs() < 1e-9);
        assert_eq!(r.pulse_rate, Some(68.0));
    }

    #[test]
    fn test_timestamp_shifts_pulse_rate() {
        let mut frame = base_frame(FLAG_TIMESTAMP | FLAG_PULSE_RATE | FLAG_USER_ID);
        frame.extend(date_time(2024, 3, 2, 7, 45, 0));
        frame.extend_from_slice(&sfloat(64, 0));
        frame.push(2);
        let r = blood_pressure(&frame);
        assert_eq!(r.pulse_rate, Some(64.0));
        assert_eq!(r.user_id, Some(2));
        assert_eq!(r.timestamp.unwrap().to_rfc3339(), "2024-03-02T07:45:00+00:00");
    }

    #[test]
    fn test_missing_pulse_rate_is_malformed() {
        let frame = base_frame(FLAG_PULSE_RATE);
        assert!(matches!(
            decode(DeviceKind::BloodPressure, &frame),
            Err(VitalsError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn test_reserved_bits_rejected() {
        assert!(decode(DeviceKind::BloodPressure, &base_frame(0x80)).is_err());
    }
}
