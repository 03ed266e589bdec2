//! Heart Rate Measurement (0x2A37)
//!
//! ```text
//! flags | hr (u8 or u16) | [energy expended u16] | [rr u16]*
//! bit 0: hr is u16    bits 1-2: sensor contact
//! bit 3: energy       bit 4: rr intervals (1/1024 s)
//! ```

use serde::{Deserialize, Serialize};

use super::{check_reserved_bits, DeviceKind, FrameCursor, FrameDecoder, TypedReading};
use crate::error::VitalsError;

const FLAG_HR_U16: u8 = 0x01;
const FLAG_CONTACT_DETECTED: u8 = 0x02;
const FLAG_CONTACT_SUPPORTED: u8 = 0x04;
const FLAG_ENERGY: u8 = 0x08;
const FLAG_RR: u8 = 0x10;
const RESERVED: u8 = 0xE0;

/// Skin contact status reported by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorContact {
    NotSupported,
    NotDetected,
    Detected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateReading {
    pub bpm: u16,
    pub sensor_contact: SensorContact,
    /// Cumulative energy expended since the last reset (kJ)
    pub energy_expended_kj: Option<u16>,
    /// Beat-to-beat intervals in milliseconds, oldest first
    pub rr_intervals_ms: Vec<f64>,
}

/// Convert a 1/1024 s RR tick count to milliseconds
pub fn rr_ticks_to_ms(raw: u16) -> f64 {
    f64::from(raw) / 1024.0 * 1000.0
}

pub struct HeartRateDecoder;

impl FrameDecoder for HeartRateDecoder {
    fn kind(&self) -> DeviceKind {
        DeviceKind::HeartRate
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<TypedReading, VitalsError> {
        let mut cursor = FrameCursor::new(self.kind(), frame);
        let flags = cursor.u8("flags")?;
        check_reserved_bits(self.kind(), flags, RESERVED)?;

        let bpm = if flags & FLAG_HR_U16 != 0 {
            cursor.u16("heart rate")?
        } else {
            u16::from(cursor.u8("heart rate")?)
        };

        let sensor_contact = match (
            flags & FLAG_CONTACT_SUPPORTED != 0,
            flags & FLAG_CONTACT_DETECTED != 0,
        ) {
            (false, _) => SensorContact::NotSupported,
            (true, false) => SensorContact::NotDetected,
            (true, true) => SensorContact::Detected,
        };

        let energy_expended_kj = if flags & FLAG_ENERGY != 0 {
            Some(cursor.u16("energy expended")?)
        } else {
            None
        };

        let mut rr_intervals_ms = Vec::new();
        if flags & FLAG_RR != 0 {
            let rr_bytes = cursor.remaining();
            if rr_bytes < 2 || rr_bytes % 2 != 0 {
                return Err(VitalsError::malformed(
                    self.kind().as_str(),
                    format!("rr block of {rr_bytes} bytes is not a whole number of u16"),
                ));
            }
            while cursor.remaining() >= 2 {
                rr_intervals_ms.push(rr_ticks_to_ms(cursor.u16("rr interval")?));
            }
        }

        Ok(TypedReading::HeartRate(HeartRateReading {
            bpm,
            sensor_contact,
            energy_expended_kj,
            rr_intervals_ms,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::decode;

    fn heart_rate(frame: &[u8]) -> HeartRateReading {
        match decode(DeviceKind::HeartRate, frame).unwrap() {
            TypedReading::HeartRate(r) => r,
            other => panic!("unexpected reading {other:?}"),
        }
    }

    #[test]
    fn test_u8_heart_rate() {
        let r = heart_rate(&[0x00, 72]);
        assert_eq!(r.bpm, 72);
        assert_eq!(r.sensor_contact, SensorContact::NotSupported);
        assert!(r.energy_expended_kj.is_none());
        assert!(r.rr_intervals_ms.is_empty());
    }

    #[test]
    fn test_u16_heart_rate_matches_le_integer() {
        for value in [0u16, 1, 72, 255, 256, 300, 0x1234, u16::MAX] {
            let bytes = value.to_le_bytes();
            let r = heart_rate(&[FLAG_HR_U16, bytes[0], bytes[1]]);
            assert_eq!(r.bpm, value);
        }
    }

    #[test]
    fn test_energy_and_rr_intervals() {
        // flags: u16 hr, contact detected, energy, rr
        let flags =
            FLAG_HR_U16 | FLAG_CONTACT_SUPPORTED | FLAG_CONTACT_DETECTED | FLAG_ENERGY | FLAG_RR;
        let frame = [flags, 0x50, 0x00, 0x10, 0x00, 0x00, 0x04, 0x00, 0x02];
        let r = heart_rate(&frame);
        assert_eq!(r.bpm, 80);
        assert_eq!(r.sensor_contact, SensorContact::Detected);
        assert_eq!(r.energy_expended_kj, Some(16));
        assert_eq!(r.rr_intervals_ms, vec![1000.0, 500.0]);
    }

    #[test]
    fn test_contact_not_detected() {
        let r = heart_rate(&[FLAG_CONTACT_SUPPORTED, 60]);
        assert_eq!(r.sensor_contact, SensorContact::NotDetected);
    }

    #[test]
    fn test_truncated_optional_fields() {
        // u16 flag set but only one value byte
        assert!(decode(DeviceKind::HeartRate, &[FLAG_HR_U16, 72]).is_err());
        // energy flag without the energy field
        assert!(decode(DeviceKind::HeartRate, &[FLAG_ENERGY, 72]).is_err());
        // rr flag with an odd trailing byte
        assert!(decode(DeviceKind::HeartRate, &[FLAG_RR, 72, 0x00, 0x04, 0x01]).is_err());
        // rr flag without any interval
        assert!(decode(DeviceKind::HeartRate, &[FLAG_RR, 72]).is_err());
    }

    #[test]
    fn test_reserved_bits_rejected() {
        assert!(matches!(
            decode(DeviceKind::HeartRate, &[0x20, 72]),
            Err(VitalsError::MalformedFrame { .. })
        ));
    }
}
