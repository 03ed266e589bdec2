//! Weight Measurement (0x2A9D)
//!
//! ```text
//! flags | weight u16 | [timestamp 7] | [user id] | [bmi u16 | height u16]
//! ```
//! Weight resolution is 0.005 kg (SI) or 0.01 lb (imperial); BMI is 0.1 kg/m².

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{check_reserved_bits, DeviceKind, FrameCursor, FrameDecoder, TypedReading};
use crate::error::VitalsError;

const FLAG_IMPERIAL: u8 = 0x01;
const FLAG_TIMESTAMP: u8 = 0x02;
const FLAG_USER_ID: u8 = 0x04;
const FLAG_BMI: u8 = 0x08;
const RESERVED: u8 = 0xF0;

pub const WEIGHT_RESOLUTION_KG: f64 = 0.005;
pub const WEIGHT_RESOLUTION_LB: f64 = 0.01;
pub const BMI_RESOLUTION: f64 = 0.1;
pub const HEIGHT_RESOLUTION_M: f64 = 0.001;
pub const HEIGHT_RESOLUTION_IN: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MassUnit {
    Kilograms,
    Pounds,
}

impl MassUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MassUnit::Kilograms => "kg",
            MassUnit::Pounds => "lb",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightReading {
    /// Weight in `unit`
    pub weight: f64,
    pub unit: MassUnit,
    pub bmi: Option<f64>,
    /// Height in meters (SI) or inches (imperial)
    pub height: Option<f64>,
    pub user_id: Option<u8>,
    pub timestamp: Option<DateTime<Utc>>,
}

pub struct WeightScaleDecoder;

impl FrameDecoder for WeightScaleDecoder {
    fn kind(&self) -> DeviceKind {
        DeviceKind::WeightScale
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<TypedReading, VitalsError> {
        let mut cursor = FrameCursor::new(self.kind(), frame);
        let flags = cursor.u8("flags")?;
        check_reserved_bits(self.kind(), flags, RESERVED)?;

        let imperial = flags & FLAG_IMPERIAL != 0;
        let (unit, weight_resolution, height_resolution) = if imperial {
            (MassUnit::Pounds, WEIGHT_RESOLUTION_LB, HEIGHT_RESOLUTION_IN)
        } else {
            (MassUnit::Kilograms, WEIGHT_RESOLUTION_KG, HEIGHT_RESOLUTION_M)
        };

        let weight = f64::from(cursor.u16("weight")?) * weight_resolution;

        let timestamp = if flags & FLAG_TIMESTAMP != 0 {
            cursor.date_time("timestamp")?
        } else {
            None
        };
        let user_id = if flags & FLAG_USER_ID != 0 {
            Some(cursor.u8("user id")?)
        } else {
            None
        };

        // Some scales send BMI without the trailing height
        let (bmi, height) = if flags & FLAG_BMI != 0 {
            let bmi = f64::from(cursor.u16("bmi")?) * BMI_RESOLUTION;
            let height = if cursor.remaining() >= 2 {
                Some(f64::from(cursor.u16("height")?) * height_resolution)
            } else {
                None
            };
            (Some(bmi), height)
        } else {
            (None, None)
        };

        Ok(TypedReading::WeightScale(WeightReading {
            weight,
            unit,
            bmi,
            height,
            user_id,
            timestamp,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::decode;

    fn weight(frame: &[u8]) -> WeightReading {
        match decode(DeviceKind::WeightScale, frame).unwrap() {
            TypedReading::WeightScale(r) => r,
            other => panic!("unexpected reading {other:?}"),
        }
    }

    #[test]
    fn test_si_weight() {
        // 14000 * 0.005 = 70 kg
        let raw = 14000u16.to_le_bytes();
        let r = weight(&[0x00, raw[0], raw[1]]);
        assert_eq!(r.unit, MassUnit::Kilograms);
        assert!((r.weight - 70.0).abs() < 1e-9);
        assert!(r.bmi.is_none());
    }

    #[test]
    fn test_imperial_weight() {
        // 15432 * 0.01 = 154.32 lb
        let raw = 15432u16.to_le_bytes();
        let r = weight(&[FLAG_IMPERIAL, raw[0], raw[1]]);
        assert_eq!(r.unit, MassUnit::Pounds);
        assert!((r.weight - 154.32).abs() < 1e-9);
    }

    #[test]
    fn test_bmi_and_height() {
        let w = 14000u16.to_le_bytes();
        let bmi = 229u16.to_le_bytes();
        let height = 1750u16.to_le_bytes();
        let r = weight(&[FLAG_BMI, w[0], w[1], bmi[0], bmi[1], height[0], height[1]]);
        assert!((r.bmi.unwrap() - 22.9).abs() < 1e-9);
        assert!((r.height.unwrap() - 1.75).abs() < 1e-9);
    }

    #[test]
    fn test_bmi_without_height() {
        let w = 14000u16.to_le_bytes();
        let bmi = 229u16.to_le_bytes();
        let r = weight(&[FLAG_BMI, w[0], w[1], bmi[0], bmi[1]]);
        assert!((r.bmi.unwrap() - 22.9).abs() < 1e-9);
        assert!(r.height.is_none());
    }

    #[test]
    fn test_user_id_shifts_bmi() {
        let w = 14000u16.to_le_bytes();
        let bmi = 250u16.to_le_bytes();
        let r = weight(&[FLAG_USER_ID | FLAG_BMI, w[0], w[1], 3, bmi[0], bmi[1]]);
        assert_eq!(r.user_id, Some(3));
        assert!((r.bmi.unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_bmi_flag_without_field() {
        let w = 14000u16.to_le_bytes();
        assert!(decode(DeviceKind::WeightScale, &[FLAG_BMI, w[0], w[1]]).is_err());
    }

    #[test]
    fn test_reserved_bits_rejected() {
        assert!(decode(DeviceKind::WeightScale, &[0x10, 0x00, 0x00]).is_err());
    }
}
