//! Binary device frame decoding
//!
//! This module turns raw measurement frames from the standard wireless health
//! profiles into typed readings. Every profile starts with a flags byte that
//! selects the layout of the remaining little-endian fields.
//!
//! Decoding is a pure function over bytes: no state, no clock.

mod blood_pressure;
mod glucose;
mod heart_rate;
pub mod ieee11073;
mod pulse_oximeter;
mod thermometer;
mod weight_scale;

pub use blood_pressure::{BloodPressureDecoder, BloodPressureReading, PressureUnit};
pub use glucose::{GlucoseDecoder, GlucoseReading, GlucoseUnit, GLUCOSE_TO_MG_DL};
pub use heart_rate::{HeartRateDecoder, HeartRateReading, SensorContact};
pub use ieee11073::{Float32, Sfloat, SpecialValue};
pub use pulse_oximeter::{PulseOximeterDecoder, PulseOximeterReading};
pub use thermometer::{TemperatureReading, TemperatureUnit, ThermometerDecoder};
pub use weight_scale::{MassUnit, WeightReading, WeightScaleDecoder};

use crate::error::VitalsError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The six supported measurement profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    HeartRate,
    BloodPressure,
    WeightScale,
    PulseOximeter,
    Glucose,
    Thermometer,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 6] = [
        DeviceKind::HeartRate,
        DeviceKind::BloodPressure,
        DeviceKind::WeightScale,
        DeviceKind::PulseOximeter,
        DeviceKind::Glucose,
        DeviceKind::Thermometer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::HeartRate => "heart_rate",
            DeviceKind::BloodPressure => "blood_pressure",
            DeviceKind::WeightScale => "weight_scale",
            DeviceKind::PulseOximeter => "pulse_oximeter",
            DeviceKind::Glucose => "glucose",
            DeviceKind::Thermometer => "thermometer",
        }
    }

    /// 16-bit assigned number of the measurement characteristic
    pub fn characteristic_uuid(&self) -> u16 {
        match self {
            DeviceKind::HeartRate => 0x2A37,
            DeviceKind::BloodPressure => 0x2A35,
            DeviceKind::WeightScale => 0x2A9D,
            DeviceKind::PulseOximeter => 0x2A5E,
            DeviceKind::Glucose => 0x2A18,
            DeviceKind::Thermometer => 0x2A1C,
        }
    }

    /// Shortest frame the profile can produce (all optional fields absent)
    pub fn minimum_frame_len(&self) -> usize {
        match self {
            DeviceKind::HeartRate => 2,
            DeviceKind::BloodPressure => 7,
            DeviceKind::WeightScale => 3,
            DeviceKind::PulseOximeter => 5,
            DeviceKind::Glucose => 5,
            DeviceKind::Thermometer => 5,
        }
    }

    fn decoder(&self) -> &'static dyn FrameDecoder {
        match self {
            DeviceKind::HeartRate => &HeartRateDecoder,
            DeviceKind::BloodPressure => &BloodPressureDecoder,
            DeviceKind::WeightScale => &WeightScaleDecoder,
            DeviceKind::PulseOximeter => &PulseOximeterDecoder,
            DeviceKind::Glucose => &GlucoseDecoder,
            DeviceKind::Thermometer => &ThermometerDecoder,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = VitalsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        DeviceKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| VitalsError::ParseError(format!("unknown device kind '{s}'")))
    }
}

/// A decoded measurement; one variant per profile so that fields which do not
/// apply to a profile cannot be read from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "profile", rename_all = "snake_case")]
pub enum TypedReading {
    HeartRate(HeartRateReading),
    BloodPressure(BloodPressureReading),
    WeightScale(WeightReading),
    PulseOximeter(PulseOximeterReading),
    Glucose(GlucoseReading),
    Thermometer(TemperatureReading),
}

impl TypedReading {
    pub fn kind(&self) -> DeviceKind {
        match self {
            TypedReading::HeartRate(_) => DeviceKind::HeartRate,
            TypedReading::BloodPressure(_) => DeviceKind::BloodPressure,
            TypedReading::WeightScale(_) => DeviceKind::WeightScale,
            TypedReading::PulseOximeter(_) => DeviceKind::PulseOximeter,
            TypedReading::Glucose(_) => DeviceKind::Glucose,
            TypedReading::Thermometer(_) => DeviceKind::Thermometer,
        }
    }

    /// Unit of the primary value as transmitted by the device
    pub fn unit(&self) -> &'static str {
        match self {
            TypedReading::HeartRate(_) => "bpm",
            TypedReading::BloodPressure(r) => r.unit.as_str(),
            TypedReading::WeightScale(r) => r.unit.as_str(),
            TypedReading::PulseOximeter(_) => "%",
            TypedReading::Glucose(_) => "mg/dL",
            TypedReading::Thermometer(r) => r.unit.as_str(),
        }
    }

    /// Time reported inside the frame, if the profile carried one
    pub fn device_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            TypedReading::HeartRate(_) | TypedReading::PulseOximeter(_) => None,
            TypedReading::BloodPressure(r) => r.timestamp,
            TypedReading::WeightScale(r) => r.timestamp,
            TypedReading::Glucose(r) => r.timestamp,
            TypedReading::Thermometer(r) => r.timestamp,
        }
    }

    /// Flat name → value view of the reading
    pub fn values(&self) -> BTreeMap<&'static str, f64> {
        let mut values = BTreeMap::new();
        match self {
            TypedReading::HeartRate(r) => {
                values.insert("heart_rate", f64::from(r.bpm));
                if let Some(energy) = r.energy_expended_kj {
                    values.insert("energy_expended", f64::from(energy));
                }
                if let Some(rr) = r.rr_intervals_ms.first() {
                    values.insert("rr_interval", *rr);
                }
            }
            TypedReading::BloodPressure(r) => {
                values.insert("systolic", r.systolic);
                values.insert("diastolic", r.diastolic);
                values.insert("mean_arterial_pressure", r.mean_arterial_pressure);
                if let Some(pulse) = r.pulse_rate {
                    values.insert("pulse_rate", pulse);
                }
            }
            TypedReading::WeightScale(r) => {
                values.insert("weight", r.weight);
                if let Some(bmi) = r.bmi {
                    values.insert("bmi", bmi);
                }
                if let Some(height) = r.height {
                    values.insert("height", height);
                }
            }
            TypedReading::PulseOximeter(r) => {
                values.insert("spo2", r.spo2);
                values.insert("pulse_rate", r.pulse_rate);
                if let Some(pai) = r.pulse_amplitude_index {
                    values.insert("pulse_amplitude_index", pai);
                }
            }
            TypedReading::Glucose(r) => {
                values.insert("glucose", r.concentration_mg_dl);
            }
            TypedReading::Thermometer(r) => {
                values.insert("temperature", r.temperature);
            }
        }
        values
    }
}

/// Trait for per-profile frame decoders
pub trait FrameDecoder: Sync {
    fn kind(&self) -> DeviceKind;

    /// Decode one frame; the frame has already passed the minimum length check
    fn decode_frame(&self, frame: &[u8]) -> Result<TypedReading, VitalsError>;
}

/// Decode a raw frame of the given profile.
///
/// Fails with [`VitalsError::MalformedFrame`] when the frame is shorter than
/// the profile (or its flags) require, or when reserved flag bits are set.
pub fn decode(kind: DeviceKind, frame: &[u8]) -> Result<TypedReading, VitalsError> {
    if frame.len() < kind.minimum_frame_len() {
        return Err(VitalsError::malformed(
            kind.as_str(),
            format!(
                "{} bytes, profile requires at least {}",
                frame.len(),
                kind.minimum_frame_len()
            ),
        ));
    }

    let reading = kind.decoder().decode_frame(frame)?;
    tracing::debug!(profile = kind.as_str(), len = frame.len(), "decoded device frame");
    Ok(reading)
}

/// Sequential little-endian reader over one frame
pub(crate) struct FrameCursor<'a> {
    kind: DeviceKind,
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> FrameCursor<'a> {
    pub(crate) fn new(kind: DeviceKind, bytes: &'a [u8]) -> Self {
        Self {
            kind,
            bytes,
            offset: 0,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8], VitalsError> {
        if self.remaining() < n {
            return Err(VitalsError::malformed(
                self.kind.as_str(),
                format!(
                    "{field} needs {n} bytes at offset {}, frame has {}",
                    self.offset,
                    self.bytes.len()
                ),
            ));
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self, field: &str) -> Result<u8, VitalsError> {
        Ok(self.take(1, field)?[0])
    }

    pub(crate) fn u16(&mut self, field: &str) -> Result<u16, VitalsError> {
        let b = self.take(2, field)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn sfloat(&mut self, field: &str) -> Result<f64, VitalsError> {
        let b = self.take(2, field)?;
        Ok(Sfloat::from_le_bytes([b[0], b[1]]).value_checked())
    }

    pub(crate) fn float32(&mut self, field: &str) -> Result<f64, VitalsError> {
        let b = self.take(4, field)?;
        Ok(Float32::from_le_bytes([b[0], b[1], b[2], b[3]]).value_checked())
    }

    /// 7-byte date-time block: year (u16), month, day, hours, minutes, seconds.
    /// Unknown (zero) or impossible dates decode to `None`.
    pub(crate) fn date_time(&mut self, field: &str) -> Result<Option<DateTime<Utc>>, VitalsError> {
        let year = self.u16(field)?;
        let b = self.take(5, field)?;
        let (month, day, hour, minute, second) = (b[0], b[1], b[2], b[3], b[4]);
        if year == 0 || month == 0 || day == 0 {
            return Ok(None);
        }
        Ok(
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|d| {
                    d.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second))
                })
                .map(|dt| dt.and_utc()),
        )
    }
}

/// Reject flags with bits the profile does not define
pub(crate) fn check_reserved_bits(
    kind: DeviceKind,
    flags: u8,
    reserved_mask: u8,
) -> Result<(), VitalsError> {
    if flags & reserved_mask != 0 {
        return Err(VitalsError::malformed(
            kind.as_str(),
            format!("reserved flag bits set (flags {flags:#04x}, reserved {reserved_mask:#04x})"),
        ));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_kind_parsing() {
        assert_eq!("heart-rate".parse::<DeviceKind>().unwrap(), DeviceKind::HeartRate);
        assert_eq!("Pulse_Oximeter".parse::<DeviceKind>().unwrap(), DeviceKind::PulseOximeter);
        assert!("scale".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn test_short_frames_rejected_for_every_profile() {
        for kind in DeviceKind::ALL {
            let frame = vec![0u8; kind.minimum_frame_len() - 1];
            match decode(kind, &frame) {
                Err(VitalsError::MalformedFrame { profile, .. }) => {
                    assert_eq!(profile, kind.as_str())
                }
                other => panic!("{kind}: expected malformed frame, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_minimal_frames_decode_for_every_profile() {
        for kind in DeviceKind::ALL {
            let frame = vec![0u8; kind.minimum_frame_len()];
            let reading = decode(kind, &frame).unwrap();
            assert_eq!(reading.kind(), kind);
        }
    }

    #[test]
    fn test_date_time_block() {
        let bytes = test_frames::date_time(2024, 1, 15, 8, 30, 5);
        let mut cursor = FrameCursor::new(DeviceKind::Glucose, &bytes);
        let ts = cursor.date_time("timestamp").unwrap().unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-15T08:30:05+00:00");

        let unknown = test_frames::date_time(0, 0, 0, 0, 0, 0);
        let mut cursor = FrameCursor::new(DeviceKind::Glucose, &unknown);
        assert!(cursor.date_time("timestamp").unwrap().is_none());
    }

    #[test]
    fn test_reading_flat_view() {
        let reading = decode(DeviceKind::HeartRate, &[0x00, 72]).unwrap();
        assert_eq!(reading.unit(), "bpm");
        assert_eq!(reading.values().get("heart_rate"), Some(&72.0));
        assert!(reading.device_timestamp().is_none());
    }
}
