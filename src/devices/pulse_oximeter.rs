//! PLX Spot-Check Measurement (0x2A5E)
//!
//! ```text
//! flags | SpO2 | pulse rate | [pulse amplitude index]
//! ```
//! All values are SFLOAT. Bit 2 announces the pulse amplitude index; bits 0-1
//! do not change the layout and bits 3-7 must be clear.

use serde::{Deserialize, Serialize};

use super::{check_reserved_bits, DeviceKind, FrameCursor, FrameDecoder, TypedReading};
use crate::error::VitalsError;

const FLAG_PULSE_AMPLITUDE: u8 = 0x04;
const RESERVED: u8 = 0xF8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseOximeterReading {
    /// Oxygen saturation (%)
    pub spo2: f64,
    /// Pulse rate (bpm)
    pub pulse_rate: f64,
    /// Pulse amplitude index (%)
    pub pulse_amplitude_index: Option<f64>,
}

pub struct PulseOximeterDecoder;

impl FrameDecoder for PulseOximeterDecoder {
    fn kind(&self) -> DeviceKind {
        DeviceKind::PulseOximeter
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<TypedReading, VitalsError> {
        let mut cursor = FrameCursor::new(self.kind(), frame);
        let flags = cursor.u8("flags")?;
        check_reserved_bits(self.kind(), flags, RESERVED)?;

        let spo2 = cursor.sfloat("spo2")?;
        let pulse_rate = cursor.sfloat("pulse rate")?;
        let pulse_amplitude_index = if flags & FLAG_PULSE_AMPLITUDE != 0 {
            Some(cursor.sfloat("pulse amplitude index")?)
        } else {
            None
        };

        Ok(TypedReading::PulseOximeter(PulseOximeterReading {
            spo2,
            pulse_rate,
            pulse_amplitude_index,
        }))
    }
}
