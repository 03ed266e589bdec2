//! IEEE 11073-20601 compact floating point formats
//!
//! Medical GATT profiles encode measurements as a signed mantissa and a signed
//! base-10 exponent packed into 16 bits (SFLOAT: 12 + 4) or 32 bits (FLOAT:
//! 24 + 8). Both fields are two's complement and must be sign-extended.
//! A handful of raw values with exponent 0 are reserved for special values.

use serde::{Deserialize, Serialize};

/// Reserved encodings shared by SFLOAT and FLOAT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialValue {
    NaN,
    NotAtThisResolution,
    PositiveInfinity,
    NegativeInfinity,
    Reserved,
}

impl SpecialValue {
    fn as_f64(self) -> f64 {
        match self {
            SpecialValue::PositiveInfinity => f64::INFINITY,
            SpecialValue::NegativeInfinity => f64::NEG_INFINITY,
            _ => f64::NAN,
        }
    }
}

#[inline]
fn sign_extend(raw: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((raw << shift) as i32) >> shift
}

/// 16-bit SFLOAT: 4-bit exponent (high nibble) and 12-bit mantissa
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sfloat(pub u16);

impl Sfloat {
    pub const MANTISSA_MIN: i32 = -2048;
    pub const MANTISSA_MAX: i32 = 2047;
    pub const EXPONENT_MIN: i32 = -8;
    pub const EXPONENT_MAX: i32 = 7;

    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Sfloat(u16::from_le_bytes(bytes))
    }

    /// Pack a mantissa/exponent pair; both are truncated to their field widths
    pub fn encode(mantissa: i32, exponent: i32) -> Self {
        let m = (mantissa as u32) & 0x0FFF;
        let e = (exponent as u32) & 0x000F;
        Sfloat(((e << 12) | m) as u16)
    }

    pub fn mantissa(&self) -> i32 {
        sign_extend(u32::from(self.0) & 0x0FFF, 12)
    }

    pub fn exponent(&self) -> i32 {
        sign_extend(u32::from(self.0) >> 12, 4)
    }

    /// mantissa × 10^exponent, without special-value interpretation
    pub fn value(&self) -> f64 {
        f64::from(self.mantissa()) * 10f64.powi(self.exponent())
    }

    pub fn special(&self) -> Option<SpecialValue> {
        match self.0 {
            0x07FF => Some(SpecialValue::NaN),
            0x0800 => Some(SpecialValue::NotAtThisResolution),
            0x07FE => Some(SpecialValue::PositiveInfinity),
            0x0802 => Some(SpecialValue::NegativeInfinity),
            0x0801 => Some(SpecialValue::Reserved),
            _ => None,
        }
    }

    /// Value as a device would mean it: special encodings become NaN or ±infinity
    pub fn value_checked(&self) -> f64 {
        match self.special() {
            Some(special) => special.as_f64(),
            None => self.value(),
        }
    }
}

/// 32-bit FLOAT: 8-bit exponent (high byte) and 24-bit mantissa
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Float32(pub u32);

impl Float32 {
    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Float32(u32::from_le_bytes(bytes))
    }

    pub fn encode(mantissa: i32, exponent: i32) -> Self {
        let m = (mantissa as u32) & 0x00FF_FFFF;
        let e = (exponent as u32) & 0xFF;
        Float32((e << 24) | m)
    }

    pub fn mantissa(&self) -> i32 {
        sign_extend(self.0 & 0x00FF_FFFF, 24)
    }

    pub fn exponent(&self) -> i32 {
        sign_extend(self.0 >> 24, 8)
    }

    pub fn value(&self) -> f64 {
        f64::from(self.mantissa()) * 10f64.powi(self.exponent())
    }

    pub fn special(&self) -> Option<SpecialValue> {
        match self.0 {
            0x007F_FFFF => Some(SpecialValue::NaN),
            0x0080_0000 => Some(SpecialValue::NotAtThisResolution),
            0x007F_FFFE => Some(SpecialValue::PositiveInfinity),
            0x0080_0002 => Some(SpecialValue::NegativeInfinity),
            0x0080_0001 => Some(SpecialValue::Reserved),
            _ => None,
        }
    }

    pub fn value_checked(&self) -> f64 {
        match self.special() {
            Some(special) => special.as_f64(),
            None => self.value(),
        }
    }
}
