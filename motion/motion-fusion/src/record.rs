//! The persisted calibration record.
//!
//! Layout, little-endian:
//!
//! | offset | field |
//! |--------|-------|
//! | 0 | key `53394` (u32) |
//! | 4 | compass bias, 3 × i32 q16 |
//! | 16 | gyro bias, 3 × i32 q16 |
//! | 28 | gyro temperature at capture, i32 q16 °C |
//! | 32 | accel bias, 3 × i32 q16 |
//! | 44 | accel temperature at capture, i32 q16 °C |
//! | 48 | gyro temperature slope, 3 × i32 q16 |

use crate::error::{FusionError, Result};

/// Calibration state that survives power cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationRecord {
    /// Compass hard-iron bias, q16 µT.
    pub compass_bias: [i32; 3],
    /// Gyro bias, q16 chip units.
    pub gyro_bias: [i32; 3],
    /// Temperature when the gyro bias was captured.
    pub gyro_temp: i32,
    /// Accel bias, q16 chip units.
    pub accel_bias: [i32; 3],
    /// Temperature when the accel bias was captured.
    pub accel_temp: i32,
    /// Gyro bias drift per degree.
    pub gyro_temp_slope: [i32; 3],
}

impl CalibrationRecord {
    /// Format key written ahead of the fields.
    pub const KEY: u32 = 53394;

    /// Encoded size in bytes.
    pub const ENCODED_LEN: usize = 4 + 14 * 4;

    /// Appends the encoded record to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&Self::KEY.to_le_bytes());
        let fields = self
            .compass_bias
            .iter()
            .chain(&self.gyro_bias)
            .chain(std::iter::once(&self.gyro_temp))
            .chain(&self.accel_bias)
            .chain(std::iter::once(&self.accel_temp))
            .chain(&self.gyro_temp_slope);
        for v in fields {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// Decodes a record.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::CorruptRecord`] if `bytes` is not exactly
    /// [`Self::ENCODED_LEN`] long and [`FusionError::UnknownRecordKey`] if
    /// the key does not match.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(FusionError::corrupt_record(Self::ENCODED_LEN, bytes.len()));
        }
        let words: Vec<[u8; 4]> = bytes
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();

        let key = u32::from_le_bytes(words[0]);
        if key != Self::KEY {
            return Err(FusionError::UnknownRecordKey(key));
        }

        let v: Vec<i32> = words[1..].iter().map(|w| i32::from_le_bytes(*w)).collect();
        Ok(Self {
            compass_bias: [v[0], v[1], v[2]],
            gyro_bias: [v[3], v[4], v[5]],
            gyro_temp: v[6],
            accel_bias: [v[7], v[8], v[9]],
            accel_temp: v[10],
            gyro_temp_slope: [v[11], v[12], v[13]],
        })
    }
}
