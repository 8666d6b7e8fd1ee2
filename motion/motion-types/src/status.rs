//! Channel status bits, new-data masks and accuracy levels.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SensorError;

bitflags::bitflags! {
    /// Per-channel status.
    ///
    /// `NEW_DATA` is set once per recorded sample and cleared by the next
    /// fusion pass. `SENSOR_ON` persists until the channel is marked off.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct ChannelStatus: u32 {
        /// No sample was skipped since the previous pass.
        const CONTIGUOUS = 16;
        /// `calibrated` is current with `raw`, bias and orientation.
        const CALIBRATED = 32;
        /// A sample is waiting for a fusion pass.
        const NEW_DATA = 64;
        /// `raw` holds a device-unit sample.
        const RAW_DATA = 128;
        /// The physical sensor is producing samples.
        const SENSOR_ON = 256;
    }
}

bitflags::bitflags! {
    /// Which channels carried new data into a fusion pass.
    ///
    /// Fusion stages declare a trigger mask of this type and run when it
    /// intersects the pass's active mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct DataMask: u32 {
        /// New accelerometer sample.
        const ACCEL_NEW = 1;
        /// New gyroscope sample.
        const GYRO_NEW = 2;
        /// New magnetometer sample.
        const MAG_NEW = 4;
        /// New temperature sample.
        const TEMP_NEW = 8;
    }
}

/// Confidence in a bias estimate or in calibrated data, 0 through 3.
///
/// ```
/// use motion_types::Accuracy;
///
/// assert_eq!(Accuracy::from_status_bits(0x23), Accuracy::High);
/// assert!(Accuracy::new(4).is_err());
/// assert!(Accuracy::Medium < Accuracy::High);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Accuracy {
    /// No usable calibration.
    #[default]
    Unreliable = 0,
    /// Rough calibration.
    Low = 1,
    /// Usable calibration.
    Medium = 2,
    /// Fully converged calibration.
    High = 3,
}

impl Accuracy {
    /// Builds an accuracy from its numeric level.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::InvalidAccuracy`] for levels above 3.
    pub const fn new(level: u8) -> Result<Self, SensorError> {
        match level {
            0 => Ok(Self::Unreliable),
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(SensorError::InvalidAccuracy(other)),
        }
    }

    /// Extracts the accuracy carried in the low two bits of a driver status.
    #[must_use]
    pub const fn from_status_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Unreliable,
            1 => Self::Low,
            2 => Self::Medium,
            _ => Self::High,
        }
    }

    /// Numeric level.
    #[must_use]
    pub const fn level(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unreliable => "unreliable",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bits_match_wire_values() {
        assert_eq!(ChannelStatus::CONTIGUOUS.bits(), 16);
        assert_eq!(ChannelStatus::CALIBRATED.bits(), 32);
        assert_eq!(ChannelStatus::NEW_DATA.bits(), 64);
        assert_eq!(ChannelStatus::RAW_DATA.bits(), 128);
        assert_eq!(ChannelStatus::SENSOR_ON.bits(), 256);
        assert_eq!(DataMask::all().bits(), 0xF);
    }

    #[test]
    fn accuracy_levels() {
        for level in 0..=3 {
            let acc = Accuracy::new(level).unwrap();
            assert_eq!(acc.level(), level);
        }
        assert!(matches!(
            Accuracy::new(7),
            Err(SensorError::InvalidAccuracy(7))
        ));
    }

    #[test]
    fn accuracy_from_status_masks_high_bits() {
        assert_eq!(Accuracy::from_status_bits(0), Accuracy::Unreliable);
        assert_eq!(Accuracy::from_status_bits(32 | 2), Accuracy::Medium);
        assert_eq!(Accuracy::from_status_bits(u32::MAX), Accuracy::High);
    }

    #[test]
    fn accuracy_display() {
        assert_eq!(Accuracy::High.to_string(), "high");
        assert_eq!(Accuracy::Unreliable.to_string(), "unreliable");
    }
}
