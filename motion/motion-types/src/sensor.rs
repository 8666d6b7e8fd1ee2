//! Physical and virtual sensor identifiers.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SensorError;
use crate::status::DataMask;

/// A physical sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PhysicalSensor {
    /// Three-axis gyroscope.
    Gyro,
    /// Three-axis accelerometer.
    Accel,
    /// Three-axis magnetometer.
    Compass,
    /// Die temperature.
    Temperature,
}

impl PhysicalSensor {
    /// All physical streams.
    pub const ALL: [Self; 4] = [Self::Gyro, Self::Accel, Self::Compass, Self::Temperature];

    /// The streams whose samples gate a fusion pass.
    pub const MOTION: [Self; 3] = [Self::Gyro, Self::Accel, Self::Compass];

    /// The new-data bit this stream contributes to a pass.
    #[must_use]
    pub const fn data_bit(self) -> DataMask {
        match self {
            Self::Gyro => DataMask::GYRO_NEW,
            Self::Accel => DataMask::ACCEL_NEW,
            Self::Compass => DataMask::MAG_NEW,
            Self::Temperature => DataMask::TEMP_NEW,
        }
    }

    /// Short lowercase name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gyro => "gyro",
            Self::Accel => "accel",
            Self::Compass => "compass",
            Self::Temperature => "temperature",
        }
    }
}

impl fmt::Display for PhysicalSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A sensor exposed to consumers, identified by a fixed handle.
///
/// ```
/// use motion_types::VirtualSensor;
///
/// let s = VirtualSensor::try_from(4).unwrap();
/// assert_eq!(s, VirtualSensor::RotationVector);
/// assert!(s.needs_fusion());
/// assert!(VirtualSensor::try_from(7).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VirtualSensor {
    /// Calibrated angular rate, rad/s.
    Gyroscope = 0,
    /// Calibrated acceleration, m/s².
    Accelerometer = 1,
    /// Calibrated magnetic field, µT.
    MagneticField = 2,
    /// Azimuth, pitch, roll in degrees.
    Orientation = 3,
    /// Unit quaternion x, y, z, w.
    RotationVector = 4,
    /// Acceleration with gravity removed, m/s².
    LinearAcceleration = 5,
    /// Gravity in the body frame, m/s².
    Gravity = 6,
}

impl VirtualSensor {
    /// Number of virtual sensors.
    pub const COUNT: usize = 7;

    /// All virtual sensors in handle order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Gyroscope,
        Self::Accelerometer,
        Self::MagneticField,
        Self::Orientation,
        Self::RotationVector,
        Self::LinearAcceleration,
        Self::Gravity,
    ];

    /// Handle exposed to the poll-device shell.
    #[must_use]
    pub const fn handle(self) -> i32 {
        self as i32
    }

    /// Position in handle-indexed tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether the sensor is derived from the fused quaternion and so needs
    /// gyro, accel and compass running together.
    #[must_use]
    pub const fn needs_fusion(self) -> bool {
        matches!(
            self,
            Self::Orientation | Self::RotationVector | Self::LinearAcceleration | Self::Gravity
        )
    }

    /// Number of meaningful output values.
    #[must_use]
    pub const fn value_count(self) -> usize {
        match self {
            Self::RotationVector => 4,
            _ => 3,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gyroscope => "gyroscope",
            Self::Accelerometer => "accelerometer",
            Self::MagneticField => "magnetic_field",
            Self::Orientation => "orientation",
            Self::RotationVector => "rotation_vector",
            Self::LinearAcceleration => "linear_acceleration",
            Self::Gravity => "gravity",
        }
    }
}

impl TryFrom<i32> for VirtualSensor {
    type Error = SensorError;

    fn try_from(handle: i32) -> Result<Self, Self::Error> {
        usize::try_from(handle)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(SensorError::InvalidHandle(handle))
    }
}

impl fmt::Display for VirtualSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_stable() {
        for (i, s) in VirtualSensor::ALL.iter().enumerate() {
            assert_eq!(s.index(), i);
            assert_eq!(VirtualSensor::try_from(s.handle()).unwrap(), *s);
        }
        assert_eq!(VirtualSensor::Gravity.handle(), 6);
    }

    #[test]
    fn unknown_handle_rejected() {
        for bad in [-1, 7, 100, i32::MIN] {
            assert!(matches!(
                VirtualSensor::try_from(bad),
                Err(SensorError::InvalidHandle(h)) if h == bad
            ));
        }
    }

    #[test]
    fn fusion_membership() {
        let fused: Vec<_> = VirtualSensor::ALL
            .into_iter()
            .filter(|s| s.needs_fusion())
            .collect();
        assert_eq!(
            fused,
            [
                VirtualSensor::Orientation,
                VirtualSensor::RotationVector,
                VirtualSensor::LinearAcceleration,
                VirtualSensor::Gravity
            ]
        );
    }

    #[test]
    fn physical_data_bits() {
        let all = PhysicalSensor::ALL
            .iter()
            .fold(DataMask::empty(), |m, s| m | s.data_bit());
        assert_eq!(all, DataMask::all());
    }
}
