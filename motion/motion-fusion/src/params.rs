//! Channel calibration parameters.

use motion_types::{Orientation, PhysicalSensor};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Gyro sensitivity for a ±2000 dps part, q30 dps per LSB scaled by 2^16.
pub const GYRO_SENSITIVITY_2000DPS: i32 = 2000 << 15;

/// Accel sensitivity for a ±2 g part.
pub const ACCEL_SENSITIVITY_2G: i32 = 2 << 15;

/// Compass sensitivity when the driver already reports q16 µT counts.
pub const COMPASS_SENSITIVITY_UNIT: i32 = 1 << 30;

/// Mounting and scale for the motion channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FusionParams {
    /// Gyro q30 sensitivity. Default: 2000 dps full scale
    pub gyro_sensitivity: i32,

    /// Accel q30 sensitivity. Default: 2 g full scale
    pub accel_sensitivity: i32,

    /// Compass q30 sensitivity. Default: unit
    pub compass_sensitivity: i32,

    /// Gyro chip mounting. Default: identity
    pub gyro_orientation: Orientation,

    /// Accel chip mounting. Default: identity
    pub accel_orientation: Orientation,

    /// Compass chip mounting. Default: identity
    pub compass_orientation: Orientation,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            gyro_sensitivity: GYRO_SENSITIVITY_2000DPS,
            accel_sensitivity: ACCEL_SENSITIVITY_2G,
            compass_sensitivity: COMPASS_SENSITIVITY_UNIT,
            gyro_orientation: Orientation::IDENTITY,
            accel_orientation: Orientation::IDENTITY,
            compass_orientation: Orientation::IDENTITY,
        }
    }
}

impl FusionParams {
    /// Sets the gyro and accel mounting, which share a die on combined parts.
    #[must_use]
    pub const fn with_imu_orientation(mut self, orientation: Orientation) -> Self {
        self.gyro_orientation = orientation;
        self.accel_orientation = orientation;
        self
    }

    /// Sets the compass mounting.
    #[must_use]
    pub const fn with_compass_orientation(mut self, orientation: Orientation) -> Self {
        self.compass_orientation = orientation;
        self
    }

    /// Sets the accel sensitivity.
    #[must_use]
    pub const fn with_accel_sensitivity(mut self, sensitivity: i32) -> Self {
        self.accel_sensitivity = sensitivity;
        self
    }

    /// Sets the gyro sensitivity.
    #[must_use]
    pub const fn with_gyro_sensitivity(mut self, sensitivity: i32) -> Self {
        self.gyro_sensitivity = sensitivity;
        self
    }

    /// Sets the compass sensitivity.
    #[must_use]
    pub const fn with_compass_sensitivity(mut self, sensitivity: i32) -> Self {
        self.compass_sensitivity = sensitivity;
        self
    }

    /// Unit sensitivity on every channel, so raw counts map straight to
    /// q16 physical units. Useful for feeding synthetic data.
    #[must_use]
    pub fn unit() -> Self {
        Self {
            gyro_sensitivity: 1 << 30,
            accel_sensitivity: 1 << 30,
            compass_sensitivity: 1 << 30,
            ..Default::default()
        }
    }

    /// Mounting and sensitivity for one channel. Temperature is never
    /// rotated or scaled.
    #[must_use]
    pub const fn channel(&self, sensor: PhysicalSensor) -> (Orientation, i32) {
        match sensor {
            PhysicalSensor::Gyro => (self.gyro_orientation, self.gyro_sensitivity),
            PhysicalSensor::Accel => (self.accel_orientation, self.accel_sensitivity),
            PhysicalSensor::Compass => (self.compass_orientation, self.compass_sensitivity),
            PhysicalSensor::Temperature => (Orientation::IDENTITY, 1 << 30),
        }
    }
}
