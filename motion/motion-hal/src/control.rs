//! Writing sensor configuration to the hardware.
//!
//! [`PhysicalControl`] is the seam between rate/enable decisions and the
//! device. [`SysfsControl`] drives the kernel driver's attribute files;
//! tests substitute a recording implementation.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use motion_types::{Duration, PhysicalSensor, Timestamp};
use tracing::debug;

use crate::error::{HalError, HalResult};

/// One temperature sample in q16 °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureReading {
    /// Degrees Celsius scaled by 2^16.
    pub value_q16: i32,
    /// Driver timestamp of the reading.
    pub timestamp: Timestamp,
}

/// Hardware operations the HAL needs.
pub trait PhysicalControl: Send {
    /// Starts or stops a physical sensor.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the change.
    fn enable(&mut self, sensor: PhysicalSensor, on: bool) -> HalResult<()>;

    /// Sets a sensor's sampling period.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the period.
    fn set_period(&mut self, sensor: PhysicalSensor, period: Duration) -> HalResult<()>;

    /// Sets the period at which the accelerometer switches to its own
    /// low-power sampling. Zero disables it.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the value.
    fn set_low_power_delay(&mut self, delay: Duration) -> HalResult<()>;

    /// Arms wake-on-motion at `threshold`, or disarms it with zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the value.
    fn set_motion_threshold(&mut self, threshold: u8) -> HalResult<()>;

    /// Reads the die temperature.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be read or parsed.
    fn read_temperature(&mut self) -> HalResult<TemperatureReading>;
}

/// Driver attributes used by [`SysfsControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Gyro master enable.
    GyroEnable,
    /// Gyro FIFO axis mask.
    GyroFifoEnable,
    /// Gyro period in microseconds.
    GyroDelay,
    /// Accel master enable.
    AccelEnable,
    /// Accel FIFO axis mask.
    AccelFifoEnable,
    /// Accel period in microseconds.
    AccelDelay,
    /// Compass enable.
    CompassEnable,
    /// Compass period in microseconds.
    CompassDelay,
    /// Low-power accel switch-over period in microseconds.
    LowPowerDelay,
    /// Wake-on-motion threshold.
    MotionThreshold,
    /// Raw temperature and its timestamp.
    Temperature,
    /// Raw counts per °C.
    TempScale,
    /// Raw count at 35 °C.
    TempOffset,
}

impl Attribute {
    /// Every attribute with its file name, in table order.
    pub const TABLE: [(Self, &'static str); 13] = [
        (Self::GyroEnable, "gyro_enable"),
        (Self::GyroFifoEnable, "gyro_fifo_enable"),
        (Self::GyroDelay, "gyro_delay"),
        (Self::AccelEnable, "accl_enable"),
        (Self::AccelFifoEnable, "accl_fifo_enable"),
        (Self::AccelDelay, "accl_delay"),
        (Self::CompassEnable, "compass_enable"),
        (Self::CompassDelay, "compass_delay"),
        (Self::LowPowerDelay, "lpa_delay"),
        (Self::MotionThreshold, "motion_threshold"),
        (Self::Temperature, "temperature"),
        (Self::TempScale, "temp_scale"),
        (Self::TempOffset, "temp_offset"),
    ];

    /// File name of the attribute.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        Self::TABLE[self as usize].1
    }
}

/// Attribute-file implementation of [`PhysicalControl`].
#[derive(Debug, Clone)]
pub struct SysfsControl {
    paths: [PathBuf; Attribute::TABLE.len()],
    temp_scale: f32,
    temp_offset: f32,
}

impl SysfsControl {
    /// Resolves every attribute under `dir`. Temperature conversion
    /// starts at one count per degree with no offset.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            paths: Attribute::TABLE.map(|(_, name)| dir.join(name)),
            temp_scale: 1.0,
            temp_offset: 0.0,
        }
    }

    /// Resolves attributes under `dir` and reads the temperature
    /// calibration from the driver.
    ///
    /// # Errors
    ///
    /// Returns an error if `temp_scale` or `temp_offset` is missing or not
    /// a number.
    pub fn open(dir: impl AsRef<Path>) -> HalResult<Self> {
        let mut control = Self::new(dir);
        let scale = control.read_number(Attribute::TempScale)?;
        let offset = control.read_number(Attribute::TempOffset)?;
        control = control.with_temperature_calibration(offset, scale);
        debug!(scale, offset, "Opened motion control attributes");
        Ok(control)
    }

    /// Sets the raw-to-°C conversion.
    #[must_use]
    pub const fn with_temperature_calibration(mut self, offset: f32, scale: f32) -> Self {
        self.temp_offset = offset;
        self.temp_scale = scale;
        self
    }

    /// Path of one attribute.
    #[must_use]
    pub fn path(&self, attribute: Attribute) -> &Path {
        &self.paths[attribute as usize]
    }

    fn write(&self, attribute: Attribute, value: impl Display) -> HalResult<()> {
        let path = self.path(attribute);
        fs::write(path, value.to_string()).map_err(|e| HalError::attribute(path, e))?;
        debug!(path = %path.display(), %value, "Wrote attribute");
        Ok(())
    }

    fn read(&self, attribute: Attribute) -> HalResult<String> {
        let path = self.path(attribute);
        fs::read_to_string(path).map_err(|e| HalError::attribute(path, e))
    }

    fn read_number(&self, attribute: Attribute) -> HalResult<f32> {
        let text = self.read(attribute)?;
        text.trim()
            .parse()
            .map_err(|_| HalError::parse(self.path(attribute), text.trim()))
    }
}

impl PhysicalControl for SysfsControl {
    fn enable(&mut self, sensor: PhysicalSensor, on: bool) -> HalResult<()> {
        // FIFO enables take an axis mask; master enables only need clearing.
        let axes = if on { 7 } else { 0 };
        match sensor {
            PhysicalSensor::Gyro => {
                self.write(Attribute::GyroFifoEnable, axes)?;
                if !on {
                    self.write(Attribute::GyroEnable, 0)?;
                }
                Ok(())
            }
            PhysicalSensor::Accel => {
                self.write(Attribute::AccelFifoEnable, axes)?;
                if !on {
                    self.write(Attribute::AccelEnable, 0)?;
                }
                Ok(())
            }
            PhysicalSensor::Compass => self.write(Attribute::CompassEnable, u8::from(on)),
            PhysicalSensor::Temperature => Ok(()),
        }
    }

    fn set_period(&mut self, sensor: PhysicalSensor, period: Duration) -> HalResult<()> {
        let us = period.as_micros();
        match sensor {
            PhysicalSensor::Gyro => self.write(Attribute::GyroDelay, us),
            PhysicalSensor::Accel => self.write(Attribute::AccelDelay, us),
            PhysicalSensor::Compass => self.write(Attribute::CompassDelay, us),
            PhysicalSensor::Temperature => Ok(()),
        }
    }

    fn set_low_power_delay(&mut self, delay: Duration) -> HalResult<()> {
        self.write(Attribute::LowPowerDelay, delay.as_micros())
    }

    fn set_motion_threshold(&mut self, threshold: u8) -> HalResult<()> {
        self.write(Attribute::MotionThreshold, threshold)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_temperature(&mut self) -> HalResult<TemperatureReading> {
        let text = self.read(Attribute::Temperature)?;
        let path = self.path(Attribute::Temperature);
        let mut fields = text.split_whitespace();
        let raw: i16 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| HalError::parse(path, text.trim()))?;
        let timestamp = fields
            .next()
            .and_then(|f| f.parse::<i64>().ok())
            .and_then(|ns| u64::try_from(ns).ok())
            .map_or(Timestamp::ZERO, Timestamp::from_nanos);

        let celsius = 35.0 + (f32::from(raw) - self.temp_offset) / self.temp_scale;
        Ok(TemperatureReading {
            value_q16: (celsius * 65536.0).round() as i32,
            timestamp,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read(control: &SysfsControl, attribute: Attribute) -> String {
        fs::read_to_string(control.path(attribute)).unwrap()
    }

    #[test]
    fn table_matches_variant_order() {
        for (index, (attribute, _)) in Attribute::TABLE.iter().enumerate() {
            assert_eq!(*attribute as usize, index);
        }
        assert_eq!(Attribute::AccelDelay.file_name(), "accl_delay");
    }

    #[test]
    fn enable_and_disable_gyro() {
        let dir = tempdir().unwrap();
        let mut control = SysfsControl::new(dir.path());

        control.enable(PhysicalSensor::Gyro, true).unwrap();
        assert_eq!(read(&control, Attribute::GyroFifoEnable), "7");
        assert!(!control.path(Attribute::GyroEnable).exists());

        control.enable(PhysicalSensor::Gyro, false).unwrap();
        assert_eq!(read(&control, Attribute::GyroFifoEnable), "0");
        assert_eq!(read(&control, Attribute::GyroEnable), "0");
    }

    #[test]
    fn periods_written_in_microseconds() {
        let dir = tempdir().unwrap();
        let mut control = SysfsControl::new(dir.path());
        control
            .set_period(PhysicalSensor::Accel, Duration::from_millis(20))
            .unwrap();
        control
            .set_low_power_delay(Duration::from_millis(256))
            .unwrap();
        assert_eq!(read(&control, Attribute::AccelDelay), "20000");
        assert_eq!(read(&control, Attribute::LowPowerDelay), "256000");
    }

    #[test]
    fn temperature_conversion() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("temp_scale"), "340\n").unwrap();
        fs::write(dir.path().join("temp_offset"), "-521\n").unwrap();
        fs::write(dir.path().join("temperature"), "-521 123456789\n").unwrap();

        let mut control = SysfsControl::open(dir.path()).unwrap();
        let reading = control.read_temperature().unwrap();
        assert_eq!(reading.value_q16, 35 << 16);
        assert_eq!(reading.timestamp, Timestamp::from_nanos(123_456_789));
    }

    #[test]
    fn garbage_temperature_is_parse_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("temperature"), "hot").unwrap();
        let mut control = SysfsControl::new(dir.path());
        let err = control.read_temperature().unwrap_err();
        assert!(matches!(err, HalError::Parse { .. }));
    }

    #[test]
    fn missing_directory_is_attribute_error() {
        let dir = tempdir().unwrap();
        let mut control = SysfsControl::new(dir.path().join("absent"));
        let err = control.enable(PhysicalSensor::Compass, true).unwrap_err();
        assert!(matches!(err, HalError::Attribute { .. }));
        assert_eq!(err.errno(), -5);
    }
}
