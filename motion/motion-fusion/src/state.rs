//! Channel set, biases and per-pass messages shared by fusion stages.

use motion_types::{Accuracy, ChannelStatus, PhysicalSensor, Timestamp, fixed::ONE_Q30};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channel::SensorChannel;
use crate::params::FusionParams;
use crate::record::CalibrationRecord;

/// Temperature assumed for a gyro bias captured before any temperature
/// sample arrived: 27 °C in q16.
pub const DEFAULT_GYRO_TEMP: i32 = 27 << 16;

bitflags::bitflags! {
    /// Events raised by stages during a pass and drained by the consumer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct EngineMessages: u32 {
        /// The device started moving.
        const MOTION = 0x01;
        /// The device came to rest.
        const NO_MOTION = 0x02;
        /// A new gyro bias was set.
        const NEW_GYRO_BIAS = 0x04;
    }
}

/// What the output stage latched at the end of the most recent pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalSnapshot {
    /// Fused quaternion, q30, `[w, x, y, z]`.
    pub quaternion: [i32; 4],
    /// Accuracy of the heading, taken from the compass.
    pub accuracy: Accuracy,
    /// Latest timestamp across running channels.
    pub timestamp: Timestamp,
}

impl Default for HalSnapshot {
    fn default() -> Self {
        Self {
            quaternion: [ONE_Q30, 0, 0, 0],
            accuracy: Accuracy::Unreliable,
            timestamp: Timestamp::ZERO,
        }
    }
}

/// Everything fusion stages read and write during a pass.
#[derive(Debug, Clone)]
pub struct FusionState {
    gyro: SensorChannel,
    accel: SensorChannel,
    compass: SensorChannel,
    temperature: SensorChannel,
    record: CalibrationRecord,
    compass_disturbance: bool,
    messages: EngineMessages,
    hal: HalSnapshot,
}

impl FusionState {
    /// Creates idle channels mounted and scaled per `params`, with zero
    /// bias.
    #[must_use]
    pub fn new(params: &FusionParams) -> Self {
        let channel = |sensor| {
            let (orientation, sensitivity) = params.channel(sensor);
            let mut ch = SensorChannel::new(sensor, sensitivity);
            ch.set_orientation_and_scale(orientation, sensitivity);
            ch
        };
        Self {
            gyro: channel(PhysicalSensor::Gyro),
            accel: channel(PhysicalSensor::Accel),
            compass: channel(PhysicalSensor::Compass),
            temperature: channel(PhysicalSensor::Temperature),
            record: CalibrationRecord::default(),
            compass_disturbance: false,
            messages: EngineMessages::empty(),
            hal: HalSnapshot::default(),
        }
    }

    /// One channel.
    #[must_use]
    pub const fn channel(&self, sensor: PhysicalSensor) -> &SensorChannel {
        match sensor {
            PhysicalSensor::Gyro => &self.gyro,
            PhysicalSensor::Accel => &self.accel,
            PhysicalSensor::Compass => &self.compass,
            PhysicalSensor::Temperature => &self.temperature,
        }
    }

    /// One channel, mutably.
    pub fn channel_mut(&mut self, sensor: PhysicalSensor) -> &mut SensorChannel {
        match sensor {
            PhysicalSensor::Gyro => &mut self.gyro,
            PhysicalSensor::Accel => &mut self.accel,
            PhysicalSensor::Compass => &mut self.compass,
            PhysicalSensor::Temperature => &mut self.temperature,
        }
    }

    /// All four channels.
    pub fn channels(&self) -> impl Iterator<Item = &SensorChannel> {
        [&self.gyro, &self.accel, &self.compass, &self.temperature].into_iter()
    }

    pub(crate) fn channels_mut(&mut self) -> [&mut SensorChannel; 4] {
        [
            &mut self.gyro,
            &mut self.accel,
            &mut self.compass,
            &mut self.temperature,
        ]
    }

    /// Current bias for a channel; temperature has none.
    #[must_use]
    pub const fn bias(&self, sensor: PhysicalSensor) -> [i32; 3] {
        match sensor {
            PhysicalSensor::Gyro => self.record.gyro_bias,
            PhysicalSensor::Accel => self.record.accel_bias,
            PhysicalSensor::Compass => self.record.compass_bias,
            PhysicalSensor::Temperature => [0; 3],
        }
    }

    /// Recalibrates a channel that holds a raw sample.
    pub fn reapply_calibration(&mut self, sensor: PhysicalSensor) {
        if sensor == PhysicalSensor::Temperature {
            return;
        }
        let bias = self.bias(sensor);
        let ch = self.channel_mut(sensor);
        if ch.status().contains(ChannelStatus::RAW_DATA) {
            ch.apply_calibration(bias);
        }
    }

    /// Sets the gyro bias and its accuracy.
    ///
    /// Recalibrates only when the bias changed. Records the temperature at
    /// capture and raises [`EngineMessages::NEW_GYRO_BIAS`].
    pub fn set_gyro_bias(&mut self, bias: [i32; 3], accuracy: Accuracy) {
        if self.record.gyro_bias != bias {
            self.record.gyro_bias = bias;
            self.reapply_calibration(PhysicalSensor::Gyro);
        }
        self.gyro.set_accuracy(accuracy);
        let temp = self.temperature.calibrated()[0];
        self.record.gyro_temp = if temp == 0 { DEFAULT_GYRO_TEMP } else { temp };
        self.messages |= EngineMessages::NEW_GYRO_BIAS;
    }

    /// Sets the accel bias and its accuracy.
    pub fn set_accel_bias(&mut self, bias: [i32; 3], accuracy: Accuracy) {
        self.set_accel_bias_mask(bias, accuracy, 7);
    }

    /// Sets selected accel bias axes: bit 0 is x, bit 1 y, bit 2 z.
    pub fn set_accel_bias_mask(&mut self, bias: [i32; 3], accuracy: Accuracy, mask: u8) {
        let mut changed = false;
        for (axis, value) in bias.into_iter().enumerate() {
            if mask & (1 << axis) != 0 && self.record.accel_bias[axis] != value {
                self.record.accel_bias[axis] = value;
                changed = true;
            }
        }
        if changed {
            self.reapply_calibration(PhysicalSensor::Accel);
        }
        self.accel.set_accuracy(accuracy);
    }

    /// Sets the compass bias and its accuracy.
    pub fn set_compass_bias(&mut self, bias: [i32; 3], accuracy: Accuracy) {
        if self.record.compass_bias != bias {
            self.record.compass_bias = bias;
            self.reapply_calibration(PhysicalSensor::Compass);
        }
        self.compass.set_accuracy(accuracy);
    }

    /// Sets the gyro bias drift per degree.
    pub fn set_gyro_temp_slope(&mut self, slope: [i32; 3]) {
        self.record.gyro_temp_slope = slope;
    }

    /// Gyro bias and the temperature at which it was captured.
    #[must_use]
    pub const fn gyro_bias(&self) -> ([i32; 3], i32) {
        (self.record.gyro_bias, self.record.gyro_temp)
    }

    /// Accel bias.
    #[must_use]
    pub const fn accel_bias(&self) -> [i32; 3] {
        self.record.accel_bias
    }

    /// Compass bias.
    #[must_use]
    pub const fn compass_bias(&self) -> [i32; 3] {
        self.record.compass_bias
    }

    /// Gyro bias drift per degree.
    #[must_use]
    pub const fn gyro_temp_slope(&self) -> [i32; 3] {
        self.record.gyro_temp_slope
    }

    /// The persisted calibration fields.
    #[must_use]
    pub const fn record(&self) -> &CalibrationRecord {
        &self.record
    }

    /// Replaces the persisted fields and recalibrates raw samples.
    pub fn restore_record(&mut self, record: CalibrationRecord) {
        self.record = record;
        for sensor in PhysicalSensor::MOTION {
            self.reapply_calibration(sensor);
        }
    }

    /// Flags the magnetic field as disturbed.
    pub fn set_compass_disturbance(&mut self, disturbed: bool) {
        self.compass_disturbance = disturbed;
    }

    /// Whether the magnetic field is flagged as disturbed.
    #[must_use]
    pub const fn compass_disturbance(&self) -> bool {
        self.compass_disturbance
    }

    /// Compass accuracy, forced to [`Accuracy::Unreliable`] while the
    /// field is disturbed.
    #[must_use]
    pub const fn compass_accuracy(&self) -> Accuracy {
        if self.compass_disturbance {
            Accuracy::Unreliable
        } else {
            self.compass.accuracy()
        }
    }

    /// Raises engine messages.
    pub fn post_message(&mut self, messages: EngineMessages) {
        self.messages |= messages;
    }

    /// Returns and clears the pending engine messages.
    pub fn take_messages(&mut self) -> EngineMessages {
        std::mem::take(&mut self.messages)
    }

    /// Latest timestamp over channels that are on.
    #[must_use]
    pub fn last_timestamp(&self) -> Timestamp {
        self.channels()
            .filter(|ch| ch.is_on())
            .map(SensorChannel::timestamp)
            .max()
            .unwrap_or(Timestamp::ZERO)
    }

    /// Latches the quaternion for the public outputs.
    pub fn capture_outputs(&mut self, quaternion: [i32; 4]) {
        self.hal = HalSnapshot {
            quaternion,
            accuracy: self.compass_accuracy(),
            timestamp: self.last_timestamp(),
        };
    }

    /// The most recent output snapshot.
    #[must_use]
    pub const fn outputs(&self) -> &HalSnapshot {
        &self.hal
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn state_with_raw_gyro() -> FusionState {
        let mut state = FusionState::new(&FusionParams::unit());
        state
            .channel_mut(PhysicalSensor::Gyro)
            .record_raw([3, 4, 5], [0; 3], Timestamp::from_nanos(1));
        state
    }

    #[test]
    fn gyro_bias_recalibrates_and_posts_message() {
        let mut state = state_with_raw_gyro();
        state.set_gyro_bias([1 << 16, 0, 0], Accuracy::High);

        let gyro = state.channel(PhysicalSensor::Gyro);
        assert_eq!(gyro.calibrated(), [2 << 16, 4 << 16, 5 << 16]);
        assert_eq!(gyro.accuracy(), Accuracy::High);
        assert!(state.take_messages().contains(EngineMessages::NEW_GYRO_BIAS));
        assert!(state.take_messages().is_empty());
    }

    #[test]
    fn gyro_temp_defaults_to_27c() {
        let mut state = state_with_raw_gyro();
        state.set_gyro_bias([1, 2, 3], Accuracy::Low);
        assert_eq!(state.gyro_bias(), ([1, 2, 3], 1_769_472));

        state
            .channel_mut(PhysicalSensor::Temperature)
            .record_scalar(30 << 16, Timestamp::from_nanos(2));
        state.set_gyro_bias([1, 2, 3], Accuracy::Low);
        assert_eq!(state.gyro_bias().1, 30 << 16);
    }

    #[test]
    fn accel_bias_mask_updates_selected_axes() {
        let mut state = FusionState::new(&FusionParams::unit());
        state.set_accel_bias([10, 20, 30], Accuracy::Low);
        state.set_accel_bias_mask([1, 2, 3], Accuracy::Medium, 0b101);
        assert_eq!(state.accel_bias(), [1, 20, 3]);
        assert_eq!(state.channel(PhysicalSensor::Accel).accuracy(), Accuracy::Medium);
    }

    #[test]
    fn accel_bias_keeps_saved_temperature() {
        let mut state = FusionState::new(&FusionParams::unit());
        let saved = state.record().accel_temp;
        state
            .channel_mut(PhysicalSensor::Temperature)
            .record_scalar(40 << 16, Timestamp::from_nanos(1));
        state.set_accel_bias([4, 5, 6], Accuracy::High);
        state.set_accel_bias_mask([7, 8, 9], Accuracy::High, 0b010);
        assert_eq!(state.record().accel_temp, saved);
        assert_eq!(state.accel_bias(), [4, 8, 6]);
    }

    #[test]
    fn compass_accuracy_zero_while_disturbed() {
        let mut state = FusionState::new(&FusionParams::unit());
        state.set_compass_bias([0; 3], Accuracy::High);
        assert_eq!(state.compass_accuracy(), Accuracy::High);
        state.set_compass_disturbance(true);
        assert_eq!(state.compass_accuracy(), Accuracy::Unreliable);
    }

    #[test]
    fn last_timestamp_ignores_off_channels() {
        let mut state = FusionState::new(&FusionParams::unit());
        assert_eq!(state.last_timestamp(), Timestamp::ZERO);

        state
            .channel_mut(PhysicalSensor::Gyro)
            .record_raw([0; 3], [0; 3], Timestamp::from_nanos(50));
        state
            .channel_mut(PhysicalSensor::Accel)
            .record_raw([0; 3], [0; 3], Timestamp::from_nanos(90));
        assert_eq!(state.last_timestamp(), Timestamp::from_nanos(90));

        state.channel_mut(PhysicalSensor::Accel).mark_off();
        assert_eq!(state.last_timestamp(), Timestamp::from_nanos(50));
    }

    #[test]
    fn restore_record_recalibrates() {
        let mut state = state_with_raw_gyro();
        let record = CalibrationRecord {
            gyro_bias: [3 << 16, 4 << 16, 5 << 16],
            ..Default::default()
        };
        state.restore_record(record);
        assert_eq!(state.channel(PhysicalSensor::Gyro).calibrated(), [0; 3]);
        assert_eq!(state.record(), &record);
    }
}
