//! Per-sensor sample buffer and calibration state.

use motion_types::{Accuracy, ChannelStatus, Orientation, PhysicalSensor, Timestamp};

/// The latest sample of one physical stream, with the calibration used to
/// turn it into body-frame q16 values.
///
/// `calibrated` is `orientation · sensitivity · ((raw << 16) - bias)`,
/// where `sensitivity` is q30. Temperature has no raw form; its q16 value
/// lives in `calibrated[0]`.
#[derive(Debug, Clone)]
pub struct SensorChannel {
    kind: PhysicalSensor,
    raw: [i16; 3],
    calibrated: [i32; 3],
    sensitivity: i32,
    orientation: Orientation,
    sample_rate_us: u32,
    bandwidth_hz: u32,
    status: ChannelStatus,
    accuracy: Accuracy,
    timestamp: Timestamp,
    timestamp_prev: Timestamp,
}

impl SensorChannel {
    /// Creates an idle channel with identity mounting and the given q30
    /// sensitivity.
    #[must_use]
    pub const fn new(kind: PhysicalSensor, sensitivity: i32) -> Self {
        Self {
            kind,
            raw: [0; 3],
            calibrated: [0; 3],
            sensitivity,
            orientation: Orientation::IDENTITY,
            sample_rate_us: 0,
            bandwidth_hz: 0,
            status: ChannelStatus::empty(),
            accuracy: Accuracy::Unreliable,
            timestamp: Timestamp::ZERO,
            timestamp_prev: Timestamp::ZERO,
        }
    }

    /// Which stream this channel buffers.
    #[must_use]
    pub const fn kind(&self) -> PhysicalSensor {
        self.kind
    }

    /// Last raw sample in device units.
    #[must_use]
    pub const fn raw(&self) -> [i16; 3] {
        self.raw
    }

    /// Last calibrated body-frame sample, q16.
    #[must_use]
    pub const fn calibrated(&self) -> [i32; 3] {
        self.calibrated
    }

    /// q30 scale from device units to physical units.
    #[must_use]
    pub const fn sensitivity(&self) -> i32 {
        self.sensitivity
    }

    /// Chip-to-body mounting.
    #[must_use]
    pub const fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Requested sample period in microseconds, 0 if never set.
    #[must_use]
    pub const fn sample_rate_us(&self) -> u32 {
        self.sample_rate_us
    }

    /// Bandwidth in hertz, 0 if never set.
    #[must_use]
    pub const fn bandwidth_hz(&self) -> u32 {
        self.bandwidth_hz
    }

    /// Status bits.
    #[must_use]
    pub const fn status(&self) -> ChannelStatus {
        self.status
    }

    /// Confidence in the calibrated data.
    #[must_use]
    pub const fn accuracy(&self) -> Accuracy {
        self.accuracy
    }

    /// Time of the latest sample.
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Time of the sample before the latest one.
    #[must_use]
    pub const fn timestamp_prev(&self) -> Timestamp {
        self.timestamp_prev
    }

    /// Whether the stream is producing samples.
    #[must_use]
    pub const fn is_on(&self) -> bool {
        self.status.contains(ChannelStatus::SENSOR_ON)
    }

    /// Whether a sample is waiting for a fusion pass.
    #[must_use]
    pub const fn has_new_data(&self) -> bool {
        self.status.contains(ChannelStatus::NEW_DATA)
    }

    /// Whether the stream is on but has not delivered since the last pass.
    /// A waiting channel holds back the next pass.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        self.is_on() && !self.has_new_data()
    }

    /// Records a raw device-unit sample and recalibrates it with `bias`.
    pub fn record_raw(&mut self, raw: [i16; 3], bias: [i32; 3], timestamp: Timestamp) {
        self.raw = raw;
        self.status |= ChannelStatus::NEW_DATA | ChannelStatus::RAW_DATA | ChannelStatus::SENSOR_ON;
        self.advance(timestamp);
        self.apply_calibration(bias);
    }

    /// Records a sample the driver already calibrated.
    pub fn record_calibrated(&mut self, values: [i32; 3], accuracy: Accuracy, timestamp: Timestamp) {
        self.calibrated = values;
        self.accuracy = accuracy;
        self.status |= ChannelStatus::CALIBRATED | ChannelStatus::NEW_DATA | ChannelStatus::SENSOR_ON;
        self.advance(timestamp);
    }

    /// Records a q16 scalar sample, used by the temperature stream.
    pub fn record_scalar(&mut self, value: i32, timestamp: Timestamp) {
        self.calibrated[0] = value;
        self.status |= ChannelStatus::NEW_DATA | ChannelStatus::RAW_DATA | ChannelStatus::SENSOR_ON;
        self.advance(timestamp);
    }

    fn advance(&mut self, timestamp: Timestamp) {
        self.timestamp_prev = self.timestamp;
        self.timestamp = timestamp;
    }

    /// Recomputes `calibrated` from `raw` with the given q16 bias.
    ///
    /// Applying twice with the same raw sample and bias yields the same
    /// result.
    pub fn apply_calibration(&mut self, bias: [i32; 3]) {
        let mut shifted = [0_i32; 3];
        for (out, (raw, b)) in shifted.iter_mut().zip(self.raw.iter().zip(bias)) {
            *out = (i32::from(*raw) << 16).wrapping_sub(b);
        }
        self.calibrated = self.orientation.apply_with_scale(shifted, self.sensitivity);
        self.status |= ChannelStatus::CALIBRATED;
    }

    /// Clears `SENSOR_ON` and `CONTIGUOUS`. The next recorded sample turns
    /// the channel back on.
    pub fn mark_off(&mut self) {
        self.status
            .remove(ChannelStatus::SENSOR_ON | ChannelStatus::CONTIGUOUS);
    }

    /// Ends a pass for this channel: a pending sample becomes contiguous and
    /// is consumed. Returns whether a sample was pending.
    pub fn finish_pass(&mut self) -> bool {
        let had_new = self.has_new_data();
        if had_new {
            self.status |= ChannelStatus::CONTIGUOUS;
        }
        self.status.remove(ChannelStatus::NEW_DATA);
        had_new
    }

    /// Sets the confidence in the calibrated data.
    pub fn set_accuracy(&mut self, accuracy: Accuracy) {
        self.accuracy = accuracy;
    }

    /// Sets mounting and q30 sensitivity. Takes effect on the next
    /// calibration.
    pub fn set_orientation_and_scale(&mut self, orientation: Orientation, sensitivity: i32) {
        self.orientation = orientation;
        self.sensitivity = sensitivity;
    }

    /// Sets the sample period. Bandwidth follows the rate unless it was set
    /// explicitly.
    pub fn set_sample_rate_us(&mut self, rate_us: u32) {
        self.sample_rate_us = rate_us;
        if self.bandwidth_hz == 0 && rate_us != 0 {
            self.bandwidth_hz = 1_000_000 / rate_us;
        }
    }

    /// Sets the bandwidth explicitly.
    pub fn set_bandwidth_hz(&mut self, bandwidth_hz: u32) {
        self.bandwidth_hz = bandwidth_hz;
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
    use motion_types::fixed::ONE_Q30;

    fn unit_channel() -> SensorChannel {
        SensorChannel::new(PhysicalSensor::Accel, ONE_Q30)
    }

    #[test]
    fn record_raw_sets_status_and_calibrates() {
        let mut ch = unit_channel();
        ch.record_raw([1, -2, 3], [0; 3], Timestamp::from_nanos(10));

        let expected = ChannelStatus::NEW_DATA
            | ChannelStatus::RAW_DATA
            | ChannelStatus::SENSOR_ON
            | ChannelStatus::CALIBRATED;
        assert_eq!(ch.status(), expected);
        assert_eq!(ch.calibrated(), [1 << 16, -2 << 16, 3 << 16]);
        assert_eq!(ch.timestamp(), Timestamp::from_nanos(10));
    }

    #[test]
    fn bias_is_subtracted_before_rotation() {
        let mut ch = unit_channel();
        let swap: Orientation = "0,1,0,1,0,0,0,0,-1".parse().unwrap();
        ch.set_orientation_and_scale(swap, ONE_Q30);
        ch.record_raw([2, 5, 1], [1 << 16, 0, 0], Timestamp::from_nanos(1));
        assert_eq!(ch.calibrated(), [5 << 16, 1 << 16, -(1 << 16)]);
    }

    #[test]
    fn apply_calibration_is_idempotent() {
        let mut ch = unit_channel();
        ch.set_orientation_and_scale(Orientation::IDENTITY, ONE_Q30 / 16);
        ch.record_raw([100, 200, -300], [7, 8, 9], Timestamp::from_nanos(1));
        let first = ch.calibrated();
        ch.apply_calibration([7, 8, 9]);
        assert_eq!(ch.calibrated(), first);
    }

    #[test]
    fn timestamps_shift() {
        let mut ch = unit_channel();
        ch.record_raw([0; 3], [0; 3], Timestamp::from_nanos(5));
        ch.record_raw([0; 3], [0; 3], Timestamp::from_nanos(9));
        assert_eq!(ch.timestamp_prev(), Timestamp::from_nanos(5));
        assert_eq!(ch.timestamp(), Timestamp::from_nanos(9));
    }

    #[test]
    fn record_calibrated_keeps_accuracy() {
        let mut ch = unit_channel();
        ch.record_calibrated([1, 2, 3], Accuracy::Medium, Timestamp::from_nanos(3));
        assert_eq!(ch.calibrated(), [1, 2, 3]);
        assert_eq!(ch.accuracy(), Accuracy::Medium);
        assert!(!ch.status().contains(ChannelStatus::RAW_DATA));
        assert!(ch.has_new_data());
    }

    #[test]
    fn finish_pass_marks_contiguous_once() {
        let mut ch = unit_channel();
        ch.record_raw([0; 3], [0; 3], Timestamp::from_nanos(1));
        assert!(ch.finish_pass());
        assert!(ch.status().contains(ChannelStatus::CONTIGUOUS));
        assert!(!ch.has_new_data());
        assert!(ch.is_waiting());
        assert!(!ch.finish_pass());
    }

    #[test]
    fn mark_off_clears_on_and_contiguous() {
        let mut ch = unit_channel();
        ch.record_raw([0; 3], [0; 3], Timestamp::from_nanos(1));
        ch.finish_pass();
        ch.mark_off();
        assert!(!ch.is_on());
        assert!(!ch.status().contains(ChannelStatus::CONTIGUOUS));
        assert!(!ch.is_waiting());

        ch.record_raw([0; 3], [0; 3], Timestamp::from_nanos(2));
        assert!(ch.is_on());
    }

    #[test]
    fn bandwidth_follows_rate_until_set() {
        let mut ch = unit_channel();
        ch.set_sample_rate_us(5_000);
        assert_eq!(ch.bandwidth_hz(), 200);
        ch.set_sample_rate_us(10_000);
        assert_eq!(ch.bandwidth_hz(), 200);
        assert_eq!(ch.sample_rate_us(), 10_000);
    }
}
