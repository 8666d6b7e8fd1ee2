//! Conversion of fused state into public sensor values.
//!
//! Calibrated channels are q16 in g, dps and µT; the conversions below turn
//! them into m/s², rad/s and µT. Quaternion-derived outputs read the
//! snapshot latched by the output stage at the end of the last pass, and
//! report the compass accuracy and latest pass timestamp captured there.

use std::f32::consts::PI;

use motion_types::{
    PhysicalSensor, SensorEvent, VirtualSensor,
    fixed::{ONE_Q30, Q30_TO_F32, q29_mult},
};

use crate::state::FusionState;

/// q16 g to m/s²: 9.80665 / 2^16.
#[allow(clippy::excessive_precision)]
pub const ACCEL_CONVERSION: f32 = 0.000_149_637_603_759_766;

/// q16 dps to rad/s: π / 180 / 2^16.
#[allow(clippy::excessive_precision)]
pub const GYRO_CONVERSION: f32 = 2.663_161_090_079_24e-7;

/// q16 µT to µT: 1 / 2^16.
pub const COMPASS_CONVERSION: f32 = 1.525_878_906_25e-5;

#[allow(clippy::cast_precision_loss)]
fn scale(values: [i32; 3], factor: f32) -> [f32; 3] {
    values.map(|v| v as f32 * factor)
}

/// Calibrated acceleration, m/s².
#[must_use]
pub fn accelerometer(state: &FusionState) -> SensorEvent {
    let ch = state.channel(PhysicalSensor::Accel);
    SensorEvent::vector(
        VirtualSensor::Accelerometer,
        scale(ch.calibrated(), ACCEL_CONVERSION),
        ch.accuracy(),
        ch.timestamp(),
    )
}

/// Calibrated angular rate, rad/s.
#[must_use]
pub fn gyroscope(state: &FusionState) -> SensorEvent {
    let ch = state.channel(PhysicalSensor::Gyro);
    SensorEvent::vector(
        VirtualSensor::Gyroscope,
        scale(ch.calibrated(), GYRO_CONVERSION),
        ch.accuracy(),
        ch.timestamp(),
    )
}

/// Calibrated magnetic field, µT.
#[must_use]
pub fn magnetic_field(state: &FusionState) -> SensorEvent {
    let ch = state.channel(PhysicalSensor::Compass);
    SensorEvent::vector(
        VirtualSensor::MagneticField,
        scale(ch.calibrated(), COMPASS_CONVERSION),
        state.compass_accuracy(),
        ch.timestamp(),
    )
}

/// Gravity direction in the body frame, q30, from a `[w, x, y, z]`
/// quaternion.
#[must_use]
pub const fn gravity_q30(q: [i32; 4]) -> [i32; 3] {
    [
        q29_mult(q[1], q[3]).wrapping_sub(q29_mult(q[2], q[0])),
        q29_mult(q[2], q[3]).wrapping_add(q29_mult(q[1], q[0])),
        q29_mult(q[3], q[3])
            .wrapping_add(q29_mult(q[0], q[0]))
            .wrapping_sub(ONE_Q30),
    ]
}

/// Gravity q30 reduced to the q16 accel radix.
const fn gravity_q16(q: [i32; 4]) -> [i32; 3] {
    let g = gravity_q30(q);
    [g[0] >> 14, g[1] >> 14, g[2] >> 14]
}

/// Gravity in the body frame, m/s².
#[must_use]
pub fn gravity(state: &FusionState) -> SensorEvent {
    let snap = state.outputs();
    SensorEvent::vector(
        VirtualSensor::Gravity,
        scale(gravity_q16(snap.quaternion), ACCEL_CONVERSION),
        snap.accuracy,
        snap.timestamp,
    )
}

/// Acceleration with gravity removed, m/s².
#[must_use]
pub fn linear_acceleration(state: &FusionState) -> SensorEvent {
    let ch = state.channel(PhysicalSensor::Accel);
    let g = gravity_q16(state.outputs().quaternion);
    let accel = ch.calibrated();
    let linear = [
        accel[0].wrapping_sub(g[0]),
        accel[1].wrapping_sub(g[1]),
        accel[2].wrapping_sub(g[2]),
    ];
    SensorEvent::vector(
        VirtualSensor::LinearAcceleration,
        scale(linear, ACCEL_CONVERSION),
        ch.accuracy(),
        ch.timestamp(),
    )
}

/// Attitude as `[x, y, z, w]` with `w >= 0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rotation_vector(state: &FusionState) -> SensorEvent {
    let snap = state.outputs();
    let q = snap.quaternion;
    let sign = if q[0] >= 0 { 1.0 } else { -1.0 };
    let values = [q[1], q[2], q[3], q[0]].map(|v| sign * v as f32 * Q30_TO_F32);
    SensorEvent {
        sensor: VirtualSensor::RotationVector,
        values,
        accuracy: snap.accuracy,
        timestamp: snap.timestamp,
    }
}

/// Azimuth, pitch and roll in degrees from a `[w, x, y, z]` q30
/// quaternion.
///
/// Azimuth is in `[0, 360)`. Pitch reflects into the ±180° complement
/// when the body z axis points down. Roll folds into `[-90, 90)`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::many_single_char_names)]
pub fn euler_degrees(q: [i32; 4]) -> [f32; 3] {
    let deg = 180.0 / PI;
    let m = |i: usize, j: usize| q29_mult(q[i], q[j]);

    let t1 = m(1, 2).wrapping_sub(m(0, 3));
    let t2 = m(2, 2).wrapping_add(m(0, 0)).wrapping_sub(ONE_Q30);
    let mut azimuth = (t1 as f32).atan2(t2 as f32) * deg;
    if azimuth < 0.0 {
        azimuth += 360.0;
    }

    let t3 = m(2, 3).wrapping_add(m(0, 1));
    let (f1, f2) = (t1 as f32, t2 as f32);
    let mut pitch = -(t3 as f32).atan2((f1 * f1 + f2 * f2).sqrt()) * deg;

    let t4 = m(3, 3).wrapping_add(m(0, 0)).wrapping_sub(ONE_Q30);
    if t4 < 0 {
        pitch = if pitch >= 0.0 {
            180.0 - pitch
        } else {
            -180.0 - pitch
        };
    }

    let t5 = m(1, 3).wrapping_sub(m(0, 2));
    let mut roll = -((t4 as f32).atan2(t5 as f32) * deg - 90.0);
    if roll >= 90.0 {
        roll = 180.0 - roll;
    }
    if roll < -90.0 {
        roll = -180.0 - roll;
    }

    [azimuth, pitch, roll]
}

/// Azimuth, pitch and roll, degrees.
#[must_use]
pub fn orientation(state: &FusionState) -> SensorEvent {
    let snap = state.outputs();
    SensorEvent::vector(
        VirtualSensor::Orientation,
        euler_degrees(snap.quaternion),
        snap.accuracy,
        snap.timestamp,
    )
}

/// Produces the current reading of any virtual sensor.
#[must_use]
pub fn generate(sensor: VirtualSensor, state: &FusionState) -> SensorEvent {
    match sensor {
        VirtualSensor::Gyroscope => gyroscope(state),
        VirtualSensor::Accelerometer => accelerometer(state),
        VirtualSensor::MagneticField => magnetic_field(state),
        VirtualSensor::Orientation => orientation(state),
        VirtualSensor::RotationVector => rotation_vector(state),
        VirtualSensor::LinearAcceleration => linear_acceleration(state),
        VirtualSensor::Gravity => gravity(state),
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
    use crate::params::FusionParams;
    use approx::assert_relative_eq;
    use motion_types::{Accuracy, Timestamp};

    const HALF_SQRT2_Q30: i32 = 759_250_125;

    fn state_with_quaternion(q: [i32; 4]) -> FusionState {
        let mut state = FusionState::new(&FusionParams::unit());
        state
            .channel_mut(PhysicalSensor::Compass)
            .record_calibrated([0; 3], Accuracy::Medium, Timestamp::from_nanos(77));
        state.capture_outputs(q);
        state
    }

    #[test]
    fn one_g_is_standard_gravity() {
        let mut state = FusionState::new(&FusionParams::unit());
        state.channel_mut(PhysicalSensor::Accel).record_calibrated(
            [1 << 16, 1 << 16, 1 << 16],
            Accuracy::High,
            Timestamp::from_nanos(9),
        );
        let ev = accelerometer(&state);
        for v in ev.xyz() {
            assert_relative_eq!(v, 9.80665, epsilon = 1e-4);
        }
        assert_eq!(ev.accuracy, Accuracy::High);
        assert_eq!(ev.timestamp, Timestamp::from_nanos(9));
    }

    #[test]
    fn gyro_and_compass_units() {
        let mut state = FusionState::new(&FusionParams::unit());
        state.channel_mut(PhysicalSensor::Gyro).record_calibrated(
            [180 << 16, 0, 0],
            Accuracy::Low,
            Timestamp::from_nanos(1),
        );
        state.channel_mut(PhysicalSensor::Compass).record_calibrated(
            [0, 45 << 16, 0],
            Accuracy::High,
            Timestamp::from_nanos(1),
        );
        assert_relative_eq!(gyroscope(&state).values[0], PI, epsilon = 1e-5);
        assert_relative_eq!(magnetic_field(&state).values[1], 45.0, epsilon = 1e-6);
    }

    #[test]
    fn magnetic_field_accuracy_drops_when_disturbed() {
        let mut state = state_with_quaternion([ONE_Q30, 0, 0, 0]);
        state.set_compass_disturbance(true);
        assert_eq!(magnetic_field(&state).accuracy, Accuracy::Unreliable);
    }

    #[test]
    fn identity_outputs() {
        let state = state_with_quaternion([ONE_Q30, 0, 0, 0]);

        let g = gravity(&state);
        assert_relative_eq!(g.values[0], 0.0);
        assert_relative_eq!(g.values[1], 0.0);
        assert_relative_eq!(g.values[2], 9.80665, epsilon = 1e-4);
        assert_eq!(g.accuracy, Accuracy::Medium);
        assert_eq!(g.timestamp, Timestamp::from_nanos(77));

        let rv = rotation_vector(&state);
        assert_eq!(rv.values, [0.0, 0.0, 0.0, 1.0]);

        let o = orientation(&state).xyz();
        for v in o {
            assert_relative_eq!(v, 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn rotation_vector_canonical_hemisphere() {
        let state = state_with_quaternion([-ONE_Q30 / 2, ONE_Q30 / 2, -ONE_Q30 / 2, ONE_Q30 / 2]);
        let rv = rotation_vector(&state);
        assert_eq!(rv.values, [-0.5, 0.5, -0.5, 0.5]);
        assert!(rv.values[3] >= 0.0);
    }

    #[test]
    fn yaw_quarter_turn_points_west() {
        // +90° about world z: body y points west.
        let q = [HALF_SQRT2_Q30, 0, 0, HALF_SQRT2_Q30];
        let [azimuth, pitch, roll] = euler_degrees(q);
        assert_relative_eq!(azimuth, 270.0, epsilon = 1e-3);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-3);
        assert_relative_eq!(roll, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn on_side_gravity_moves_to_y() {
        // +90° about x: body y points up.
        let state = state_with_quaternion([HALF_SQRT2_Q30, HALF_SQRT2_Q30, 0, 0]);
        let g = gravity(&state).xyz();
        assert_relative_eq!(g[0], 0.0, epsilon = 1e-3);
        assert_relative_eq!(g[1], 9.80665, epsilon = 1e-3);
        assert_relative_eq!(g[2], 0.0, epsilon = 1e-3);
    }

    #[test]
    fn linear_acceleration_removes_gravity() {
        let mut state = state_with_quaternion([ONE_Q30, 0, 0, 0]);
        state.channel_mut(PhysicalSensor::Accel).record_calibrated(
            [1 << 15, 0, 1 << 16],
            Accuracy::Low,
            Timestamp::from_nanos(123),
        );
        let la = linear_acceleration(&state);
        assert_relative_eq!(la.values[0], 9.80665 / 2.0, epsilon = 1e-4);
        assert_relative_eq!(la.values[2], 0.0, epsilon = 1e-4);
        assert_eq!(la.accuracy, Accuracy::Low);
        assert_eq!(la.timestamp, Timestamp::from_nanos(123));
    }

    #[test]
    fn upside_down_pitch_reflects() {
        // 180° about y: body z points down, pitch moves to the complement.
        let [_, pitch, _] = euler_degrees([0, 0, ONE_Q30, 0]);
        assert_relative_eq!(pitch.abs(), 180.0, epsilon = 1e-3);
    }

    #[test]
    fn generate_dispatches_by_sensor() {
        let state = state_with_quaternion([ONE_Q30, 0, 0, 0]);
        for sensor in VirtualSensor::ALL {
            assert_eq!(generate(sensor, &state).sensor, sensor);
        }
    }
}
