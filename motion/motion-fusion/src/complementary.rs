//! Reference attitude engine.
//!
//! A complementary filter: the gyro propagates the attitude, then the
//! accelerometer pulls the estimated up axis toward measured gravity and
//! the compass pulls the estimated north toward the measured field. With
//! the gyro off, the corrections apply in full and the attitude follows
//! accel and compass directly.

use std::f64::consts::PI;

use motion_types::{DataMask, PhysicalSensor, fixed::ONE_Q16};
use nalgebra::{UnitQuaternion, Vector3};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::FusionEngine;
use crate::error::{FusionError, Result};
use crate::state::FusionState;

/// Complementary filter gains.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComplementaryParams {
    /// Fraction of the tilt error removed per accel sample. Default: 0.02
    pub accel_gain: f64,

    /// Fraction of the heading error removed per compass sample. Default: 0.01
    pub compass_gain: f64,

    /// Gyro steps longer than this (seconds) are not integrated.
    /// Default: 0.5
    pub max_gyro_dt: f64,
}

impl Default for ComplementaryParams {
    fn default() -> Self {
        Self {
            accel_gain: 0.02,
            compass_gain: 0.01,
            max_gyro_dt: 0.5,
        }
    }
}

impl ComplementaryParams {
    /// Sets the accel gain.
    #[must_use]
    pub const fn with_accel_gain(mut self, gain: f64) -> Self {
        self.accel_gain = gain;
        self
    }

    /// Sets the compass gain.
    #[must_use]
    pub const fn with_compass_gain(mut self, gain: f64) -> Self {
        self.compass_gain = gain;
        self
    }

    /// Checks that both gains lie in `(0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::InvalidConfig`] otherwise.
    pub fn validate(&self) -> Result<()> {
        for (name, gain) in [("accel_gain", self.accel_gain), ("compass_gain", self.compass_gain)] {
            if !(gain > 0.0 && gain <= 1.0) {
                return Err(FusionError::invalid_config(format!(
                    "{name} must be in (0, 1], got {gain}"
                )));
            }
        }
        Ok(())
    }
}

/// Gyro-propagated attitude corrected by accel tilt and compass heading.
///
/// World frame: x east, y north, z up.
#[derive(Debug, Clone)]
pub struct ComplementaryEngine {
    params: ComplementaryParams,
    attitude: UnitQuaternion<f64>,
}

impl Default for ComplementaryEngine {
    fn default() -> Self {
        Self {
            params: ComplementaryParams::default(),
            attitude: UnitQuaternion::identity(),
        }
    }
}

impl ComplementaryEngine {
    /// Creates an engine with validated gains.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::InvalidConfig`] for gains outside `(0, 1]`.
    pub fn new(params: ComplementaryParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            attitude: UnitQuaternion::identity(),
        })
    }

    /// Current attitude as a float quaternion.
    #[must_use]
    pub const fn attitude(&self) -> &UnitQuaternion<f64> {
        &self.attitude
    }

    fn integrate_gyro(&mut self, state: &FusionState) {
        let gyro = state.channel(PhysicalSensor::Gyro);
        if gyro.timestamp_prev().is_zero() {
            return;
        }
        let dt = gyro.timestamp().saturating_since(gyro.timestamp_prev()).as_secs_f64();
        if dt <= 0.0 || dt > self.params.max_gyro_dt {
            return;
        }
        let rate = to_vector(gyro.calibrated()) * (PI / 180.0);
        self.attitude *= UnitQuaternion::from_scaled_axis(rate * dt);
    }

    fn correct_tilt(&mut self, accel: Vector3<f64>, gain: f64) {
        let Some(up) = (self.attitude * accel).try_normalize(1e-9) else {
            return;
        };
        if let Some(correction) = UnitQuaternion::rotation_between(&up, &Vector3::z()) {
            self.attitude = correction.powf(gain) * self.attitude;
        }
    }

    fn correct_heading(&mut self, field: Vector3<f64>, gain: f64) {
        let world = self.attitude * field;
        if world.x.hypot(world.y) < 1e-9 {
            return;
        }
        let error = world.x.atan2(world.y);
        self.attitude = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), error * gain)
            * self.attitude;
    }
}

fn to_vector(q16: [i32; 3]) -> Vector3<f64> {
    Vector3::from(q16.map(f64::from)) / f64::from(ONE_Q16)
}

#[allow(clippy::cast_possible_truncation)]
fn to_q30(v: f64) -> i32 {
    (v * f64::from(1_u32 << 30)).round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

impl FusionEngine for ComplementaryEngine {
    fn name(&self) -> &'static str {
        "complementary"
    }

    fn update(&mut self, state: &mut FusionState, active: DataMask) -> Result<()> {
        let gyro_on = state.channel(PhysicalSensor::Gyro).is_on();
        if active.contains(DataMask::GYRO_NEW) && gyro_on {
            self.integrate_gyro(state);
        }

        let (accel_gain, compass_gain) = if gyro_on {
            (self.params.accel_gain, self.params.compass_gain)
        } else {
            (1.0, 1.0)
        };

        if active.contains(DataMask::ACCEL_NEW) {
            let accel = to_vector(state.channel(PhysicalSensor::Accel).calibrated());
            self.correct_tilt(accel, accel_gain);
        }

        let compass = state.channel(PhysicalSensor::Compass);
        if active.contains(DataMask::MAG_NEW) && compass.is_on() && !state.compass_disturbance()
        {
            self.correct_heading(to_vector(compass.calibrated()), compass_gain);
        }

        debug!(
            active = active.bits(),
            w = self.attitude.w,
            "Complementary engine updated"
        );
        Ok(())
    }

    fn quaternion(&self) -> [i32; 4] {
        let q = self.attitude.quaternion();
        [to_q30(q.w), to_q30(q.i), to_q30(q.j), to_q30(q.k)]
    }

    fn reset(&mut self) {
        self.attitude = UnitQuaternion::identity();
    }

    /// The filter keeps no calibration of its own; attitude re-converges
    /// from accel and compass after a restart.
    fn state_size(&self) -> usize {
        0
    }

    fn save_state(&self, _out: &mut Vec<u8>) {}

    fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            Ok(())
        } else {
            Err(FusionError::corrupt_record(0, bytes.len()))
        }
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
    use motion_types::{Accuracy, Timestamp, fixed::ONE_Q30};

    const G: i32 = 1 << 16;

    fn state() -> FusionState {
        FusionState::new(&FusionParams::unit())
    }

    #[test]
    fn level_and_north_stays_identity() {
        let mut state = state();
        state
            .channel_mut(PhysicalSensor::Accel)
            .record_calibrated([0, 0, G], Accuracy::High, Timestamp::from_nanos(1));
        state
            .channel_mut(PhysicalSensor::Compass)
            .record_calibrated([0, 30 << 16, -(20 << 16)], Accuracy::High, Timestamp::from_nanos(1));

        let mut engine = ComplementaryEngine::default();
        engine
            .update(&mut state, DataMask::ACCEL_NEW | DataMask::MAG_NEW)
            .unwrap();
        assert_eq!(engine.quaternion(), [ONE_Q30, 0, 0, 0]);
    }

    #[test]
    fn without_gyro_accel_sets_tilt_directly() {
        let mut state = state();
        // Device on its side: body +y points up.
        state
            .channel_mut(PhysicalSensor::Accel)
            .record_calibrated([0, G, 0], Accuracy::High, Timestamp::from_nanos(1));

        let mut engine = ComplementaryEngine::default();
        engine.update(&mut state, DataMask::ACCEL_NEW).unwrap();

        let up = engine.attitude() * Vector3::y();
        assert_relative_eq!(up.z, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn gyro_integrates_yaw() {
        let mut state = state();
        let gyro = state.channel_mut(PhysicalSensor::Gyro);
        gyro.record_raw([0, 0, 90], [0; 3], Timestamp::from_millis(1_000));
        gyro.record_raw([0, 0, 90], [0; 3], Timestamp::from_millis(2_000));

        let mut engine = ComplementaryEngine::default();
        engine.update(&mut state, DataMask::GYRO_NEW).unwrap();

        let (_, _, yaw) = engine.attitude().euler_angles();
        assert_relative_eq!(yaw, PI / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn long_gyro_gap_is_skipped() {
        let mut state = state();
        let gyro = state.channel_mut(PhysicalSensor::Gyro);
        gyro.record_raw([0, 0, 90], [0; 3], Timestamp::from_millis(1_000));
        gyro.record_raw([0, 0, 90], [0; 3], Timestamp::from_millis(5_000));

        let mut engine = ComplementaryEngine::default();
        engine.update(&mut state, DataMask::GYRO_NEW).unwrap();
        assert_eq!(engine.quaternion(), [ONE_Q30, 0, 0, 0]);
    }

    #[test]
    fn disturbed_compass_is_ignored() {
        let mut state = state();
        state
            .channel_mut(PhysicalSensor::Compass)
            .record_calibrated([30 << 16, 0, 0], Accuracy::High, Timestamp::from_nanos(1));
        state.set_compass_disturbance(true);

        let mut engine = ComplementaryEngine::default();
        engine.update(&mut state, DataMask::MAG_NEW).unwrap();
        assert_eq!(engine.quaternion(), [ONE_Q30, 0, 0, 0]);
    }

    #[test]
    fn invalid_gains_rejected() {
        assert!(ComplementaryEngine::new(ComplementaryParams::default().with_accel_gain(0.0)).is_err());
        assert!(ComplementaryEngine::new(ComplementaryParams::default().with_compass_gain(1.5)).is_err());
        assert!(ComplementaryEngine::new(ComplementaryParams::default()).is_ok());
    }
}
