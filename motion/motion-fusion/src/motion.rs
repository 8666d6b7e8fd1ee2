//! Stillness detection and gyro bias capture.
//!
//! Raw gyro samples are collected in fixed windows. A window whose per-axis
//! variance stays under the threshold means the device is at rest, so the
//! window mean is the gyro bias.

use motion_types::{Accuracy, PhysicalSensor, fixed::ONE_Q16};
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{FusionError, Result};
use crate::state::{EngineMessages, FusionState};

/// Stillness detector settings.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NoMotionParams {
    /// Gyro samples per decision window. Default: 50
    pub window: usize,

    /// Largest per-axis variance, in raw counts squared, that still counts
    /// as rest. Default: 9.0
    pub max_variance: f64,
}

impl Default for NoMotionParams {
    fn default() -> Self {
        Self {
            window: 50,
            max_variance: 9.0,
        }
    }
}

impl NoMotionParams {
    /// Sets the window length.
    #[must_use]
    pub const fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Sets the variance threshold.
    #[must_use]
    pub const fn with_max_variance(mut self, max_variance: f64) -> Self {
        self.max_variance = max_variance;
        self
    }
}

/// Windowed stillness detector over raw gyro samples.
#[derive(Debug, Clone)]
pub struct NoMotionDetector {
    params: NoMotionParams,
    sum: [f64; 3],
    sum_sq: [f64; 3],
    count: usize,
    still: bool,
}

impl NoMotionDetector {
    /// Creates a detector.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::InvalidConfig`] for a window shorter than two
    /// samples or a negative threshold.
    pub fn new(params: NoMotionParams) -> Result<Self> {
        if params.window < 2 {
            return Err(FusionError::invalid_config(format!(
                "no-motion window must hold at least 2 samples, got {}",
                params.window
            )));
        }
        if params.max_variance.is_nan() || params.max_variance < 0.0 {
            return Err(FusionError::invalid_config(format!(
                "no-motion variance must be non-negative, got {}",
                params.max_variance
            )));
        }
        Ok(Self {
            params,
            sum: [0.0; 3],
            sum_sq: [0.0; 3],
            count: 0,
            still: false,
        })
    }

    /// Whether the last complete window was at rest.
    #[must_use]
    pub const fn is_still(&self) -> bool {
        self.still
    }

    /// Feeds the current raw gyro sample. At the end of a window, updates
    /// the gyro bias and posts [`EngineMessages::NO_MOTION`] or
    /// [`EngineMessages::MOTION`] on a change of state.
    pub fn process(&mut self, state: &mut FusionState) {
        let raw = state.channel(PhysicalSensor::Gyro).raw();
        for (axis, value) in raw.iter().map(|v| f64::from(*v)).enumerate() {
            self.sum[axis] += value;
            self.sum_sq[axis] += value * value;
        }
        self.count += 1;
        if self.count < self.params.window {
            return;
        }

        #[allow(clippy::cast_precision_loss)]
        let n = self.count as f64;
        let mean: [f64; 3] = std::array::from_fn(|axis| self.sum[axis] / n);
        let at_rest = (0..3).all(|axis| {
            let variance = (self.sum_sq[axis] / n - mean[axis] * mean[axis]).max(0.0);
            variance <= self.params.max_variance
        });
        self.sum = [0.0; 3];
        self.sum_sq = [0.0; 3];
        self.count = 0;

        if at_rest {
            let bias = mean.map(to_q16);
            state.set_gyro_bias(bias, Accuracy::High);
            debug!(x = bias[0], y = bias[1], z = bias[2], "Captured gyro bias at rest");
            if !self.still {
                self.still = true;
                info!("Device at rest");
                state.post_message(EngineMessages::NO_MOTION);
            }
        } else if self.still {
            self.still = false;
            info!("Device in motion");
            state.post_message(EngineMessages::MOTION);
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_q16(counts: f64) -> i32 {
    (counts * f64::from(ONE_Q16)).round() as i32
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
    use motion_types::Timestamp;

    fn feed(detector: &mut NoMotionDetector, state: &mut FusionState, samples: &[[i16; 3]]) {
        for (i, s) in samples.iter().enumerate() {
            let ts = Timestamp::from_millis(u64::try_from(i).unwrap() * 5 + 1);
            state
                .channel_mut(PhysicalSensor::Gyro)
                .record_raw(*s, [0; 3], ts);
            detector.process(state);
        }
    }

    #[test]
    fn still_window_sets_bias_and_posts_no_motion() {
        let mut state = FusionState::new(&FusionParams::unit());
        let mut detector = NoMotionDetector::new(NoMotionParams::default().with_window(4)).unwrap();

        feed(&mut detector, &mut state, &[[10, -4, 2], [12, -4, 2], [10, -4, 2], [12, -4, 2]]);

        assert!(detector.is_still());
        let (bias, _) = state.gyro_bias();
        assert_eq!(bias, [11 << 16, -4 << 16, 2 << 16]);
        assert_eq!(state.channel(PhysicalSensor::Gyro).accuracy(), Accuracy::High);
        let messages = state.take_messages();
        assert!(messages.contains(EngineMessages::NO_MOTION | EngineMessages::NEW_GYRO_BIAS));
    }

    #[test]
    fn no_motion_posted_once_per_rest_period() {
        let mut state = FusionState::new(&FusionParams::unit());
        let mut detector = NoMotionDetector::new(NoMotionParams::default().with_window(2)).unwrap();

        feed(&mut detector, &mut state, &[[1, 1, 1], [1, 1, 1]]);
        assert!(state.take_messages().contains(EngineMessages::NO_MOTION));

        feed(&mut detector, &mut state, &[[1, 1, 1], [1, 1, 1]]);
        assert!(!state.take_messages().contains(EngineMessages::NO_MOTION));
    }

    #[test]
    fn movement_posts_motion() {
        let mut state = FusionState::new(&FusionParams::unit());
        let mut detector = NoMotionDetector::new(NoMotionParams::default().with_window(2)).unwrap();

        feed(&mut detector, &mut state, &[[0, 0, 0], [0, 0, 0]]);
        state.take_messages();
        feed(&mut detector, &mut state, &[[0, 0, 0], [500, 0, 0]]);

        assert!(!detector.is_still());
        assert_eq!(state.take_messages(), EngineMessages::MOTION);
    }

    #[test]
    fn invalid_params_rejected() {
        assert!(NoMotionDetector::new(NoMotionParams::default().with_window(1)).is_err());
        assert!(NoMotionDetector::new(NoMotionParams::default().with_max_variance(-1.0)).is_err());
    }
}
