//! HAL configuration.

use motion_fusion::{FusionParams, NoMotionParams};
use motion_types::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::input::EventCodes;

/// Low-power accelerometer tuning.
///
/// These are device-tuned values; the defaults match a handset-class part.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LowPowerParams {
    /// Samples in the stability window. Default: 10
    pub window: usize,

    /// Per-axis deviation in m/s² still counted as stable. Default: 0.2
    pub threshold: f32,

    /// Poll period while idling in low power. Default: 256 ms
    pub idle_period: Duration,

    /// Poll periods faster than this are never treated as stable.
    /// Default: 40 ms
    pub default_poll_period: Duration,

    /// Period at which the part switches to its own low-power sampling.
    /// Zero disables it. Default: 0
    pub lpa_delay: Duration,

    /// Hardware wake-on-motion threshold. Zero disables motion
    /// detection. Default: 0
    pub motion_threshold: u8,
}

impl Default for LowPowerParams {
    fn default() -> Self {
        Self {
            window: 10,
            threshold: 0.2,
            idle_period: Duration::from_millis(256),
            default_poll_period: Duration::from_millis(40),
            lpa_delay: Duration::ZERO,
            motion_threshold: 0,
        }
    }
}

impl LowPowerParams {
    /// Sets the window length.
    #[must_use]
    pub const fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Sets the stability threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the idle poll period.
    #[must_use]
    pub const fn with_idle_period(mut self, period: Duration) -> Self {
        self.idle_period = period;
        self
    }

    /// Sets the hardware motion threshold.
    #[must_use]
    pub const fn with_motion_threshold(mut self, threshold: u8) -> Self {
        self.motion_threshold = threshold;
        self
    }

    /// Sets the low-power sampling switch-over period.
    #[must_use]
    pub const fn with_lpa_delay(mut self, delay: Duration) -> Self {
        self.lpa_delay = delay;
        self
    }
}

/// Parameters for [`MotionHub`](crate::MotionHub).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HalParams {
    /// Channel mounting and scale.
    pub fusion: FusionParams,

    /// Stillness detection for gyro bias capture.
    pub no_motion: NoMotionParams,

    /// Fastest period a consumer may request. Default: 10 ms
    pub min_period: Duration,

    /// Period used before a consumer sets one. Default: 200 ms
    pub default_period: Duration,

    /// Minimum spacing between temperature reads. Default: 500 ms
    pub temperature_interval: Duration,

    /// Low-power accelerometer tuning.
    pub low_power: LowPowerParams,

    /// Input event codes of the motion device.
    pub codes: EventCodes,

    /// Whether the accelerometer shares the gyro's FIFO. Default: true
    pub integrated_accel: bool,
}

impl Default for HalParams {
    fn default() -> Self {
        Self {
            fusion: FusionParams::default(),
            no_motion: NoMotionParams::default(),
            min_period: Duration::from_millis(10),
            default_period: Duration::from_millis(200),
            temperature_interval: Duration::from_millis(500),
            low_power: LowPowerParams::default(),
            codes: EventCodes::default(),
            integrated_accel: true,
        }
    }
}

impl HalParams {
    /// Sets the channel parameters.
    #[must_use]
    pub const fn with_fusion(mut self, fusion: FusionParams) -> Self {
        self.fusion = fusion;
        self
    }

    /// Sets the stillness detection parameters.
    #[must_use]
    pub const fn with_no_motion(mut self, no_motion: NoMotionParams) -> Self {
        self.no_motion = no_motion;
        self
    }

    /// Sets the low-power tuning.
    #[must_use]
    pub const fn with_low_power(mut self, low_power: LowPowerParams) -> Self {
        self.low_power = low_power;
        self
    }

    /// Sets the event codes.
    #[must_use]
    pub const fn with_codes(mut self, codes: EventCodes) -> Self {
        self.codes = codes;
        self
    }

    /// Sets whether the accelerometer is part of the motion chip.
    #[must_use]
    pub const fn with_integrated_accel(mut self, integrated: bool) -> Self {
        self.integrated_accel = integrated;
        self
    }

    /// Sets the default consumer period.
    #[must_use]
    pub const fn with_default_period(mut self, period: Duration) -> Self {
        self.default_period = period;
        self
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = HalParams::default();
        assert_eq!(p.min_period.as_millis(), 10);
        assert_eq!(p.default_period.as_millis(), 200);
        assert_eq!(p.temperature_interval.as_millis(), 500);
        assert!(p.integrated_accel);

        let lp = p.low_power;
        assert_eq!(lp.window, 10);
        assert_eq!(lp.threshold, 0.2);
        assert_eq!(lp.idle_period.as_millis(), 256);
        assert_eq!(lp.default_poll_period.as_millis(), 40);
        assert!(lp.lpa_delay.is_zero());
        assert_eq!(lp.motion_threshold, 0);
    }

    #[test]
    fn builders() {
        let lp = LowPowerParams::default()
            .with_window(4)
            .with_threshold(0.5)
            .with_motion_threshold(7);
        let p = HalParams::default()
            .with_low_power(lp)
            .with_integrated_accel(false);
        assert_eq!(p.low_power.window, 4);
        assert_eq!(p.low_power.motion_threshold, 7);
        assert!(!p.integrated_accel);
    }
}
