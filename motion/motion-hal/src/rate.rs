//! Which physical sensors run, and how fast.
//!
//! Every virtual sensor is either disabled or enabled with a requested
//! period. The physical configuration follows from the enabled set:
//!
//! - Any quaternion-derived sensor needs gyro, accel and compass together
//!   (fusion mode).
//! - Otherwise only the physical sensors backing the enabled virtual
//!   sensors run.
//!
//! All running channels share the fastest requested period.

use bitflags::bitflags;
use motion_types::{Duration, PhysicalSensor, VirtualSensor};
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{HalError, HalResult};

bitflags! {
    /// Physical motion sensors that must be running.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct PhysicalMask: u32 {
        /// Three-axis gyroscope.
        const GYRO = 1 << 0;
        /// Three-axis accelerometer.
        const ACCEL = 1 << 1;
        /// Three-axis magnetometer.
        const COMPASS = 1 << 2;
        /// Everything fusion needs.
        const FUSION = Self::GYRO.bits() | Self::ACCEL.bits() | Self::COMPASS.bits();
    }
}

impl PhysicalMask {
    /// Mask bit for one motion sensor. Temperature has none.
    #[must_use]
    pub const fn of(sensor: PhysicalSensor) -> Self {
        match sensor {
            PhysicalSensor::Gyro => Self::GYRO,
            PhysicalSensor::Accel => Self::ACCEL,
            PhysicalSensor::Compass => Self::COMPASS,
            PhysicalSensor::Temperature => Self::empty(),
        }
    }

    /// Whether `sensor` is in the mask.
    #[must_use]
    pub const fn runs(self, sensor: PhysicalSensor) -> bool {
        let bit = Self::of(sensor);
        !bit.is_empty() && self.contains(bit)
    }
}

/// Where the shared period is pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RateRoute {
    /// Gyro, accel and compass for fusion.
    Fusion,
    /// Gyro path; accel and compass may piggyback.
    Gyro,
    /// Compass only.
    Compass,
    /// Accel only, eligible for variable-rate low power.
    Accel,
    /// Nothing enabled.
    Idle,
}

impl RateRoute {
    /// Physical sensors whose period is written on this route.
    #[must_use]
    pub const fn targets(self) -> &'static [PhysicalSensor] {
        match self {
            Self::Fusion => &PhysicalSensor::MOTION,
            Self::Gyro => &[PhysicalSensor::Gyro],
            Self::Compass => &[PhysicalSensor::Compass],
            Self::Accel => &[PhysicalSensor::Accel],
            Self::Idle => &[],
        }
    }
}

/// Derived physical configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePlan {
    /// Fastest requested period, if anything is enabled.
    pub period: Option<Duration>,
    /// Where the period goes.
    pub route: RateRoute,
    /// Physical sensors that must run.
    pub mask: PhysicalMask,
    /// Whether the accel-only low-power window applies.
    pub variable_rate: bool,
}

impl RatePlan {
    /// Plan with nothing running.
    pub const IDLE: Self = Self {
        period: None,
        route: RateRoute::Idle,
        mask: PhysicalMask::empty(),
        variable_rate: false,
    };
}

/// Per virtual sensor enable flags and requested periods.
///
/// # Example
///
/// ```
/// use motion_hal::{EnableRateController, RateRoute};
/// use motion_types::{Duration, VirtualSensor};
///
/// let mut rates = EnableRateController::new(Duration::from_millis(10), Duration::from_millis(200));
/// rates.enable(VirtualSensor::Accelerometer, true);
/// rates.enable(VirtualSensor::Gyroscope, true);
/// rates.set_delay(VirtualSensor::Accelerometer, 20_000_000).unwrap();
/// rates.set_delay(VirtualSensor::Gyroscope, 1_000_000).unwrap();
///
/// let plan = rates.plan();
/// assert_eq!(plan.period, Some(Duration::from_millis(10)));
/// assert_eq!(plan.route, RateRoute::Gyro);
/// ```
#[derive(Debug, Clone)]
pub struct EnableRateController {
    enabled: [bool; VirtualSensor::COUNT],
    delays: [Duration; VirtualSensor::COUNT],
    min_period: Duration,
    integrated_accel: bool,
}

impl EnableRateController {
    /// All sensors disabled, each requesting `default_period`.
    #[must_use]
    pub fn new(min_period: Duration, default_period: Duration) -> Self {
        Self {
            enabled: [false; VirtualSensor::COUNT],
            delays: [default_period.max(min_period); VirtualSensor::COUNT],
            min_period,
            integrated_accel: true,
        }
    }

    /// Sets whether the accelerometer sits on the motion chip, which is
    /// what allows the variable-rate low-power mode.
    #[must_use]
    pub const fn with_integrated_accel(mut self, integrated: bool) -> Self {
        self.integrated_accel = integrated;
        self
    }

    /// Enables or disables a virtual sensor. Returns whether the state
    /// changed.
    pub fn enable(&mut self, sensor: VirtualSensor, on: bool) -> bool {
        let slot = &mut self.enabled[sensor.index()];
        if *slot == on {
            return false;
        }
        *slot = on;
        info!(sensor = sensor.name(), on, "Sensor enable changed");
        true
    }

    /// Records a requested period in nanoseconds and returns the period
    /// actually used, never below the minimum.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidDelay`] for a negative period.
    pub fn set_delay(&mut self, sensor: VirtualSensor, ns: i64) -> HalResult<Duration> {
        let ns = u64::try_from(ns).map_err(|_| HalError::InvalidDelay(ns))?;
        let period = Duration::from_nanos(ns).max(self.min_period);
        self.delays[sensor.index()] = period;
        debug!(
            sensor = sensor.name(),
            requested_ns = ns,
            period_ns = period.as_nanos(),
            "Delay set"
        );
        Ok(period)
    }

    /// Whether `sensor` is enabled.
    #[must_use]
    pub const fn is_enabled(&self, sensor: VirtualSensor) -> bool {
        self.enabled[sensor.index()]
    }

    /// Requested period for `sensor`.
    #[must_use]
    pub const fn delay(&self, sensor: VirtualSensor) -> Duration {
        self.delays[sensor.index()]
    }

    /// Enabled sensors in handle order.
    pub fn enabled(&self) -> impl Iterator<Item = VirtualSensor> + '_ {
        VirtualSensor::ALL
            .into_iter()
            .filter(|s| self.is_enabled(*s))
    }

    /// Whether anything is enabled.
    #[must_use]
    pub fn any_enabled(&self) -> bool {
        self.enabled.iter().any(|on| *on)
    }

    fn fusion_enabled(&self) -> bool {
        self.enabled().any(VirtualSensor::needs_fusion)
    }

    /// Physical sensors required by the enabled set.
    #[must_use]
    pub fn local_mask(&self) -> PhysicalMask {
        if self.fusion_enabled() {
            return PhysicalMask::FUSION;
        }
        let mut mask = PhysicalMask::empty();
        mask.set(
            PhysicalMask::GYRO,
            self.is_enabled(VirtualSensor::Gyroscope),
        );
        mask.set(
            PhysicalMask::ACCEL,
            self.is_enabled(VirtualSensor::Accelerometer),
        );
        mask.set(
            PhysicalMask::COMPASS,
            self.is_enabled(VirtualSensor::MagneticField),
        );
        mask
    }

    /// Fastest period across enabled sensors.
    #[must_use]
    pub fn min_period(&self) -> Option<Duration> {
        self.enabled().map(|s| self.delay(s)).min()
    }

    /// Derives the physical configuration for the enabled set.
    #[must_use]
    pub fn plan(&self) -> RatePlan {
        let Some(period) = self.min_period() else {
            return RatePlan::IDLE;
        };

        let route = if self.fusion_enabled() {
            RateRoute::Fusion
        } else if self.is_enabled(VirtualSensor::Gyroscope) {
            RateRoute::Gyro
        } else if self.is_enabled(VirtualSensor::MagneticField) {
            RateRoute::Compass
        } else if self.is_enabled(VirtualSensor::Accelerometer) {
            RateRoute::Accel
        } else {
            RateRoute::Idle
        };

        RatePlan {
            period: Some(period),
            route,
            mask: self.local_mask(),
            variable_rate: route == RateRoute::Accel && self.integrated_accel,
        }
    }
}
