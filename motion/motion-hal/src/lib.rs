//! Motion sensor HAL: enable and rate control over the fusion core.
//!
//! This crate sits between a poll-device shell and the fusion pipeline. It
//! owns which virtual sensors are on, how fast the physical sensors run,
//! and how kernel input events become fusion samples.
//!
//! # Components
//!
//! - [`EnableRateController`]: per virtual sensor enable flags and
//!   requested periods, deriving the physical sensor mask and shared period.
//! - [`AccelWindow`]: low-power accelerometer hysteresis for accel-only use.
//! - [`MotionFrameDecoder`]: input events to gyro/accel frames.
//! - [`PhysicalControl`] / [`SysfsControl`]: the hardware seam.
//! - [`MotionHub`]: the mutex-serialized facade tying them together.
//!
//! # Example
//!
//! ```
//! use motion_hal::{HalParams, InputEvent, MotionHub, SysfsControl};
//! use motion_store::CalibrationStore;
//! use motion_types::{Timestamp, VirtualSensor};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let hub = MotionHub::new(
//!     HalParams::default(),
//!     SysfsControl::new(dir.path()),
//!     CalibrationStore::default(),
//! )
//! .unwrap();
//! hub.enable(VirtualSensor::Gyroscope.handle(), true).unwrap();
//!
//! let frame = [
//!     InputEvent::rel(0, 16),
//!     InputEvent::rel(1, 0),
//!     InputEvent::rel(2, 0),
//!     InputEvent::syn(Timestamp::from_millis(5)),
//! ];
//! let mut out = Vec::new();
//! assert_eq!(hub.read_events(&mut frame.into_iter(), 16, &mut out).unwrap(), 1);
//! assert_eq!(out[0].sensor, VirtualSensor::Gyroscope);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod control;
mod error;
mod hub;
mod input;
mod lowpower;
mod params;
mod rate;

pub use control::{Attribute, PhysicalControl, SysfsControl, TemperatureReading};
pub use error::{HalError, HalResult};
pub use hub::MotionHub;
pub use input::{EventCodes, EventType, InputEvent, MotionFrame, MotionFrameDecoder};
pub use lowpower::{AccelWindow, LpaAction};
pub use params::{HalParams, LowPowerParams};
pub use rate::{EnableRateController, PhysicalMask, RatePlan, RateRoute};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        EnableRateController, HalError, HalParams, InputEvent, MotionHub, PhysicalControl,
        SysfsControl,
    };
}
