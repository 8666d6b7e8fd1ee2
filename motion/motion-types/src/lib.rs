//! Data types shared by the motion sensor stack.
//!
//! This crate holds the vocabulary every other `motion-*` crate speaks:
//!
//! - [`Timestamp`] / [`Duration`] - monotonic nanosecond time
//! - [`fixed`] - q16/q30 fixed-point helpers with firmware-exact truncation
//! - [`ChannelStatus`] / [`DataMask`] - per-channel status bits and the
//!   new-data mask that triggers fusion stages
//! - [`Accuracy`] - the 0..=3 confidence scale
//! - [`Orientation`] - the 48 axis-aligned chip-to-body mountings
//! - [`PhysicalSensor`] / [`VirtualSensor`] - stream and consumer identifiers
//! - [`SensorEvent`] - one reading handed to a consumer
//!
//! It performs no I/O.
//!
//! # Example
//!
//! ```
//! use motion_types::{fixed::ONE_Q30, Orientation, VirtualSensor};
//!
//! let mount: Orientation = "0,-1,0,1,0,0,0,0,1".parse().unwrap();
//! let body = mount.apply_with_scale([100, 200, 300], ONE_Q30);
//! assert_eq!(body, [-200, 100, 300]);
//!
//! assert_eq!(VirtualSensor::try_from(6).unwrap(), VirtualSensor::Gravity);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod event;
pub mod fixed;
mod orientation;
mod sensor;
mod status;
mod time;

pub use error::SensorError;
pub use event::SensorEvent;
pub use orientation::Orientation;
pub use sensor::{PhysicalSensor, VirtualSensor};
pub use status::{Accuracy, ChannelStatus, DataMask};
pub use time::{Duration, Timestamp};
