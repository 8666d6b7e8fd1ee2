//! Sample coordination and fusion output for motion sensors.
//!
//! Gyro, accel and compass samples arrive on their own schedules. This
//! crate buffers them, decides when a coherent set exists, runs the fusion
//! stages exactly once per set and turns the result into public sensor
//! values.
//!
//! # Sample Coordination
//!
//! - [`SensorChannel`] - latest sample, calibration and status of one stream
//! - [`SampleCoordinator`] - records samples and triggers passes
//! - [`FusionState`] - channels, biases and engine messages seen by stages
//!
//! # Fusion Stages
//!
//! - [`CallbackRegistry`] - priority-ordered stage table, 20 entries
//! - [`FusionEngine`] - the attitude estimator seam
//! - [`ComplementaryEngine`] - reference gyro/accel/compass filter
//! - [`NoMotionDetector`] - stillness detection and gyro bias capture
//!
//! # Outputs
//!
//! - [`outputs`] - accelerometer, gyroscope, magnetic field, gravity,
//!   linear acceleration, rotation vector and orientation
//!
//! # Persistence
//!
//! - [`CalibrationRecord`] - biases and capture temperatures, keyed and
//!   fixed-size; [`SampleCoordinator::save_state`] appends engine state
//!
//! # Example
//!
//! ```
//! use motion_fusion::{FusionParams, SampleCoordinator, SampleStatus, outputs};
//! use motion_types::Timestamp;
//!
//! let mut coord = SampleCoordinator::with_defaults(&FusionParams::unit()).unwrap();
//! coord.on_new_accel([0, 0, 1], SampleStatus::Raw, Timestamp::from_millis(10));
//!
//! let accel = outputs::accelerometer(coord.state());
//! assert!((accel.values[2] - 9.80665).abs() < 1e-4);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod channel;
mod complementary;
mod coordinator;
mod engine;
mod error;
mod motion;
pub mod outputs;
mod params;
mod record;
mod registry;
mod state;

pub use channel::SensorChannel;
pub use complementary::{ComplementaryEngine, ComplementaryParams};
pub use coordinator::{SampleCoordinator, SampleStatus};
pub use engine::{FixedEngine, FusionEngine};
pub use error::{FusionError, Result};
pub use motion::{NoMotionDetector, NoMotionParams};
pub use params::{
    ACCEL_SENSITIVITY_2G, COMPASS_SENSITIVITY_UNIT, FusionParams, GYRO_SENSITIVITY_2000DPS,
};
pub use record::CalibrationRecord;
pub use registry::{CallbackRegistry, MAX_STAGES, PassContext, StageFn, StageId, priority};
pub use state::{DEFAULT_GYRO_TEMP, EngineMessages, FusionState, HalSnapshot};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        CallbackRegistry, ComplementaryEngine, FusionEngine, FusionError, FusionParams,
        FusionState, SampleCoordinator, SampleStatus, SensorChannel, StageId, outputs, priority,
    };
}
