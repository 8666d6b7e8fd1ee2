//! Calibration persistence for the motion stack.
//!
//! The calibration record is an opaque, fixed-size byte blob whose size
//! is reported by the fusion side. This crate only knows where the record
//! lives and how to move it to and from disk.
//!
//! # Locations
//!
//! - The writable default record lives in the directory named by
//!   `MPU_DATA_DIR`.
//! - An optional read-only factory record lives in `MPU_CONF_DIR`. It is
//!   copied to the default location the first time the default is missing.
//!
//! Without `MPU_DATA_DIR` persistence is disabled and every operation
//! returns [`StoreError::NotConfigured`].
//!
//! # Example
//!
//! ```
//! use motion_store::{CalibrationPaths, CalibrationStore, StoreError};
//!
//! let store = CalibrationStore::new(CalibrationPaths::default());
//! assert!(matches!(store.load(60), Err(StoreError::NotConfigured)));
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod paths;
mod store;

pub use error::{StoreError, StoreResult};
pub use paths::{CAL_FILE_NAME, CalibrationPaths, DATA_DIR_VAR, PROTECTED_DIR_VAR};
pub use store::CalibrationStore;
