//! Error types for the motion HAL.

use std::path::PathBuf;

use motion_fusion::FusionError;
use motion_store::StoreError;
use motion_types::SensorError;
use thiserror::Error;

/// Result type for HAL operations.
pub type HalResult<T> = Result<T, HalError>;

const EINVAL: i32 = -22;
const EIO: i32 = -5;

/// Errors reported by the HAL surface.
#[derive(Debug, Error)]
pub enum HalError {
    /// Unknown handle or bad sensor descriptor.
    #[error(transparent)]
    Sensor(#[from] SensorError),

    /// A negative sampling period was requested.
    #[error("invalid delay: {0} ns")]
    InvalidDelay(i64),

    /// An event read was asked for fewer than one event.
    #[error("event count must be at least 1")]
    InvalidCount,

    /// A control attribute could not be read or written.
    #[error("control attribute {path}: {source}")]
    Attribute {
        /// The attribute file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// A control attribute held unexpected text.
    #[error("cannot parse {path}: {value:?}")]
    Parse {
        /// The attribute file.
        path: PathBuf,
        /// Text that was read.
        value: String,
    },

    /// Fusion pipeline error.
    #[error(transparent)]
    Fusion(#[from] FusionError),

    /// Calibration persistence error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HalError {
    /// Creates an attribute I/O error.
    #[must_use]
    pub fn attribute(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Attribute {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, value: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Negative errno for the poll-device shell.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::Sensor(_) | Self::InvalidDelay(_) | Self::InvalidCount => EINVAL,
            Self::Attribute { .. } | Self::Parse { .. } | Self::Store(_) => EIO,
            Self::Fusion(e) => e.errno(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_handle_is_einval() {
        let err = HalError::from(SensorError::InvalidHandle(42));
        assert_eq!(err.errno(), -22);
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn invalid_delay_is_einval() {
        assert_eq!(HalError::InvalidDelay(-1).errno(), -22);
    }

    #[test]
    fn zero_event_count_is_einval() {
        assert_eq!(HalError::InvalidCount.errno(), -22);
    }

    #[test]
    fn io_failures_are_eio() {
        let err = HalError::attribute(
            "/sys/class/invensense/mpu/gyro_delay",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.errno(), -5);
        assert_eq!(HalError::from(StoreError::NotConfigured).errno(), -5);
        assert_eq!(HalError::parse("/x", "abc").errno(), -5);
    }

    #[test]
    fn registry_exhaustion_is_enomem() {
        let err = HalError::from(FusionError::RegistryFull { capacity: 20 });
        assert_eq!(err.errno(), -12);
    }
}
