//! Error types for the motion-fusion crate.

use motion_types::SensorError;
use thiserror::Error;

use crate::registry::StageId;

/// Errors that can occur while registering or running fusion stages and
/// while restoring persisted state.
#[derive(Debug, Error)]
pub enum FusionError {
    /// A stage with this id is already registered.
    #[error("stage already registered: {0}")]
    DuplicateHandler(StageId),

    /// Another stage already runs at this priority.
    #[error("priority {0} already taken")]
    DuplicatePriority(i32),

    /// The fixed-size stage table is full.
    #[error("stage table full: capacity {capacity}")]
    RegistryFull {
        /// Maximum number of stages.
        capacity: usize,
    },

    /// Persisted state has the wrong size or key.
    #[error("corrupt persisted state: expected {expected} bytes, got {actual}")]
    CorruptRecord {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Persisted state carries an unknown format key.
    #[error("unknown persisted state key: {0}")]
    UnknownRecordKey(u32),

    /// A stage reported a failure during a pass.
    #[error("stage {stage} failed: {reason}")]
    Stage {
        /// The failing stage.
        stage: StageId,
        /// What went wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sensor identifier or descriptor error.
    #[error(transparent)]
    Sensor(#[from] SensorError),
}

impl FusionError {
    /// Creates a corrupt record error.
    #[must_use]
    pub const fn corrupt_record(expected: usize, actual: usize) -> Self {
        Self::CorruptRecord { expected, actual }
    }

    /// Creates a stage failure.
    #[must_use]
    pub fn stage(stage: StageId, reason: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// The negative errno the poll-device shell reports for this error.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::RegistryFull { .. } => -12,
            Self::CorruptRecord { .. } | Self::UnknownRecordKey(_) => -5,
            _ => -22,
        }
    }
}

/// Result type for fusion operations.
pub type Result<T> = std::result::Result<T, FusionError>;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn error_duplicate_handler() {
        let err = FusionError::DuplicateHandler(StageId::new("quat"));
        assert!(err.to_string().contains("already registered"));
        assert!(err.to_string().contains("quat"));
    }

    #[test]
    fn error_registry_full_is_enomem() {
        let err = FusionError::RegistryFull { capacity: 20 };
        assert!(err.to_string().contains("20"));
        assert_eq!(err.errno(), -12);
    }

    #[test]
    fn error_corrupt_record() {
        let err = FusionError::corrupt_record(60, 12);
        assert!(err.to_string().contains("60"));
        assert!(err.to_string().contains("12"));
        assert_eq!(err.errno(), -5);
    }

    #[test]
    fn error_stage() {
        let err = FusionError::stage(StageId::new("hal"), "no quaternion");
        assert!(err.to_string().contains("hal"));
        assert!(err.to_string().contains("no quaternion"));
        assert_eq!(err.errno(), -22);
    }

    #[test]
    fn error_from_sensor() {
        let err: FusionError = SensorError::InvalidHandle(9).into();
        assert!(err.to_string().contains('9'));
    }
}
