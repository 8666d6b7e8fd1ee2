//! Error types for motion sensor data.

use thiserror::Error;

/// Errors raised while interpreting sensor identifiers and descriptors.
#[derive(Debug, Error)]
pub enum SensorError {
    /// A virtual sensor handle outside the known set.
    #[error("invalid sensor handle: {0}")]
    InvalidHandle(i32),

    /// A packed orientation scalar that is not a signed permutation.
    #[error("invalid orientation descriptor: {0:#05x}")]
    InvalidOrientation(u16),

    /// A mounting matrix that is not a signed permutation.
    #[error("invalid mounting matrix: {0}")]
    InvalidMatrix(String),

    /// An accuracy level above 3.
    #[error("invalid accuracy level: {0}")]
    InvalidAccuracy(u8),
}

impl SensorError {
    /// Creates an invalid matrix error.
    #[must_use]
    pub fn invalid_matrix(reason: impl Into<String>) -> Self {
        Self::InvalidMatrix(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SensorError::InvalidHandle(9);
        assert!(err.to_string().contains("invalid sensor handle"));
        assert!(err.to_string().contains('9'));
    }

    #[test]
    fn orientation_error_is_hex() {
        let err = SensorError::InvalidOrientation(0x1ff);
        assert!(err.to_string().contains("0x1ff"));
    }

    #[test]
    fn error_invalid_matrix() {
        let err = SensorError::invalid_matrix("row 2");
        assert!(err.to_string().contains("row 2"));
    }
}
