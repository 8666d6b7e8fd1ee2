//! Error types for calibration persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for calibration store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while loading or storing calibration.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No writable calibration directory is configured.
    #[error("calibration persistence not configured")]
    NotConfigured,

    /// Neither the default nor the protected record exists.
    #[error("calibration record not found: {path}")]
    NotFound {
        /// The default record path.
        path: PathBuf,
    },

    /// The record on disk has the wrong size.
    #[error("corrupt calibration record {path}: expected {expected} bytes, got {actual}")]
    CorruptRecord {
        /// The record path.
        path: PathBuf,
        /// Size the caller expects.
        expected: usize,
        /// Size found on disk.
        actual: usize,
    },

    /// The record could not be written completely.
    #[error("failed to write calibration record {path}: {source}")]
    Write {
        /// The record path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Creates a write error for `path`.
    #[must_use]
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure only means there is nothing to load.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::NotConfigured | Self::NotFound { .. })
    }
}
