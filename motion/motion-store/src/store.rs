//! Loading and storing the opaque calibration record.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::paths::CalibrationPaths;

/// Persists the calibration record at the configured default path.
///
/// The record is treated as opaque bytes whose size the caller supplies
/// on load. Writes go through a temporary file in the target directory
/// that is renamed over the record, so readers never see a partial file.
///
/// # Example
///
/// ```
/// use motion_store::{CalibrationPaths, CalibrationStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = CalibrationStore::new(CalibrationPaths::from_dirs(dir.path(), None));
///
/// store.store(&[1, 2, 3, 4]).unwrap();
/// assert_eq!(store.load(4).unwrap(), vec![1, 2, 3, 4]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CalibrationStore {
    paths: CalibrationPaths,
}

impl CalibrationStore {
    /// Creates a store over `paths`.
    #[must_use]
    pub const fn new(paths: CalibrationPaths) -> Self {
        Self { paths }
    }

    /// Creates a store configured from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(CalibrationPaths::from_env())
    }

    /// The configured paths.
    #[must_use]
    pub const fn paths(&self) -> &CalibrationPaths {
        &self.paths
    }

    /// Whether a default path is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.paths.default_path().is_some()
    }

    /// Reads the record, which must be exactly `expected_len` bytes.
    ///
    /// When the default record is missing and a protected record exists,
    /// the protected record is first copied to the default path.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotConfigured`] without a default path.
    /// - [`StoreError::NotFound`] when neither record exists.
    /// - [`StoreError::CorruptRecord`] when the size differs.
    /// - [`StoreError::Io`] on read or copy failure.
    pub fn load(&self, expected_len: usize) -> StoreResult<Vec<u8>> {
        let path = self.paths.default_path().ok_or(StoreError::NotConfigured)?;

        if !path.exists() {
            self.copy_forward(path)?;
        }

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.len() != expected_len {
            return Err(StoreError::CorruptRecord {
                path: path.to_path_buf(),
                expected: expected_len,
                actual: bytes.len(),
            });
        }

        info!(path = %path.display(), len = bytes.len(), "Loaded calibration");
        Ok(bytes)
    }

    /// Atomically replaces the record with `bytes`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotConfigured`] without a default path.
    /// - [`StoreError::Write`] when the record is empty or any part of
    ///   the write, sync or rename fails.
    pub fn store(&self, bytes: &[u8]) -> StoreResult<()> {
        let path = self.paths.default_path().ok_or(StoreError::NotConfigured)?;

        if bytes.is_empty() {
            return Err(StoreError::write(
                path,
                io::Error::new(io::ErrorKind::WriteZero, "empty calibration record"),
            ));
        }

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::write(path, e))?;
        tmp.write_all(bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StoreError::write(path, e))?;
        tmp.persist(path)
            .map_err(|e| StoreError::write(path, e.error))?;

        info!(path = %path.display(), len = bytes.len(), "Stored calibration");
        Ok(())
    }

    fn copy_forward(&self, default: &Path) -> StoreResult<()> {
        let Some(protected) = self.paths.protected_path() else {
            return Err(StoreError::NotFound {
                path: default.to_path_buf(),
            });
        };
        if !protected.exists() {
            return Err(StoreError::NotFound {
                path: default.to_path_buf(),
            });
        }

        if let Some(parent) = default.parent() {
            fs::create_dir_all(parent)?;
        }
        let copied = fs::copy(protected, default)?;
        debug!(
            from = %protected.display(),
            to = %default.display(),
            bytes = copied,
            "Copied protected calibration forward"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::paths::CAL_FILE_NAME;
    use tempfile::tempdir;

    #[test]
    fn not_configured_without_default_dir() {
        let store = CalibrationStore::default();
        assert!(!store.is_configured());
        assert!(matches!(store.load(60), Err(StoreError::NotConfigured)));
        assert!(matches!(store.store(&[0; 60]), Err(StoreError::NotConfigured)));
    }

    #[test]
    fn missing_record_is_not_found() {
        let dir = tempdir().unwrap();
        let store = CalibrationStore::new(CalibrationPaths::from_dirs(dir.path(), None));
        let err = store.load(60).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(err.is_missing());
    }

    #[test]
    fn wrong_length_is_corrupt() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CAL_FILE_NAME), [7u8; 10]).unwrap();
        let store = CalibrationStore::new(CalibrationPaths::from_dirs(dir.path(), None));
        match store.load(60) {
            Err(StoreError::CorruptRecord {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 60);
                assert_eq!(actual, 10);
            }
            other => panic!("expected CorruptRecord, got {other:?}"),
        }
    }

    #[test]
    fn store_replaces_existing_record() {
        let dir = tempdir().unwrap();
        let store = CalibrationStore::new(CalibrationPaths::from_dirs(dir.path(), None));
        store.store(&[1; 8]).unwrap();
        store.store(&[2; 8]).unwrap();
        assert_eq!(store.load(8).unwrap(), vec![2; 8]);

        // Only the record remains; the temporary file was renamed away.
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn empty_record_is_rejected() {
        let dir = tempdir().unwrap();
        let store = CalibrationStore::new(CalibrationPaths::from_dirs(dir.path(), None));
        assert!(matches!(store.store(&[]), Err(StoreError::Write { .. })));
        assert!(!dir.path().join(CAL_FILE_NAME).exists());
    }

    #[test]
    fn store_into_missing_dir_fails_with_write() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent");
        let store = CalibrationStore::new(CalibrationPaths::from_dirs(&missing, None));
        assert!(matches!(store.store(&[1; 4]), Err(StoreError::Write { .. })));
    }
}
