//! Where calibration records live.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Environment variable naming the writable calibration directory.
pub const DATA_DIR_VAR: &str = "MPU_DATA_DIR";

/// Environment variable naming the read-only factory directory.
pub const PROTECTED_DIR_VAR: &str = "MPU_CONF_DIR";

/// File name of the record in either directory.
pub const CAL_FILE_NAME: &str = "inv_cal_data.bin";

/// Default and protected record locations.
///
/// # Example
///
/// ```
/// use motion_store::CalibrationPaths;
///
/// let paths = CalibrationPaths::from_lookup(|var| match var {
///     "MPU_DATA_DIR" => Some("/data/sensors".into()),
///     _ => None,
/// });
/// assert_eq!(
///     paths.default_path().unwrap(),
///     std::path::Path::new("/data/sensors/inv_cal_data.bin")
/// );
/// assert!(paths.protected_path().is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationPaths {
    default: Option<PathBuf>,
    protected: Option<PathBuf>,
}

impl CalibrationPaths {
    /// Reads [`DATA_DIR_VAR`] and [`PROTECTED_DIR_VAR`] from the process
    /// environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var_os(var))
    }

    /// Resolves the directories through `lookup`. Empty values count as
    /// unset.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let dir = |var| lookup(var).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            default: dir(DATA_DIR_VAR).map(|d| d.join(CAL_FILE_NAME)),
            protected: dir(PROTECTED_DIR_VAR).map(|d| d.join(CAL_FILE_NAME)),
        }
    }

    /// Uses explicit directories.
    #[must_use]
    pub fn from_dirs(default_dir: impl AsRef<Path>, protected_dir: Option<&Path>) -> Self {
        Self {
            default: Some(default_dir.as_ref().join(CAL_FILE_NAME)),
            protected: protected_dir.map(|d| d.join(CAL_FILE_NAME)),
        }
    }

    /// Writable record path, if configured.
    #[must_use]
    pub fn default_path(&self) -> Option<&Path> {
        self.default.as_deref()
    }

    /// Factory record path, if configured.
    #[must_use]
    pub fn protected_path(&self) -> Option<&Path> {
        self.protected.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vars_are_unset() {
        let paths = CalibrationPaths::from_lookup(|_| Some(OsString::new()));
        assert_eq!(paths, CalibrationPaths::default());
    }

    #[test]
    fn both_dirs_resolved() {
        let paths = CalibrationPaths::from_lookup(|var| match var {
            DATA_DIR_VAR => Some("/data".into()),
            PROTECTED_DIR_VAR => Some("/persist".into()),
            _ => None,
        });
        assert_eq!(
            paths.default_path(),
            Some(Path::new("/data/inv_cal_data.bin"))
        );
        assert_eq!(
            paths.protected_path(),
            Some(Path::new("/persist/inv_cal_data.bin"))
        );
    }

    #[test]
    fn from_dirs_joins_file_name() {
        let paths = CalibrationPaths::from_dirs("/tmp/a", Some(Path::new("/tmp/b")));
        assert!(paths.default_path().unwrap_or(Path::new("")).ends_with(CAL_FILE_NAME));
        assert!(paths.protected_path().is_some());
    }
}
