//! Calibration persistence through real directories.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;

use motion_fusion::{FixedEngine, FusionParams, SampleCoordinator};
use motion_store::{CAL_FILE_NAME, CalibrationPaths, CalibrationStore, StoreError};
use motion_types::Accuracy;
use tempfile::tempdir;

fn coordinator() -> SampleCoordinator {
    SampleCoordinator::new(&FusionParams::unit(), Box::new(FixedEngine::default()))
}

#[test]
fn stored_bias_survives_reload() {
    let dir = tempdir().unwrap();
    let store = CalibrationStore::new(CalibrationPaths::from_dirs(dir.path(), None));

    let mut before = coordinator();
    let bias = [1 << 16, -(3 << 16), 42];
    before.state_mut().set_gyro_bias(bias, Accuracy::High);
    before.state_mut().set_accel_bias([5, 6, 7], Accuracy::Medium);
    before.state_mut().set_compass_bias([-1, -2, -3], Accuracy::Low);
    let saved = before.save_state();
    store.store(&saved).unwrap();

    let mut after = coordinator();
    let bytes = store.load(after.state_size()).unwrap();
    assert_eq!(bytes, saved);
    after.load_state(&bytes).unwrap();

    assert_eq!(after.state().gyro_bias().0, bias);
    assert_eq!(after.state().accel_bias(), [5, 6, 7]);
    assert_eq!(after.state().compass_bias(), [-1, -2, -3]);
    assert_eq!(after.state().record(), before.state().record());
}

#[test]
fn truncated_record_is_corrupt() {
    let dir = tempdir().unwrap();
    let store = CalibrationStore::new(CalibrationPaths::from_dirs(dir.path(), None));
    let c = coordinator();

    let saved = c.save_state();
    fs::write(dir.path().join(CAL_FILE_NAME), &saved[..saved.len() - 1]).unwrap();

    let err = store.load(c.state_size()).unwrap_err();
    assert!(matches!(err, StoreError::CorruptRecord { .. }));
}

#[test]
fn protected_record_is_copied_forward() {
    let data = tempdir().unwrap();
    let factory = tempdir().unwrap();
    let store = CalibrationStore::new(CalibrationPaths::from_dirs(
        data.path(),
        Some(factory.path()),
    ));

    let mut c = coordinator();
    c.state_mut().set_accel_bias([9, 9, 9], Accuracy::High);
    let factory_bytes = c.save_state();
    fs::write(factory.path().join(CAL_FILE_NAME), &factory_bytes).unwrap();

    let loaded = store.load(factory_bytes.len()).unwrap();
    assert_eq!(loaded, factory_bytes);
    assert_eq!(
        fs::read(data.path().join(CAL_FILE_NAME)).unwrap(),
        factory_bytes
    );

    // The default copy now wins over the factory record.
    store.store(&vec![0xAB; factory_bytes.len()]).unwrap();
    assert_eq!(
        store.load(factory_bytes.len()).unwrap(),
        vec![0xAB; factory_bytes.len()]
    );
}

#[test]
fn missing_factory_record_is_not_found() {
    let data = tempdir().unwrap();
    let factory = tempdir().unwrap();
    let store = CalibrationStore::new(CalibrationPaths::from_dirs(
        data.path(),
        Some(factory.path()),
    ));
    assert!(matches!(store.load(60), Err(StoreError::NotFound { .. })));
}
