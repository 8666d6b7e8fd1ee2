//! End-to-end behaviour of the motion hub against a recording control.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};

use motion_fusion::{NoMotionParams, SampleCoordinator, SampleStatus};
use motion_hal::{
    HalError, HalParams, HalResult, InputEvent, LowPowerParams, MotionHub, PhysicalControl,
    TemperatureReading,
};
use motion_store::{CAL_FILE_NAME, CalibrationPaths, CalibrationStore};
use motion_types::{
    Accuracy, Duration, PhysicalSensor, SensorEvent, Timestamp, VirtualSensor,
};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Enable(PhysicalSensor, bool),
    Period(PhysicalSensor, Duration),
    MotionThreshold(u8),
    Other,
}

#[derive(Debug, Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Call>>>);

impl Recorder {
    fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }
}

impl PhysicalControl for Recorder {
    fn enable(&mut self, sensor: PhysicalSensor, on: bool) -> HalResult<()> {
        self.push(Call::Enable(sensor, on));
        Ok(())
    }

    fn set_period(&mut self, sensor: PhysicalSensor, period: Duration) -> HalResult<()> {
        self.push(Call::Period(sensor, period));
        Ok(())
    }

    fn set_low_power_delay(&mut self, _delay: Duration) -> HalResult<()> {
        self.push(Call::Other);
        Ok(())
    }

    fn set_motion_threshold(&mut self, threshold: u8) -> HalResult<()> {
        self.push(Call::MotionThreshold(threshold));
        Ok(())
    }

    fn read_temperature(&mut self) -> HalResult<TemperatureReading> {
        self.push(Call::Other);
        Ok(TemperatureReading {
            value_q16: 25 << 16,
            timestamp: Timestamp::ZERO,
        })
    }
}

fn gyro_frame(value: i32, ts_ms: u64) -> [InputEvent; 4] {
    [
        InputEvent::rel(0, value),
        InputEvent::rel(1, value),
        InputEvent::rel(2, value),
        InputEvent::syn(Timestamp::from_millis(ts_ms)),
    ]
}

fn accel_frame(x: i32, ts_ms: u64) -> [InputEvent; 4] {
    [
        InputEvent::rel(3, x),
        InputEvent::rel(4, 0),
        InputEvent::rel(5, 16384),
        InputEvent::syn(Timestamp::from_millis(ts_ms)),
    ]
}

fn read(
    hub: &MotionHub<Recorder>,
    events: impl IntoIterator<Item = InputEvent>,
    out: &mut Vec<SensorEvent>,
) -> usize {
    hub.read_events(&mut events.into_iter(), 64, out).unwrap()
}

fn quick_rest() -> HalParams {
    HalParams::default().with_no_motion(NoMotionParams::default().with_window(5))
}

#[test]
fn rest_stores_calibration_and_next_start_restores_it() {
    let dir = tempdir().unwrap();
    let paths = CalibrationPaths::from_dirs(dir.path(), None);
    let record = dir.path().join(CAL_FILE_NAME);

    let hub = MotionHub::new(
        quick_rest(),
        Recorder::default(),
        CalibrationStore::new(paths.clone()),
    )
    .unwrap();
    hub.enable(VirtualSensor::Gyroscope.handle(), true).unwrap();

    let mut out = Vec::new();
    for i in 0..4 {
        read(&hub, gyro_frame(5, 10 * (i + 1)), &mut out);
    }
    assert!(!record.exists());

    read(&hub, gyro_frame(5, 50), &mut out);
    assert!(record.exists());
    assert_eq!(out.len(), 5);
    assert_eq!(out[4].accuracy, Accuracy::High);

    let restarted = MotionHub::new(
        quick_rest(),
        Recorder::default(),
        CalibrationStore::new(paths),
    )
    .unwrap();
    let bias = restarted.with_coordinator(|c| c.state().gyro_bias().0);
    assert_eq!(bias, [5 << 16; 3]);
}

#[test]
fn disabling_everything_stores_good_calibration() {
    let dir = tempdir().unwrap();
    let record = dir.path().join(CAL_FILE_NAME);
    let hub = MotionHub::new(
        quick_rest(),
        Recorder::default(),
        CalibrationStore::new(CalibrationPaths::from_dirs(dir.path(), None)),
    )
    .unwrap();
    let handle = VirtualSensor::Gyroscope.handle();
    hub.enable(handle, true).unwrap();

    let mut out = Vec::new();
    for i in 0..5 {
        read(&hub, gyro_frame(2, 10 * (i + 1)), &mut out);
    }
    std::fs::remove_file(&record).unwrap();

    hub.enable(handle, false).unwrap();
    assert!(record.exists());
    assert!(hub.store_calibration().unwrap());
}

#[test]
fn corrupt_saved_calibration_falls_back_to_zero_bias() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join(CAL_FILE_NAME), [1u8; 7]).unwrap();

    let hub = MotionHub::new(
        HalParams::default(),
        Recorder::default(),
        CalibrationStore::new(CalibrationPaths::from_dirs(dir.path(), None)),
    )
    .unwrap();
    let bias = hub.with_coordinator(|c| c.state().gyro_bias().0);
    assert_eq!(bias, [0; 3]);
}

#[test]
fn accel_only_idles_when_still_and_wakes_on_motion() {
    let recorder = Recorder::default();
    let params = HalParams::default()
        .with_low_power(LowPowerParams::default().with_motion_threshold(5));
    let hub = MotionHub::new(params, recorder.clone(), CalibrationStore::default()).unwrap();

    let handle = VirtualSensor::Accelerometer.handle();
    hub.enable(handle, true).unwrap();
    hub.set_delay(handle, 60_000_000).unwrap();
    recorder.take();
    assert_eq!(hub.poll_timeout(), Some(Duration::from_millis(60)));

    let mut out = Vec::new();
    for i in 0..10 {
        assert_eq!(read(&hub, accel_frame(0, 60 * (i + 1)), &mut out), 1);
    }
    assert!(hub.is_low_power());
    assert_eq!(hub.poll_timeout(), Some(Duration::from_millis(256)));
    let calls = recorder.take();
    assert!(calls.contains(&Call::Period(
        PhysicalSensor::Accel,
        Duration::from_millis(256)
    )));
    assert!(calls.contains(&Call::MotionThreshold(5)));

    read(&hub, accel_frame(16384, 1000), &mut out);
    assert!(!hub.is_low_power());
    assert_eq!(hub.poll_timeout(), Some(Duration::from_millis(60)));
    let calls = recorder.take();
    assert!(calls.contains(&Call::MotionThreshold(0)));
    assert!(calls.contains(&Call::Period(
        PhysicalSensor::Accel,
        Duration::from_millis(60)
    )));
}

#[test]
fn fusion_scenario_after_warm_up_runs_one_pass_per_coherent_set() {
    let recorder = Recorder::default();
    let hub = MotionHub::new(
        HalParams::default(),
        recorder.clone(),
        CalibrationStore::default(),
    )
    .unwrap();
    hub.enable(VirtualSensor::RotationVector.handle(), true)
        .unwrap();
    let calls = recorder.take();
    for sensor in PhysicalSensor::MOTION {
        assert!(calls.contains(&Call::Enable(sensor, true)));
    }

    let mut out = Vec::new();
    let both = |ts: u64| {
        [
            InputEvent::rel(0, 1),
            InputEvent::rel(3, 0),
            InputEvent::rel(4, 0),
            InputEvent::rel(5, 16384),
            InputEvent::syn(Timestamp::from_millis(ts)),
        ]
    };

    // Warm up until all three channels run with nothing pending.
    read(&hub, both(1), &mut out);
    hub.push_compass_sample(
        [100, 0, 0],
        SampleStatus::Raw,
        Timestamp::from_millis(1),
        16,
        &mut out,
    )
    .unwrap();
    read(
        &hub,
        [InputEvent::rel(0, 1), InputEvent::syn(Timestamp::from_millis(2))],
        &mut out,
    );
    let before = hub.with_coordinator(SampleCoordinator::pass_count);

    // Gyro and accel share a frame; the compass completes the set.
    out.clear();
    read(&hub, both(11), &mut out);
    let n = hub
        .push_compass_sample(
            [100, 0, 0],
            SampleStatus::Raw,
            Timestamp::from_millis(12),
            16,
            &mut out,
        )
        .unwrap();
    let after = hub.with_coordinator(SampleCoordinator::pass_count);

    assert_eq!(after - before, 1);
    assert_eq!(n, 1);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].sensor, VirtualSensor::RotationVector);
    assert_eq!(out[0].timestamp, Timestamp::from_millis(12));
}

#[test]
fn disabled_fusion_sensor_stops_unused_channels() {
    let recorder = Recorder::default();
    let hub = MotionHub::new(
        HalParams::default(),
        recorder.clone(),
        CalibrationStore::default(),
    )
    .unwrap();
    hub.enable(VirtualSensor::Gyroscope.handle(), true).unwrap();
    hub.enable(VirtualSensor::Orientation.handle(), true).unwrap();
    recorder.take();

    hub.enable(VirtualSensor::Orientation.handle(), false)
        .unwrap();
    let calls = recorder.take();
    assert!(calls.contains(&Call::Enable(PhysicalSensor::Accel, false)));
    assert!(calls.contains(&Call::Enable(PhysicalSensor::Compass, false)));
    assert!(!calls.contains(&Call::Enable(PhysicalSensor::Gyro, false)));
}

#[test]
fn every_new_rest_after_motion_is_stored() {
    let dir = tempdir().unwrap();
    let paths = CalibrationPaths::from_dirs(dir.path(), None);
    let record = dir.path().join(CAL_FILE_NAME);
    let hub = MotionHub::new(
        quick_rest(),
        Recorder::default(),
        CalibrationStore::new(paths.clone()),
    )
    .unwrap();
    hub.enable(VirtualSensor::Gyroscope.handle(), true).unwrap();

    let mut out = Vec::new();
    let mut ts = 0;
    let mut feed = |value: i32| {
        ts += 10;
        read(&hub, gyro_frame(value, ts), &mut out);
    };

    for _ in 0..5 {
        feed(5);
    }
    assert!(record.exists());
    std::fs::remove_file(&record).unwrap();

    // Shaking: the next window is far too noisy to count as rest.
    for value in [0, 100, 0, 100, 0] {
        feed(value);
    }
    assert!(!record.exists());

    for _ in 0..5 {
        feed(7);
    }
    assert!(record.exists());

    let restarted = MotionHub::new(
        quick_rest(),
        Recorder::default(),
        CalibrationStore::new(paths),
    )
    .unwrap();
    let bias = restarted.with_coordinator(|c| c.state().gyro_bias().0);
    assert_eq!(bias, [7 << 16; 3]);
}

#[test]
fn continued_rest_is_stored_once() {
    let dir = tempdir().unwrap();
    let record = dir.path().join(CAL_FILE_NAME);
    let hub = MotionHub::new(
        quick_rest(),
        Recorder::default(),
        CalibrationStore::new(CalibrationPaths::from_dirs(dir.path(), None)),
    )
    .unwrap();
    hub.enable(VirtualSensor::Gyroscope.handle(), true).unwrap();

    let mut out = Vec::new();
    for i in 0..5 {
        read(&hub, gyro_frame(3, 10 * (i + 1)), &mut out);
    }
    std::fs::remove_file(&record).unwrap();

    for i in 5..15 {
        read(&hub, gyro_frame(3, 10 * (i + 1)), &mut out);
    }
    assert!(!record.exists());
}

#[test]
fn zero_event_count_is_rejected() {
    let hub = MotionHub::new(
        HalParams::default(),
        Recorder::default(),
        CalibrationStore::default(),
    )
    .unwrap();
    hub.enable(VirtualSensor::Gyroscope.handle(), true).unwrap();

    let mut events = gyro_frame(1, 10).into_iter();
    let mut out = Vec::new();
    let err = hub.read_events(&mut events, 0, &mut out).unwrap_err();
    assert!(matches!(err, HalError::InvalidCount));
    assert_eq!(err.errno(), -22);
    assert!(out.is_empty());
    assert_eq!(events.len(), 4);
    assert_eq!(hub.with_coordinator(SampleCoordinator::pass_count), 0);
}

#[test]
fn capped_read_leaves_remaining_frames_for_the_next_call() {
    let hub = MotionHub::new(
        HalParams::default(),
        Recorder::default(),
        CalibrationStore::default(),
    )
    .unwrap();
    for sensor in [
        VirtualSensor::Gyroscope,
        VirtualSensor::MagneticField,
        VirtualSensor::Orientation,
    ] {
        hub.enable(sensor.handle(), true).unwrap();
    }

    // Accel and compass never report, so they never gate and every gyro
    // frame runs one pass with three outputs.
    let batch: Vec<InputEvent> = (1..=5).flat_map(|i| gyro_frame(1, 10 * i)).collect();
    let mut events = batch.into_iter();
    let mut out = Vec::new();

    let n = hub.read_events(&mut events, 4, &mut out).unwrap();
    assert_eq!(n, 4);
    assert_eq!(out.len(), 4);
    assert_eq!(events.len(), 3 * 4);

    let n = hub.read_events(&mut events, 64, &mut out).unwrap();
    assert_eq!(n, 9);
    assert_eq!(events.len(), 0);
}
