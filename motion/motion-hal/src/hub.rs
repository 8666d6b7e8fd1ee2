//! The mutex-serialized motion sensor facade.
//!
//! One lock covers channel state, the stage table and the enable/rate
//! state, so a reader thread's record, coherence check and fusion pass run
//! as one unit. Calibration bytes are copied out under the lock and written
//! after it is released.

use std::sync::{Mutex, MutexGuard, PoisonError};

use motion_fusion::{
    ComplementaryEngine, EngineMessages, FusionEngine, SampleCoordinator, SampleStatus, outputs,
};
use motion_store::CalibrationStore;
use motion_types::{
    Accuracy, Duration, PhysicalSensor, SensorEvent, Timestamp, VirtualSensor,
};
use tracing::{debug, info, warn};

use crate::control::PhysicalControl;
use crate::error::{HalError, HalResult};
use crate::input::{EventCodes, InputEvent, MotionFrame, MotionFrameDecoder};
use crate::lowpower::{AccelWindow, LpaAction};
use crate::params::HalParams;
use crate::rate::{EnableRateController, PhysicalMask};

/// Motion sensor HAL over a physical control implementation.
///
/// # Example
///
/// ```
/// use motion_hal::{HalParams, MotionHub, SysfsControl};
/// use motion_store::{CalibrationPaths, CalibrationStore};
/// use motion_types::VirtualSensor;
///
/// let dir = tempfile::tempdir().unwrap();
/// let hub = MotionHub::new(
///     HalParams::default(),
///     SysfsControl::new(dir.path()),
///     CalibrationStore::new(CalibrationPaths::default()),
/// )
/// .unwrap();
///
/// hub.enable(VirtualSensor::Gyroscope.handle(), true).unwrap();
/// hub.set_delay(VirtualSensor::Gyroscope.handle(), 20_000_000).unwrap();
/// assert_eq!(hub.poll_timeout().map(|d| d.as_millis()), Some(20));
/// ```
#[derive(Debug)]
pub struct MotionHub<C: PhysicalControl> {
    inner: Mutex<HubInner<C>>,
    store: CalibrationStore,
}

#[derive(Debug)]
struct HubInner<C> {
    params: HalParams,
    coordinator: SampleCoordinator,
    rates: EnableRateController,
    control: C,
    mask: PhysicalMask,
    motion: MotionFrameDecoder,
    external_accel: MotionFrameDecoder,
    window: AccelWindow,
    variable_rate: bool,
    last_temperature: Timestamp,
    have_good_cal: bool,
    no_motion_stored: bool,
    pending_store: bool,
}

impl<C: PhysicalControl> MotionHub<C> {
    /// Creates a hub running the reference fusion engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the stillness parameters are invalid.
    pub fn new(params: HalParams, control: C, store: CalibrationStore) -> HalResult<Self> {
        Self::with_engine(
            params,
            control,
            store,
            Box::new(ComplementaryEngine::default()),
        )
    }

    /// Creates a hub around `engine`.
    ///
    /// Registers the standard stages, writes the low-power switch-over
    /// period and loads saved calibration. Failures to configure the
    /// hardware or load calibration are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the stillness parameters are invalid.
    pub fn with_engine(
        params: HalParams,
        mut control: C,
        store: CalibrationStore,
        engine: Box<dyn FusionEngine>,
    ) -> HalResult<Self> {
        let mut coordinator =
            SampleCoordinator::with_standard_stages(&params.fusion, engine, params.no_motion)?;

        if params.integrated_accel {
            if let Err(err) = control.set_low_power_delay(params.low_power.lpa_delay) {
                warn!(error = %err, "Failed to set low-power accel delay");
            }
        }

        load_calibration(&mut coordinator, &store);

        let rates = EnableRateController::new(params.min_period, params.default_period)
            .with_integrated_accel(params.integrated_accel);
        info!(engine = coordinator.engine().name(), "Motion HAL ready");

        Ok(Self {
            inner: Mutex::new(HubInner {
                params,
                coordinator,
                rates,
                control,
                mask: PhysicalMask::empty(),
                motion: MotionFrameDecoder::new(params.codes),
                external_accel: MotionFrameDecoder::new(EventCodes::external_accel()),
                window: AccelWindow::new(params.low_power, params.default_period),
                variable_rate: false,
                last_temperature: Timestamp::ZERO,
                have_good_cal: false,
                no_motion_stored: false,
                pending_store: false,
            }),
            store,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HubInner<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enables or disables the virtual sensor `handle`.
    ///
    /// Starts or stops the backing physical sensors and re-derives the
    /// shared period. When nothing is left running, calibration is saved.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Sensor`](crate::HalError::Sensor) for an
    /// unknown handle, or the first hardware error. The enable state is
    /// updated even when the hardware rejects a write.
    pub fn enable(&self, handle: i32, on: bool) -> HalResult<()> {
        let sensor = VirtualSensor::try_from(handle)?;

        let (result, snapshot) = {
            let mut inner = self.lock();
            if !inner.rates.enable(sensor, on) {
                return Ok(());
            }
            let mask_result = inner.apply_mask();
            if sensor == VirtualSensor::LinearAcceleration && on {
                inner.window.reset();
            }
            let rate_result = inner.apply_rates();
            let snapshot = if inner.mask.is_empty() {
                inner.calibration_snapshot()
            } else {
                None
            };
            (mask_result.and(rate_result), snapshot)
        };

        if let Some(bytes) = snapshot {
            self.persist(&bytes);
        }
        result
    }

    /// Sets the requested period of `handle` in nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Sensor`](crate::HalError::Sensor) for an
    /// unknown handle, [`HalError::InvalidDelay`](crate::HalError::InvalidDelay)
    /// for a negative period, or the first hardware error.
    pub fn set_delay(&self, handle: i32, ns: i64) -> HalResult<()> {
        let sensor = VirtualSensor::try_from(handle)?;
        let mut inner = self.lock();
        inner.rates.set_delay(sensor, ns)?;
        inner.apply_rates()
    }

    /// Decodes events from the motion device and appends one output per
    /// enabled virtual sensor for every fusion pass. Returns the number of
    /// events appended.
    ///
    /// At most `max_count` events are appended. Decoding stops once the cap
    /// is reached, leaving the rest of `events` for the next call. Outputs
    /// of a pass that overflow the cap are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidCount`] when `max_count` is zero.
    pub fn read_events<I>(
        &self,
        events: &mut I,
        max_count: usize,
        out: &mut Vec<SensorEvent>,
    ) -> HalResult<usize>
    where
        I: Iterator<Item = InputEvent>,
    {
        let start = out.len();
        let limit = output_limit(start, max_count)?;
        let snapshot = {
            let mut inner = self.lock();
            while out.len() < limit {
                let Some(event) = events.next() else {
                    break;
                };
                if let Some(frame) = inner.motion.push(event) {
                    inner.on_motion_frame(frame, out, limit);
                }
            }
            inner.take_pending_store()
        };
        if let Some(bytes) = snapshot {
            self.persist(&bytes);
        }
        Ok(out.len() - start)
    }

    /// Like [`Self::read_events`] for a stand-alone accelerometer that
    /// reports absolute axes.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidCount`] when `max_count` is zero.
    pub fn read_accel_events<I>(
        &self,
        events: &mut I,
        max_count: usize,
        out: &mut Vec<SensorEvent>,
    ) -> HalResult<usize>
    where
        I: Iterator<Item = InputEvent>,
    {
        let start = out.len();
        let limit = output_limit(start, max_count)?;
        let snapshot = {
            let mut inner = self.lock();
            while out.len() < limit {
                let Some(event) = events.next() else {
                    break;
                };
                if let Some(MotionFrame {
                    accel: Some(accel),
                    timestamp,
                    ..
                }) = inner.external_accel.push(event)
                {
                    inner.on_accel(accel, timestamp, out, limit);
                }
            }
            inner.take_pending_store()
        };
        if let Some(bytes) = snapshot {
            self.persist(&bytes);
        }
        Ok(out.len() - start)
    }

    /// Feeds one compass sample, appending at most `max_count` events.
    /// Returns the number of events appended.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidCount`] when `max_count` is zero.
    pub fn push_compass_sample(
        &self,
        values: [i32; 3],
        status: SampleStatus,
        timestamp: Timestamp,
        max_count: usize,
        out: &mut Vec<SensorEvent>,
    ) -> HalResult<usize> {
        let start = out.len();
        let limit = output_limit(start, max_count)?;
        let snapshot = {
            let mut inner = self.lock();
            if inner.mask.runs(PhysicalSensor::Compass)
                && inner.coordinator.on_new_compass(values, status, timestamp)
            {
                inner.execute_on_data(out, limit);
            }
            inner.take_pending_store()
        };
        if let Some(bytes) = snapshot {
            self.persist(&bytes);
        }
        Ok(out.len() - start)
    }

    /// How long the caller's poll may wait, or `None` when idle.
    #[must_use]
    pub fn poll_timeout(&self) -> Option<Duration> {
        let inner = self.lock();
        if inner.variable_rate {
            Some(inner.window.poll_period())
        } else {
            inner.rates.plan().period
        }
    }

    /// Saves calibration now if it is worth keeping. Returns whether
    /// anything was written.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Store`](crate::HalError::Store) if the write
    /// fails or persistence is not configured.
    pub fn store_calibration(&self) -> HalResult<bool> {
        let snapshot = self.lock().calibration_snapshot();
        let Some(bytes) = snapshot else {
            return Ok(false);
        };
        self.store.store(&bytes)?;
        Ok(true)
    }

    /// Whether `handle` is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Sensor`](crate::HalError::Sensor) for an
    /// unknown handle.
    pub fn is_enabled(&self, handle: i32) -> HalResult<bool> {
        let sensor = VirtualSensor::try_from(handle)?;
        Ok(self.lock().rates.is_enabled(sensor))
    }

    /// Physical sensors currently running.
    #[must_use]
    pub fn physical_mask(&self) -> PhysicalMask {
        self.lock().mask
    }

    /// Whether the accelerometer is idling in low power.
    #[must_use]
    pub fn is_low_power(&self) -> bool {
        let inner = self.lock();
        inner.variable_rate && inner.window.is_idle()
    }

    /// Runs `f` against the coordinator under the lock.
    pub fn with_coordinator<R>(&self, f: impl FnOnce(&SampleCoordinator) -> R) -> R {
        f(&self.lock().coordinator)
    }

    fn persist(&self, bytes: &[u8]) {
        if !self.store.is_configured() {
            debug!("Calibration persistence not configured");
            return;
        }
        if let Err(err) = self.store.store(bytes) {
            warn!(error = %err, "Cannot store calibration");
        }
    }
}

fn load_calibration(coordinator: &mut SampleCoordinator, store: &CalibrationStore) {
    match store.load(coordinator.state_size()) {
        Ok(bytes) => match coordinator.load_state(&bytes) {
            Ok(()) => info!("Calibration restored"),
            Err(err) => warn!(error = %err, "Saved calibration rejected, using defaults"),
        },
        Err(err) if err.is_missing() => info!(reason = %err, "No saved calibration"),
        Err(err) => warn!(error = %err, "Cannot load calibration, using defaults"),
    }
}

/// Output length a read may grow `out` to.
fn output_limit(len: usize, max_count: usize) -> HalResult<usize> {
    if max_count == 0 {
        return Err(HalError::InvalidCount);
    }
    Ok(len.saturating_add(max_count))
}

/// Narrows driver values to 16-bit counts. Wraps like the driver's own
/// `short` conversion; do not saturate.
#[allow(clippy::cast_possible_truncation)]
fn gyro_counts(values: [i32; 3]) -> [i16; 3] {
    values.map(|v| v as i16)
}

impl<C: PhysicalControl> HubInner<C> {
    /// Starts and stops physical sensors to match the enabled set.
    fn apply_mask(&mut self) -> HalResult<()> {
        let wanted = self.rates.local_mask();
        let mut result = Ok(());
        for sensor in PhysicalSensor::MOTION {
            let run = wanted.runs(sensor);
            if run == self.mask.runs(sensor) {
                continue;
            }
            if let Err(err) = self.control.enable(sensor, run) {
                warn!(sensor = sensor.name(), on = run, error = %err, "Enable failed");
                result = result.and(Err(err));
            }
            if !run {
                self.coordinator.mark_off(sensor);
            }
        }
        if wanted != self.mask {
            info!(mask = wanted.bits(), "Physical sensors changed");
        }
        self.mask = wanted;
        result
    }

    /// Pushes the shared period to the channels on the current route.
    fn apply_rates(&mut self) -> HalResult<()> {
        let plan = self.rates.plan();
        self.variable_rate = plan.variable_rate;
        let Some(period) = plan.period else {
            return Ok(());
        };

        for sensor in PhysicalSensor::MOTION {
            self.coordinator.set_sample_rate(sensor, period);
        }
        let mut result = Ok(());
        for sensor in plan.route.targets() {
            if let Err(err) = self.control.set_period(*sensor, period) {
                warn!(sensor = sensor.name(), error = %err, "Period update failed");
                result = result.and(Err(err));
            }
        }
        if plan.variable_rate {
            self.window.set_poll_period(period);
        }
        debug!(route = ?plan.route, period_ns = period.as_nanos(), "Rate updated");
        result
    }

    fn on_motion_frame(&mut self, frame: MotionFrame, out: &mut Vec<SensorEvent>, limit: usize) {
        let ts = frame.timestamp;
        if ts.saturating_since(self.last_temperature) >= self.params.temperature_interval {
            self.last_temperature = ts;
            match self.control.read_temperature() {
                Ok(reading) => {
                    self.coordinator
                        .on_new_temp(reading.value_q16, reading.timestamp);
                }
                Err(err) => warn!(error = %err, "Temperature read failed"),
            }
        }

        if let Some(gyro) = frame.gyro {
            if self.mask.runs(PhysicalSensor::Gyro)
                && self.coordinator.on_new_gyro(gyro_counts(gyro), ts)
            {
                self.execute_on_data(out, limit);
            }
        }
        if let Some(accel) = frame.accel {
            self.on_accel(accel, ts, out, limit);
        }
    }

    fn on_accel(
        &mut self,
        accel: [i32; 3],
        ts: Timestamp,
        out: &mut Vec<SensorEvent>,
        limit: usize,
    ) {
        if self.mask.runs(PhysicalSensor::Accel)
            && self.coordinator.on_new_accel(accel, SampleStatus::Raw, ts)
        {
            self.execute_on_data(out, limit);
        }
    }

    /// Handles engine messages and emits outputs after a pass, keeping
    /// `out` no longer than `limit`.
    fn execute_on_data(&mut self, out: &mut Vec<SensorEvent>, limit: usize) {
        let messages = self.coordinator.state_mut().take_messages();
        if messages.contains(EngineMessages::MOTION) {
            debug!("Motion, next rest will store calibration");
            self.no_motion_stored = false;
        }
        if messages.contains(EngineMessages::NO_MOTION) {
            debug!("No motion, gyro bias settled");
            self.coordinator
                .state_mut()
                .channel_mut(PhysicalSensor::Gyro)
                .set_accuracy(Accuracy::High);
            self.have_good_cal = true;
            if !self.no_motion_stored {
                self.no_motion_stored = true;
                self.pending_store = true;
            }
        }

        for sensor in VirtualSensor::ALL {
            if !self.rates.is_enabled(sensor) {
                continue;
            }
            let event = outputs::generate(sensor, self.coordinator.state());
            if sensor == VirtualSensor::Accelerometer && self.variable_rate {
                self.drive_window(event.xyz());
            }
            if out.len() < limit {
                out.push(event);
            } else {
                debug!(sensor = sensor.name(), "Event buffer full, output dropped");
            }
        }
    }

    fn drive_window(&mut self, accel: [f32; 3]) {
        let requested = self.rates.delay(VirtualSensor::Accelerometer);
        match self.window.update(accel, requested) {
            Some(LpaAction::Enter {
                period,
                motion_threshold,
            }) => {
                self.write_accel_period(period);
                if motion_threshold != 0 {
                    if let Err(err) = self.control.set_motion_threshold(motion_threshold) {
                        warn!(error = %err, "Cannot arm motion detection");
                    }
                }
                info!(period_ns = period.as_nanos(), "Accel entered low power");
            }
            Some(LpaAction::Exit { period }) => {
                if self.params.low_power.motion_threshold != 0 {
                    if let Err(err) = self.control.set_motion_threshold(0) {
                        warn!(error = %err, "Cannot disarm motion detection");
                    }
                }
                self.write_accel_period(period);
                info!(period_ns = period.as_nanos(), "Accel left low power");
            }
            None => {}
        }
    }

    fn write_accel_period(&mut self, period: Duration) {
        match self.control.set_period(PhysicalSensor::Accel, period) {
            Ok(()) => self
                .coordinator
                .set_sample_rate(PhysicalSensor::Accel, period),
            Err(err) => warn!(error = %err, "Accel period update failed"),
        }
    }

    /// Record bytes, if calibration is good enough to keep.
    fn calibration_snapshot(&self) -> Option<Vec<u8>> {
        let accel_accuracy = self
            .coordinator
            .state()
            .channel(PhysicalSensor::Accel)
            .accuracy();
        if self.have_good_cal || accel_accuracy >= Accuracy::Medium {
            Some(self.coordinator.save_state())
        } else {
            debug!("Calibration not settled, skipping store");
            None
        }
    }

    fn take_pending_store(&mut self) -> Option<Vec<u8>> {
        if !std::mem::take(&mut self.pending_store) {
            return None;
        }
        self.calibration_snapshot()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::control::TemperatureReading;
    use motion_store::CalibrationPaths;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Enable(PhysicalSensor, bool),
        Period(PhysicalSensor, Duration),
        LowPowerDelay(Duration),
        MotionThreshold(u8),
        Temperature,
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
        fn set_low_power_delay(&mut self, delay: Duration) -> HalResult<()> {
            self.push(Call::LowPowerDelay(delay));
            Ok(())
        }
        fn set_motion_threshold(&mut self, threshold: u8) -> HalResult<()> {
            self.push(Call::MotionThreshold(threshold));
            Ok(())
        }
        fn read_temperature(&mut self) -> HalResult<TemperatureReading> {
            self.push(Call::Temperature);
            Ok(TemperatureReading {
                value_q16: 30 << 16,
                timestamp: Timestamp::ZERO,
            })
        }
    }

    fn hub() -> (MotionHub<Recorder>, Recorder) {
        let recorder = Recorder::default();
        let hub = MotionHub::new(
            HalParams::default(),
            recorder.clone(),
            CalibrationStore::new(CalibrationPaths::default()),
        )
        .unwrap();
        recorder.take();
        (hub, recorder)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn gyro_accel_frame(ts_ms: u64) -> Vec<InputEvent> {
        vec![
            InputEvent::rel(0, 0),
            InputEvent::rel(1, 0),
            InputEvent::rel(2, 0),
            InputEvent::rel(3, 0),
            InputEvent::rel(4, 0),
            InputEvent::rel(5, 16384),
            InputEvent::syn(Timestamp::from_millis(ts_ms)),
        ]
    }

    fn read(
        hub: &MotionHub<Recorder>,
        events: Vec<InputEvent>,
        out: &mut Vec<SensorEvent>,
    ) -> usize {
        hub.read_events(&mut events.into_iter(), 16, out).unwrap()
    }

    #[test]
    fn gyro_counts_wrap() {
        assert_eq!(gyro_counts([32_768, -32_769, 7]), [-32_768, 32_767, 7]);
    }

    #[test]
    fn construction_writes_low_power_delay() {
        let recorder = Recorder::default();
        let _hub = MotionHub::new(
            HalParams::default(),
            recorder.clone(),
            CalibrationStore::default(),
        )
        .unwrap();
        assert_eq!(recorder.take(), vec![Call::LowPowerDelay(Duration::ZERO)]);
    }

    #[test]
    fn unknown_handle_is_rejected() {
        let (hub, _) = hub();
        let err = hub.enable(7, true).unwrap_err();
        assert!(matches!(err, HalError::Sensor(_)));
        assert_eq!(err.errno(), -22);
        assert_eq!(hub.set_delay(-1, 0).unwrap_err().errno(), -22);
    }

    #[test]
    fn negative_delay_is_rejected() {
        let (hub, _) = hub();
        let err = hub
            .set_delay(VirtualSensor::Gyroscope.handle(), -5)
            .unwrap_err();
        assert!(matches!(err, HalError::InvalidDelay(-5)));
    }

    #[test]
    fn fusion_sensor_starts_all_three() {
        let (hub, recorder) = hub();
        hub.enable(VirtualSensor::RotationVector.handle(), true)
            .unwrap();
        let calls = recorder.take();
        for sensor in PhysicalSensor::MOTION {
            assert!(calls.contains(&Call::Enable(sensor, true)));
            assert!(calls.contains(&Call::Period(sensor, ms(200))));
        }
        assert_eq!(hub.physical_mask(), PhysicalMask::FUSION);
    }

    #[test]
    fn repeated_enable_is_a_no_op() {
        let (hub, recorder) = hub();
        let handle = VirtualSensor::Gyroscope.handle();
        hub.enable(handle, true).unwrap();
        recorder.take();
        hub.enable(handle, true).unwrap();
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn delay_is_clamped_and_routed() {
        let (hub, recorder) = hub();
        let handle = VirtualSensor::Gyroscope.handle();
        hub.enable(handle, true).unwrap();
        recorder.take();

        hub.set_delay(handle, 1_000_000).unwrap();
        assert_eq!(
            recorder.take(),
            vec![Call::Period(PhysicalSensor::Gyro, ms(10))]
        );
        assert_eq!(hub.poll_timeout(), Some(ms(10)));
    }

    #[test]
    fn disabling_last_sensor_stops_hardware() {
        let (hub, recorder) = hub();
        let handle = VirtualSensor::MagneticField.handle();
        hub.enable(handle, true).unwrap();
        hub.enable(handle, false).unwrap();
        let calls = recorder.take();
        assert!(calls.contains(&Call::Enable(PhysicalSensor::Compass, false)));
        assert!(hub.physical_mask().is_empty());
        assert_eq!(hub.poll_timeout(), None);
    }

    #[test]
    fn fusion_outputs_after_pass() {
        let (hub, _) = hub();
        hub.enable(VirtualSensor::Gravity.handle(), true).unwrap();

        let mut out = Vec::new();
        assert_eq!(read(&hub, gyro_accel_frame(10), &mut out), 1);
        assert_eq!(out[0].sensor, VirtualSensor::Gravity);

        let n = hub
            .push_compass_sample(
                [1, 0, 0],
                SampleStatus::Raw,
                Timestamp::from_millis(10),
                8,
                &mut out,
            )
            .unwrap();
        assert_eq!(n, 0);

        assert_eq!(read(&hub, gyro_accel_frame(20), &mut out), 1);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn samples_for_stopped_sensors_are_dropped() {
        let (hub, _) = hub();
        hub.enable(VirtualSensor::MagneticField.handle(), true)
            .unwrap();
        let mut out = Vec::new();
        assert_eq!(read(&hub, gyro_accel_frame(10), &mut out), 0);
        assert_eq!(hub.with_coordinator(SampleCoordinator::pass_count), 0);
    }

    #[test]
    fn temperature_read_on_cadence() {
        let (hub, recorder) = hub();
        hub.enable(VirtualSensor::Gyroscope.handle(), true).unwrap();
        recorder.take();

        let mut out = Vec::new();
        read(&hub, gyro_accel_frame(100), &mut out);
        assert!(!recorder.take().contains(&Call::Temperature));

        read(&hub, gyro_accel_frame(600), &mut out);
        assert!(recorder.take().contains(&Call::Temperature));

        read(&hub, gyro_accel_frame(700), &mut out);
        assert!(!recorder.take().contains(&Call::Temperature));

        let temp = hub.with_coordinator(|c| {
            c.state().channel(PhysicalSensor::Temperature).calibrated()[0]
        });
        assert_eq!(temp, 30 << 16);
    }

    #[test]
    fn store_skipped_without_good_calibration() {
        let (hub, _) = hub();
        assert!(!hub.store_calibration().unwrap());
    }

    #[test]
    fn zero_count_reads_are_rejected() {
        let (hub, _) = hub();
        hub.enable(VirtualSensor::Gyroscope.handle(), true).unwrap();
        let mut out = Vec::new();

        let mut events = gyro_accel_frame(10).into_iter();
        let err = hub.read_events(&mut events, 0, &mut out).unwrap_err();
        assert!(matches!(err, HalError::InvalidCount));
        assert_eq!(err.errno(), -22);
        assert_eq!(events.len(), 7);

        let err = hub
            .push_compass_sample([1, 0, 0], SampleStatus::Raw, Timestamp::ZERO, 0, &mut out)
            .unwrap_err();
        assert_eq!(err.errno(), -22);
        assert!(hub.read_accel_events(&mut std::iter::empty(), 0, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn pass_outputs_beyond_cap_are_dropped() {
        let (hub, _) = hub();
        hub.enable(VirtualSensor::Gyroscope.handle(), true).unwrap();
        hub.enable(VirtualSensor::Accelerometer.handle(), true).unwrap();

        let mut out = Vec::new();
        let mut events = gyro_accel_frame(10).into_iter();
        assert_eq!(hub.read_events(&mut events, 1, &mut out).unwrap(), 1);
        assert_eq!(out.len(), 1);
    }
}
