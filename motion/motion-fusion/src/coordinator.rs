//! Turning asynchronous samples into fusion passes.
//!
//! Each motion channel moves between idle and holding a new sample. A pass
//! runs once every running channel holds a new sample, so no pass sees a
//! partially updated set. A channel that receives a second sample before
//! the pass consumed its first forces a pass for the older sample before
//! recording the newer one.

use motion_types::{Accuracy, DataMask, Duration, Orientation, PhysicalSensor, Timestamp};
use tracing::{debug, warn};

use crate::complementary::ComplementaryEngine;
use crate::engine::FusionEngine;
use crate::error::{FusionError, Result};
use crate::motion::{NoMotionDetector, NoMotionParams};
use crate::params::FusionParams;
use crate::record::CalibrationRecord;
use crate::registry::{CallbackRegistry, PassContext, StageId, priority};
use crate::state::FusionState;

/// How a driver delivered a three-axis sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    /// Device-unit counts; calibration is applied here.
    Raw,
    /// Already calibrated q16 values with the driver's accuracy.
    Calibrated(Accuracy),
}

impl SampleStatus {
    /// Decodes a driver status word: bit 5 marks calibrated data and the
    /// low two bits carry its accuracy.
    #[must_use]
    pub const fn from_driver_bits(bits: u32) -> Self {
        if bits & 32 == 0 {
            Self::Raw
        } else {
            Self::Calibrated(Accuracy::from_status_bits(bits))
        }
    }
}

/// The sample coordinator.
///
/// # Example
///
/// ```
/// use motion_fusion::{FixedEngine, FusionParams, SampleCoordinator, SampleStatus};
/// use motion_types::{ChannelStatus, PhysicalSensor, Timestamp};
///
/// let mut coord = SampleCoordinator::new(&FusionParams::unit(), Box::new(FixedEngine::default()));
///
/// // Gyro alone is a complete set.
/// assert!(coord.on_new_gyro([1, 2, 3], Timestamp::from_millis(1)));
///
/// // Accel starts: the running gyro has nothing new yet, so no pass.
/// assert!(!coord.on_new_accel([0, 0, 1], SampleStatus::Raw, Timestamp::from_millis(2)));
/// assert!(coord.on_new_gyro([1, 2, 3], Timestamp::from_millis(3)));
///
/// let gyro = coord.state().channel(PhysicalSensor::Gyro);
/// assert!(gyro.status().contains(ChannelStatus::CONTIGUOUS));
/// assert_eq!(coord.pass_count(), 2);
/// ```
pub struct SampleCoordinator {
    state: FusionState,
    registry: CallbackRegistry,
    engine: Box<dyn FusionEngine>,
    passes: u64,
    last_error: Option<FusionError>,
}

impl std::fmt::Debug for SampleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleCoordinator")
            .field("state", &self.state)
            .field("registry", &self.registry)
            .field("engine", &self.engine.name())
            .field("passes", &self.passes)
            .finish_non_exhaustive()
    }
}

impl SampleCoordinator {
    /// Stillness detection and gyro bias capture.
    pub const NO_MOTION_STAGE: StageId = StageId::new("no_motion");
    /// The fusion engine.
    pub const ENGINE_STAGE: StageId = StageId::new("fusion_engine");
    /// Output snapshot.
    pub const HAL_OUTPUTS_STAGE: StageId = StageId::new("hal_outputs");

    /// Creates a coordinator with no stages registered.
    #[must_use]
    pub fn new(params: &FusionParams, engine: Box<dyn FusionEngine>) -> Self {
        Self {
            state: FusionState::new(params),
            registry: CallbackRegistry::new(),
            engine,
            passes: 0,
            last_error: None,
        }
    }

    /// Creates a coordinator running the standard pipeline: stillness
    /// detection at priority 100, the engine at 600 and the output
    /// snapshot at 900.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::InvalidConfig`] for invalid stillness
    /// parameters.
    pub fn with_standard_stages(
        params: &FusionParams,
        engine: Box<dyn FusionEngine>,
        no_motion: NoMotionParams,
    ) -> Result<Self> {
        let mut coord = Self::new(params, engine);
        coord.install_standard_stages(no_motion)?;
        Ok(coord)
    }

    /// Creates a coordinator with the reference engine and default
    /// settings.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::with_standard_stages`].
    pub fn with_defaults(params: &FusionParams) -> Result<Self> {
        Self::with_standard_stages(
            params,
            Box::new(ComplementaryEngine::default()),
            NoMotionParams::default(),
        )
    }

    fn install_standard_stages(&mut self, no_motion: NoMotionParams) -> Result<()> {
        let motion = DataMask::GYRO_NEW | DataMask::ACCEL_NEW | DataMask::MAG_NEW;

        let mut detector = NoMotionDetector::new(no_motion)?;
        self.registry.register(
            Self::NO_MOTION_STAGE,
            priority::MOTION_NO_MOTION,
            DataMask::GYRO_NEW,
            move |ctx| {
                detector.process(ctx.state);
                Ok(())
            },
        )?;
        self.registry.register(
            Self::ENGINE_STAGE,
            priority::NINE_AXIS_FUSION,
            motion,
            |ctx| {
                let active = ctx.active();
                ctx.engine.update(ctx.state, active)
            },
        )?;
        self.registry.register(
            Self::HAL_OUTPUTS_STAGE,
            priority::HAL_OUTPUTS,
            motion,
            |ctx| {
                let q = ctx.engine.quaternion();
                ctx.state.capture_outputs(q);
                Ok(())
            },
        )
    }

    /// Registers an additional stage.
    ///
    /// # Errors
    ///
    /// See [`CallbackRegistry::register`].
    pub fn register_stage<F>(
        &mut self,
        id: StageId,
        priority: i32,
        trigger: DataMask,
        handler: F,
    ) -> Result<()>
    where
        F: FnMut(&mut PassContext<'_>) -> Result<()> + Send + 'static,
    {
        self.registry.register(id, priority, trigger, handler)
    }

    /// Removes a stage. Returns `false` if it was not registered.
    pub fn unregister_stage(&mut self, id: StageId) -> bool {
        self.registry.unregister(id)
    }

    /// The stage table.
    #[must_use]
    pub const fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    /// Channels, biases and the output snapshot.
    #[must_use]
    pub const fn state(&self) -> &FusionState {
        &self.state
    }

    /// Mutable access for bias updates from outside a pass.
    pub fn state_mut(&mut self) -> &mut FusionState {
        &mut self.state
    }

    /// The fusion engine.
    #[must_use]
    pub fn engine(&self) -> &dyn FusionEngine {
        self.engine.as_ref()
    }

    /// Number of passes run so far.
    #[must_use]
    pub const fn pass_count(&self) -> u64 {
        self.passes
    }

    /// First error of the most recent failing pass.
    #[must_use]
    pub const fn last_pass_error(&self) -> Option<&FusionError> {
        self.last_error.as_ref()
    }

    /// Records a raw gyro sample. Returns whether a pass ran.
    pub fn on_new_gyro(&mut self, raw: [i16; 3], timestamp: Timestamp) -> bool {
        let mut executed = self.flush_pending(PhysicalSensor::Gyro);
        let bias = self.state.bias(PhysicalSensor::Gyro);
        self.state
            .channel_mut(PhysicalSensor::Gyro)
            .record_raw(raw, bias, timestamp);
        executed |= self.check_and_run();
        executed
    }

    /// Records an accel sample. Returns whether a pass ran.
    pub fn on_new_accel(
        &mut self,
        values: [i32; 3],
        status: SampleStatus,
        timestamp: Timestamp,
    ) -> bool {
        self.on_new_vector(PhysicalSensor::Accel, values, status, timestamp)
    }

    /// Records a compass sample. Returns whether a pass ran.
    pub fn on_new_compass(
        &mut self,
        values: [i32; 3],
        status: SampleStatus,
        timestamp: Timestamp,
    ) -> bool {
        self.on_new_vector(PhysicalSensor::Compass, values, status, timestamp)
    }

    /// Records a q16 °C temperature sample.
    ///
    /// Temperature neither forces nor gates a pass, so this always returns
    /// `false`.
    pub fn on_new_temp(&mut self, value_q16: i32, timestamp: Timestamp) -> bool {
        self.state
            .channel_mut(PhysicalSensor::Temperature)
            .record_scalar(value_q16, timestamp);
        false
    }

    fn on_new_vector(
        &mut self,
        sensor: PhysicalSensor,
        values: [i32; 3],
        status: SampleStatus,
        timestamp: Timestamp,
    ) -> bool {
        let mut executed = self.flush_pending(sensor);
        let bias = self.state.bias(sensor);
        let ch = self.state.channel_mut(sensor);
        match status {
            SampleStatus::Raw => ch.record_raw(truncate_counts(values), bias, timestamp),
            SampleStatus::Calibrated(accuracy) => {
                ch.record_calibrated(values, accuracy, timestamp);
            }
        }
        executed |= self.check_and_run();
        executed
    }

    /// Runs a pass for a sample that was never consumed.
    fn flush_pending(&mut self, sensor: PhysicalSensor) -> bool {
        if !self.state.channel(sensor).has_new_data() {
            return false;
        }
        debug!(sensor = sensor.name(), "Second sample before pass, flushing");
        self.run_logged();
        true
    }

    /// Runs a pass unless a running motion channel is still waiting.
    fn check_and_run(&mut self) -> bool {
        if PhysicalSensor::MOTION
            .iter()
            .any(|s| self.state.channel(*s).is_waiting())
        {
            return false;
        }
        self.run_logged();
        true
    }

    fn run_logged(&mut self) {
        match self.execute_pass() {
            Ok(()) => self.last_error = None,
            Err(err) => {
                warn!(error = %err, pass = self.passes, "Fusion pass reported an error");
                self.last_error = Some(err);
            }
        }
    }

    /// Runs one pass over the current samples, then consumes them.
    ///
    /// # Errors
    ///
    /// Returns the first stage error; every stage still runs and the
    /// samples are consumed either way.
    pub fn execute_pass(&mut self) -> Result<()> {
        let active = PhysicalSensor::ALL
            .iter()
            .filter(|s| self.state.channel(**s).has_new_data())
            .fold(DataMask::empty(), |mask, s| mask | s.data_bit());

        let mut ctx = PassContext::new(&mut self.state, self.engine.as_mut(), active);
        let result = self.registry.run_pass(&mut ctx);

        for ch in self.state.channels_mut() {
            ch.finish_pass();
        }
        self.passes += 1;
        debug!(pass = self.passes, active = active.bits(), "Fusion pass complete");
        result
    }

    /// Marks a physical sensor as stopped so it no longer gates passes.
    pub fn mark_off(&mut self, sensor: PhysicalSensor) {
        self.state.channel_mut(sensor).mark_off();
    }

    /// Sets a channel's mounting and q30 sensitivity and recalibrates the
    /// held sample.
    pub fn set_orientation_and_scale(
        &mut self,
        sensor: PhysicalSensor,
        orientation: Orientation,
        sensitivity: i32,
    ) {
        self.state
            .channel_mut(sensor)
            .set_orientation_and_scale(orientation, sensitivity);
        self.state.reapply_calibration(sensor);
    }

    /// Records the sampling period a channel runs at.
    pub fn set_sample_rate(&mut self, sensor: PhysicalSensor, period: Duration) {
        let rate_us = u32::try_from(period.as_micros()).unwrap_or(u32::MAX);
        self.state.channel_mut(sensor).set_sample_rate_us(rate_us);
    }

    /// Size of [`Self::save_state`] output.
    #[must_use]
    pub fn state_size(&self) -> usize {
        CalibrationRecord::ENCODED_LEN + self.engine.state_size()
    }

    /// Serializes the calibration record followed by engine state.
    #[must_use]
    pub fn save_state(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.state_size());
        self.state.record().write_to(&mut out);
        self.engine.save_state(&mut out);
        out
    }

    /// Restores state written by [`Self::save_state`] and recalibrates the
    /// held samples. Nothing changes if the bytes are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::CorruptRecord`] for a size mismatch and
    /// [`FusionError::UnknownRecordKey`] for a foreign record.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        let expected = self.state_size();
        if bytes.len() != expected {
            return Err(FusionError::corrupt_record(expected, bytes.len()));
        }
        let (record, engine) = bytes.split_at(CalibrationRecord::ENCODED_LEN);
        let record = CalibrationRecord::from_bytes(record)?;
        self.engine.load_state(engine)?;
        self.state.restore_record(record);
        Ok(())
    }
}

/// Drivers deliver 16-bit counts widened to 32 bits. Out-of-range values
/// wrap like the driver's `short` conversion; do not saturate.
#[allow(clippy::cast_possible_truncation)]
fn truncate_counts(values: [i32; 3]) -> [i16; 3] {
    values.map(|v| v as i16)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::engine::FixedEngine;
    use motion_types::ChannelStatus;
    use std::sync::{Arc, Mutex};

    fn coordinator() -> SampleCoordinator {
        SampleCoordinator::new(&FusionParams::unit(), Box::new(FixedEngine::default()))
    }

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn out_of_range_counts_wrap() {
        assert_eq!(truncate_counts([70_000, -40_000, 5]), [4464, 25_536, 5]);
    }

    #[test]
    fn pass_waits_for_all_running_channels() {
        let mut c = coordinator();
        assert!(c.on_new_gyro([0; 3], ts(1)));
        assert!(!c.on_new_accel([0; 3], SampleStatus::Raw, ts(1)));
        assert!(!c.on_new_compass([0; 3], SampleStatus::Raw, ts(1)));
        assert!(c.on_new_gyro([0; 3], ts(2)));
        let before = c.pass_count();

        assert!(!c.on_new_gyro([0; 3], ts(3)));
        assert!(!c.on_new_accel([0; 3], SampleStatus::Raw, ts(3)));
        assert!(c.on_new_compass([0; 3], SampleStatus::Raw, ts(3)));
        assert_eq!(c.pass_count(), before + 1);

        for s in PhysicalSensor::MOTION {
            let st = c.state().channel(s).status();
            assert!(st.contains(ChannelStatus::CONTIGUOUS));
            assert!(!st.contains(ChannelStatus::NEW_DATA));
        }
    }

    #[test]
    fn second_sample_flushes_first() {
        let mut c = coordinator();
        c.on_new_gyro([0; 3], ts(1));
        c.on_new_accel([0; 3], SampleStatus::Raw, ts(1));
        c.on_new_gyro([0; 3], ts(2));
        let before = c.pass_count();

        assert!(!c.on_new_gyro([1, 1, 1], ts(3)));
        // Accel never arrived: the second gyro sample forces a pass for
        // the first one.
        assert!(c.on_new_gyro([2, 2, 2], ts(4)));
        assert_eq!(c.pass_count(), before + 1);
        assert!(c.state().channel(PhysicalSensor::Gyro).has_new_data());
        assert_eq!(c.state().channel(PhysicalSensor::Gyro).raw(), [2, 2, 2]);
    }

    #[test]
    fn off_channel_never_blocks() {
        let mut c = coordinator();
        c.on_new_gyro([0; 3], ts(1));
        c.on_new_accel([0; 3], SampleStatus::Raw, ts(1));
        c.mark_off(PhysicalSensor::Accel);

        assert!(c.on_new_gyro([0; 3], ts(2)));
    }

    #[test]
    fn temperature_never_triggers_or_blocks() {
        let mut c = coordinator();
        assert!(!c.on_new_temp(25 << 16, ts(1)));
        assert_eq!(c.pass_count(), 0);
        assert!(c.on_new_gyro([0; 3], ts(2)));
        assert!(!c.on_new_temp(26 << 16, ts(3)));
        assert!(c.on_new_gyro([0; 3], ts(4)));
    }

    #[test]
    fn calibrated_samples_keep_driver_accuracy() {
        let mut c = coordinator();
        let status = SampleStatus::from_driver_bits(32 | 2);
        c.on_new_compass([5, 6, 7], status, ts(1));

        let compass = c.state().channel(PhysicalSensor::Compass);
        assert_eq!(compass.calibrated(), [5, 6, 7]);
        assert_eq!(compass.accuracy(), Accuracy::Medium);
        assert_eq!(SampleStatus::from_driver_bits(3), SampleStatus::Raw);
    }

    #[test]
    fn active_mask_reflects_new_channels() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let mut c = coordinator();
        c.register_stage(StageId::new("spy"), 10, DataMask::all(), move |ctx| {
            log.lock().unwrap().push(ctx.active());
            Ok(())
        })
        .unwrap();

        c.on_new_gyro([0; 3], ts(1));
        c.on_new_accel([0; 3], SampleStatus::Raw, ts(1));
        c.on_new_temp(1, ts(1));
        c.on_new_gyro([0; 3], ts(2));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            [
                DataMask::GYRO_NEW,
                DataMask::GYRO_NEW | DataMask::ACCEL_NEW | DataMask::TEMP_NEW
            ]
        );
    }

    #[test]
    fn stage_error_is_kept_and_pass_still_counts() {
        let mut c = coordinator();
        c.register_stage(StageId::new("boom"), 1, DataMask::GYRO_NEW, |_| {
            Err(FusionError::stage(StageId::new("boom"), "bad sample"))
        })
        .unwrap();

        assert!(c.on_new_gyro([0; 3], ts(1)));
        assert_eq!(c.pass_count(), 1);
        assert!(c.last_pass_error().is_some());
        assert!(!c.state().channel(PhysicalSensor::Gyro).has_new_data());
    }

    #[test]
    fn standard_stages_latch_outputs() {
        let engine = FixedEngine::new([0, 1 << 30, 0, 0]);
        let mut c = SampleCoordinator::with_standard_stages(
            &FusionParams::unit(),
            Box::new(engine),
            NoMotionParams::default(),
        )
        .unwrap();
        assert_eq!(c.registry().len(), 3);

        c.on_new_gyro([0; 3], ts(7));
        assert_eq!(c.state().outputs().quaternion, [0, 1 << 30, 0, 0]);
        assert_eq!(c.state().outputs().timestamp, ts(7));
    }

    #[test]
    fn orientation_change_recalibrates() {
        let mut c = coordinator();
        c.on_new_accel([1, 2, 3], SampleStatus::Raw, ts(1));
        let flip: Orientation = "-1,0,0,0,-1,0,0,0,1".parse().unwrap();
        c.set_orientation_and_scale(PhysicalSensor::Accel, flip, 1 << 30);
        assert_eq!(
            c.state().channel(PhysicalSensor::Accel).calibrated(),
            [-1 << 16, -2 << 16, 3 << 16]
        );
    }

    #[test]
    fn state_restores_bias() {
        let mut c = coordinator();
        c.state_mut().set_gyro_bias([100, 200, 300], Accuracy::High);
        let bytes = c.save_state();
        assert_eq!(bytes.len(), c.state_size());
        assert_eq!(bytes.len(), 60 + 16);

        let mut restored = coordinator();
        restored.on_new_gyro([1, 1, 1], ts(1));
        restored.load_state(&bytes).unwrap();
        assert_eq!(restored.state().gyro_bias().0, [100, 200, 300]);
        assert_eq!(
            restored.state().channel(PhysicalSensor::Gyro).calibrated(),
            [(1 << 16) - 100, (1 << 16) - 200, (1 << 16) - 300]
        );
    }

    #[test]
    fn corrupt_state_changes_nothing() {
        let mut c = coordinator();
        c.state_mut().set_compass_bias([9, 9, 9], Accuracy::Low);
        let err = c.load_state(&[0; 10]).unwrap_err();
        assert!(matches!(err, FusionError::CorruptRecord { expected: 76, actual: 10 }));
        assert_eq!(c.state().compass_bias(), [9, 9, 9]);
    }

    #[test]
    fn sample_rate_sets_bandwidth() {
        let mut c = coordinator();
        c.set_sample_rate(PhysicalSensor::Gyro, Duration::from_millis(5));
        let gyro = c.state().channel(PhysicalSensor::Gyro);
        assert_eq!(gyro.sample_rate_us(), 5_000);
        assert_eq!(gyro.bandwidth_hz(), 200);
    }
}
