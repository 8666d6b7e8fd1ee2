//! Priority-ordered fusion stages.
//!
//! A fusion pass walks the registered stages in ascending priority and
//! calls each one whose trigger mask intersects the channels that carried
//! new data. A failing stage does not stop the pass: the first error is
//! returned after every stage has run.

use std::fmt;

use motion_types::DataMask;
use tracing::{debug, warn};

use crate::engine::FusionEngine;
use crate::error::{FusionError, Result};
use crate::state::FusionState;

/// Maximum number of registered stages.
pub const MAX_STAGES: usize = 20;

/// Well-known stage priorities. Lower runs first.
pub mod priority {
    /// Stillness detection and gyro bias capture.
    pub const MOTION_NO_MOTION: i32 = 100;
    /// Gyro temperature compensation.
    pub const GYRO_TC: i32 = 150;
    /// Six-axis quaternion from gyro and accel.
    pub const QUAT_GYRO_ACCEL: i32 = 200;
    /// Quaternion without a gyro.
    pub const QUAT_NO_GYRO: i32 = 250;
    /// Magnetic disturbance detection.
    pub const MAG_DISTURBANCE: i32 = 300;
    /// Heading propagated from the gyro.
    pub const HEADING_FROM_GYRO: i32 = 350;
    /// Compass bias estimation with gyro help.
    pub const COMPASS_BIAS_W_GYRO: i32 = 375;
    /// Compass vector calibration.
    pub const COMPASS_VECTOR_CAL: i32 = 400;
    /// Advanced compass bias estimation.
    pub const COMPASS_ADV_BIAS: i32 = 500;
    /// Nine-axis fusion.
    pub const NINE_AXIS_FUSION: i32 = 600;
    /// Nine-axis quaternion adjustment.
    pub const QUAT_ADJUST_9AXIS: i32 = 700;
    /// Quaternion accuracy estimation.
    pub const QUAT_ACCURACY: i32 = 750;
    /// Result latching.
    pub const RESULTS_HOLDER: i32 = 800;
    /// In-use auto calibration.
    pub const INUSE_AUTO_CAL: i32 = 850;
    /// Snapshot for public outputs.
    pub const HAL_OUTPUTS: i32 = 900;
    /// Glyph recognition.
    pub const GLYPH: i32 = 950;
    /// State machines.
    pub const SM: i32 = 1000;
}

/// Identity of a registered stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(&'static str);

impl StageId {
    /// Creates a stage id from a static name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// What a stage sees while it runs.
pub struct PassContext<'a> {
    /// Channels, biases and engine messages.
    pub state: &'a mut FusionState,
    /// The fusion engine.
    pub engine: &'a mut dyn FusionEngine,
    active: DataMask,
}

impl<'a> PassContext<'a> {
    /// Bundles the pass inputs.
    pub fn new(
        state: &'a mut FusionState,
        engine: &'a mut dyn FusionEngine,
        active: DataMask,
    ) -> Self {
        Self {
            state,
            engine,
            active,
        }
    }

    /// Channels that carried new data into this pass.
    #[must_use]
    pub const fn active(&self) -> DataMask {
        self.active
    }
}

/// A stage body.
pub type StageFn = Box<dyn FnMut(&mut PassContext<'_>) -> Result<()> + Send>;

struct Stage {
    id: StageId,
    priority: i32,
    trigger: DataMask,
    handler: StageFn,
}

/// Fixed-capacity, priority-sorted stage table.
///
/// # Example
///
/// ```
/// use motion_fusion::{CallbackRegistry, StageId};
/// use motion_types::DataMask;
///
/// let mut registry = CallbackRegistry::new();
/// registry
///     .register(StageId::new("late"), 300, DataMask::all(), |_| Ok(()))
///     .unwrap();
/// registry
///     .register(StageId::new("early"), 100, DataMask::GYRO_NEW, |_| Ok(()))
///     .unwrap();
///
/// let order: Vec<i32> = registry.stages().map(|(_, p)| p).collect();
/// assert_eq!(order, [100, 300]);
/// ```
pub struct CallbackRegistry {
    stages: Vec<Stage>,
    capacity: usize,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("stages", &self.stages().collect::<Vec<_>>())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl CallbackRegistry {
    /// Creates an empty table holding up to [`MAX_STAGES`] stages.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_STAGES)
    }

    /// Creates an empty table with a custom capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stages: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a stage, keeping the table sorted by priority.
    ///
    /// # Errors
    ///
    /// - [`FusionError::DuplicateHandler`] if `id` is already registered
    /// - [`FusionError::DuplicatePriority`] if `priority` is taken
    /// - [`FusionError::RegistryFull`] if the table is full
    pub fn register<F>(
        &mut self,
        id: StageId,
        priority: i32,
        trigger: DataMask,
        handler: F,
    ) -> Result<()>
    where
        F: FnMut(&mut PassContext<'_>) -> Result<()> + Send + 'static,
    {
        for stage in &self.stages {
            if stage.id == id {
                return Err(FusionError::DuplicateHandler(id));
            }
            if stage.priority == priority {
                return Err(FusionError::DuplicatePriority(priority));
            }
        }
        if self.stages.len() >= self.capacity {
            return Err(FusionError::RegistryFull {
                capacity: self.capacity,
            });
        }

        let at = self
            .stages
            .iter()
            .position(|s| s.priority >= priority)
            .unwrap_or(self.stages.len());
        self.stages.insert(
            at,
            Stage {
                id,
                priority,
                trigger,
                handler: Box::new(handler),
            },
        );
        debug!(stage = id.name(), priority, at, "Registered fusion stage");
        Ok(())
    }

    /// Removes a stage. Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: StageId) -> bool {
        match self.stages.iter().position(|s| s.id == id) {
            Some(at) => {
                self.stages.remove(at);
                true
            }
            None => false,
        }
    }

    /// Whether a stage with this id is registered.
    #[must_use]
    pub fn contains(&self, id: StageId) -> bool {
        self.stages.iter().any(|s| s.id == id)
    }

    /// Number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether no stage is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Registered stages with their priorities, in run order.
    pub fn stages(&self) -> impl Iterator<Item = (StageId, i32)> + '_ {
        self.stages.iter().map(|s| (s.id, s.priority))
    }

    /// Runs every stage whose trigger intersects `ctx.active()`.
    ///
    /// # Errors
    ///
    /// Returns the first stage error. Later stages still run.
    pub fn run_pass(&mut self, ctx: &mut PassContext<'_>) -> Result<()> {
        let active = ctx.active();
        let mut first_error = None;
        for stage in &mut self.stages {
            if !stage.trigger.intersects(active) {
                continue;
            }
            if let Err(err) = (stage.handler)(ctx) {
                warn!(stage = stage.id.name(), error = %err, "Fusion stage failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
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
    use crate::params::FusionParams;
    use std::sync::{Arc, Mutex};

    fn run(registry: &mut CallbackRegistry, active: DataMask) -> Result<()> {
        let mut state = FusionState::new(&FusionParams::default());
        let mut engine = FixedEngine::default();
        let mut ctx = PassContext::new(&mut state, &mut engine, active);
        registry.run_pass(&mut ctx)
    }

    fn recorder(
        log: &Arc<Mutex<Vec<i32>>>,
        tag: i32,
    ) -> impl FnMut(&mut PassContext<'_>) -> Result<()> + Send + 'static {
        let log = Arc::clone(log);
        move |_| {
            log.lock().unwrap().push(tag);
            Ok(())
        }
    }

    #[test]
    fn runs_in_ascending_priority() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        for (name, p) in [("c", 300), ("a", 100), ("b", 200)] {
            registry
                .register(StageId::new(name), p, DataMask::all(), recorder(&log, p))
                .unwrap();
        }

        run(&mut registry, DataMask::GYRO_NEW).unwrap();
        run(&mut registry, DataMask::ACCEL_NEW).unwrap();
        assert_eq!(*log.lock().unwrap(), [100, 200, 300, 100, 200, 300]);
    }

    #[test]
    fn trigger_mask_filters_stages() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        registry
            .register(StageId::new("gyro"), 1, DataMask::GYRO_NEW, recorder(&log, 1))
            .unwrap();
        registry
            .register(StageId::new("mag"), 2, DataMask::MAG_NEW, recorder(&log, 2))
            .unwrap();

        run(&mut registry, DataMask::MAG_NEW | DataMask::ACCEL_NEW).unwrap();
        assert_eq!(*log.lock().unwrap(), [2]);
    }

    #[test]
    fn duplicates_rejected_without_side_effects() {
        let mut registry = CallbackRegistry::new();
        registry
            .register(StageId::new("a"), 100, DataMask::all(), |_| Ok(()))
            .unwrap();

        let dup_id = registry.register(StageId::new("a"), 200, DataMask::all(), |_| Ok(()));
        assert!(matches!(dup_id, Err(FusionError::DuplicateHandler(_))));

        let dup_prio = registry.register(StageId::new("b"), 100, DataMask::all(), |_| Ok(()));
        assert!(matches!(dup_prio, Err(FusionError::DuplicatePriority(100))));

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn twenty_first_registration_is_full() {
        const NAMES: [&str; 21] = [
            "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "s12",
            "s13", "s14", "s15", "s16", "s17", "s18", "s19", "s20",
        ];
        let mut registry = CallbackRegistry::new();
        for (i, name) in NAMES.iter().take(MAX_STAGES).enumerate() {
            let p = i32::try_from(i).unwrap();
            registry
                .register(StageId::new(name), p, DataMask::all(), |_| Ok(()))
                .unwrap();
        }
        let err = registry
            .register(StageId::new(NAMES[20]), 20, DataMask::all(), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, FusionError::RegistryFull { capacity: 20 }));
        assert_eq!(err.errno(), -12);
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let mut registry = CallbackRegistry::new();
        registry
            .register(StageId::new("a"), 1, DataMask::all(), |_| Ok(()))
            .unwrap();
        assert!(!registry.unregister(StageId::new("missing")));
        assert!(registry.unregister(StageId::new("a")));
        assert!(registry.is_empty());
    }

    #[test]
    fn first_error_wins_and_later_stages_still_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        registry
            .register(StageId::new("bad1"), 1, DataMask::all(), |_| {
                Err(FusionError::stage(StageId::new("bad1"), "first"))
            })
            .unwrap();
        registry
            .register(StageId::new("bad2"), 2, DataMask::all(), |_| {
                Err(FusionError::stage(StageId::new("bad2"), "second"))
            })
            .unwrap();
        registry
            .register(StageId::new("ok"), 3, DataMask::all(), recorder(&log, 3))
            .unwrap();

        let err = run(&mut registry, DataMask::GYRO_NEW).unwrap_err();
        assert!(err.to_string().contains("first"));
        assert_eq!(*log.lock().unwrap(), [3]);
    }

    #[test]
    fn stages_can_mutate_state() {
        let mut registry = CallbackRegistry::new();
        registry
            .register(StageId::new("disturb"), 300, DataMask::MAG_NEW, |ctx| {
                ctx.state.set_compass_disturbance(true);
                Ok(())
            })
            .unwrap();

        let mut state = FusionState::new(&FusionParams::default());
        let mut engine = FixedEngine::default();
        let mut ctx = PassContext::new(&mut state, &mut engine, DataMask::MAG_NEW);
        registry.run_pass(&mut ctx).unwrap();
        assert!(state.compass_disturbance());
    }
}
