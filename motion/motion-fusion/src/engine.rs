//! The fusion engine seam.
//!
//! The math that turns calibrated samples into an attitude quaternion is
//! a black box to the rest of the stack. The coordinator owns one engine,
//! calls it as a stage during each pass, and hands its quaternion to the
//! output stage.

use motion_types::{DataMask, fixed::ONE_Q30};

use crate::error::{FusionError, Result};
use crate::state::FusionState;

/// An attitude estimator driven by fusion passes.
pub trait FusionEngine: Send {
    /// Engine name for logs.
    fn name(&self) -> &'static str;

    /// Consumes the samples that arrived in this pass.
    ///
    /// # Errors
    ///
    /// Implementations return [`FusionError::Stage`] when the samples cannot
    /// be used. The pass continues either way.
    fn update(&mut self, state: &mut FusionState, active: DataMask) -> Result<()>;

    /// Current attitude, q30, `[w, x, y, z]`, body to world.
    fn quaternion(&self) -> [i32; 4];

    /// Forgets the current attitude.
    fn reset(&mut self);

    /// Size of the persisted engine state in bytes.
    fn state_size(&self) -> usize;

    /// Appends the persisted engine state to `out`.
    fn save_state(&self, out: &mut Vec<u8>);

    /// Restores persisted engine state.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::CorruptRecord`] if `bytes` has the wrong size.
    fn load_state(&mut self, bytes: &[u8]) -> Result<()>;
}

/// An engine that reports a quaternion set from outside.
///
/// Useful on parts without on-board fusion and for driving the output
/// stage deterministically. Its persisted state is the quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedEngine {
    quaternion: [i32; 4],
    updates: u64,
}

impl Default for FixedEngine {
    fn default() -> Self {
        Self::new([ONE_Q30, 0, 0, 0])
    }
}

impl FixedEngine {
    /// Creates an engine reporting `quaternion`.
    #[must_use]
    pub const fn new(quaternion: [i32; 4]) -> Self {
        Self {
            quaternion,
            updates: 0,
        }
    }

    /// Replaces the reported quaternion.
    pub fn set_quaternion(&mut self, quaternion: [i32; 4]) {
        self.quaternion = quaternion;
    }

    /// Number of passes that reached this engine.
    #[must_use]
    pub const fn updates(&self) -> u64 {
        self.updates
    }
}

impl FusionEngine for FixedEngine {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn update(&mut self, _state: &mut FusionState, _active: DataMask) -> Result<()> {
        self.updates += 1;
        Ok(())
    }

    fn quaternion(&self) -> [i32; 4] {
        self.quaternion
    }

    fn reset(&mut self) {
        self.quaternion = [ONE_Q30, 0, 0, 0];
    }

    fn state_size(&self) -> usize {
        16
    }

    fn save_state(&self, out: &mut Vec<u8>) {
        for v in self.quaternion {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.state_size() {
            return Err(FusionError::corrupt_record(self.state_size(), bytes.len()));
        }
        for (slot, c) in self.quaternion.iter_mut().zip(bytes.chunks_exact(4)) {
            *slot = i32::from_le_bytes([c[0], c[1], c[2], c[3]]);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn fixed_engine_state_round_trip() {
        let engine = FixedEngine::new([1, -2, 3, -4]);
        let mut bytes = Vec::new();
        engine.save_state(&mut bytes);
        assert_eq!(bytes.len(), engine.state_size());

        let mut restored = FixedEngine::default();
        restored.load_state(&bytes).unwrap();
        assert_eq!(restored.quaternion(), [1, -2, 3, -4]);
    }

    #[test]
    fn fixed_engine_rejects_short_state() {
        let mut engine = FixedEngine::default();
        assert!(matches!(
            engine.load_state(&[0; 3]),
            Err(FusionError::CorruptRecord {
                expected: 16,
                actual: 3
            })
        ));
    }

    #[test]
    fn reset_returns_to_identity() {
        let mut engine = FixedEngine::new([0, ONE_Q30, 0, 0]);
        engine.reset();
        assert_eq!(engine.quaternion(), [ONE_Q30, 0, 0, 0]);
    }
}
