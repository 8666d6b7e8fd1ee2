//! Low-power accelerometer hysteresis.
//!
//! While only the accelerometer is in use, a device lying still does not
//! need fast polling. The window tracks the last N samples and the poll
//! period in force; once the device is judged stable it drops to the idle
//! period and arms hardware wake-on-motion, and it returns to the
//! consumer's period as soon as any axis moves.

use motion_types::Duration;
use tracing::debug;

use crate::params::LowPowerParams;

/// What the caller must do to the hardware after a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpaAction {
    /// Switch to the idle period and arm motion detection.
    Enter {
        /// The idle poll period.
        period: Duration,
        /// Motion detection threshold to write.
        motion_threshold: u8,
    },
    /// Disarm motion detection and restore the consumer's period.
    Exit {
        /// The requested accelerometer period.
        period: Duration,
    },
}

/// Ring buffer of recent accelerometer samples with running sums.
#[derive(Debug, Clone)]
pub struct AccelWindow {
    params: LowPowerParams,
    samples: Vec<[f32; 3]>,
    sum: [f32; 3],
    index: usize,
    full: bool,
    poll_period: Duration,
}

impl AccelWindow {
    /// Creates an empty window. `poll_period` is the period currently in
    /// force.
    #[must_use]
    pub fn new(params: LowPowerParams, poll_period: Duration) -> Self {
        let len = params.window.max(1);
        Self {
            params,
            samples: vec![[0.0; 3]; len],
            sum: [0.0; 3],
            index: 0,
            full: false,
            poll_period,
        }
    }

    /// Forgets all samples.
    pub fn reset(&mut self) {
        self.full = false;
        self.index = 0;
        self.sum = [0.0; 3];
    }

    /// Period currently in force.
    #[must_use]
    pub const fn poll_period(&self) -> Duration {
        self.poll_period
    }

    /// Records a period written to the hardware outside the window.
    pub fn set_poll_period(&mut self, period: Duration) {
        self.poll_period = period;
    }

    /// Whether the device is in idle low-power polling.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.poll_period == self.params.idle_period
    }

    /// Adds a sample in m/s² and decides whether the hardware must change
    /// mode. `requested` is the consumer's accelerometer period.
    pub fn update(&mut self, sample: [f32; 3], requested: Duration) -> Option<LpaAction> {
        let len = self.samples.len();
        if self.full {
            for (sum, old) in self.sum.iter_mut().zip(self.samples[self.index]) {
                *sum -= old;
            }
        }
        self.samples[self.index] = sample;
        for (sum, new) in self.sum.iter_mut().zip(sample) {
            *sum += new;
        }
        if self.index == len - 1 {
            self.full = true;
        }

        let stable = self.is_stable();
        self.index = (self.index + 1) % len;

        if stable {
            if self.is_idle() {
                return None;
            }
            debug!(
                period_ns = self.params.idle_period.as_nanos(),
                "Accel stable, entering low power"
            );
            self.poll_period = self.params.idle_period;
            Some(LpaAction::Enter {
                period: self.params.idle_period,
                motion_threshold: self.params.motion_threshold,
            })
        } else if self.poll_period == requested {
            None
        } else {
            debug!(period_ns = requested.as_nanos(), "Accel moving, leaving low power");
            self.reset();
            self.poll_period = requested;
            Some(LpaAction::Exit { period: requested })
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn is_stable(&self) -> bool {
        let threshold = self.params.threshold;
        let current = self.samples[self.index];

        if self.poll_period < self.params.default_poll_period {
            return false;
        }

        if self.is_idle() {
            let len = self.samples.len();
            let prev = self.samples[(self.index + len - 1) % len];
            return current
                .iter()
                .zip(prev)
                .all(|(c, p)| (c - p).abs() <= threshold);
        }

        if !self.full {
            return false;
        }
        let n = self.samples.len() as f32;
        current
            .iter()
            .zip(self.sum)
            .all(|(c, sum)| (n * c - sum).abs() <= n * threshold)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const REQUESTED: Duration = Duration::from_millis(60);
    const FLAT: [f32; 3] = [0.0, 0.0, 9.8];

    fn window() -> AccelWindow {
        AccelWindow::new(
            LowPowerParams::default().with_motion_threshold(3),
            REQUESTED,
        )
    }

    #[test]
    fn enters_low_power_after_full_stable_window() {
        let mut w = window();
        for _ in 0..9 {
            assert_eq!(w.update(FLAT, REQUESTED), None);
        }
        let action = w.update(FLAT, REQUESTED);
        assert_eq!(
            action,
            Some(LpaAction::Enter {
                period: Duration::from_millis(256),
                motion_threshold: 3,
            })
        );
        assert!(w.is_idle());

        // Stays idle while still.
        assert_eq!(w.update(FLAT, REQUESTED), None);
    }

    #[test]
    fn exits_on_motion_while_idle() {
        let mut w = window();
        for _ in 0..10 {
            w.update(FLAT, REQUESTED);
        }
        assert!(w.is_idle());

        let action = w.update([0.5, 0.0, 9.8], REQUESTED);
        assert_eq!(action, Some(LpaAction::Exit { period: REQUESTED }));
        assert!(!w.is_idle());
        assert_eq!(w.poll_period(), REQUESTED);
    }

    #[test]
    fn small_jitter_is_stable() {
        let mut w = window();
        for i in 0..10 {
            let jitter = if i % 2 == 0 { 0.05 } else { -0.05 };
            w.update([jitter, 0.0, 9.8], REQUESTED);
        }
        assert!(w.is_idle());
    }

    #[test]
    fn fast_polling_never_stable() {
        let fast = Duration::from_millis(20);
        let mut w = AccelWindow::new(LowPowerParams::default(), fast);
        for _ in 0..30 {
            assert_eq!(w.update(FLAT, fast), None);
        }
        assert!(!w.is_idle());
    }

    #[test]
    fn moving_device_restores_requested_period() {
        let mut w = AccelWindow::new(LowPowerParams::default(), Duration::from_millis(100));
        let action = w.update(FLAT, REQUESTED);
        assert_eq!(action, Some(LpaAction::Exit { period: REQUESTED }));
        assert_eq!(w.poll_period(), REQUESTED);
    }

    #[test]
    fn outlier_in_window_blocks_entry() {
        let mut w = window();
        w.update([3.0, 0.0, 9.8], REQUESTED);
        for _ in 0..9 {
            assert_eq!(w.update(FLAT, REQUESTED), None);
        }
        assert!(!w.is_idle());
    }
}
