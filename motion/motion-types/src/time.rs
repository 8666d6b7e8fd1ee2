//! Monotonic time for sensor samples.
//!
//! Kernel input events carry a monotonic nanosecond clock. Drivers that
//! cannot fit 64 bits into one event value split it into two 32-bit halves,
//! which [`Timestamp::from_halves`] reassembles.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Monotonic timestamp in nanoseconds.
///
/// # Example
///
/// ```
/// use motion_types::{Duration, Timestamp};
///
/// let t0 = Timestamp::from_millis(1_000);
/// let t1 = t0 + Duration::from_millis(5);
/// assert_eq!(t1.saturating_since(t0), Duration::from_millis(5));
/// assert_eq!(t0.saturating_since(t1), Duration::ZERO);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Timestamp {
    nanos: u64,
}

impl Timestamp {
    /// The zero timestamp, used for channels that never produced a sample.
    pub const ZERO: Self = Self { nanos: 0 };

    /// Creates a timestamp from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Creates a timestamp from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self {
            nanos: millis.saturating_mul(1_000_000),
        }
    }

    /// Reassembles a timestamp split across two 32-bit event values.
    ///
    /// ```
    /// use motion_types::Timestamp;
    ///
    /// let ts = Timestamp::from_halves(0x1, 0x8000_0000_u32 as i32);
    /// assert_eq!(ts.as_nanos(), 0x1_8000_0000);
    /// ```
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn from_halves(high: i32, low: i32) -> Self {
        let hi = high as u32 as u64;
        let lo = low as u32 as u64;
        Self {
            nanos: (hi << 32) | lo,
        }
    }

    /// Returns the timestamp as nanoseconds.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.nanos
    }

    /// Returns the timestamp as seconds (floating point).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_secs_f64(self) -> f64 {
        self.nanos as f64 / 1e9
    }

    /// Checks if this is the zero timestamp.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.nanos == 0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is later.
    #[must_use]
    pub const fn saturating_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(earlier.nanos))
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self {
            nanos: self.nanos.saturating_add(rhs.as_nanos()),
        }
    }
}

/// A span of time with nanosecond precision.
///
/// Used for sampling periods and poll timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Duration {
    nanos: u64,
}

impl Duration {
    /// The zero duration.
    pub const ZERO: Self = Self { nanos: 0 };

    /// Creates a duration from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Creates a duration from microseconds.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self {
            nanos: micros.saturating_mul(1_000),
        }
    }

    /// Creates a duration from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self {
            nanos: millis.saturating_mul(1_000_000),
        }
    }

    /// Returns the duration as nanoseconds.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.nanos
    }

    /// Returns the duration as whole microseconds.
    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.nanos / 1_000
    }

    /// Returns the duration as whole milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.nanos / 1_000_000
    }

    /// Returns the duration as seconds (floating point).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_secs_f64(self) -> f64 {
        self.nanos as f64 / 1e9
    }

    /// Rate in hertz for a sampling period, or `None` for a zero period.
    #[must_use]
    pub const fn as_hz(self) -> Option<u64> {
        if self.nanos == 0 {
            None
        } else {
            Some(1_000_000_000 / self.nanos)
        }
    }

    /// Checks if this is a zero duration.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.nanos == 0
    }
}

impl From<Duration> for std::time::Duration {
    fn from(d: Duration) -> Self {
        Self::from_nanos(d.nanos)
    }
}
