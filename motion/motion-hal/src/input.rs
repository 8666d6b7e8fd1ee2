//! Decoding kernel input events into motion frames.

use motion_types::Timestamp;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Input event types the motion devices use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EventType {
    /// Frame separator.
    Syn,
    /// Relative axis.
    Rel,
    /// Absolute axis.
    Abs,
    /// Any other type.
    Other(u16),
}

impl EventType {
    /// Maps the kernel numeric type.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::Syn,
            2 => Self::Rel,
            3 => Self::Abs,
            other => Self::Other(other),
        }
    }
}

/// One kernel input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Event type.
    pub kind: EventType,
    /// Type-specific code.
    pub code: u16,
    /// Payload.
    pub value: i32,
    /// Kernel delivery time.
    pub timestamp: Timestamp,
}

impl InputEvent {
    /// Creates an event.
    #[must_use]
    pub const fn new(kind: EventType, code: u16, value: i32, timestamp: Timestamp) -> Self {
        Self {
            kind,
            code,
            value,
            timestamp,
        }
    }

    /// A relative-axis event.
    #[must_use]
    pub const fn rel(code: u16, value: i32) -> Self {
        Self::new(EventType::Rel, code, value, Timestamp::ZERO)
    }

    /// An absolute-axis event.
    #[must_use]
    pub const fn abs(code: u16, value: i32) -> Self {
        Self::new(EventType::Abs, code, value, Timestamp::ZERO)
    }

    /// A frame separator delivered at `timestamp`.
    #[must_use]
    pub const fn syn(timestamp: Timestamp) -> Self {
        Self::new(EventType::Syn, 0, 0, timestamp)
    }
}

/// Which codes carry which axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventCodes {
    /// Gyro x/y/z on relative axes. Default: 0, 1, 2
    pub gyro: [u16; 3],

    /// Accel x/y/z. Default: 3, 4, 5
    pub accel: [u16; 3],

    /// Event type carrying accel axes. Default: relative
    pub accel_type: EventType,

    /// Upper 32 bits of the sample time. Default: 9
    pub timestamp_high: u16,

    /// Lower 32 bits of the sample time. Default: 8
    pub timestamp_low: u16,
}

impl Default for EventCodes {
    fn default() -> Self {
        Self {
            gyro: [0, 1, 2],
            accel: [3, 4, 5],
            accel_type: EventType::Rel,
            timestamp_high: 9,
            timestamp_low: 8,
        }
    }
}

impl EventCodes {
    /// Codes for a stand-alone accelerometer reporting absolute axes.
    #[must_use]
    pub fn external_accel() -> Self {
        Self {
            accel: [0, 1, 2],
            accel_type: EventType::Abs,
            ..Self::default()
        }
    }
}

/// Axes collected between two frame separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionFrame {
    /// Gyro axes, if any gyro code was seen.
    pub gyro: Option<[i32; 3]>,
    /// Accel axes, if any accel code was seen.
    pub accel: Option<[i32; 3]>,
    /// Sample time.
    pub timestamp: Timestamp,
}

/// Stateful decoder. Axis values persist between frames, so a frame that
/// updates one axis reports the others at their last value.
#[derive(Debug, Clone, Default)]
pub struct MotionFrameDecoder {
    codes: EventCodes,
    gyro: [i32; 3],
    accel: [i32; 3],
    pending_gyro: bool,
    pending_accel: bool,
    time_high: i32,
    time_low: i32,
    has_time: bool,
}

impl MotionFrameDecoder {
    /// Creates a decoder for `codes`.
    #[must_use]
    pub fn new(codes: EventCodes) -> Self {
        Self {
            codes,
            ..Self::default()
        }
    }

    /// Feeds one event. Returns a frame on each separator.
    pub fn push(&mut self, event: InputEvent) -> Option<MotionFrame> {
        match event.kind {
            EventType::Syn => return Some(self.finish(event.timestamp)),
            EventType::Rel => {
                if let Some(axis) = self.codes.gyro.iter().position(|c| *c == event.code) {
                    self.gyro[axis] = event.value;
                    self.pending_gyro = true;
                    return None;
                }
                if event.code == self.codes.timestamp_high {
                    self.time_high = event.value;
                    self.has_time = true;
                    return None;
                }
                if event.code == self.codes.timestamp_low {
                    self.time_low = event.value;
                    self.has_time = true;
                    return None;
                }
            }
            EventType::Abs | EventType::Other(_) => {}
        }

        if event.kind == self.codes.accel_type {
            if let Some(axis) = self.codes.accel.iter().position(|c| *c == event.code) {
                self.accel[axis] = event.value;
                self.pending_accel = true;
                return None;
            }
        }

        debug!(kind = ?event.kind, code = event.code, "Unknown input event");
        None
    }

    fn finish(&mut self, delivered: Timestamp) -> MotionFrame {
        let frame = MotionFrame {
            gyro: self.pending_gyro.then_some(self.gyro),
            accel: self.pending_accel.then_some(self.accel),
            timestamp: if self.has_time {
                Timestamp::from_halves(self.time_high, self.time_low)
            } else {
                delivered
            },
        };
        self.pending_gyro = false;
        self.pending_accel = false;
        frame
    }
}
