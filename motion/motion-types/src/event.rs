//! Output events handed to consumers.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::sensor::VirtualSensor;
use crate::status::Accuracy;
use crate::time::Timestamp;

/// One reading of a virtual sensor.
///
/// Only the first [`VirtualSensor::value_count`] entries of `values` are
/// meaningful; the rest are zero.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorEvent {
    /// Which virtual sensor produced the reading.
    pub sensor: VirtualSensor,
    /// Values in the sensor's physical unit.
    pub values: [f32; 4],
    /// Confidence in the values.
    pub accuracy: Accuracy,
    /// Time of the contributing sample.
    pub timestamp: Timestamp,
}

impl SensorEvent {
    /// Builds a three-axis event.
    #[must_use]
    pub const fn vector(
        sensor: VirtualSensor,
        xyz: [f32; 3],
        accuracy: Accuracy,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            sensor,
            values: [xyz[0], xyz[1], xyz[2], 0.0],
            accuracy,
            timestamp,
        }
    }

    /// The first three values.
    #[must_use]
    pub const fn xyz(&self) -> [f32; 3] {
        [self.values[0], self.values[1], self.values[2]]
    }

    /// The meaningful values for this sensor.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.values[..self.sensor.value_count()]
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn vector_event_pads_fourth_value() {
        let ev = SensorEvent::vector(
            VirtualSensor::Gravity,
            [1.0, 2.0, 3.0],
            Accuracy::Low,
            Timestamp::from_nanos(5),
        );
        assert_eq!(ev.as_slice().len(), 3);
        assert!(ev.values[3].abs() < f32::EPSILON);
        assert_eq!(ev.xyz(), [1.0, 2.0, 3.0]);
    }
}
