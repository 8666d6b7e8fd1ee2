//! Fixed-point helpers.
//!
//! Calibrated sensor data is carried in q16 (one physical unit is `1 << 16`)
//! and quaternions in q30. Products are formed in 64 bits and truncated back
//! to 32 bits, wrapping on overflow, so that intermediate terms such as
//! `q29_mult(ONE_Q30, ONE_Q30)` behave exactly like 32-bit firmware math.

/// One unit in q16.
pub const ONE_Q16: i32 = 1 << 16;

/// One unit in q30.
pub const ONE_Q30: i32 = 1 << 30;

/// `2^-30`, for converting q30 values to floating point.
pub const Q30_TO_F32: f32 = 1.0 / 1_073_741_824.0;

/// Multiplies two q30 values.
///
/// ```
/// use motion_types::fixed::{q30_mult, ONE_Q30};
///
/// assert_eq!(q30_mult(ONE_Q30, 12_345), 12_345);
/// assert_eq!(q30_mult(ONE_Q30 / 2, 100), 50);
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn q30_mult(a: i32, b: i32) -> i32 {
    ((a as i64 * b as i64) >> 30) as i32
}

/// Multiplies two q30 values into q29 (twice the q30 product).
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn q29_mult(a: i32, b: i32) -> i32 {
    ((a as i64 * b as i64) >> 29) as i32
}

/// Converts a q16 value to floating point.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn q16_to_f32(value: i32) -> f32 {
    value as f32 / ONE_Q16 as f32
}
