//! Chip-to-body orientation descriptors.
//!
//! A sensor die can be mounted on the board in any of 48 axis-aligned
//! ways: 6 axis permutations times 8 sign combinations. Each mounting is a
//! signed permutation matrix, packed into a scalar with three bits per row:
//!
//! | bits | meaning |
//! |------|---------|
//! | `0..2` | column of the non-zero entry (0, 1 or 2) |
//! | `2` | the entry is `-1` |
//!
//! Row 0 sits at shift 0, row 1 at shift 3, row 2 at shift 6, so the
//! identity matrix packs to `0x88`.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SensorError;
use crate::fixed::q30_mult;

/// A packed signed-permutation matrix.
///
/// # Example
///
/// ```
/// use motion_types::Orientation;
///
/// // x and y swapped, z flipped
/// let o: Orientation = "0,1,0,1,0,0,0,0,-1".parse().unwrap();
/// assert_eq!(o.apply([10, 20, 30]), [20, 10, -30]);
/// assert_eq!(Orientation::IDENTITY.scalar(), 0x88);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u16", into = "u16"))]
pub struct Orientation(u16);

impl Orientation {
    /// Chip axes coincide with body axes.
    pub const IDENTITY: Self = Self(0x88);

    /// Validates a packed descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::InvalidOrientation`] unless the three rows
    /// select three distinct columns and no other bits are set.
    pub const fn from_scalar(scalar: u16) -> Result<Self, SensorError> {
        if scalar >> 9 != 0 {
            return Err(SensorError::InvalidOrientation(scalar));
        }
        let c0 = scalar & 3;
        let c1 = (scalar >> 3) & 3;
        let c2 = (scalar >> 6) & 3;
        if c0 == 3 || c1 == 3 || c2 == 3 || c0 == c1 || c1 == c2 || c0 == c2 {
            return Err(SensorError::InvalidOrientation(scalar));
        }
        Ok(Self(scalar))
    }

    /// Packs a signed permutation matrix, rows first.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::InvalidMatrix`] if a row is not a signed unit
    /// vector or two rows share a column.
    pub fn from_matrix(matrix: [[i8; 3]; 3]) -> Result<Self, SensorError> {
        let mut scalar = 0_u16;
        for (r, row) in matrix.iter().enumerate() {
            let bits = match *row {
                [1, 0, 0] => 0,
                [-1, 0, 0] => 4,
                [0, 1, 0] => 1,
                [0, -1, 0] => 5,
                [0, 0, 1] => 2,
                [0, 0, -1] => 6,
                _ => return Err(SensorError::invalid_matrix(format!("{matrix:?}"))),
            };
            scalar |= bits << (3 * r);
        }
        Self::from_scalar(scalar).map_err(|_| SensorError::invalid_matrix(format!("{matrix:?}")))
    }

    /// Unpacks the descriptor into its matrix.
    #[must_use]
    pub fn to_matrix(self) -> [[i8; 3]; 3] {
        let mut matrix = [[0_i8; 3]; 3];
        for (r, row) in matrix.iter_mut().enumerate() {
            let (col, negative) = self.row(r);
            row[col] = if negative { -1 } else { 1 };
        }
        matrix
    }

    /// Packed scalar form.
    #[must_use]
    pub const fn scalar(self) -> u16 {
        self.0
    }

    /// All 48 valid descriptors, in ascending scalar order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0_u16..512).filter_map(|s| Self::from_scalar(s).ok())
    }

    /// Column and sign selected by row `r`.
    const fn row(self, r: usize) -> (usize, bool) {
        let bits = (self.0 >> (3 * r)) & 7;
        ((bits & 3) as usize, bits & 4 != 0)
    }

    /// Rotates a chip-frame vector into the body frame.
    #[must_use]
    pub fn apply(self, input: [i32; 3]) -> [i32; 3] {
        let mut out = [0; 3];
        for (r, slot) in out.iter_mut().enumerate() {
            let (col, negative) = self.row(r);
            *slot = if negative {
                input[col].wrapping_neg()
            } else {
                input[col]
            };
        }
        out
    }

    /// Rotates a chip-frame vector into the body frame and scales it by a
    /// q30 sensitivity.
    #[must_use]
    pub fn apply_with_scale(self, input: [i32; 3], sensitivity: i32) -> [i32; 3] {
        let mut out = [0; 3];
        for (r, slot) in out.iter_mut().enumerate() {
            let (col, negative) = self.row(r);
            let scaled = q30_mult(input[col], sensitivity);
            *slot = if negative {
                scaled.wrapping_neg()
            } else {
                scaled
            };
        }
        out
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TryFrom<u16> for Orientation {
    type Error = SensorError;

    fn try_from(scalar: u16) -> Result<Self, Self::Error> {
        Self::from_scalar(scalar)
    }
}

impl From<Orientation> for u16 {
    fn from(o: Orientation) -> Self {
        o.0
    }
}

/// Parses the kernel mounting-matrix text form: nine comma separated
/// integers, rows first.
impl FromStr for Orientation {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<i8> = s
            .trim()
            .split(',')
            .map(|v| v.trim().parse::<i8>())
            .collect::<Result<_, _>>()
            .map_err(|e| SensorError::invalid_matrix(format!("{s:?}: {e}")))?;
        if values.len() != 9 {
            return Err(SensorError::invalid_matrix(format!(
                "{s:?}: expected 9 entries, got {}",
                values.len()
            )));
        }
        let mut matrix = [[0_i8; 3]; 3];
        for (i, v) in values.into_iter().enumerate() {
            matrix[i / 3][i % 3] = v;
        }
        Self::from_matrix(matrix)
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.to_matrix();
        write!(
            f,
            "{},{},{},{},{},{},{},{},{}",
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2]
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fixed::ONE_Q30;
    use proptest::prelude::*;

    #[test]
    fn identity_is_0x88() {
        let o = Orientation::from_matrix([[1, 0, 0], [0, 1, 0], [0, 0, 1]]).unwrap();
        assert_eq!(o, Orientation::IDENTITY);
        assert_eq!(o.scalar(), 136);
        assert_eq!(o.apply([1, 2, 3]), [1, 2, 3]);
    }

    #[test]
    fn exactly_48_descriptors() {
        let all: Vec<_> = Orientation::all().collect();
        assert_eq!(all.len(), 48);
        for o in all {
            assert_eq!(Orientation::from_matrix(o.to_matrix()).unwrap(), o);
            assert_eq!(o.to_string().parse::<Orientation>().unwrap(), o);
        }
    }

    #[test]
    fn rejects_repeated_column() {
        assert!(Orientation::from_matrix([[1, 0, 0], [1, 0, 0], [0, 0, 1]]).is_err());
        assert!(Orientation::from_scalar(0).is_err());
        assert!(Orientation::from_scalar(0x88 | 0x200).is_err());
    }

    #[test]
    fn rejects_non_unit_rows() {
        assert!(Orientation::from_matrix([[2, 0, 0], [0, 1, 0], [0, 0, 1]]).is_err());
        assert!(Orientation::from_matrix([[1, 1, 0], [0, 1, 0], [0, 0, 1]]).is_err());
        assert!(Orientation::from_matrix([[0, 0, 0], [0, 1, 0], [0, 0, 1]]).is_err());
    }

    #[test]
    fn parse_mounting_matrix() {
        let o: Orientation = " -1, 0, 0, 0,-1, 0, 0, 0, 1\n".parse().unwrap();
        assert_eq!(o.apply([5, 6, 7]), [-5, -6, 7]);
        assert!("1,0,0,0,1,0".parse::<Orientation>().is_err());
        assert!("1,0,0,0,1,0,0,0,x".parse::<Orientation>().is_err());
    }

    #[test]
    fn apply_with_unit_scale_matches_apply() {
        let o: Orientation = "0,0,1,-1,0,0,0,1,0".parse().unwrap();
        assert_eq!(o.apply_with_scale([3, 4, 5], ONE_Q30), o.apply([3, 4, 5]));
        assert_eq!(o.apply([3, 4, 5]), [5, -3, 4]);
    }

    #[test]
    fn apply_with_scale_uses_q30() {
        let scaled = Orientation::IDENTITY.apply_with_scale([1 << 16, 0, -(1 << 16)], ONE_Q30 / 4);
        assert_eq!(scaled, [1 << 14, 0, -(1 << 14)]);
    }

    proptest! {
        #[test]
        fn apply_preserves_magnitudes(idx in 0_usize..48, v in prop::array::uniform3(-1_000_000_i32..1_000_000)) {
            let o = Orientation::all().nth(idx).unwrap();
            let out = o.apply(v);
            let mut a: Vec<i32> = v.iter().map(|x| x.abs()).collect();
            let mut b: Vec<i32> = out.iter().map(|x| x.abs()).collect();
            a.sort_unstable();
            b.sort_unstable();
            prop_assert_eq!(a, b);
        }
    }
}
