use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use ndarray::Array3;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A meson field block indexed by (time, left mode, right mode).
pub type MesonFieldMatrix = Array3<Complex64>;

/// A contiguous, half-open block of time slices.
pub type TimeSlice = Range<usize>;

/// Whether a diagram leg is built from the low-mode (eigenvector) subspace or
/// from the stochastic high-mode complement.
///
/// `High` orders before `Low`, so sorted leg strings match the lexicographic
/// order of their `H`/`L` spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LegMode {
    High,
    Low,
}

impl LegMode {
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            LegMode::High => 'H',
            LegMode::Low => 'L',
        }
    }

    pub fn from_char(c: char) -> Result<Self> {
        match c {
            'H' => Ok(LegMode::High),
            'L' => Ok(LegMode::Low),
            _ => Err(Error::Value(format!(
                "leg mode must be 'H' or 'L', got '{c}'"
            ))),
        }
    }
}

/// An assignment of leg modes to the legs of a diagram, e.g. `LHH`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permutation(Vec<LegMode>);

impl Permutation {
    #[must_use]
    pub fn new(modes: Vec<LegMode>) -> Self {
        Self(modes)
    }

    #[inline]
    #[must_use]
    pub fn modes(&self) -> &[LegMode] {
        &self.0
    }

    /// The number of legs.
    #[inline]
    #[must_use]
    pub fn npoint(&self) -> usize {
        self.0.len()
    }

    /// The number of legs in the low-mode subspace.
    #[must_use]
    pub fn low_count(&self) -> usize {
        self.0.iter().filter(|m| **m == LegMode::Low).count()
    }

    /// The permutation key, formed by concatenating every cyclically adjacent
    /// pair of leg modes.
    ///
    /// # Examples
    /// ```
    /// # use a2a_contract::types::Permutation;
    /// let perm: Permutation = "LH".parse().unwrap();
    /// assert_eq!(perm.key(), "LHHL");
    /// let perm: Permutation = "LHH".parse().unwrap();
    /// assert_eq!(perm.key(), "LHHHHL");
    /// ```
    #[must_use]
    pub fn key(&self) -> String {
        let n = self.0.len();
        (0..n)
            .flat_map(|i| [self.0[i].as_char(), self.0[(i + 1) % n].as_char()])
            .collect()
    }
}

impl FromStr for Permutation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.chars()
            .map(LegMode::from_char)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for mode in &self.0 {
            write!(f, "{}", mode.as_char())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_key_two_point() {
        let lh: Permutation = "LH".parse().unwrap();
        let hl: Permutation = "HL".parse().unwrap();
        assert_eq!(lh.key(), "LHHL");
        assert_eq!(hl.key(), "HLLH");
        assert_ne!(lh.key(), hl.key());
    }

    #[test]
    fn test_permutation_key_uniform() {
        let perm: Permutation = "LLLL".parse().unwrap();
        assert_eq!(perm.key(), "LLLLLLLL");
        let perm: Permutation = "HH".parse().unwrap();
        assert_eq!(perm.key(), "HHHH");
    }

    #[test]
    fn test_permutation_roundtrip_display() {
        let perm: Permutation = "HLHL".parse().unwrap();
        assert_eq!(perm.to_string(), "HLHL");
        assert_eq!(perm.npoint(), 4);
        assert_eq!(perm.low_count(), 2);
    }

    #[test]
    fn test_permutation_invalid_char() {
        assert!(matches!("LX".parse::<Permutation>(), Err(Error::Value(_))));
    }

    #[test]
    fn test_leg_mode_order() {
        assert!(LegMode::High < LegMode::Low);
    }
}
