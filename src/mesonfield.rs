//! Sources of meson field blocks.
use std::path::Path;

use log::info;
use ndarray::{s, Array1};
use num_complex::Complex64;

use crate::error::{Error, Result};
use crate::io::{read_eigenvalues, read_meson_field};
use crate::types::{MesonFieldMatrix, TimeSlice};

pub mod loader;

/// Loads meson field blocks. The streaming loader is generic over this trait
/// so that the file backend can be swapped out.
pub trait MesonFieldSource {
    /// Loads the time slices `times` of the meson field stored in `file`.
    fn load(&self, file: &Path, times: &TimeSlice) -> Result<MesonFieldMatrix>;
}

/// Parses a mass label such as `"01"` into the bare quark mass `0.01`.
pub fn parse_mass(label: &str) -> Result<f64> {
    if label.is_empty() || !label.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Config(format!(
            "mass label must be a non-empty digit string, got `{label}`"
        )));
    }
    format!("0.{label}")
        .parse()
        .map_err(|e| Error::Config(format!("invalid mass label `{label}`: {e}")))
}

/// Reweights low modes computed at one quark mass to a different mass.
///
/// Each eigenvalue `λ` contributes the mode pair `(λ, -λ)`; the right mode
/// `2k` is scaled by `(f·m_old + iλ_k) / (f·m_new + iλ_k)` and mode `2k + 1`
/// by its conjugate, where `f` is 2 for MILC mass conventions and 1 otherwise.
#[derive(Debug, Clone)]
pub struct MassShift {
    old_mass: f64,
    new_mass: f64,
    evals: Array1<f64>,
    milc_mass: bool,
}

impl MassShift {
    /// Creates a mass shift from squared eigenvalues as they are stored on
    /// disk.
    #[must_use]
    pub fn new(old_mass: f64, new_mass: f64, squared_evals: &Array1<f64>, milc_mass: bool) -> Self {
        Self {
            old_mass,
            new_mass,
            evals: squared_evals.mapv(f64::sqrt),
            milc_mass,
        }
    }

    /// Creates a mass shift with eigenvalues read from `evalfile`.
    pub fn from_file(evalfile: &Path, old_mass: f64, new_mass: f64, milc_mass: bool) -> Result<Self> {
        let evals = read_eigenvalues(evalfile)?;
        Ok(Self::new(old_mass, new_mass, &evals, milc_mass))
    }

    /// The scale factor of every right mode, twice as many as eigenvalues.
    #[must_use]
    pub fn scaling(&self) -> Array1<Complex64> {
        let factor = if self.milc_mass { 2.0 } else { 1.0 };
        let old = factor * self.old_mass;
        let new = factor * self.new_mass;
        self.evals
            .iter()
            .flat_map(|&lambda| {
                let scale = Complex64::new(old, lambda) / Complex64::new(new, lambda);
                [scale, scale.conj()]
            })
            .collect()
    }

    /// Rescales `matrix` along its right-mode axis.
    pub fn apply(&self, matrix: &mut MesonFieldMatrix) -> Result<()> {
        let right = matrix.shape()[2];
        let scaling = self.scaling();
        if right > scaling.len() {
            return Err(Error::Format(format!(
                "meson field has {right} right modes, but only {} eigenvalues are available",
                self.evals.len()
            )));
        }
        *matrix *= &scaling.slice(s![..right]);
        Ok(())
    }
}

/// Reads meson fields from HDF5 files, optionally truncating the mode ranges
/// and shifting the mass.
#[derive(Debug, Clone, Default)]
pub struct Hdf5MesonFieldSource {
    left_max: Option<usize>,
    right_max: Option<usize>,
    mass_shift: Option<MassShift>,
}

impl Hdf5MesonFieldSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `left_max` left modes and `right_max` right modes.
    #[must_use]
    pub fn with_truncation(mut self, left_max: Option<usize>, right_max: Option<usize>) -> Self {
        self.left_max = left_max;
        self.right_max = right_max;
        self
    }

    #[must_use]
    pub fn with_mass_shift(mut self, mass_shift: MassShift) -> Self {
        self.mass_shift = Some(mass_shift);
        self
    }
}

impl MesonFieldSource for Hdf5MesonFieldSource {
    fn load(&self, file: &Path, times: &TimeSlice) -> Result<MesonFieldMatrix> {
        let mut matrix = read_meson_field(file, times, self.left_max, self.right_max)?;
        if let Some(shift) = &self.mass_shift {
            let convention = if shift.milc_mass { "2*" } else { "" };
            info!(file:% = file.display(); "Shifting mass from {convention}{} to {convention}{}", shift.old_mass, shift.new_mass);
            shift.apply(&mut matrix)?;
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use float_cmp::assert_approx_eq;
    use ndarray::Array3;

    use crate::io::{write_eigenvalues, write_meson_field};

    #[test]
    fn test_parse_mass() {
        assert_approx_eq!(f64, parse_mass("01").unwrap(), 0.01);
        assert_approx_eq!(f64, parse_mass("0024").unwrap(), 0.0024);
        assert!(matches!(parse_mass(""), Err(Error::Config(_))));
        assert!(matches!(parse_mass("0.1"), Err(Error::Config(_))));
    }

    #[test]
    fn test_scaling_pairs_are_conjugate() {
        let shift = MassShift::new(0.01, 0.02, &Array1::from(vec![4.0, 9.0]), false);
        let scaling = shift.scaling();
        assert_eq!(scaling.len(), 4);

        let expected = Complex64::new(0.01, 2.0) / Complex64::new(0.02, 2.0);
        assert_approx_eq!(f64, scaling[0].re, expected.re);
        assert_approx_eq!(f64, scaling[0].im, expected.im);
        assert_eq!(scaling[1], scaling[0].conj());

        let expected = Complex64::new(0.01, 3.0) / Complex64::new(0.02, 3.0);
        assert_approx_eq!(f64, scaling[2].re, expected.re);
        assert_approx_eq!(f64, scaling[2].im, expected.im);
    }

    #[test]
    fn test_scaling_milc_convention() {
        let milc = MassShift::new(0.01, 0.02, &Array1::from(vec![1.0]), true);
        let plain = MassShift::new(0.02, 0.04, &Array1::from(vec![1.0]), false);
        assert_eq!(milc.scaling(), plain.scaling());
    }

    #[test]
    fn test_equal_masses_are_identity() {
        let shift = MassShift::new(0.03, 0.03, &Array1::from(vec![1.0, 2.0]), true);
        let mut matrix = Array3::from_elem((2, 3, 4), Complex64::new(1.5, -0.5));
        let reference = matrix.clone();
        shift.apply(&mut matrix).unwrap();
        for (a, b) in matrix.iter().zip(reference.iter()) {
            assert_approx_eq!(f64, a.re, b.re);
            assert_approx_eq!(f64, a.im, b.im);
        }
    }

    #[test]
    fn test_apply_scales_right_modes_only() {
        let shift = MassShift::new(0.01, 0.05, &Array1::from(vec![0.25]), false);
        let mut matrix = Array3::from_elem((1, 3, 2), Complex64::ONE);
        shift.apply(&mut matrix).unwrap();
        let scaling = shift.scaling();
        for l in 0..3 {
            assert_eq!(matrix[[0, l, 0]], scaling[0]);
            assert_eq!(matrix[[0, l, 1]], scaling[1]);
        }
    }

    #[test]
    fn test_apply_too_few_eigenvalues() {
        let shift = MassShift::new(0.01, 0.05, &Array1::from(vec![0.25]), false);
        let mut matrix = Array3::from_elem((1, 1, 3), Complex64::ONE);
        assert!(matches!(shift.apply(&mut matrix), Err(Error::Format(_))));
    }

    #[test]
    fn test_hdf5_source_with_mass_shift() {
        let dir = tempfile::tempdir().unwrap();
        let mf = dir.path().join("mf.h5");
        let evalfile = dir.path().join("evals.h5");
        write_meson_field(&mf, "meson", &Array3::from_elem((4, 4, 4), Complex64::ONE)).unwrap();
        write_eigenvalues(&evalfile, &Array1::from(vec![1.0, 4.0])).unwrap();

        let shift = MassShift::from_file(&evalfile, 0.01, 0.02, true).unwrap();
        let scaling = shift.scaling();
        let source = Hdf5MesonFieldSource::new()
            .with_truncation(Some(2), Some(4))
            .with_mass_shift(shift);

        let matrix = source.load(&mf, &(1..3)).unwrap();
        assert_eq!(matrix.shape(), &[2, 2, 4]);
        for r in 0..4 {
            assert_approx_eq!(f64, matrix[[1, 1, r]].re, scaling[r].re);
            assert_approx_eq!(f64, matrix[[1, 1, r]].im, scaling[r].im);
        }
    }
}
