//! Reading meson fields and eigenvalues from HDF5 and writing pickled
//! correlators.
use std::fs;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

use hdf5::{File, H5Type};
use log::debug;
use ndarray::{s, Array1, Array3};
use num_complex::Complex64;
use serde::Serialize;
use serde_pickle::SerOptions;

use crate::error::{Error, Result};
use crate::types::{MesonFieldMatrix, TimeSlice};

/// Name of the meson field dataset inside the top-level group.
pub const MESON_DATASET: &str = "a2aMatrix";

/// Locations of the eigenvalue dataset, in lookup order.
pub const EIGENVALUE_DATASETS: [&str; 2] = ["evals", "EigenValueFile/evals"];

/// Single precision complex number as stored on disk.
#[derive(H5Type, Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct StoredComplex {
    pub re: f32,
    pub im: f32,
}

impl From<StoredComplex> for Complex64 {
    fn from(value: StoredComplex) -> Self {
        Complex64::new(f64::from(value.re), f64::from(value.im))
    }
}

impl From<Complex64> for StoredComplex {
    fn from(value: Complex64) -> Self {
        Self {
            re: value.re as f32,
            im: value.im as f32,
        }
    }
}

fn open_file(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    Ok(File::open(path)?)
}

/// Reads the time slices `times` of the meson field in `path`, keeping at most
/// `left_max` left modes and `right_max` right modes. The single precision
/// data is promoted to double precision.
pub fn read_meson_field(
    path: &Path,
    times: &TimeSlice,
    left_max: Option<usize>,
    right_max: Option<usize>,
) -> Result<MesonFieldMatrix> {
    let start = Instant::now();
    let file = open_file(path)?;

    let mut groups = file.member_names()?;
    groups.sort();
    let group_name = groups.first().ok_or_else(|| {
        Error::Format(format!("{} has no top-level group", path.display()))
    })?;
    let dataset = file
        .group(group_name)
        .and_then(|group| group.dataset(MESON_DATASET))
        .map_err(|_| {
            Error::Format(format!(
                "{} has no dataset /{group_name}/{MESON_DATASET}",
                path.display()
            ))
        })?;

    let shape = dataset.shape();
    let &[nt, left, right] = shape.as_slice() else {
        return Err(Error::Format(format!(
            "expected a 3-dimensional meson field in {}, got shape {shape:?}",
            path.display()
        )));
    };
    if times.end > nt || times.start > times.end {
        return Err(Error::Value(format!(
            "time slices {times:?} out of range for {} with {nt} time slices",
            path.display()
        )));
    }
    let left = left_max.map_or(left, |max| max.min(left));
    let right = right_max.map_or(right, |max| max.min(right));

    let raw: Array3<StoredComplex> =
        dataset.read_slice(s![times.start..times.end, 0..left, 0..right])?;
    let matrix = raw.mapv(Complex64::from);

    debug!(file:% = path.display(), shape:? = matrix.shape(), seconds = start.elapsed().as_secs_f64(); "Loaded meson field");
    Ok(matrix)
}

/// Writes `data` as a meson field dataset below `group` into a new file.
pub fn write_meson_field(path: &Path, group: &str, data: &MesonFieldMatrix) -> Result<()> {
    let file = File::create(path)?;
    let group = file.create_group(group)?;
    let stored = data.mapv(StoredComplex::from);
    group
        .new_dataset_builder()
        .with_data(&stored)
        .create(MESON_DATASET)?;
    Ok(())
}

/// Reads the eigenvalue list from `path`, trying each of
/// [`EIGENVALUE_DATASETS`] in order.
pub fn read_eigenvalues(path: &Path) -> Result<Array1<f64>> {
    let file = open_file(path)?;
    for name in EIGENVALUE_DATASETS {
        if let Ok(dataset) = file.dataset(name) {
            return Ok(dataset.read_1d::<f64>()?);
        }
    }
    Err(Error::Format(format!(
        "{} contains none of the datasets {EIGENVALUE_DATASETS:?}",
        path.display()
    )))
}

/// Writes `evals` to the primary eigenvalue dataset of a new file.
pub fn write_eigenvalues(path: &Path, evals: &Array1<f64>) -> Result<()> {
    let file = File::create(path)?;
    file.new_dataset_builder()
        .with_data(evals)
        .create(EIGENVALUE_DATASETS[0])?;
    Ok(())
}

/// Pickles `value` into `path`, creating missing parent directories.
pub fn write_pickle<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let file = fs::File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_pickle::to_writer(&mut writer, value, SerOptions::default())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use float_cmp::assert_approx_eq;
    use ndarray::Array;

    fn ramp(shape: (usize, usize, usize)) -> MesonFieldMatrix {
        Array::from_shape_fn(shape, |(t, l, r)| {
            Complex64::new((100 * t + 10 * l + r) as f64, -(r as f64))
        })
    }

    #[test]
    fn test_read_meson_field_slice_and_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mf.h5");
        let data = ramp((6, 4, 4));
        write_meson_field(&path, "meson", &data).unwrap();

        let loaded = read_meson_field(&path, &(2..4), Some(3), Some(2)).unwrap();
        assert_eq!(loaded.shape(), &[2, 3, 2]);
        assert_eq!(loaded[[0, 0, 0]], Complex64::new(200.0, 0.0));
        assert_eq!(loaded[[1, 2, 1]], Complex64::new(321.0, -1.0));
    }

    #[test]
    fn test_read_meson_field_full_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mf.h5");
        let data = ramp((3, 2, 2));
        write_meson_field(&path, "meson", &data).unwrap();

        let loaded = read_meson_field(&path, &(0..3), None, Some(10)).unwrap();
        assert_eq!(loaded.shape(), data.shape());
        for (a, b) in loaded.iter().zip(data.iter()) {
            assert_approx_eq!(f64, a.re, b.re);
            assert_approx_eq!(f64, a.im, b.im);
        }
    }

    #[test]
    fn test_read_meson_field_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_meson_field(&dir.path().join("nope.h5"), &(0..1), None, None);
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_read_meson_field_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.h5");
        let file = File::create(&path).unwrap();
        file.create_group("meson").unwrap();
        drop(file);

        let result = read_meson_field(&path, &(0..1), None, None);
        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn test_read_meson_field_time_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mf.h5");
        write_meson_field(&path, "meson", &ramp((2, 2, 2))).unwrap();

        let result = read_meson_field(&path, &(1..3), None, None);
        assert!(matches!(result, Err(Error::Value(_))));
    }

    #[test]
    fn test_read_eigenvalues_fallback_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evals.h5");
        let file = File::create(&path).unwrap();
        let group = file.create_group("EigenValueFile").unwrap();
        group
            .new_dataset_builder()
            .with_data(&Array1::from(vec![1.0, 4.0]))
            .create("evals")
            .unwrap();
        drop(file);

        let evals = read_eigenvalues(&path).unwrap();
        assert_eq!(evals.to_vec(), vec![1.0, 4.0]);
    }

    #[test]
    fn test_read_eigenvalues_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evals.h5");
        File::create(&path).unwrap();

        assert!(matches!(read_eigenvalues(&path), Err(Error::Format(_))));
    }

    #[test]
    fn test_write_pickle_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/out.p");
        write_pickle(&path, &vec![1, 2, 3]).unwrap();

        let bytes = fs::read(&path).unwrap();
        let value: Vec<i32> = serde_pickle::from_slice(&bytes, Default::default()).unwrap();
        assert_eq!(value, vec![1, 2, 3]);
    }
}
