//! Cyclic contraction of meson field blocks.
use itertools::Itertools;
use log::trace;
use ndarray::{Array3, ArrayD, Axis, CowArray, Ix3, IxDyn, Slice};
use num_complex::Complex64;

use crate::error::{Error, Result};
use crate::mesonfield::loader::LoadedField;
use crate::types::MesonFieldMatrix;

pub mod time_average;

pub use time_average::time_average;

/// The open legs used when none are requested: the first and the last.
#[must_use]
pub fn default_open_indices(npoint: usize) -> Vec<usize> {
    vec![0, npoint.saturating_sub(1)]
}

fn validate(matrices: &[&MesonFieldMatrix], open_indices: &[usize]) -> Result<()> {
    let npoint = matrices.len();
    if !(2..=4).contains(&npoint) {
        return Err(Error::Value(format!(
            "expected 2 to 4 meson fields, got {npoint}"
        )));
    }
    if open_indices.len() > npoint {
        return Err(Error::Value(format!(
            "{} open indices exceed the diagram degree {npoint}",
            open_indices.len()
        )));
    }
    if let Some(leg) = open_indices.iter().find(|&&leg| leg >= npoint) {
        return Err(Error::Value(format!(
            "open index {leg} out of range for {npoint} legs"
        )));
    }
    if !open_indices.iter().all_unique() {
        return Err(Error::Value(format!(
            "open indices {open_indices:?} contain duplicates"
        )));
    }
    for (k, (a, b)) in matrices.iter().circular_tuple_windows().enumerate() {
        if a.shape()[2] != b.shape()[1] {
            return Err(Error::Value(format!(
                "right extent {} of leg {k} does not match left extent {} of leg {}",
                a.shape()[2],
                b.shape()[1],
                (k + 1) % npoint
            )));
        }
    }
    Ok(())
}

/// Contracts the cyclic chain `tr(M_0[t_0] M_1[t_1] ... M_{n-1}[t_{n-1}])`.
///
/// The right mode index of every leg is summed against the left mode index of
/// the next leg, the last leg closing back on the first. The time axes of the
/// legs listed in `open_indices` are kept, in that order; all other time axes
/// are summed.
///
/// # Examples
/// ```
/// # use a2a_contract::contraction::contract;
/// # use ndarray::Array3;
/// # use num_complex::Complex64;
/// let a = Array3::from_elem((3, 2, 2), Complex64::new(1.0, 0.0));
/// let c = contract(&[&a, &a], &[0, 1]).unwrap();
/// assert_eq!(c.shape(), &[3, 3]);
/// assert_eq!(c[[0, 2]], Complex64::new(4.0, 0.0));
/// ```
pub fn contract(
    matrices: &[&MesonFieldMatrix],
    open_indices: &[usize],
) -> Result<ArrayD<Complex64>> {
    validate(matrices, open_indices)?;

    // Summed time axes are collapsed up front so that they never enter the
    // matrix products.
    let legs: Vec<CowArray<'_, Complex64, Ix3>> = matrices
        .iter()
        .enumerate()
        .map(|(leg, m)| {
            if open_indices.contains(&leg) {
                CowArray::from(m.view())
            } else {
                CowArray::from(m.sum_axis(Axis(0)).insert_axis(Axis(0)))
            }
        })
        .collect();

    // `chain` holds the product of the legs so far with the open time axes
    // flattened into its first axis.
    let mut chain: Array3<Complex64> = legs[0].to_owned();
    for leg in &legs[1..] {
        let (p, left, inner) = chain.dim();
        let (t, _, right) = leg.dim();
        let rhs = leg.view().permuted_axes([1, 0, 2]);
        let rhs = rhs.to_shape((inner, t * right))?;
        let product = {
            let lhs = chain.to_shape((p * left, inner))?;
            lhs.dot(&rhs)
        };
        chain = product
            .to_shape((p, left, t, right))?
            .permuted_axes([0, 2, 1, 3])
            .to_shape((p * t, left, right))?
            .into_owned();
    }

    let traced = chain
        .outer_iter()
        .map(|m| m.diag().sum())
        .collect::<ndarray::Array1<_>>();

    let mut sorted_open = open_indices.to_vec();
    sorted_open.sort_unstable();
    let extents = sorted_open
        .iter()
        .map(|&leg| matrices[leg].shape()[0])
        .collect_vec();
    let tensor = traced.into_shape_with_order(extents)?;

    let axes = open_indices
        .iter()
        .map(|leg| sorted_open.binary_search(leg).unwrap_or_default())
        .collect_vec();
    Ok(tensor
        .permuted_axes(axes)
        .as_standard_layout()
        .into_owned())
}

/// Contracts every step of `blocks` and adds the results into an
/// `nt^len(open_indices)` tensor at the time offsets of the open legs.
///
/// With `mirror`, a two-index block at `(a, b)` with `a != b` is also added
/// transposed at `(b, a)`.
pub fn accumulate_blocks<I>(
    blocks: I,
    open_indices: &[usize],
    nt: usize,
    mirror: bool,
) -> Result<ArrayD<Complex64>>
where
    I: IntoIterator<Item = Result<Vec<LoadedField>>>,
{
    if mirror && open_indices.len() != 2 {
        return Err(Error::Value(format!(
            "mirroring needs exactly two open indices, got {open_indices:?}"
        )));
    }

    let mut accumulator = ArrayD::zeros(IxDyn(&vec![nt; open_indices.len()]));
    for step in blocks {
        let step = step?;
        let matrices = step.iter().map(|(_, m)| &**m).collect_vec();
        let block = contract(&matrices, open_indices)?;
        let offsets = open_indices
            .iter()
            .map(|&leg| step[leg].0.clone())
            .collect_vec();
        trace!(offsets:?; "Contracted block");

        let mut target =
            accumulator.slice_each_axis_mut(|ax| Slice::from(offsets[ax.axis.index()].clone()));
        target += &block;

        if mirror && offsets[0] != offsets[1] {
            let mut target = accumulator
                .slice_each_axis_mut(|ax| Slice::from(offsets[1 - ax.axis.index()].clone()));
            target += &block.t();
        }
    }
    Ok(accumulator)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::rc::Rc;

    use float_cmp::assert_approx_eq;
    use ndarray::{Array, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(rng: &mut StdRng, shape: (usize, usize, usize)) -> MesonFieldMatrix {
        Array::from_shape_simple_fn(shape, || Complex64::new(rng.gen(), rng.gen()))
    }

    fn assert_close(a: &ArrayD<Complex64>, b: &ArrayD<Complex64>) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_approx_eq!(f64, x.re, y.re, epsilon = 1e-10);
            assert_approx_eq!(f64, x.im, y.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_two_point_against_loops() {
        let mut rng = StdRng::seed_from_u64(42);
        let a = random_matrix(&mut rng, (4, 3, 5));
        let b = random_matrix(&mut rng, (4, 5, 3));

        let mut reference = Array2::zeros((4, 4));
        for ((i, j), value) in reference.indexed_iter_mut() {
            for m in 0..3 {
                for n in 0..5 {
                    *value += a[[i, m, n]] * b[[j, n, m]];
                }
            }
        }

        let result = contract(&[&a, &b], &[0, 1]).unwrap();
        assert_close(&result, &reference.into_dyn());

        let swapped = contract(&[&a, &b], &[1, 0]).unwrap();
        assert_close(&swapped, &result.t().to_owned());
    }

    #[test]
    fn test_three_point_against_loops() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = random_matrix(&mut rng, (2, 2, 3));
        let b = random_matrix(&mut rng, (3, 3, 4));
        let c = random_matrix(&mut rng, (4, 4, 2));

        let mut full = Array::zeros((2, 3, 4));
        for ((i, j, k), value) in full.indexed_iter_mut() {
            for m in 0..2 {
                for n in 0..3 {
                    for o in 0..4 {
                        *value += a[[i, m, n]] * b[[j, n, o]] * c[[k, o, m]];
                    }
                }
            }
        }

        let result = contract(&[&a, &b, &c], &[0, 1, 2]).unwrap();
        assert_close(&result, &full.clone().into_dyn());

        let open_outer = contract(&[&a, &b, &c], &[2, 0]).unwrap();
        let reference = full.sum_axis(Axis(1)).t().to_owned();
        assert_close(&open_outer, &reference.into_dyn());
    }

    #[test]
    fn test_four_point_against_loops() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = random_matrix(&mut rng, (2, 2, 2));
        let b = random_matrix(&mut rng, (3, 2, 3));
        let c = random_matrix(&mut rng, (2, 3, 2));
        let d = random_matrix(&mut rng, (3, 2, 2));

        let mut reference = Array2::zeros((2, 2));
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..2 {
                    for l in 0..3 {
                        for m in 0..2 {
                            for n in 0..2 {
                                for o in 0..3 {
                                    for p in 0..2 {
                                        reference[[i, k]] += a[[i, m, n]]
                                            * b[[j, n, o]]
                                            * c[[k, o, p]]
                                            * d[[l, p, m]];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let result = contract(&[&a, &b, &c, &d], &[0, 2]).unwrap();
        assert_close(&result, &reference.into_dyn());
    }

    #[test]
    fn test_identity_chain_is_mode_count() {
        let mut identity = Array3::zeros((3, 4, 4));
        for t in 0..3 {
            for m in 0..4 {
                identity[[t, m, m]] = Complex64::ONE;
            }
        }
        let result = contract(&[&identity, &identity, &identity], &[0, 2]).unwrap();
        assert_eq!(result.shape(), &[3, 3]);
        for value in &result {
            assert_approx_eq!(f64, value.re, 12.0);
            assert_approx_eq!(f64, value.im, 0.0);
        }
    }

    #[test]
    fn test_fully_summed_is_scalar() {
        let a = Array3::from_elem((2, 1, 1), Complex64::new(0.0, 1.0));
        let result = contract(&[&a, &a], &[]).unwrap();
        assert_eq!(result.ndim(), 0);
        assert_approx_eq!(f64, result.first().unwrap().re, -4.0);
    }

    #[test]
    fn test_invalid_inputs() {
        let a = Array3::<Complex64>::zeros((2, 2, 2));
        let b = Array3::<Complex64>::zeros((2, 3, 2));
        assert!(matches!(contract(&[&a], &[0]), Err(Error::Value(_))));
        assert!(matches!(contract(&[&a, &a, &a, &a, &a], &[0]), Err(Error::Value(_))));
        assert!(matches!(contract(&[&a, &a], &[0, 2]), Err(Error::Value(_))));
        assert!(matches!(contract(&[&a, &a], &[1, 1]), Err(Error::Value(_))));
        assert!(matches!(contract(&[&a, &a], &[0, 1, 0]), Err(Error::Value(_))));
        assert!(matches!(contract(&[&a, &b], &[0, 1]), Err(Error::Value(_))));
    }

    fn field(times: std::ops::Range<usize>, value: f64) -> LoadedField {
        let matrix = Array3::from_elem((times.len(), 1, 1), Complex64::new(value, 0.0));
        (times, Rc::new(matrix))
    }

    #[test]
    fn test_accumulate_blocks_places_offsets() {
        let steps = vec![
            Ok(vec![field(0..2, 1.0), field(0..2, 2.0)]),
            Ok(vec![field(0..2, 1.0), field(2..4, 3.0)]),
        ];
        let result = accumulate_blocks(steps, &[0, 1], 4, false).unwrap();
        assert_eq!(result[[1, 1]], Complex64::new(2.0, 0.0));
        assert_eq!(result[[0, 3]], Complex64::new(3.0, 0.0));
        assert_eq!(result[[3, 0]], Complex64::ZERO);
    }

    #[test]
    fn test_accumulate_blocks_mirror() {
        let steps = vec![
            Ok(vec![field(0..2, 1.0), field(0..2, 2.0)]),
            Ok(vec![field(0..2, 1.0), field(2..4, 3.0)]),
        ];
        let result = accumulate_blocks(steps, &[0, 1], 4, true).unwrap();
        assert_eq!(result[[1, 1]], Complex64::new(2.0, 0.0));
        assert_eq!(result[[0, 3]], Complex64::new(3.0, 0.0));
        assert_eq!(result[[3, 0]], Complex64::new(3.0, 0.0));
    }

    #[test]
    fn test_accumulate_blocks_sums_repeated_offsets() {
        let steps = vec![
            Ok(vec![field(0..1, 1.0), field(0..1, 2.0), field(0..1, 1.0)]),
            Ok(vec![field(0..1, 1.0), field(1..2, 5.0), field(0..1, 1.0)]),
        ];
        let result = accumulate_blocks(steps, &[0, 2], 2, false).unwrap();
        assert_eq!(result[[0, 0]], Complex64::new(7.0, 0.0));
        assert_eq!(result.sum(), Complex64::new(7.0, 0.0));
    }

    #[test]
    fn test_accumulate_blocks_propagates_errors() {
        let steps = vec![Err(Error::Format("broken".into()))];
        assert!(matches!(
            accumulate_blocks(steps, &[0, 1], 2, false),
            Err(Error::Format(_))
        ));
    }
}
