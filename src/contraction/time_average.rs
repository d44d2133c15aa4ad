use ndarray::{Array2, ArrayD};
use num_complex::Complex64;

use crate::error::{Error, Result};

/// Folds the two time axes `(start, end)` of `tensor` into a single axis of
/// time separations, averaging over the source time.
///
/// `out[..., d]` is the sum of all `tensor[..., s, ..., e, ...]` with
/// `(e - s) mod nt == d`, divided by `nt`. The remaining axes are kept in
/// their original order, followed by the separation axis.
pub fn time_average(tensor: &ArrayD<Complex64>, axes: (usize, usize)) -> Result<ArrayD<Complex64>> {
    let (start, end) = axes;
    let ndim = tensor.ndim();
    if start >= ndim || end >= ndim || start == end {
        return Err(Error::Value(format!(
            "invalid time axes ({start}, {end}) for a {ndim}-dimensional tensor"
        )));
    }
    let nt = tensor.shape()[start];
    if tensor.shape()[end] != nt || nt == 0 {
        return Err(Error::Value(format!(
            "time axes must have equal, non-zero extent, got shape {:?}",
            tensor.shape()
        )));
    }

    let aux_axes = (0..ndim).filter(|&a| a != start && a != end).collect::<Vec<_>>();
    let aux_shape = aux_axes.iter().map(|&a| tensor.shape()[a]).collect::<Vec<_>>();
    let aux_len = aux_shape.iter().product::<usize>();

    let mut order = aux_axes;
    order.extend([start, end]);
    let view = tensor.view().permuted_axes(order);
    let view = view.to_shape((aux_len, nt, nt))?;

    let mut folded = Array2::<Complex64>::zeros((aux_len, nt));
    for ((a, s, e), value) in view.indexed_iter() {
        folded[[a, (e + nt - s) % nt]] += *value;
    }
    folded.mapv_inplace(|v| v / nt as f64);

    let mut shape = aux_shape;
    shape.push(nt);
    Ok(folded.into_shape_with_order(shape)?)
}
