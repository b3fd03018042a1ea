//! Layout normalization: every strategy wants the sort dimension innermost and densely packed.

use std::cmp::Reverse;

use crate::array::Array;
use crate::device::Stream;
use crate::dtype::Element;
use crate::error::Result;
use crate::kernels;

/// True when `array` can be sorted along `dim` without repacking: it tiles its storage without
/// gaps or overlap, and the slices along `dim` are unit strided.
pub fn is_sort_ready<T>(array: &Array<T>, dim: usize) -> bool {
    array.is_non_overlapping_and_dense() && (array.shape()[dim] == 1 || array.strides()[dim] == 1)
}

/// Dense strides with `dim` innermost, the remaining dimensions keep their relative memory order.
///
/// A transposed input stays transposed, only `dim` moves. That keeps the repacking copy close to
/// a streaming read.
pub fn dense_strides_dim_last(shape: &[usize], strides: &[usize], dim: usize) -> Vec<usize> {
    let ndim = shape.len();

    // Outermost first, `dim` always last. The sort is stable so equal strides keep dimension order.
    let mut order: Vec<usize> = (0..ndim).collect();
    order.sort_by_key(|&d| Reverse((d != dim, strides[d])));

    let mut dense = vec![0; ndim];
    let mut acc = 1;
    for &d in order.iter().rev() {
        dense[d] = acc;
        acc *= shape[d].max(1);
    }
    dense
}

/// Returns `input` itself when it is sort ready along `dim`, otherwise a repacked copy with
/// [`dense_strides_dim_last`] strides. The copy is enqueued on `stream`.
pub fn normalize<T: Element>(stream: &Stream, input: &Array<T>, dim: usize) -> Result<Array<T>> {
    if is_sort_ready(input, dim) {
        return Ok(input.clone());
    }

    let strides = dense_strides_dim_last(input.shape(), input.strides(), dim);
    log::debug!(
        "repacking input of shape {:?}: strides {:?} -> {:?}",
        input.shape(),
        input.strides(),
        strides
    );

    let packed = Array::empty_strided(stream.device(), input.shape(), &strides)?;
    kernels::copy(stream, input, &packed);
    Ok(packed)
}
