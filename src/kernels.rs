//! Elementwise device kernels: strided copies and index fills.

use rayon::prelude::*;

use crate::array::Array;
use crate::device::{LaunchConfig, Stream};
use crate::dtype::Element;
use crate::error::DeviceFault;
use crate::index_width::{with_index_width, IndexInt, IndexWidth, OffsetCalc};

/// `dst[..] = src[..]` in logical order. The shapes must match, the layouts may differ and the two
/// views may share an allocation.
pub(crate) fn copy<T: Element>(stream: &Stream, src: &Array<T>, dst: &Array<T>) {
    let numel = src.numel();
    if numel == 0 {
        return;
    }

    let width = IndexWidth::common(&[IndexWidth::for_array(src), IndexWidth::for_array(dst)]);
    let (src, dst) = (src.clone(), dst.clone());
    stream.launch("copy_strided", LaunchConfig::for_elements(numel), move || {
        with_index_width!(width, I => copy_kernel::<T, I>(&src, &dst))
    });
}

fn copy_kernel<T: Element, I: IndexInt>(src: &Array<T>, dst: &Array<T>) -> Result<(), DeviceFault> {
    if src.shape() != dst.shape() {
        return Err(DeviceFault::new(format!(
            "copy_strided: source shape {:?}, destination shape {:?}",
            src.shape(),
            dst.shape()
        )));
    }

    let numel = src.numel();
    let src_calc = OffsetCalc::<I>::new(src.offset(), src.shape(), src.strides());

    // Gather completely before the first write, src and dst may alias.
    let staged: Vec<T> = {
        let data = src.buffer().read();
        (0..numel)
            .into_par_iter()
            .map(|i| data[src_calc.get(i)])
            .collect()
    };

    let mut out = dst.buffer().write();
    if dst.is_contiguous() {
        let start = dst.offset();
        out[start..start + numel].copy_from_slice(&staged);
    } else {
        let dst_calc = OffsetCalc::<I>::new(dst.offset(), dst.shape(), dst.strides());
        for (i, value) in staged.into_iter().enumerate() {
            out[dst_calc.get(i)] = value;
        }
    }

    Ok(())
}

/// Writes every element's coordinate along `dim`, the identity permutation of each slice.
pub(crate) fn fill_identity_indices(stream: &Stream, indices: &Array<i64>, dim: usize) {
    let numel = indices.numel();
    if numel == 0 {
        return;
    }

    let width = IndexWidth::for_array(indices);
    let indices = indices.clone();
    stream.launch("fill_identity_indices", LaunchConfig::for_elements(numel), move || {
        with_index_width!(width, I => fill_identity_kernel::<I>(&indices, dim))
    });
}

fn fill_identity_kernel<I: IndexInt>(indices: &Array<i64>, dim: usize) -> Result<(), DeviceFault> {
    let numel = indices.numel();
    let size = I::from_usize(indices.shape()[dim]);
    let inner = I::from_usize(indices.shape()[dim + 1..].iter().product::<usize>());
    let coord = |i: usize| ((I::from_usize(i) / inner) % size).to_usize() as i64;

    let mut out = indices.buffer().write();
    if indices.is_contiguous() {
        let start = indices.offset();
        out[start..start + numel]
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, v)| *v = coord(i));
    } else {
        let calc = OffsetCalc::<I>::new(indices.offset(), indices.shape(), indices.strides());
        for i in 0..numel {
            out[calc.get(i)] = coord(i);
        }
    }

    Ok(())
}
