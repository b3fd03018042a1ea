//! In-place bitonic sort of short slices, one block per slice.

use rayon::prelude::*;

use crate::array::Array;
use crate::config::SortConfig;
use crate::device::{LaunchConfig, Stream};
use crate::dtype::SortKey;
use crate::error::{DeviceFault, Result, SortError};
use crate::index_width::{with_index_width, IndexInt, IndexWidth, OffsetCalc};

/// Network lane. Padding compares greater than every key so it collects at the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Lane<K> {
    Key(K),
    Pad,
}

/// Ascending bitonic network over `keys`, permuting `payload` alongside.
///
/// `keys.len()` must be a power of two. Equal keys are never exchanged, which does not make the
/// network stable: two equal keys can still pass each other through exchanges with third keys.
fn bitonic_sort_kv<K: Ord + Copy, V>(keys: &mut [K], payload: &mut [V]) {
    let n = keys.len();
    debug_assert!(n.is_power_of_two() && payload.len() == n);

    let mut k = 2;
    while k <= n {
        let mut j = k / 2;
        while j > 0 {
            for i in 0..n {
                let l = i ^ j;
                if l <= i {
                    continue;
                }

                let ascending = i & k == 0;
                let out_of_order = if ascending {
                    keys[i] > keys[l]
                } else {
                    keys[i] < keys[l]
                };
                if out_of_order {
                    keys.swap(i, l);
                    payload.swap(i, l);
                }
            }
            j /= 2;
        }
        k *= 2;
    }
}

/// Sorts one slice of (value, index) pairs through a network of `width` lanes.
fn sort_slice<T: SortKey>(values: &mut [T], indices: &mut [i64], width: usize, descending: bool) {
    let mut keys: Vec<Lane<T::Radix>> = values
        .iter()
        .map(|v| Lane::Key(v.directed_key(descending)))
        .chain(std::iter::repeat(Lane::Pad))
        .take(width)
        .collect();
    let mut payload: Vec<(T, i64)> = values
        .iter()
        .copied()
        .zip(indices.iter().copied())
        .chain(std::iter::repeat((T::default(), -1)))
        .take(width)
        .collect();

    bitonic_sort_kv(&mut keys, &mut payload);

    for ((v, i), (pv, pi)) in values.iter_mut().zip(indices.iter_mut()).zip(payload) {
        *v = pv;
        *i = pi;
    }
}

/// Network width for slices of `nsort` elements.
pub(crate) fn network_width(nsort: usize, config: &SortConfig) -> Result<usize> {
    let width = nsort.next_power_of_two();
    if width > config.bitonic_max_width {
        return Err(SortError::UnsupportedSize {
            what: "in-place bitonic sort",
            len: nsort,
            max: config.bitonic_max_width,
        });
    }
    Ok(width)
}

/// Sorts every slice of `values` along `dim` in place, permuting `indices` the same way.
///
/// `indices` must hold the origin position of every element already, usually the identity.
pub(crate) fn sort_in_place<T: SortKey>(
    stream: &Stream,
    values: &Array<T>,
    indices: &Array<i64>,
    dim: usize,
    descending: bool,
    config: &SortConfig,
) -> Result<()> {
    let nsort = values.shape()[dim];
    let width = network_width(nsort, config)?;
    let nslices = if nsort == 0 { 0 } else { values.numel() / nsort };
    if nslices == 0 {
        return Ok(());
    }

    let index_width = IndexWidth::common(&[
        IndexWidth::for_array(values),
        IndexWidth::for_array(indices),
    ]);
    let launch = LaunchConfig::new(nslices as u64, (width / 2).max(1) as u32);
    let (values, indices) = (values.clone(), indices.clone());

    stream.launch("bitonic_sort_kv_in_place", launch, move || {
        with_index_width!(index_width, I => {
            sort_in_place_kernel::<T, I>(&values, &indices, dim, width, descending)
        })
    });
    Ok(())
}

// Base offset of every slice and the stride along the sorted dimension.
struct SliceLayout<I> {
    outer: OffsetCalc<I>,
    stride: usize,
}

impl<I: IndexInt> SliceLayout<I> {
    fn new<T>(array: &Array<T>, dim: usize) -> Self {
        let mut shape = array.shape().to_vec();
        let mut strides = array.strides().to_vec();
        shape.remove(dim);
        let stride = strides.remove(dim);

        Self {
            outer: OffsetCalc::new(array.offset(), &shape, &strides),
            stride,
        }
    }

    #[inline]
    fn offset(&self, slice: usize, i: usize) -> usize {
        self.outer.get(slice) + i * self.stride
    }
}

fn sort_in_place_kernel<T: SortKey, I: IndexInt>(
    values: &Array<T>,
    indices: &Array<i64>,
    dim: usize,
    width: usize,
    descending: bool,
) -> core::result::Result<(), DeviceFault> {
    let nsort = values.shape()[dim];
    let nslices = values.numel() / nsort;
    let value_layout = SliceLayout::<I>::new(values, dim);
    let index_layout = SliceLayout::<I>::new(indices, dim);

    // One block per slice: load into shared memory, run the network, store back.
    let sorted: Vec<(Vec<T>, Vec<i64>)> = {
        let value_data = values.buffer().read();
        let index_data = indices.buffer().read();
        (0..nslices)
            .into_par_iter()
            .map(|s| {
                let mut vals: Vec<T> = (0..nsort)
                    .map(|i| value_data[value_layout.offset(s, i)])
                    .collect();
                let mut idx: Vec<i64> = (0..nsort)
                    .map(|i| index_data[index_layout.offset(s, i)])
                    .collect();
                sort_slice(&mut vals, &mut idx, width, descending);
                (vals, idx)
            })
            .collect()
    };

    let mut value_data = values.buffer().write();
    let mut index_data = indices.buffer().write();
    for (s, (vals, idx)) in sorted.into_iter().enumerate() {
        for (i, (v, j)) in vals.into_iter().zip(idx).enumerate() {
            value_data[value_layout.offset(s, i)] = v;
            index_data[index_layout.offset(s, i)] = j;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceProps};
    use crate::error::ErrorKind;
    use crate::kernels;

    fn run(values: &mut [f32], descending: bool) -> Vec<i64> {
        let len = values.len();
        let width = len.next_power_of_two();
        let mut indices: Vec<i64> = (0..len as i64).collect();
        sort_slice(values, &mut indices, width, descending);
        indices
    }

    #[test]
    fn non_power_of_two_lengths() {
        for len in [1usize, 2, 3, 5, 17, 100, 1000] {
            let orig: Vec<f32> = (0..len).map(|i| ((i * 7919) % 211) as f32 - 100.0).collect();
            let mut values = orig.clone();
            let indices = run(&mut values, false);

            let mut expected = orig.clone();
            expected.sort_by(f32::total_cmp);
            assert_eq!(values, expected, "len {len}");
            for (v, i) in values.iter().zip(&indices) {
                assert_eq!(*v, orig[*i as usize]);
            }
        }
    }

    #[test]
    fn descending_with_nan() {
        let mut values = vec![1.0, f32::NAN, -3.0, 2.0, f32::NEG_INFINITY];
        let indices = run(&mut values, true);
        assert!(values[0].is_nan());
        assert_eq!(&values[1..], &[2.0, 1.0, -3.0, f32::NEG_INFINITY]);
        assert_eq!(indices, [1, 3, 0, 2, 4]);
    }

    #[test]
    fn width_is_limited() {
        let config = SortConfig::default();
        assert_eq!(network_width(2048, &config).unwrap(), 2048);
        assert_eq!(network_width(3, &config).unwrap(), 4);
        let err = network_width(2049, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedSize);
    }

    #[test]
    fn sorts_strided_slices() {
        let device = Device::default();
        let stream = device.new_stream();
        // Slices run along dim 0 of a row-major [3, 2] array, stride 2.
        let values = Array::from_vec(&device, vec![3i32, 10, 1, 30, 2, 20], &[3, 2]).unwrap();
        let indices = Array::<i64>::zeros(&device, &[3, 2]).unwrap();
        kernels::fill_identity_indices(&stream, &indices, 0);

        sort_in_place(&stream, &values, &indices, 0, false, &SortConfig::default()).unwrap();
        assert_eq!(values.to_vec(&stream).unwrap(), [1, 10, 2, 20, 3, 30]);
        assert_eq!(indices.to_vec(&stream).unwrap(), [1, 0, 2, 2, 0, 1]);
    }

    #[test]
    fn block_limit_faults_at_synchronize() {
        let device = Device::new(DeviceProps {
            max_threads_per_block: 64,
            ..DeviceProps::default()
        });
        let stream = device.new_stream();
        let values = Array::from_vec(&device, (0..200i32).rev().collect(), &[200]).unwrap();
        let indices = Array::<i64>::zeros(&device, &[200]).unwrap();

        sort_in_place(&stream, &values, &indices, 0, false, &SortConfig::default()).unwrap();
        let err = stream.synchronize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceExecution);
    }
}
