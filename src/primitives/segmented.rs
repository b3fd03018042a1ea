use std::mem;

use rayon::prelude::*;

use super::radix::radix_sort_pairs;
use crate::dtype::RadixKey;
use crate::error::DeviceFault;

/// Sorts every segment `[begin(i), end(i))` of `keys_in` independently, carrying `values_in`
/// along. Stable within a segment.
///
/// Segments must be ordered and disjoint. Output positions not covered by any segment are left
/// untouched.
#[allow(clippy::too_many_arguments)]
pub fn segmented_sort_pairs<K, V, R>(
    keys_in: &[K],
    keys_out: &mut [K],
    values_in: &[V],
    values_out: &mut [V],
    nsegments: usize,
    begin: impl Fn(usize) -> usize + Sync,
    end: impl Fn(usize) -> usize + Sync,
    radix: impl Fn(K) -> R + Sync,
    descending: bool,
) -> Result<(), DeviceFault>
where
    K: Copy + Send + Sync,
    V: Copy + Send + Sync,
    R: RadixKey,
{
    let len = keys_in.len();
    if keys_out.len() != len || values_in.len() != len || values_out.len() != len {
        return Err(DeviceFault::new(format!(
            "segmented_sort_pairs: {len} keys, {} sorted keys, {} values, {} sorted values",
            keys_out.len(),
            values_in.len(),
            values_out.len()
        )));
    }

    // Carve the outputs into one disjoint slice per segment.
    let mut segments = Vec::with_capacity(nsegments);
    let mut keys_rest = keys_out;
    let mut values_rest = values_out;
    let mut cursor = 0;
    for i in 0..nsegments {
        let (b, e) = (begin(i), end(i));
        if b < cursor || e < b || e > len {
            return Err(DeviceFault::new(format!(
                "segmented_sort_pairs: segment {i} spans [{b}, {e}), previous segment ended at \
                 {cursor}, {len} keys"
            )));
        }

        let (_, keys_tail) = mem::take(&mut keys_rest).split_at_mut(b - cursor);
        let (keys_seg, keys_tail) = keys_tail.split_at_mut(e - b);
        let (_, values_tail) = mem::take(&mut values_rest).split_at_mut(b - cursor);
        let (values_seg, values_tail) = values_tail.split_at_mut(e - b);
        segments.push((b, keys_seg, values_seg));

        keys_rest = keys_tail;
        values_rest = values_tail;
        cursor = e;
    }

    segments
        .into_par_iter()
        .try_for_each(|(b, keys_seg, values_seg)| {
            let e = b + keys_seg.len();
            radix_sort_pairs(
                &keys_in[b..e],
                Some(keys_seg),
                &values_in[b..e],
                values_seg,
                &radix,
                descending,
                0..R::BITS,
            )
        })
}
