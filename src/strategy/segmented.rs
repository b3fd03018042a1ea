//! Segmented sort through the segmented radix primitive, for batches of many segments.

use rayon::prelude::*;

use super::{Batch, BatchShape};
use crate::device::{LaunchConfig, Stream};
use crate::dtype::SortKey;
use crate::error::{DeviceFault, Result};
use crate::index_width::{with_index_width, IndexInt};
use crate::primitives::segmented_sort_pairs;

pub(crate) fn execute<T: SortKey>(stream: &Stream, batch: &Batch<T>) -> Result<()> {
    let BatchShape { nsegments, nsort } = batch.shape;
    let numel = batch.shape.numel();
    let width = batch.width;
    let launch = LaunchConfig::for_elements(numel);

    // Origin position of every element, carried through the sort as the payload.
    let reverse_indices = batch.scratch.tags.clone();
    {
        let reverse_indices = reverse_indices.clone();
        stream.launch("fill_reverse_indices", launch, move || {
            with_index_width!(width, I => {
                fill_reverse_indices::<I>(&mut reverse_indices.write()[..numel], nsort)
            })
        });
    }

    let input = batch.input.clone();
    let values = batch.values.clone();
    let indices = batch.indices.clone();
    let descending = batch.descending;
    stream.launch(
        "segmented_sort_pairs",
        LaunchConfig::new(nsegments as u64, LaunchConfig::DEFAULT_BLOCK),
        move || {
            let keys = input.buffer.read()[input.start..input.start + numel].to_vec();
            let mut value_data = values.buffer.write();
            let mut index_data = indices.buffer.write();
            segmented_sort_pairs(
                &keys,
                &mut value_data[values.start..values.start + numel],
                &reverse_indices.read()[..numel],
                &mut index_data[indices.start..indices.start + numel],
                nsegments,
                |i| i * nsort,
                |i| (i + 1) * nsort,
                |k: T| k.radix_key(),
                descending,
            )
        },
    );

    Ok(())
}

fn fill_reverse_indices<I: IndexInt>(
    reverse_indices: &mut [i64],
    nsort: usize,
) -> core::result::Result<(), DeviceFault> {
    let n = I::from_usize(nsort);
    reverse_indices
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, r)| *r = (I::from_usize(i) % n).to_usize() as i64);
    Ok(())
}
