//! Segmented sort out of two global sorts, for batches of few long segments.
//!
//! Every element is tagged with its segment id and its position inside the segment. A radix sort
//! by key scrambles the segments but keeps the tags attached, a second radix sort on the segment
//! id bits alone regroups the segments. Both passes are stable, so each segment comes out in key
//! order with ties in input order. A final scatter turns the surviving tags into values and
//! origin indices.

use rayon::prelude::*;

use super::{Batch, BatchShape, Scratch, Span};
use crate::device::{LaunchConfig, Stream};
use crate::dtype::{RadixKey, SortKey};
use crate::error::{DeviceFault, Result, SortError};
use crate::index_width::{with_index_width, IndexInt};
use crate::primitives::{radix_sort_keys, radix_sort_pairs};

const SEGMENT_MASK: i64 = 0xFFFF_FFFF;

/// Largest segment id width the tag has room for.
pub(crate) const MAX_SEGMENT_BITS: u32 = 32;

/// `ceil(log2(nsegments))`, the key width of the regrouping pass.
pub(crate) fn segment_bits(nsegments: usize) -> Result<u32> {
    let bits = if nsegments <= 1 {
        0
    } else {
        usize::BITS - (nsegments - 1).leading_zeros()
    };

    if bits > MAX_SEGMENT_BITS {
        return Err(SortError::UnsupportedSize {
            what: "full-sort segment ids",
            len: nsegments,
            max: 1 << MAX_SEGMENT_BITS,
        });
    }
    Ok(bits)
}

#[inline]
fn pack_tag(segment: usize, position: usize) -> i64 {
    ((position as i64) << 32) | segment as i64
}

#[inline]
fn unpack_tag(tag: i64) -> (usize, usize) {
    ((tag & SEGMENT_MASK) as usize, (tag >> 32) as usize)
}

pub(crate) fn execute<T: SortKey>(stream: &Stream, batch: &Batch<T>) -> Result<()> {
    let BatchShape { nsegments, nsort } = batch.shape;
    let numel = batch.shape.numel();
    let bits = segment_bits(nsegments)?;
    debug_assert!(batch.scratch.sorted_tags.len() >= numel);

    let Scratch { tags, sorted_tags } = batch.scratch.clone();
    let width = batch.width;
    let launch = LaunchConfig::for_elements(numel);

    {
        let tags = tags.clone();
        stream.launch("fill_segment_tags", launch, move || {
            with_index_width!(width, I => {
                fill_segment_tags::<I>(&mut tags.write()[..numel], nsort)
            })
        });
    }

    {
        let input = batch.input.clone();
        let (tags, sorted_tags) = (tags.clone(), sorted_tags.clone());
        let descending = batch.descending;
        let key_bits = <T::Radix as RadixKey>::BITS;
        stream.launch("radix_sort_pairs", launch, move || {
            let keys = input.buffer.read()[input.start..input.start + numel].to_vec();
            radix_sort_pairs(
                &keys,
                None,
                &tags.read()[..numel],
                &mut sorted_tags.write()[..numel],
                |k: T| k.radix_key(),
                descending,
                0..key_bits,
            )
        });
    }

    {
        let tags = tags.clone();
        stream.launch("radix_sort_segment_ids", launch, move || {
            radix_sort_keys(
                &sorted_tags.read()[..numel],
                &mut tags.write()[..numel],
                |tag: i64| tag as u64,
                false,
                0..bits,
            )
        });
    }

    let input = batch.input.clone();
    let values = batch.values.clone();
    let indices = batch.indices.clone();
    stream.launch("sort_postprocess", launch, move || {
        with_index_width!(width, I => {
            postprocess::<T, I>(&input, &tags.read()[..numel], &values, &indices, nsort)
        })
    });

    Ok(())
}

fn fill_segment_tags<I: IndexInt>(
    tags: &mut [i64],
    nsort: usize,
) -> core::result::Result<(), DeviceFault> {
    let n = I::from_usize(nsort);
    tags.par_iter_mut().enumerate().for_each(|(i, tag)| {
        let i = I::from_usize(i);
        *tag = pack_tag((i / n).to_usize(), (i % n).to_usize());
    });
    Ok(())
}

fn postprocess<T: SortKey, I: IndexInt>(
    input: &Span<T>,
    tags: &[i64],
    values: &Span<T>,
    indices: &Span<i64>,
    nsort: usize,
) -> core::result::Result<(), DeviceFault> {
    let numel = tags.len();
    // The unsorted keys, read before the first write: values may be the input itself.
    let keys = input.buffer.read()[input.start..input.start + numel].to_vec();
    let mut value_data = values.buffer.write();
    let mut index_data = indices.buffer.write();
    let n = I::from_usize(nsort);

    value_data[values.start..values.start + numel]
        .par_chunks_mut(nsort)
        .zip(index_data[indices.start..indices.start + numel].par_chunks_mut(nsort))
        .zip(tags.par_chunks(nsort))
        .enumerate()
        .try_for_each(|(segment, ((vals, idx), tags))| {
            for (i, tag) in tags.iter().enumerate() {
                let (tag_segment, position) = unpack_tag(*tag);
                if tag_segment != segment {
                    return Err(DeviceFault::new(format!(
                        "sort_postprocess: element {i} of segment {segment} carries segment \
                         {tag_segment}"
                    )));
                }

                let src = I::from_usize(segment) * n + I::from_usize(position);
                vals[i] = keys[src.to_usize()];
                idx[i] = position as i64;
            }
            Ok(())
        })
}
