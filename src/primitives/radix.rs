use std::mem;
use std::ops::Range;

use rayon::prelude::*;

use crate::dtype::RadixKey;
use crate::error::DeviceFault;

const DIGIT_BITS: u32 = 8;
const RADIX: usize = 1 << DIGIT_BITS;

// Elements per histogram tile, the unit of parallelism of the counting pass.
const TILE: usize = 4096;

/// Stable LSD radix sort of `(key, value)` pairs.
///
/// Only the key bits in `bits` take part in the ordering. `radix` maps a key onto the unsigned
/// integer whose order is the ascending order. With `descending` every digit is mirrored, which
/// keeps the sort stable: equal keys retain their input order in both directions.
///
/// `keys_out` may be `None` when only the permuted values are of interest.
#[allow(clippy::too_many_arguments)]
pub fn radix_sort_pairs<K, V, R>(
    keys_in: &[K],
    keys_out: Option<&mut [K]>,
    values_in: &[V],
    values_out: &mut [V],
    radix: impl Fn(K) -> R + Sync,
    descending: bool,
    bits: Range<u32>,
) -> Result<(), DeviceFault>
where
    K: Copy + Send + Sync,
    V: Copy + Send + Sync,
    R: RadixKey,
{
    let len = keys_in.len();
    if values_in.len() != len || values_out.len() != len {
        return Err(DeviceFault::new(format!(
            "radix_sort_pairs: {len} keys but {} input and {} output values",
            values_in.len(),
            values_out.len()
        )));
    }
    if let Some(keys_out) = keys_out.as_ref() {
        if keys_out.len() != len {
            return Err(DeviceFault::new(format!(
                "radix_sort_pairs: {len} keys but room for {} sorted keys",
                keys_out.len()
            )));
        }
    }
    if bits.start > bits.end || bits.end > R::BITS {
        return Err(DeviceFault::new(format!(
            "radix_sort_pairs: bit range {bits:?} outside of a {} bit key",
            R::BITS
        )));
    }

    let mut keys = keys_in.to_vec();
    let mut values = values_in.to_vec();
    let mut keys_alt = keys.clone();
    let mut values_alt = values.clone();

    let mut shift = bits.start;
    while shift < bits.end {
        let width = DIGIT_BITS.min(bits.end - shift);
        let mask = (1usize << width) - 1;
        let digit = |key: K| {
            let d = radix(key).digit(shift) & mask;
            if descending {
                mask - d
            } else {
                d
            }
        };

        // Upsweep: one digit histogram per tile.
        let tile_hists: Vec<[usize; RADIX]> = keys
            .par_chunks(TILE)
            .map(|tile| {
                let mut hist = [0usize; RADIX];
                for key in tile {
                    hist[digit(*key)] += 1;
                }
                hist
            })
            .collect();

        let mut totals = [0usize; RADIX];
        for hist in &tile_hists {
            for (total, count) in totals.iter_mut().zip(hist) {
                *total += count;
            }
        }

        // Every key has the same digit, the pass would be the identity.
        if totals.iter().any(|&count| count == len) {
            shift += width;
            continue;
        }

        // Scan: digit major, tile minor. That order is what makes the scatter stable.
        let mut tile_offsets = vec![[0usize; RADIX]; tile_hists.len()];
        let mut running = 0;
        for d in 0..RADIX {
            for (offsets, hist) in tile_offsets.iter_mut().zip(&tile_hists) {
                offsets[d] = running;
                running += hist[d];
            }
        }

        // Downsweep.
        for (t, offsets) in tile_offsets.iter_mut().enumerate() {
            let start = t * TILE;
            let end = (start + TILE).min(len);
            for i in start..end {
                let d = digit(keys[i]);
                let pos = offsets[d];
                offsets[d] += 1;
                keys_alt[pos] = keys[i];
                values_alt[pos] = values[i];
            }
        }

        mem::swap(&mut keys, &mut keys_alt);
        mem::swap(&mut values, &mut values_alt);
        shift += width;
    }

    values_out.copy_from_slice(&values);
    if let Some(keys_out) = keys_out {
        keys_out.copy_from_slice(&keys);
    }

    Ok(())
}

/// Keys only version of [`radix_sort_pairs`].
pub fn radix_sort_keys<K, R>(
    keys_in: &[K],
    keys_out: &mut [K],
    radix: impl Fn(K) -> R + Sync,
    descending: bool,
    bits: Range<u32>,
) -> Result<(), DeviceFault>
where
    K: Copy + Send + Sync,
    R: RadixKey,
{
    let unit_in = vec![(); keys_in.len()];
    let mut unit_out = vec![(); keys_in.len()];
    radix_sort_pairs(
        keys_in,
        Some(keys_out),
        &unit_in,
        &mut unit_out,
        radix,
        descending,
        bits,
    )
}
