#![no_main]

use libfuzzer_sys::fuzz_target;

use batched_sort::{Array, Device, SortConfig, SortKey, SortOptions, Sorter};

// Header byte layout: bits 0-1 strategy, bit 2 descending, bit 3 stable, bit 4 sort along dim 0.
// The second byte is the number of rows, the rest are little endian i16 keys.
fuzz_target!(|data: &[u8]| {
    let [flags, rows, keys @ ..] = data else {
        return;
    };

    let config = match flags & 0b11 {
        0 => SortConfig::default(),
        1 => SortConfig::default()
            .without_small_sort()
            .with_segmented_min_segments(usize::MAX),
        2 => SortConfig::default()
            .without_small_sort()
            .with_segmented_min_segments(1),
        _ => SortConfig::default().with_max_batch_elements(64),
    };
    let descending = flags & 0b100 != 0;
    let stable = flags & 0b1000 != 0;
    let dim = if flags & 0b1_0000 != 0 { 0 } else { 1 };

    let keys: Vec<i16> = keys
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    let rows = (*rows as usize).clamp(1, keys.len().max(1));
    let cols = keys.len() / rows;
    let keys = keys[..rows * cols].to_vec();
    let nsort = if dim == 0 { rows } else { cols };
    if nsort > 64 && flags & 0b11 == 3 {
        return;
    }

    let device = Device::default();
    let stream = device.new_stream();
    let input = Array::from_vec(&device, keys.clone(), &[rows, cols]).unwrap();
    let options = SortOptions::new()
        .dim(dim as isize)
        .descending(descending)
        .stable(stable);
    let (values, indices) = Sorter::new(config).sort(&stream, &input, &options).unwrap();
    let values = values.to_vec(&stream).unwrap();
    let indices = indices.to_vec(&stream).unwrap();

    let (step, nslices, slice_step) = if dim == 0 { (cols, cols, 1) } else { (1, rows, cols) };
    for s in 0..nslices {
        let at = |i: usize| s * slice_step + i * step;
        let mut expected: Vec<(usize, i16)> = (0..nsort).map(|i| (i, keys[at(i)])).collect();
        expected.sort_by_key(|(_, v)| v.directed_key(descending));

        for (i, (origin, key)) in expected.iter().enumerate() {
            assert_eq!(values[at(i)], *key);
            let got = indices[at(i)] as usize;
            assert_eq!(keys[at(got)], *key);
            if stable {
                assert_eq!(got, *origin);
            }
        }
    }
});
