use batched_sort::{
    AnyArray, Array, Device, DeviceProps, ErrorKind, SortConfig, SortError, SortOptions,
    SortStrategy, Sorter,
};
use sort_test_tools::{instantiate_sort_tests, patterns, Sort};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

mod in_place {
    use super::*;

    struct SortImpl {}

    impl Sort for SortImpl {
        fn name() -> String {
            "in_place_bitonic".into()
        }

        fn config() -> SortConfig {
            SortConfig::default()
        }
    }

    instantiate_sort_tests!(SortImpl);
}

mod full_sort {
    use super::*;

    struct SortImpl {}

    impl Sort for SortImpl {
        fn name() -> String {
            "full_sort".into()
        }

        fn config() -> SortConfig {
            SortConfig::default()
                .without_small_sort()
                .with_segmented_min_segments(usize::MAX)
        }
    }

    instantiate_sort_tests!(SortImpl);
}

mod segmented {
    use super::*;

    struct SortImpl {}

    impl Sort for SortImpl {
        fn name() -> String {
            "segmented".into()
        }

        fn config() -> SortConfig {
            SortConfig::default()
                .without_small_sort()
                .with_segmented_min_segments(1)
        }
    }

    instantiate_sort_tests!(SortImpl);
}

mod stable {
    use super::*;

    struct SortImpl {}

    impl Sort for SortImpl {
        fn name() -> String {
            "stable_default".into()
        }

        fn config() -> SortConfig {
            SortConfig::default()
        }

        fn stable() -> bool {
            true
        }
    }

    instantiate_sort_tests!(SortImpl);
}

mod small_batches {
    use super::*;

    struct SortImpl {}

    impl Sort for SortImpl {
        fn name() -> String {
            "small_batches".into()
        }

        fn config() -> SortConfig {
            SortConfig::default()
                .without_small_sort()
                .with_max_batch_elements(5_000)
        }
    }

    instantiate_sort_tests!(SortImpl);
}

fn strategy_configs() -> [(SortStrategy, SortConfig); 3] {
    let base = SortConfig::default().without_small_sort();
    [
        (SortStrategy::InPlace, SortConfig::default()),
        (
            SortStrategy::FullSort,
            base.with_segmented_min_segments(usize::MAX),
        ),
        (SortStrategy::Segmented, base.with_segmented_min_segments(1)),
    ]
}

#[test]
fn long_single_slice_uses_full_sort() {
    init_logging();

    let device = Device::default();
    let stream = device.new_stream();
    let input = Array::from_vec(&device, patterns::random(2_050), &[2_050]).unwrap();
    let values = Array::zeros(&device, &[2_050]).unwrap();
    let indices = Array::zeros(&device, &[2_050]).unwrap();

    let plan = Sorter::new(SortConfig::default())
        .plan(&stream, &input, &values, &indices, &SortOptions::new())
        .unwrap();
    assert_eq!(plan.strategies(), [SortStrategy::FullSort]);
    assert_eq!(plan.nslices, 1);

    let (values, _) = batched_sort::sort(&stream, &input, &SortOptions::new()).unwrap();
    let values = values.to_vec(&stream).unwrap();
    assert!(values.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn eight_byte_keys_leave_the_network_earlier() {
    let device = Device::default();
    let stream = device.new_stream();
    let sorter = Sorter::new(SortConfig::default());

    let narrow = Array::<i32>::zeros(&device, &[2, 1_500]).unwrap();
    let wide = Array::<i64>::zeros(&device, &[2, 1_500]).unwrap();
    let indices = Array::<i64>::zeros(&device, &[2, 1_500]).unwrap();
    let out_narrow = Array::<i32>::zeros(&device, &[2, 1_500]).unwrap();
    let out_wide = Array::<i64>::zeros(&device, &[2, 1_500]).unwrap();

    let plan = sorter
        .plan(&stream, &narrow, &out_narrow, &indices, &SortOptions::new())
        .unwrap();
    assert_eq!(plan.strategies(), [SortStrategy::InPlace]);
    let plan = sorter
        .plan(&stream, &wide, &out_wide, &indices, &SortOptions::new())
        .unwrap();
    assert_eq!(plan.strategies(), [SortStrategy::FullSort]);
}

#[test]
fn strategies_agree_bit_for_bit() {
    init_logging();

    let device = Device::default();
    let stream = device.new_stream();
    // NaN payloads are not ordered among each other, keep them out of the bitwise comparison.
    let data: Vec<f32> = patterns::random_floats(130 * 300)
        .into_iter()
        .map(|v| if v.is_nan() { 0.5 } else { v as f32 })
        .collect();
    let input = Array::from_vec(&device, data, &[130, 300]).unwrap();

    for descending in [false, true] {
        let options = SortOptions::new().descending(descending);
        let results: Vec<Vec<u32>> = strategy_configs()
            .into_iter()
            .map(|(strategy, config)| {
                let sorter = Sorter::new(config);
                let values = Array::zeros(&device, &[130, 300]).unwrap();
                let indices = Array::zeros(&device, &[130, 300]).unwrap();
                let plan = sorter
                    .plan(&stream, &input, &values, &indices, &options)
                    .unwrap();
                assert_eq!(plan.strategies(), [strategy]);

                sorter
                    .sort_out(&stream, &input, &values, &indices, &options)
                    .unwrap();
                values
                    .to_vec(&stream)
                    .unwrap()
                    .into_iter()
                    .map(f32::to_bits)
                    .collect()
            })
            .collect();

        assert_eq!(results[0], results[1]);
        assert_eq!(results[1], results[2]);
    }
}

#[test]
fn batching_is_transparent() {
    init_logging();

    let device = Device::default();
    let stream = device.new_stream();
    let input = Array::from_vec(&device, patterns::random_uniform(40 * 7, 0..10), &[40, 7])
        .unwrap()
        .transpose(0, 1)
        .unwrap();
    let options = SortOptions::new().dim(1).stable(true);

    let (expected_values, expected_indices) = Sorter::new(SortConfig::default())
        .sort(&stream, &input, &options)
        .unwrap();

    for max_batch_elements in [40, 57, 200, 279] {
        let sorter = Sorter::new(SortConfig::default().with_max_batch_elements(max_batch_elements));
        let (values, indices) = sorter.sort(&stream, &input, &options).unwrap();
        assert_eq!(
            values.to_vec(&stream).unwrap(),
            expected_values.to_vec(&stream).unwrap()
        );
        assert_eq!(
            indices.to_vec(&stream).unwrap(),
            expected_indices.to_vec(&stream).unwrap()
        );
    }

    let err = Sorter::new(SortConfig::default().with_max_batch_elements(39))
        .sort(&stream, &input, &options)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedSize);
}

fn capped_device(capacity: usize) -> Device {
    Device::new(DeviceProps {
        memory_capacity: Some(capacity),
        ..DeviceProps::default()
    })
}

#[test]
fn batches_share_scratch_memory() {
    init_logging();

    let (rows, cols) = (100, 50);
    let data = patterns::random_uniform(rows * cols, 0..20);
    let mut expected: Vec<(i32, i64)> = Vec::new();
    for row in data.chunks(cols) {
        let mut pairs: Vec<(i32, i64)> = row.iter().copied().zip(0..).collect();
        pairs.sort_by_key(|(v, _)| *v);
        expected.extend(pairs);
    }

    // Input, values and indices take 80_000 bytes, one batch of 500 elements needs 8_000 bytes
    // of tags for the full sort and 4_000 for the segmented one.
    let strategies = [
        (
            SortConfig::default().without_small_sort().with_segmented_min_segments(usize::MAX),
            8_000,
        ),
        (
            SortConfig::default().without_small_sort().with_segmented_min_segments(1),
            4_000,
        ),
    ];
    for (config, scratch) in strategies {
        let device = capped_device(100_000);
        let stream = device.new_stream();
        let input = Array::from_vec(&device, data.clone(), &[rows, cols]).unwrap();
        let values = Array::<i32>::zeros(&device, &[rows, cols]).unwrap();
        let indices = Array::<i64>::zeros(&device, &[rows, cols]).unwrap();

        let sorter = Sorter::new(config.with_max_batch_elements(500));
        let options = SortOptions::new().stable(true);
        let plan = sorter.plan(&stream, &input, &values, &indices, &options).unwrap();
        assert_eq!(plan.strategies().len(), 10);

        sorter.sort_out(&stream, &input, &values, &indices, &options).unwrap();
        stream.synchronize().unwrap();
        let got: Vec<(i32, i64)> = values
            .to_vec(&stream)
            .unwrap()
            .into_iter()
            .zip(indices.to_vec(&stream).unwrap())
            .collect();
        assert_eq!(got, expected);

        assert_eq!(device.memory_stats().peak, 80_000 + scratch);
        assert_eq!(device.memory_stats().in_use, 80_000);
    }
}

#[test]
fn failed_requests_leave_outputs_untouched() {
    // Room for the arrays and less than one batch of full-sort scratch.
    let device = capped_device(85_000);
    let stream = device.new_stream();
    let input = Array::from_vec(&device, patterns::random(5_000), &[100, 50]).unwrap();
    let values = Array::from_vec(&device, vec![-1i32; 5_000], &[100, 50]).unwrap();
    let indices = Array::from_vec(&device, vec![-1i64; 5_000], &[100, 50]).unwrap();

    let config = SortConfig::default()
        .without_small_sort()
        .with_segmented_min_segments(usize::MAX)
        .with_max_batch_elements(500);
    let err = Sorter::new(config)
        .sort_out(&stream, &input, &values, &indices, &SortOptions::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    assert_eq!(stream.pending(), 0);

    stream.synchronize().unwrap();
    assert!(values.to_vec(&stream).unwrap().iter().all(|v| *v == -1));
    assert!(indices.to_vec(&stream).unwrap().iter().all(|i| *i == -1));
    assert_eq!(device.memory_stats().in_use, 80_000);
}

#[test]
fn stable_sorts_order_signed_zeros() {
    let device = Device::default();
    let stream = device.new_stream();
    let input = Array::from_vec(&device, vec![0.0f32, -0.0, 0.0, -0.0], &[4]).unwrap();

    for descending in [false, true] {
        let options = SortOptions::new().stable(true).descending(descending);
        let (values, indices) = batched_sort::sort(&stream, &input, &options).unwrap();
        let bits: Vec<u32> = values
            .to_vec(&stream)
            .unwrap()
            .iter()
            .map(|v| v.to_bits())
            .collect();
        let (neg, pos) = ((-0.0f32).to_bits(), 0.0f32.to_bits());
        if descending {
            assert_eq!(bits, [pos, pos, neg, neg]);
            assert_eq!(indices.to_vec(&stream).unwrap(), [0, 2, 1, 3]);
        } else {
            assert_eq!(bits, [neg, neg, pos, pos]);
            assert_eq!(indices.to_vec(&stream).unwrap(), [1, 3, 0, 2]);
        }
    }
}

#[test]
fn unsupported_types_allocate_nothing() {
    let device = Device::default();
    let stream = device.new_stream();
    let input: AnyArray = Array::from_vec(&device, vec![true, false, true], &[3])
        .unwrap()
        .into();
    let before = device.memory_stats();

    let err = Sorter::default()
        .sort_dyn(&stream, &input, &SortOptions::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    assert_eq!(device.memory_stats(), before);
    assert_eq!(stream.pending(), 0);
}

#[test]
fn bf16_needs_device_support() {
    let device = Device::new(DeviceProps {
        supports_bf16_sort: false,
        ..DeviceProps::default()
    });
    let stream = device.new_stream();
    let input = Array::from_vec(&device, vec![half::bf16::from_f32(1.0); 4], &[4]).unwrap();

    let err = batched_sort::sort(&stream, &input, &SortOptions::new()).unwrap_err();
    assert!(matches!(err, SortError::UnsupportedType { .. }));

    let supported = Device::default();
    let stream = supported.new_stream();
    let input = Array::from_vec(
        &supported,
        vec![half::bf16::from_f32(2.0), half::bf16::from_f32(-1.0)],
        &[2],
    )
    .unwrap();
    let (values, indices) = batched_sort::sort(&stream, &input, &SortOptions::new()).unwrap();
    assert_eq!(
        values.to_vec(&stream).unwrap(),
        [half::bf16::from_f32(-1.0), half::bf16::from_f32(2.0)]
    );
    assert_eq!(indices.to_vec(&stream).unwrap(), [1, 0]);
}

#[test]
fn dyn_requests_route_by_type() {
    let device = Device::default();
    let stream = device.new_stream();
    let input: AnyArray = Array::from_vec(&device, vec![3.0f64, 1.0, 2.0], &[3])
        .unwrap()
        .into();

    let (values, indices) = Sorter::default()
        .sort_dyn(&stream, &input, &SortOptions::new().descending(true))
        .unwrap();
    let AnyArray::F64(values) = values else {
        panic!("sorted values changed their type to {}", values.dtype());
    };
    assert_eq!(values.to_vec(&stream).unwrap(), [3.0, 2.0, 1.0]);
    assert_eq!(indices.to_vec(&stream).unwrap(), [0, 2, 1]);

    let wrong: AnyArray = Array::<f32>::zeros(&device, &[3]).unwrap().into();
    let out_indices = Array::zeros(&device, &[3]).unwrap();
    let err = Sorter::default()
        .sort_out_dyn(&stream, &input, &wrong, &out_indices, &SortOptions::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn invalid_requests_issue_no_work() {
    let device = Device::default();
    let stream = device.new_stream();
    let input = Array::from_vec(&device, patterns::random(12), &[3, 4]).unwrap();
    let values = Array::zeros(&device, &[3, 4]).unwrap();
    let indices = Array::zeros(&device, &[3, 4]).unwrap();
    let sorter = Sorter::default();

    let err = sorter
        .sort_out(&stream, &input, &values, &indices, &SortOptions::new().dim(2))
        .unwrap_err();
    assert_eq!(
        err,
        SortError::DimOutOfRange {
            dim: 2,
            min: -2,
            max: 1
        }
    );

    let short = Array::zeros(&device, &[3, 3]).unwrap();
    let err = sorter
        .sort_out(&stream, &input, &short, &indices, &SortOptions::new())
        .unwrap_err();
    assert!(matches!(err, SortError::ShapeMismatch { name: "values", .. }));

    let base = Array::<i32>::zeros(&device, &[4]).unwrap();
    let overlapping = Array::as_strided(base.buffer().clone(), 0, &[3, 4], &[0, 1]).unwrap();
    let err = sorter
        .sort_out(&stream, &input, &overlapping, &indices, &SortOptions::new())
        .unwrap_err();
    assert_eq!(err, SortError::InternalOverlap { name: "values" });

    assert_eq!(stream.pending(), 0);
    assert_eq!(stream.executed(), 0);
}

#[test]
fn device_faults_surface_at_synchronization() {
    init_logging();

    let device = Device::new(DeviceProps {
        max_threads_per_block: 512,
        ..DeviceProps::default()
    });
    let stream = device.new_stream();
    // A 2048 wide network needs 1024 threads per slice.
    let input = Array::from_vec(&device, patterns::random(2 * 2_000), &[2, 2_000]).unwrap();

    // Validation passed, the oversized launch only fails when the stream runs.
    let (values, _) = batched_sort::sort(&stream, &input, &SortOptions::new()).unwrap();
    let err = values.to_vec(&stream).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceExecution);
    assert!(matches!(
        err,
        SortError::DeviceExecution {
            kernel: "bitonic_sort_kv_in_place",
            ..
        }
    ));

    // The fault is consumed, the stream takes new work.
    stream.synchronize().unwrap();
}

#[test]
fn allocation_failures_are_reported() {
    let device = Device::new(DeviceProps {
        memory_capacity: Some(10_000),
        ..DeviceProps::default()
    });
    let stream = device.new_stream();
    let input = Array::from_vec(&device, patterns::random(1_000), &[1_000]).unwrap();

    let err = batched_sort::sort(&stream, &input, &SortOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    assert_eq!(device.memory_stats().in_use, 4_000);
}

#[test]
fn empty_and_scalar_inputs() {
    let device = Device::default();
    let stream = device.new_stream();

    let empty = Array::<f32>::zeros(&device, &[4, 0, 3]).unwrap();
    let (values, indices) = batched_sort::sort(&stream, &empty, &SortOptions::new().dim(1)).unwrap();
    assert_eq!(values.shape(), &[4, 0, 3]);
    assert_eq!(indices.shape(), &[4, 0, 3]);
    assert_eq!(stream.pending(), 0);

    let scalar = Array::from_vec(&device, vec![-7i16], &[]).unwrap();
    for dim in [0, -1] {
        let (values, indices) =
            batched_sort::sort(&stream, &scalar, &SortOptions::new().dim(dim)).unwrap();
        assert_eq!(values.shape(), &[] as &[usize]);
        assert_eq!(values.to_vec(&stream).unwrap(), [-7]);
        assert_eq!(indices.to_vec(&stream).unwrap(), [0]);
    }
    let err = batched_sort::sort(&stream, &scalar, &SortOptions::new().dim(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn argsort_and_topk() {
    let device = Device::default();
    let stream = device.new_stream();
    let input = Array::from_vec(&device, vec![5, 3, 1, 4, 2, 9, 7, 8, 6, 10], &[2, 5]).unwrap();

    let indices = batched_sort::argsort(&stream, &input, &SortOptions::new()).unwrap();
    assert_eq!(indices.to_vec(&stream).unwrap(), [2, 4, 1, 3, 0, 3, 1, 2, 0, 4]);

    let (values, indices) = batched_sort::topk(&stream, &input, 3, 1, false).unwrap();
    assert_eq!(values.to_vec(&stream).unwrap(), [1, 2, 3, 6, 7, 8]);
    assert_eq!(indices.to_vec(&stream).unwrap(), [2, 4, 1, 3, 1, 2]);

    // Long slices take the batched path, the selection is the same.
    let long = Array::from_vec(&device, patterns::random_unique(3 * 3_000), &[3, 3_000]).unwrap();
    let (values, _) = batched_sort::topk(&stream, &long, 5, -1, true).unwrap();
    let values = values.to_vec(&stream).unwrap();
    let mut expected = long.to_vec(&stream).unwrap();
    for (row, got) in expected.chunks_mut(3_000).zip(values.chunks(5)) {
        row.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(&row[..5], got);
    }
}
