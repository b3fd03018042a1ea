//! Batched sorting of the slices of a multi-dimensional array on an accelerator.
//!
//! A request sorts every one-dimensional slice along one dimension and returns the sorted values
//! together with the origin position of each value inside its slice. Short slices are sorted by
//! an in-place bitonic network, long slices by one of two radix sort based strategies picked per
//! batch from the number of slices in it.
//!
//! ```ignore
//! let device = Device::default();
//! let stream = device.new_stream();
//! let input = Array::from_vec(&device, vec![5, 3, 1, 4, 2, 9, 7, 8, 6, 10], &[2, 5])?;
//! let (values, indices) = batched_sort::sort(&stream, &input, &SortOptions::new())?;
//! assert_eq!(values.to_vec(&stream)?, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
//! assert_eq!(indices.to_vec(&stream)?, [2, 4, 1, 3, 0, 3, 1, 2, 0, 4]);
//! ```

pub mod array;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod dtype;
pub mod error;
pub mod index_width;
pub mod layout;
pub mod primitives;
pub mod strategy;

mod kernels;
mod topk;

pub use array::{AnyArray, Array};
pub use config::SortConfig;
pub use coordinator::{BatchPlan, SortOptions, SortPath, SortPlan, Sorter};
pub use device::{Device, DeviceProps, Stream};
pub use dtype::{DType, Element, SortKey};
pub use error::{ErrorKind, Result, SortError};
pub use index_width::IndexWidth;
pub use strategy::{BatchShape, SortStrategy};

/// [`Sorter::sort`] with the process wide [`SortConfig`].
pub fn sort<T: SortKey>(
    stream: &Stream,
    input: &Array<T>,
    options: &SortOptions,
) -> Result<(Array<T>, Array<i64>)> {
    Sorter::default().sort(stream, input, options)
}

/// [`Sorter::sort_out`] with the process wide [`SortConfig`].
pub fn sort_out<T: SortKey>(
    stream: &Stream,
    input: &Array<T>,
    values: &Array<T>,
    indices: &Array<i64>,
    options: &SortOptions,
) -> Result<()> {
    Sorter::default().sort_out(stream, input, values, indices, options)
}

pub fn argsort<T: SortKey>(
    stream: &Stream,
    input: &Array<T>,
    options: &SortOptions,
) -> Result<Array<i64>> {
    Sorter::default().argsort(stream, input, options)
}

pub fn topk<T: SortKey>(
    stream: &Stream,
    input: &Array<T>,
    k: usize,
    dim: isize,
    largest: bool,
) -> Result<(Array<T>, Array<i64>)> {
    Sorter::default().topk(stream, input, k, dim, largest)
}
