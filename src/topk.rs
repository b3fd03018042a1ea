//! Sort based top-k selection.

use crate::array::Array;
use crate::coordinator::{check_sortable, wrap_dim, SortOptions, Sorter};
use crate::device::Stream;
use crate::dtype::SortKey;
use crate::error::{Result, SortError};
use crate::kernels;

impl Sorter {
    /// The `k` largest (or smallest) elements of every slice along `dim`, in sorted order, with
    /// their positions along `dim`.
    ///
    /// Sorts every slice completely and keeps the first `k` of each.
    pub fn topk<T: SortKey>(
        &self,
        stream: &Stream,
        input: &Array<T>,
        k: usize,
        dim: isize,
        largest: bool,
    ) -> Result<(Array<T>, Array<i64>)> {
        check_sortable(T::DTYPE, stream.device().props())?;
        let dim = wrap_dim(dim, input.ndim())?;
        let nsort = input.shape().get(dim).copied().unwrap_or(1);
        if k > nsort {
            return Err(SortError::InvalidArgument(format!(
                "k ({k}) is larger than the slice length {nsort}"
            )));
        }

        let device = stream.device();
        let mut shape = input.shape().to_vec();
        if let Some(size) = shape.get_mut(dim) {
            *size = k;
        }
        if k == 0 {
            return Ok((Array::zeros(device, &shape)?, Array::zeros(device, &shape)?));
        }

        let options = SortOptions::new()
            .dim(dim as isize)
            .descending(largest);
        let (sorted, sorted_indices) = self.sort(stream, input, &options)?;
        if input.ndim() == 0 || k == nsort {
            return Ok((sorted, sorted_indices));
        }

        let values = Array::zeros(device, &shape)?;
        let indices = Array::zeros(device, &shape)?;
        kernels::copy(stream, &sorted.narrow(dim, 0, k)?, &values);
        kernels::copy(stream, &sorted_indices.narrow(dim, 0, k)?, &indices);
        Ok((values, indices))
    }
}
