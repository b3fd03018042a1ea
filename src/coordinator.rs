//! The batch coordinator: validation, planning and issuing the work of one sort request.

use crate::array::{AnyArray, Array};
use crate::config::SortConfig;
use crate::device::{DeviceProps, Stream};
use crate::dtype::{DType, Element, SortKey};
use crate::error::{Result, SortError};
use crate::index_width::IndexWidth;
use crate::kernels;
use crate::layout;
use crate::strategy::{full_sort, small};
use crate::strategy::{
    Batch, BatchShape, Scratch, SortStrategy, Span, BATCH_STRATEGIES, REQUEST_STRATEGIES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOptions {
    /// Dimension to sort along, negative values count from the back.
    pub dim: isize,
    pub descending: bool,
    /// Equal elements keep their input order. `-0.0` and `+0.0` are ordered, not tied.
    pub stable: bool,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            dim: -1,
            descending: false,
            stable: false,
        }
    }
}

impl SortOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dim(mut self, dim: isize) -> Self {
        self.dim = dim;
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    /// Signed zeros are ordered, not tied: a stable ascending sort of `[0.0, -0.0]` yields the
    /// indices `[1, 0]`.
    pub fn stable(mut self, stable: bool) -> Self {
        self.stable = stable;
        self
    }
}

/// One batch of a [`SortPath::Batched`] plan. `start` is relative to the first element of the
/// dense layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub start: usize,
    pub shape: BatchShape,
    pub strategy: SortStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortPath {
    /// No elements, nothing is launched.
    Empty,
    /// The whole request in one launch of the in-place network, directly on the outputs.
    InPlace,
    Batched {
        /// The input is repacked so the sort dimension is innermost and dense.
        normalize_input: bool,
        /// The strategies write to a temporary that is copied to the output afterwards.
        stage_values: bool,
        stage_indices: bool,
        batches: Vec<BatchPlan>,
    },
}

/// What [`Sorter::sort_out`] does for a request, decided before any work is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortPlan {
    /// The wrapped sort dimension.
    pub dim: usize,
    pub nsort: usize,
    pub nslices: usize,
    pub index_width: IndexWidth,
    pub path: SortPath,
}

impl SortPlan {
    /// Strategy of every launch group, in issue order.
    pub fn strategies(&self) -> Vec<SortStrategy> {
        match &self.path {
            SortPath::Empty => Vec::new(),
            SortPath::InPlace => vec![SortStrategy::InPlace],
            SortPath::Batched { batches, .. } => batches.iter().map(|b| b.strategy).collect(),
        }
    }
}

/// Wraps a possibly negative `dim`. Zero-dimensional arrays accept `0` and `-1`.
pub fn wrap_dim(dim: isize, ndim: usize) -> Result<usize> {
    let ndim = ndim.max(1) as isize;
    if dim < -ndim || dim >= ndim {
        return Err(SortError::DimOutOfRange {
            dim,
            min: -ndim,
            max: ndim - 1,
        });
    }

    Ok(if dim < 0 { dim + ndim } else { dim } as usize)
}

/// Rejects element types the engine has no kernels for on this device.
pub fn check_sortable(dtype: DType, props: &DeviceProps) -> Result<()> {
    match dtype {
        DType::Bool => Err(SortError::UnsupportedType {
            dtype,
            reason: "boolean sort is not supported",
        }),
        dtype if dtype.is_complex() => Err(SortError::UnsupportedType {
            dtype,
            reason: "complex numbers have no total order",
        }),
        DType::BF16 if !props.supports_bf16_sort => Err(SortError::UnsupportedType {
            dtype,
            reason: "this device has no bfloat16 sort kernels",
        }),
        _ => Ok(()),
    }
}

// Validated request, zero-dimensional arrays already viewed as one element long slices.
struct Request<T> {
    input: Array<T>,
    values: Array<T>,
    indices: Array<i64>,
    dim: usize,
    descending: bool,
    stable: bool,
}

fn at_least_1d<T: Element>(array: &Array<T>) -> Result<Array<T>> {
    if array.ndim() > 0 {
        return Ok(array.clone());
    }
    Array::as_strided(array.buffer().clone(), array.offset(), &[1], &[1])
}

/// Sorts batches of slices on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sorter {
    config: SortConfig,
}

impl Default for Sorter {
    fn default() -> Self {
        Self::new(SortConfig::global())
    }
}

impl Sorter {
    pub fn new(config: SortConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Validates a request and returns what [`Sorter::sort_out`] would issue for it.
    pub fn plan<T: SortKey>(
        &self,
        stream: &Stream,
        input: &Array<T>,
        values: &Array<T>,
        indices: &Array<i64>,
        options: &SortOptions,
    ) -> Result<SortPlan> {
        let request = self.request(stream, input, values, indices, options)?;
        Ok(self.plan_request(&request))
    }

    /// Sorts `input` along `options.dim` into `values`, writing the origin position of every
    /// value along that dimension into `indices`.
    ///
    /// Validation errors are reported before anything is issued. Work is enqueued on `stream`
    /// and device faults surface at its next synchronization.
    pub fn sort_out<T: SortKey>(
        &self,
        stream: &Stream,
        input: &Array<T>,
        values: &Array<T>,
        indices: &Array<i64>,
        options: &SortOptions,
    ) -> Result<()> {
        let request = self.request(stream, input, values, indices, options)?;
        let plan = self.plan_request(&request);
        self.execute(stream, &request, &plan)
    }

    /// Like [`Sorter::sort_out`] with freshly allocated contiguous outputs.
    pub fn sort<T: SortKey>(
        &self,
        stream: &Stream,
        input: &Array<T>,
        options: &SortOptions,
    ) -> Result<(Array<T>, Array<i64>)> {
        // Everything that can be rejected is rejected before the allocations.
        self.config.validate()?;
        check_sortable(T::DTYPE, stream.device().props())?;
        wrap_dim(options.dim, input.ndim())?;

        let device = stream.device();
        let values = Array::zeros(device, input.shape())?;
        let indices = Array::zeros(device, input.shape())?;
        self.sort_out(stream, input, &values, &indices, options)?;
        Ok((values, indices))
    }

    pub fn argsort<T: SortKey>(
        &self,
        stream: &Stream,
        input: &Array<T>,
        options: &SortOptions,
    ) -> Result<Array<i64>> {
        self.sort(stream, input, options).map(|(_, indices)| indices)
    }

    fn request<T: SortKey>(
        &self,
        stream: &Stream,
        input: &Array<T>,
        values: &Array<T>,
        indices: &Array<i64>,
        options: &SortOptions,
    ) -> Result<Request<T>> {
        self.config.validate()?;
        check_sortable(T::DTYPE, stream.device().props())?;
        let dim = wrap_dim(options.dim, input.ndim())?;

        if values.shape() != input.shape() {
            return Err(SortError::ShapeMismatch {
                name: "values",
                expected: input.shape().to_vec(),
                got: values.shape().to_vec(),
            });
        }
        if indices.shape() != input.shape() {
            return Err(SortError::ShapeMismatch {
                name: "indices",
                expected: input.shape().to_vec(),
                got: indices.shape().to_vec(),
            });
        }
        if values.has_internal_overlap() {
            return Err(SortError::InternalOverlap { name: "values" });
        }
        if indices.has_internal_overlap() {
            return Err(SortError::InternalOverlap { name: "indices" });
        }

        let indices_id = indices.buffer().id();
        if indices_id == input.buffer().id() {
            return Err(SortError::InvalidArgument(
                "indices must not share memory with the input".into(),
            ));
        }
        if indices_id == values.buffer().id() {
            return Err(SortError::InvalidArgument(
                "indices must not share memory with values".into(),
            ));
        }

        let request = Request {
            input: at_least_1d(input)?,
            values: at_least_1d(values)?,
            indices: at_least_1d(indices)?,
            dim,
            descending: options.descending,
            stable: options.stable,
        };

        let nsort = request.input.shape()[dim];
        if nsort > self.config.max_batch_elements {
            return Err(SortError::UnsupportedSize {
                what: "sort slice",
                len: nsort,
                max: self.config.max_batch_elements,
            });
        }

        Ok(request)
    }

    fn plan_request<T: SortKey>(&self, request: &Request<T>) -> SortPlan {
        let Request {
            input,
            values,
            indices,
            dim,
            stable,
            ..
        } = request;
        let (dim, stable) = (*dim, *stable);

        let numel = input.numel();
        let nsort = input.shape()[dim];
        let nslices = if nsort == 0 { 0 } else { numel / nsort };
        let index_width = IndexWidth::common(&[
            IndexWidth::for_array(input),
            IndexWidth::for_array(values),
            IndexWidth::for_array(indices),
        ]);
        let plan = |path| SortPlan {
            dim,
            nsort,
            nslices,
            index_width,
            path,
        };

        if numel == 0 {
            return plan(SortPath::Empty);
        }

        let whole = BatchShape {
            nsegments: nslices,
            nsort,
        };
        let strategy =
            SortStrategy::select(&REQUEST_STRATEGIES, whole, stable, T::WIDE_KEY, &self.config);
        if strategy == SortStrategy::InPlace {
            log::debug!(
                "sort of {nslices} slices of {nsort} along dim {dim}: in place, {index_width:?} \
                 indexing"
            );
            return plan(SortPath::InPlace);
        }

        let normalize_input = !layout::is_sort_ready(input, dim);
        let strides = if normalize_input {
            layout::dense_strides_dim_last(input.shape(), input.strides(), dim)
        } else {
            input.strides().to_vec()
        };
        let stage_values = values.strides() != strides.as_slice()
            || (!normalize_input && values.shares_storage(input));
        let stage_indices = indices.strides() != strides.as_slice();

        // Whole slices only, as many as fit.
        let per_batch = (self.config.max_batch_elements / nsort) * nsort;
        let mut batches = Vec::with_capacity(numel.div_ceil(per_batch));
        let mut start = 0;
        while start < numel {
            let len = per_batch.min(numel - start);
            let shape = BatchShape {
                nsegments: len / nsort,
                nsort,
            };
            let strategy =
                SortStrategy::select(&BATCH_STRATEGIES, shape, stable, T::WIDE_KEY, &self.config);
            batches.push(BatchPlan {
                start,
                shape,
                strategy,
            });
            start += len;
        }

        log::debug!(
            "sort of {nslices} slices of {nsort} along dim {dim}: {} batch(es) starting with \
             {first}, {index_width:?} indexing, normalize_input={normalize_input} \
             stage_values={stage_values} stage_indices={stage_indices}",
            batches.len(),
            first = batches[0].strategy,
        );

        plan(SortPath::Batched {
            normalize_input,
            stage_values,
            stage_indices,
            batches,
        })
    }

    fn execute<T: SortKey>(
        &self,
        stream: &Stream,
        request: &Request<T>,
        plan: &SortPlan,
    ) -> Result<()> {
        let dim = request.dim;

        let (stage_values, stage_indices, batches) = match &plan.path {
            SortPath::Empty => return Ok(()),
            SortPath::InPlace => {
                kernels::copy(stream, &request.input, &request.values);
                kernels::fill_identity_indices(stream, &request.indices, dim);
                return small::sort_in_place(
                    stream,
                    &request.values,
                    &request.indices,
                    dim,
                    request.descending,
                    &self.config,
                );
            }
            SortPath::Batched {
                stage_values,
                stage_indices,
                batches,
                ..
            } => (*stage_values, *stage_indices, batches),
        };

        let device = stream.device();
        let input = layout::normalize(stream, &request.input, dim)?;
        let values = if stage_values {
            Array::empty_strided(device, input.shape(), input.strides())?
        } else {
            request.values.clone()
        };
        let indices = if stage_indices {
            Array::empty_strided(device, input.shape(), input.strides())?
        } else {
            request.indices.clone()
        };

        // Nothing may fail once the first batch is queued.
        for batch in batches {
            if batch.strategy == SortStrategy::FullSort {
                full_sort::segment_bits(batch.shape.nsegments)?;
            }
        }
        let scratch = Scratch::allocate(device, batches.iter().map(|b| (b.shape, b.strategy)))?;

        for batch in batches {
            let span = |offset: usize| offset + batch.start;
            Batch {
                input: Span {
                    buffer: input.buffer().clone(),
                    start: span(input.offset()),
                },
                values: Span {
                    buffer: values.buffer().clone(),
                    start: span(values.offset()),
                },
                indices: Span {
                    buffer: indices.buffer().clone(),
                    start: span(indices.offset()),
                },
                scratch: scratch.clone(),
                shape: batch.shape,
                descending: request.descending,
                width: plan.index_width,
            }
            .execute(stream, batch.strategy)?;
        }

        if stage_values {
            kernels::copy(stream, &values, &request.values);
        }
        if stage_indices {
            kernels::copy(stream, &indices, &request.indices);
        }

        Ok(())
    }
}

macro_rules! dyn_entry_points {
    ($($variant:ident),*) => {
        impl Sorter {
            /// [`Sorter::sort_out`] for arrays whose element type is only known at runtime.
            pub fn sort_out_dyn(
                &self,
                stream: &Stream,
                input: &AnyArray,
                values: &AnyArray,
                indices: &Array<i64>,
                options: &SortOptions,
            ) -> Result<()> {
                check_sortable(input.dtype(), stream.device().props())?;
                match (input, values) {
                    $(
                        (AnyArray::$variant(input), AnyArray::$variant(values)) => {
                            self.sort_out(stream, input, values, indices, options)
                        }
                    )*
                    (input, values) if input.dtype() != values.dtype() => {
                        Err(SortError::InvalidArgument(format!(
                            "values are {}, the input is {}",
                            values.dtype(),
                            input.dtype()
                        )))
                    }
                    (input, _) => Err(SortError::UnsupportedType {
                        dtype: input.dtype(),
                        reason: "no sort kernels for this type",
                    }),
                }
            }

            /// [`Sorter::sort`] for arrays whose element type is only known at runtime.
            pub fn sort_dyn(
                &self,
                stream: &Stream,
                input: &AnyArray,
                options: &SortOptions,
            ) -> Result<(AnyArray, Array<i64>)> {
                check_sortable(input.dtype(), stream.device().props())?;
                match input {
                    $(
                        AnyArray::$variant(input) => {
                            let (values, indices) = self.sort(stream, input, options)?;
                            Ok((values.into(), indices))
                        }
                    )*
                    input => Err(SortError::UnsupportedType {
                        dtype: input.dtype(),
                        reason: "no sort kernels for this type",
                    }),
                }
            }
        }
    };
}

dyn_entry_points!(U8, I8, I16, I32, I64, F16, BF16, F32, F64);
