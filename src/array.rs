use std::fmt;

use half::{bf16, f16};
use num_complex::Complex;

use crate::device::{Device, DeviceBuffer, Stream};
use crate::dtype::{DType, Element};
use crate::error::{Result, SortError};
use crate::index_width::OffsetCalc;

/// Strided view of device memory, all quantities in elements.
pub struct Array<T> {
    buffer: DeviceBuffer<T>,
    offset: usize,
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl<T> Clone for Array<T> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            offset: self.offset,
            shape: self.shape.clone(),
            strides: self.strides.clone(),
        }
    }
}

impl<T> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("buffer", &self.buffer)
            .field("offset", &self.offset)
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .finish()
    }
}

/// Row-major strides for `shape`.
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    let mut acc = 1;
    for (stride, size) in strides.iter_mut().zip(shape).rev() {
        *stride = acc;
        acc *= (*size).max(1);
    }
    strides
}

impl<T: Element> Array<T> {
    pub fn from_vec(device: &Device, data: Vec<T>, shape: &[usize]) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(SortError::InvalidArgument(format!(
                "shape {shape:?} holds {numel} elements, got {} values",
                data.len()
            )));
        }

        let buffer = device.upload(data)?;
        Ok(Self {
            buffer,
            offset: 0,
            shape: shape.to_vec(),
            strides: contiguous_strides(shape),
        })
    }

    pub fn zeros(device: &Device, shape: &[usize]) -> Result<Self> {
        Self::empty_strided(device, shape, &contiguous_strides(shape))
    }

    /// Allocates exactly the storage a view with these strides can reach.
    pub fn empty_strided(device: &Device, shape: &[usize], strides: &[usize]) -> Result<Self> {
        check_rank(shape, strides)?;
        let buffer = device.allocate(extent(0, shape, strides))?;
        Ok(Self {
            buffer,
            offset: 0,
            shape: shape.to_vec(),
            strides: strides.to_vec(),
        })
    }

    /// New view of an existing allocation.
    pub fn as_strided(
        buffer: DeviceBuffer<T>,
        offset: usize,
        shape: &[usize],
        strides: &[usize],
    ) -> Result<Self> {
        check_rank(shape, strides)?;
        let needed = extent(offset, shape, strides);
        if needed > buffer.len() {
            return Err(SortError::InvalidArgument(format!(
                "view of shape {shape:?} strides {strides:?} at offset {offset} needs {needed} \
                 elements, the allocation holds {}",
                buffer.len()
            )));
        }

        Ok(Self {
            buffer,
            offset,
            shape: shape.to_vec(),
            strides: strides.to_vec(),
        })
    }

    /// Waits for all work on `stream` and reads the elements in row-major logical order.
    pub fn to_vec(&self, stream: &Stream) -> Result<Vec<T>> {
        stream.synchronize()?;

        let data = self.buffer.read();
        let calc = OffsetCalc::<u64>::new(self.offset, &self.shape, &self.strides);
        Ok((0..self.numel()).map(|i| data[calc.get(i)]).collect())
    }
}

impl<T> Array<T> {
    pub fn buffer(&self) -> &DeviceBuffer<T> {
        &self.buffer
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// One past the furthest storage element the view reaches.
    pub fn storage_extent(&self) -> usize {
        extent(self.offset, &self.shape, &self.strides)
    }

    pub fn is_contiguous(&self) -> bool {
        let expected = contiguous_strides(&self.shape);
        self.shape
            .iter()
            .zip(self.strides.iter().zip(&expected))
            .all(|(size, (s, e))| *size < 2 || s == e)
    }

    /// True when the elements tile a gap free block of memory in some dimension order.
    pub fn is_non_overlapping_and_dense(&self) -> bool {
        if self.numel() == 0 {
            return true;
        }

        let mut required = 1;
        for d in self.dims_by_stride() {
            if self.strides[d] != required {
                return false;
            }
            required *= self.shape[d];
        }
        true
    }

    /// Conservative check, a view we can't prove disjoint counts as overlapping.
    pub fn has_internal_overlap(&self) -> bool {
        if self.numel() == 0 {
            return false;
        }

        let mut reach = 0;
        for d in self.dims_by_stride() {
            if self.strides[d] <= reach {
                return true;
            }
            reach += (self.shape[d] - 1) * self.strides[d];
        }
        false
    }

    pub fn shares_storage(&self, other: &Array<T>) -> bool {
        self.buffer.same_allocation(&other.buffer)
    }

    pub fn transpose(&self, d0: usize, d1: usize) -> Result<Self> {
        let ndim = self.ndim();
        if d0 >= ndim || d1 >= ndim {
            return Err(SortError::InvalidArgument(format!(
                "transpose({d0}, {d1}) of a {ndim}-d array"
            )));
        }

        let mut view = self.clone();
        view.shape.swap(d0, d1);
        view.strides.swap(d0, d1);
        Ok(view)
    }

    pub fn permute(&self, dims: &[usize]) -> Result<Self> {
        let ndim = self.ndim();
        let mut seen = vec![false; ndim];
        for &d in dims {
            if d >= ndim || seen[d] {
                return Err(SortError::InvalidArgument(format!(
                    "{dims:?} is not a permutation of the {ndim} dimensions"
                )));
            }
            seen[d] = true;
        }
        if dims.len() != ndim {
            return Err(SortError::InvalidArgument(format!(
                "{dims:?} is not a permutation of the {ndim} dimensions"
            )));
        }

        let mut view = self.clone();
        view.shape = dims.iter().map(|&d| self.shape[d]).collect();
        view.strides = dims.iter().map(|&d| self.strides[d]).collect();
        Ok(view)
    }

    /// View of `len` elements along `dim` starting at `start`.
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Self> {
        if dim >= self.ndim() || start + len > self.shape[dim] {
            return Err(SortError::InvalidArgument(format!(
                "narrow({dim}, {start}, {len}) of shape {:?}",
                self.shape
            )));
        }

        let mut view = self.clone();
        if len > 0 {
            view.offset += start * self.strides[dim];
        }
        view.shape[dim] = len;
        Ok(view)
    }

    // Dimensions of size > 1, innermost (smallest stride) first.
    fn dims_by_stride(&self) -> Vec<usize> {
        let mut dims: Vec<usize> = (0..self.ndim()).filter(|&d| self.shape[d] > 1).collect();
        dims.sort_by_key(|&d| self.strides[d]);
        dims
    }
}

fn check_rank(shape: &[usize], strides: &[usize]) -> Result<()> {
    if shape.len() != strides.len() {
        return Err(SortError::InvalidArgument(format!(
            "shape {shape:?} and strides {strides:?} differ in rank"
        )));
    }
    Ok(())
}

fn extent(offset: usize, shape: &[usize], strides: &[usize]) -> usize {
    if shape.iter().any(|&s| s == 0) {
        return 0;
    }

    offset
        + shape
            .iter()
            .zip(strides)
            .map(|(size, stride)| (size - 1) * stride)
            .sum::<usize>()
        + 1
}

/// An [`Array`] whose element type is only known at runtime.
#[derive(Debug, Clone)]
pub enum AnyArray {
    Bool(Array<bool>),
    U8(Array<u8>),
    I8(Array<i8>),
    I16(Array<i16>),
    I32(Array<i32>),
    I64(Array<i64>),
    F16(Array<f16>),
    BF16(Array<bf16>),
    F32(Array<f32>),
    F64(Array<f64>),
    ComplexF32(Array<Complex<f32>>),
    ComplexF64(Array<Complex<f64>>),
}

macro_rules! any_array_impl {
    ($($t:ty => $variant:ident),*) => {
        impl AnyArray {
            pub fn dtype(&self) -> DType {
                match self {
                    $(AnyArray::$variant(_) => DType::$variant,)*
                }
            }

            pub fn shape(&self) -> &[usize] {
                match self {
                    $(AnyArray::$variant(a) => a.shape(),)*
                }
            }
        }

        $(
            impl From<Array<$t>> for AnyArray {
                fn from(array: Array<$t>) -> Self {
                    AnyArray::$variant(array)
                }
            }
        )*
    };
}

any_array_impl!(
    bool => Bool,
    u8 => U8,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f16 => F16,
    bf16 => BF16,
    f32 => F32,
    f64 => F64,
    Complex<f32> => ComplexF32,
    Complex<f64> => ComplexF64
);
