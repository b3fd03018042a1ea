//! 32 vs 64 bit offset arithmetic.
//!
//! Every kernel that turns a logical element number into a memory offset is generic over the
//! offset integer. The narrow instantiation is cheaper per element and is picked whenever the
//! whole array is addressable with a positive `i32`.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Rem};

use crate::array::Array;
use crate::dtype::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexWidth {
    Narrow,
    Wide,
}

impl IndexWidth {
    /// Largest element count or offset the narrow instantiation may touch.
    pub const NARROW_MAX: usize = i32::MAX as usize;

    pub fn for_len(len: usize) -> Self {
        if len <= Self::NARROW_MAX {
            IndexWidth::Narrow
        } else {
            IndexWidth::Wide
        }
    }

    /// Looks at the element count and at the furthest storage offset the view can reach, a
    /// strided view of a few elements can still span a huge allocation.
    pub fn for_array<T: Element>(array: &Array<T>) -> Self {
        Self::for_len(array.numel().max(array.storage_extent()))
    }

    /// The width able to address all of the given arrays.
    pub fn common(widths: &[IndexWidth]) -> Self {
        if widths.iter().any(|w| *w == IndexWidth::Wide) {
            IndexWidth::Wide
        } else {
            IndexWidth::Narrow
        }
    }
}

/// Offset integer a kernel is instantiated with.
pub trait IndexInt:
    Copy
    + Debug
    + PartialOrd
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Rem<Output = Self>
{
    fn from_usize(v: usize) -> Self;
    fn to_usize(self) -> usize;
}

impl IndexInt for u32 {
    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v <= u32::MAX as usize);
        v as u32
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl IndexInt for u64 {
    #[inline]
    fn from_usize(v: usize) -> Self {
        v as u64
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

/// Runs `$body` with `$I` bound to the offset integer of `$width`.
macro_rules! with_index_width {
    ($width:expr, $I:ident => $body:expr) => {
        match $width {
            $crate::index_width::IndexWidth::Narrow => {
                type $I = u32;
                $body
            }
            $crate::index_width::IndexWidth::Wide => {
                type $I = u64;
                $body
            }
        }
    };
}

pub(crate) use with_index_width;

/// Maps the n-th element in row-major logical order onto a storage offset.
#[derive(Debug, Clone)]
pub(crate) struct OffsetCalc<I> {
    base: I,
    // Innermost dimension last, size 1 dimensions dropped.
    sizes: Vec<I>,
    strides: Vec<I>,
}

impl<I: IndexInt> OffsetCalc<I> {
    pub(crate) fn new(offset: usize, shape: &[usize], strides: &[usize]) -> Self {
        let (sizes, strides) = shape
            .iter()
            .zip(strides)
            .filter(|(size, _)| **size != 1)
            .map(|(size, stride)| (I::from_usize(*size), I::from_usize(*stride)))
            .unzip();

        Self {
            base: I::from_usize(offset),
            sizes,
            strides,
        }
    }

    #[inline]
    pub(crate) fn get(&self, linear: usize) -> usize {
        let mut rem = I::from_usize(linear);
        let mut offset = self.base;

        for (size, stride) in self.sizes.iter().zip(self.strides.iter()).rev() {
            let coord = rem % *size;
            rem = rem / *size;
            offset = offset + coord * *stride;
        }

        offset.to_usize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_boundary() {
        assert_eq!(IndexWidth::for_len(0), IndexWidth::Narrow);
        assert_eq!(IndexWidth::for_len(i32::MAX as usize), IndexWidth::Narrow);
        assert_eq!(IndexWidth::for_len(i32::MAX as usize + 1), IndexWidth::Wide);
        assert_eq!(
            IndexWidth::common(&[IndexWidth::Narrow, IndexWidth::Wide]),
            IndexWidth::Wide
        );
        assert_eq!(IndexWidth::common(&[IndexWidth::Narrow]), IndexWidth::Narrow);
    }

    #[test]
    fn offsets_follow_strides() {
        // A transposed 2x3 view of a row-major 3x2 buffer.
        let narrow = OffsetCalc::<u32>::new(1, &[2, 3], &[1, 2]);
        let wide = OffsetCalc::<u64>::new(1, &[2, 3], &[1, 2]);

        let expected = [1, 3, 5, 2, 4, 6];
        for (i, e) in expected.iter().enumerate() {
            assert_eq!(narrow.get(i), *e);
            assert_eq!(wide.get(i), *e);
        }
    }

    #[test]
    fn macro_binds_offset_type() {
        let bits = with_index_width!(IndexWidth::Wide, I => std::mem::size_of::<I>() * 8);
        assert_eq!(bits, 64);
        let bits = with_index_width!(IndexWidth::Narrow, I => std::mem::size_of::<I>() * 8);
        assert_eq!(bits, 32);
    }
}
