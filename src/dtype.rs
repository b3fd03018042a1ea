use std::fmt::{self, Debug, Display};

use half::{bf16, f16};
use num_complex::Complex;

/// Closed set of element types an [`crate::Array`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    U8,
    I8,
    I16,
    I32,
    I64,
    F16,
    BF16,
    F32,
    F64,
    ComplexF32,
    ComplexF64,
}

impl DType {
    pub fn is_complex(self) -> bool {
        matches!(self, DType::ComplexF32 | DType::ComplexF64)
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::F16 => "float16",
            DType::BF16 => "bfloat16",
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::ComplexF32 => "complex64",
            DType::ComplexF64 => "complex128",
        };
        f.write_str(name)
    }
}

/// Anything that can live in device memory.
pub trait Element: Copy + Default + PartialEq + Send + Sync + Debug + 'static {
    const DTYPE: DType;
}

/// Unsigned integer keys the radix primitives operate on.
pub trait RadixKey: Copy + Ord + Send + Sync + Debug + 'static {
    const BITS: u32;

    /// The 8 bit digit starting at bit `shift`.
    fn digit(self, shift: u32) -> usize;

    /// Bitwise complement, reverses the order of all keys.
    fn flip(self) -> Self;
}

macro_rules! radix_key_impl {
    ($($t:ty),*) => {
        $(
            impl RadixKey for $t {
                const BITS: u32 = <$t>::BITS;

                #[inline]
                fn digit(self, shift: u32) -> usize {
                    ((self >> shift) & 0xFF) as usize
                }

                #[inline]
                fn flip(self) -> Self {
                    !self
                }
            }
        )*
    };
}

radix_key_impl!(u8, u16, u32, u64);

/// Numeric element types the engine can sort.
///
/// All strategies order elements by [`SortKey::radix_key`], an encoding whose unsigned integer
/// order is the ascending sort order. That is what makes the in-place network, the full-sort and
/// the segmented strategies agree bit for bit on the sorted values.
pub trait SortKey: Element {
    type Radix: RadixKey;

    /// 8-byte keys get a smaller in-place network, they need twice the shared memory per lane.
    const WIDE_KEY: bool = std::mem::size_of::<Self>() == 8;

    fn radix_key(self) -> Self::Radix;

    #[inline]
    fn directed_key(self, descending: bool) -> Self::Radix {
        let key = self.radix_key();
        if descending {
            key.flip()
        } else {
            key
        }
    }
}

macro_rules! element_impl {
    ($($t:ty => $dtype:ident),*) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$dtype;
            }
        )*
    };
}

element_impl!(
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

impl SortKey for u8 {
    type Radix = u8;

    #[inline]
    fn radix_key(self) -> u8 {
        self
    }
}

macro_rules! signed_sort_key_impl {
    ($($t:ty => $u:ty),*) => {
        $(
            impl SortKey for $t {
                type Radix = $u;

                #[inline]
                fn radix_key(self) -> $u {
                    // Flipping the sign bit maps MIN..=MAX onto 0..=uMAX in order.
                    (self as $u) ^ (1 << (<$u>::BITS - 1))
                }
            }
        )*
    };
}

signed_sort_key_impl!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);

// IEEE total order: negative values have all bits inverted, positive values only the sign bit.
// NaN of either sign is canonicalised to the largest key so it sorts after +inf.
macro_rules! float_sort_key_impl {
    ($($t:ty => $u:ty),*) => {
        $(
            impl SortKey for $t {
                type Radix = $u;

                #[inline]
                fn radix_key(self) -> $u {
                    if self.is_nan() {
                        return <$u>::MAX;
                    }

                    let bits = self.to_bits();
                    let sign: $u = 1 << (<$u>::BITS - 1);
                    if bits & sign != 0 {
                        !bits
                    } else {
                        bits ^ sign
                    }
                }
            }
        )*
    };
}

float_sort_key_impl!(f16 => u16, bf16 => u16, f32 => u32, f64 => u64);
