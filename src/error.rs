use thiserror::Error;

use crate::dtype::DType;

pub type Result<T> = core::result::Result<T, SortError>;

/// Coarse classification of [`SortError`], what a caller usually wants to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    UnsupportedType,
    UnsupportedSize,
    OutOfMemory,
    DeviceExecution,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortError {
    #[error("dimension out of range (expected to be in range of [{min}, {max}], but got {dim})")]
    DimOutOfRange { dim: isize, min: isize, max: isize },

    #[error("{name} has shape {got:?}, expected the input shape {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("{name} has internal overlap, writing to it in parallel is unsupported")]
    InternalOverlap { name: &'static str },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("sort is not supported for {dtype} ({reason})")]
    UnsupportedType { dtype: DType, reason: &'static str },

    #[error("{what}: slice length {len} exceeds the supported maximum of {max}")]
    UnsupportedSize {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("out of device memory: tried to allocate {requested} bytes with {in_use} of {capacity} bytes in use")]
    OutOfMemory {
        requested: usize,
        in_use: usize,
        capacity: usize,
    },

    #[error("device execution failed in `{kernel}`: {message}")]
    DeviceExecution { kernel: &'static str, message: String },
}

impl SortError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DimOutOfRange { .. }
            | Self::ShapeMismatch { .. }
            | Self::InternalOverlap { .. }
            | Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            Self::UnsupportedSize { .. } => ErrorKind::UnsupportedSize,
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::DeviceExecution { .. } => ErrorKind::DeviceExecution,
        }
    }
}

/// Failure reported by a kernel body. Turned into [`SortError::DeviceExecution`] at the next
/// synchronization point of the stream it was launched on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DeviceFault(pub String);

impl DeviceFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
