//! Host executed model of the accelerator: memory, streams and kernel launches.
//!
//! Kernels are plain closures queued on a [`Stream`]. Inside a kernel the independent blocks of a
//! launch are spread over the rayon thread pool, which plays the part of the streaming
//! multiprocessors.

mod memory;
mod stream;

use std::sync::Arc;

pub use memory::{DeviceBuffer, MemoryStats};
pub use stream::{LaunchConfig, Stream};

use crate::dtype::Element;
use crate::error::Result;
use memory::MemoryLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProps {
    /// `None` means unbounded.
    pub memory_capacity: Option<usize>,
    pub max_threads_per_block: u32,
    /// Some hardware paths have no bfloat16 support in the sort kernels.
    pub supports_bf16_sort: bool,
}

impl Default for DeviceProps {
    fn default() -> Self {
        Self {
            memory_capacity: None,
            max_threads_per_block: 1024,
            supports_bf16_sort: true,
        }
    }
}

struct DeviceInner {
    props: DeviceProps,
    ledger: Arc<MemoryLedger>,
}

/// Cheap to clone handle to one accelerator.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("props", &self.inner.props)
            .finish()
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new(DeviceProps::default())
    }
}

impl Device {
    pub fn new(props: DeviceProps) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                props,
                ledger: Arc::new(MemoryLedger::new(props.memory_capacity)),
            }),
        }
    }

    pub fn props(&self) -> &DeviceProps {
        &self.inner.props
    }

    pub fn new_stream(&self) -> Stream {
        Stream::new(self.clone())
    }

    /// Allocates `len` default initialized elements.
    pub fn allocate<T: Element>(&self, len: usize) -> Result<DeviceBuffer<T>> {
        DeviceBuffer::zeroed(&self.inner.ledger, len)
    }

    /// Uploads host data, the copy is complete when this returns.
    pub fn upload<T: Element>(&self, data: Vec<T>) -> Result<DeviceBuffer<T>> {
        DeviceBuffer::from_vec(&self.inner.ledger, data)
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.inner.ledger.stats()
    }
}
