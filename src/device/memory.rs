use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::dtype::Element;
use crate::error::{Result, SortError};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Byte accounting shared by all buffers of one device.
#[derive(Debug)]
pub(crate) struct MemoryLedger {
    capacity: Option<usize>,
    in_use: Mutex<usize>,
    peak: AtomicUsize,
    allocations: AtomicUsize,
}

impl MemoryLedger {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            in_use: Mutex::new(0),
            peak: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
        }
    }

    fn reserve(&self, bytes: usize) -> Result<()> {
        let mut in_use = self.in_use.lock();
        if let Some(capacity) = self.capacity {
            if in_use.saturating_add(bytes) > capacity {
                return Err(SortError::OutOfMemory {
                    requested: bytes,
                    in_use: *in_use,
                    capacity,
                });
            }
        }

        *in_use += bytes;
        self.peak.fetch_max(*in_use, Ordering::Relaxed);
        self.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn release(&self, bytes: usize) {
        let mut in_use = self.in_use.lock();
        *in_use = in_use.saturating_sub(bytes);
    }

    pub(crate) fn stats(&self) -> MemoryStats {
        MemoryStats {
            in_use: *self.in_use.lock(),
            peak: self.peak.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a device's memory ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub in_use: usize,
    pub peak: usize,
    pub allocations: usize,
}

struct Allocation<T> {
    id: u64,
    len: usize,
    bytes: usize,
    data: RwLock<Vec<T>>,
    ledger: Arc<MemoryLedger>,
}

impl<T> Drop for Allocation<T> {
    fn drop(&mut self) {
        self.ledger.release(self.bytes);
    }
}

/// Handle to a device allocation.
///
/// Cloning the handle does not copy memory. The bytes go back to the device once the last handle
/// is gone, which includes the handles captured by launches still queued on a stream.
pub struct DeviceBuffer<T> {
    inner: Arc<Allocation<T>>,
}

impl<T> Clone for DeviceBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("id", &self.inner.id)
            .field("bytes", &self.inner.bytes)
            .finish()
    }
}

impl<T: Element> DeviceBuffer<T> {
    pub(crate) fn from_vec(ledger: &Arc<MemoryLedger>, data: Vec<T>) -> Result<Self> {
        let bytes = data.len() * mem::size_of::<T>();
        ledger.reserve(bytes)?;
        Ok(Self::reserved(ledger, bytes, data))
    }

    pub(crate) fn zeroed(ledger: &Arc<MemoryLedger>, len: usize) -> Result<Self> {
        // Reserve before touching host memory, an oversized request must fail cleanly.
        let bytes = len.saturating_mul(mem::size_of::<T>());
        ledger.reserve(bytes)?;
        Ok(Self::reserved(ledger, bytes, vec![T::default(); len]))
    }

    fn reserved(ledger: &Arc<MemoryLedger>, bytes: usize, data: Vec<T>) -> Self {
        Self {
            inner: Arc::new(Allocation {
                id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
                len: data.len(),
                bytes,
                data: RwLock::new(data),
                ledger: Arc::clone(ledger),
            }),
        }
    }
}

impl<T> DeviceBuffer<T> {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn same_allocation(&self, other: &DeviceBuffer<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Device side access, only to be used from inside a kernel body.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.inner.data.read()
    }

    /// Device side access, only to be used from inside a kernel body.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.inner.data.write()
    }
}
