use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::Device;
use crate::error::{DeviceFault, Result, SortError};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(0);

/// Grid and block shape of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid: u64,
    pub block: u32,
}

impl LaunchConfig {
    pub const DEFAULT_BLOCK: u32 = 512;

    pub fn new(grid: u64, block: u32) -> Self {
        Self { grid, block }
    }

    /// Enough blocks of [`Self::DEFAULT_BLOCK`] threads to cover `n` elements, one thread each.
    pub fn for_elements(n: usize) -> Self {
        let block = Self::DEFAULT_BLOCK;
        let grid = (n as u64).div_ceil(block as u64).max(1);
        Self { grid, block }
    }
}

type KernelFn = Box<dyn FnOnce() -> core::result::Result<(), DeviceFault> + Send>;

struct Launch {
    name: &'static str,
    config: LaunchConfig,
    kernel: KernelFn,
}

#[derive(Default)]
struct StreamState {
    queue: VecDeque<Launch>,
    fault: Option<SortError>,
    executed: u64,
}

/// In-order execution queue, the host never waits on a launch unless it synchronizes.
///
/// Launches are recorded and run in FIFO order when the stream is synchronized. The first launch
/// that fails poisons the stream: later launches are discarded and the fault is reported by the
/// next [`Stream::synchronize`], not by the call that issued the failing launch.
pub struct Stream {
    id: u64,
    device: Device,
    state: Mutex<StreamState>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").field("id", &self.id).finish()
    }
}

impl Stream {
    pub(crate) fn new(device: Device) -> Self {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            device,
            state: Mutex::new(StreamState::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Records `kernel` for execution after everything already queued.
    pub fn launch<F>(&self, name: &'static str, config: LaunchConfig, kernel: F)
    where
        F: FnOnce() -> core::result::Result<(), DeviceFault> + Send + 'static,
    {
        log::trace!(
            "stream {}: launch `{name}` grid={} block={}",
            self.id,
            config.grid,
            config.block
        );

        self.state.lock().queue.push_back(Launch {
            name,
            config,
            kernel: Box::new(kernel),
        });
    }

    /// Number of launches queued and not yet executed.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Number of launches that ran to completion on this stream.
    pub fn executed(&self) -> u64 {
        self.state.lock().executed
    }

    /// Runs every queued launch and reports the first fault, if any.
    ///
    /// A reported fault is cleared, the stream is usable again afterwards.
    pub fn synchronize(&self) -> Result<()> {
        loop {
            // Never hold the state lock while a kernel runs, kernels may launch follow up work.
            let launch = {
                let mut state = self.state.lock();
                match state.queue.pop_front() {
                    Some(launch) => launch,
                    None => break,
                }
            };

            let has_fault = self.state.lock().fault.is_some();
            if has_fault {
                log::trace!("stream {}: skipping `{}` after fault", self.id, launch.name);
                continue;
            }

            let name = launch.name;
            match self.run(launch) {
                Ok(()) => self.state.lock().executed += 1,
                Err(message) => {
                    log::debug!("stream {}: `{name}` failed: {message}", self.id);
                    self.state.lock().fault = Some(SortError::DeviceExecution {
                        kernel: name,
                        message,
                    });
                }
            }
        }

        match self.state.lock().fault.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn run(&self, launch: Launch) -> core::result::Result<(), String> {
        let props = self.device.props();
        if launch.config.block == 0 || launch.config.block > props.max_threads_per_block {
            return Err(format!(
                "invalid configuration argument: block of {} threads, device maximum is {}",
                launch.config.block, props.max_threads_per_block
            ));
        }

        match panic::catch_unwind(AssertUnwindSafe(launch.kernel)) {
            Ok(result) => result.map_err(|fault| fault.to_string()),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "kernel panicked".to_string());
                Err(format!("device-side assertion: {message}"))
            }
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Err(err) = self.synchronize() {
            log::warn!("stream {} dropped with an unobserved fault: {err}", self.id);
        }
    }
}
