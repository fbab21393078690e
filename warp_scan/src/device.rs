use crate::{
    config::{ScanConfig, MAX_BLOCK_SIZE},
    error::{Result, ScanError},
    launch::{plan_intervals, DeviceLimits, LaunchPlan, MAX_GRID_BLOCKS},
};
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    OnceLock,
};

/// Resident threads each pool worker stands in for when no hardware is
/// queried.
pub const RESIDENT_THREADS_PER_WORKER: usize = 2048;

static DEFAULT_DEVICE: OnceLock<Device> = OnceLock::new();

/// Counters describing the work a device has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub launches: usize,
    pub allocations: usize,
    pub scratch_bytes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    launches: AtomicUsize,
    allocations: AtomicUsize,
    scratch_bytes: AtomicUsize,
}

/// The accelerator the primitives run on.
///
/// Blocks of warps are executed by a dedicated worker pool. A launch returns
/// only after every warp of its grid has finished, which is what lets one
/// phase safely read what the previous phase wrote.
#[derive(Debug)]
pub struct Device {
    pool: ThreadPool,
    config: ScanConfig,
    limits: DeviceLimits,
    counters: Counters,
}

impl Device {
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("warp-scan-{i}"));
        if let Some(threads) = config.worker_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        let max_resident_threads = match config.max_resident_threads {
            Some(threads) => threads,
            None => query_max_resident_threads(&pool)?,
        };
        let limits = DeviceLimits {
            max_resident_threads,
            max_block_size: MAX_BLOCK_SIZE,
            max_grid_blocks: MAX_GRID_BLOCKS,
        };

        log::debug!(
            "device ready: {} workers, {} resident threads, block size {}, carries on {}",
            pool.current_num_threads(),
            max_resident_threads,
            config.block_size,
            config.carry_strategy
        );

        Ok(Self {
            pool,
            config,
            limits,
            counters: Counters::default(),
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn limits(&self) -> DeviceLimits {
        self.limits
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            launches: self.counters.launches.load(Ordering::Relaxed),
            allocations: self.counters.allocations.load(Ordering::Relaxed),
            scratch_bytes: self.counters.scratch_bytes.load(Ordering::Relaxed),
        }
    }

    /// Plans a launch over `n` elements and checks it against the device.
    pub fn plan(&self, n: usize) -> Result<LaunchPlan> {
        let plan = plan_intervals(n, self.config.block_size, self.limits.max_resident_threads)?;
        plan.check(&self.limits)?;
        Ok(plan)
    }

    /// Allocates an empty scratch buffer with room for `len` elements.
    pub fn alloc<T>(&self, len: usize) -> Result<DeviceBuffer<T>> {
        let bytes = len.saturating_mul(std::mem::size_of::<T>());
        if let Some(limit) = self.config.scratch_limit_bytes {
            if bytes > limit {
                return Err(ScanError::OutOfMemory { bytes, limit });
            }
        }

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|source| ScanError::Alloc {
                elements: len,
                source,
            })?;

        self.counters.allocations.fetch_add(1, Ordering::Relaxed);
        self.counters.scratch_bytes.fetch_add(bytes, Ordering::Relaxed);
        log::trace!("allocated scratch for {len} elements ({bytes} bytes)");

        Ok(DeviceBuffer { data })
    }

    /// Runs `kernel` over a grid of `num_blocks` blocks of `block_size`
    /// threads and waits for it to complete.
    pub(crate) fn launch<R, K>(
        &self,
        name: &str,
        num_blocks: usize,
        block_size: usize,
        kernel: K,
    ) -> R
    where
        R: Send,
        K: FnOnce() -> R + Send,
    {
        self.counters.launches.fetch_add(1, Ordering::Relaxed);
        log::trace!("launching {name}<<<{num_blocks}, {block_size}>>>");
        self.pool.install(kernel)
    }
}

/// The device shared by the free-standing entry points, configured from the
/// environment on first use.
pub fn default_device() -> Result<&'static Device> {
    if let Some(device) = DEFAULT_DEVICE.get() {
        return Ok(device);
    }
    let device = Device::new(ScanConfig::from_env()?)?;
    Ok(DEFAULT_DEVICE.get_or_init(|| device))
}

#[cfg(feature = "cuda")]
fn query_max_resident_threads(_pool: &ThreadPool) -> Result<usize> {
    use cust::device::{Device as CudaDevice, DeviceAttribute};

    cust::init(cust::CudaFlags::empty())?;
    let device = CudaDevice::get_device(0)?;
    let multiprocessors = device.get_attribute(DeviceAttribute::MultiprocessorCount)? as usize;
    let threads_per_multiprocessor =
        device.get_attribute(DeviceAttribute::MaxThreadsPerMultiprocessor)? as usize;
    log::debug!(
        "CUDA device reports {multiprocessors} multiprocessors of {threads_per_multiprocessor} threads"
    );
    Ok(multiprocessors * threads_per_multiprocessor)
}

#[cfg(not(feature = "cuda"))]
fn query_max_resident_threads(pool: &ThreadPool) -> Result<usize> {
    Ok(pool.current_num_threads() * RESIDENT_THREADS_PER_WORKER)
}

/// Scratch memory owned by one call. It is freed when dropped.
#[derive(Debug)]
pub struct DeviceBuffer<T> {
    data: Vec<T>,
}

impl<T> DeviceBuffer<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub(crate) fn push(&mut self, value: T) {
        debug_assert!(self.data.len() < self.data.capacity());
        self.data.push(value);
    }
}

impl<T: Send> DeviceBuffer<T> {
    /// Appends the items of `iter` in order.
    pub(crate) fn par_extend<I>(&mut self, iter: I)
    where
        I: ParallelIterator<Item = T>,
    {
        self.data.par_extend(iter);
    }
}

/// Copies device memory into a newly allocated host vector.
pub fn copy_to_host<T: Clone>(src: &[T]) -> Result<Vec<T>> {
    let mut host = Vec::new();
    host.try_reserve_exact(src.len())
        .map_err(|source| ScanError::Alloc {
            elements: src.len(),
            source,
        })?;
    host.extend_from_slice(src);
    Ok(host)
}

/// Copies host memory back into device memory of the same length.
pub fn copy_from_host<T: Clone>(dst: &mut [T], src: &[T]) {
    dst.clone_from_slice(src);
}
