use crate::error::{Result, ScanError};
use kernel_tools::WARP_SIZE;

/// The largest grid a launch may request.
pub const MAX_GRID_BLOCKS: usize = (1 << 31) - 1;

/// ceil(x / y) for integers, used to determine # of blocks/warps etc.
pub fn divide_into(x: usize, y: usize) -> usize {
    (x + y - 1) / y
}

/// Hardware limits the launches are checked against before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// How many threads can be resident on the device at once.
    pub max_resident_threads: usize,
    pub max_block_size: usize,
    pub max_grid_blocks: usize,
}

/// How a sequence of `n` elements is split into warp intervals.
///
/// Each warp owns the contiguous interval starting at
/// `warp_index * interval_size`; only the last interval may be short.
///
/// ```text
/// warp#0: (WARP_SIZE) (WARP_SIZE) ... (WARP_SIZE)
/// warp#1: (WARP_SIZE) (WARP_SIZE) ... (WARP_SIZE)
/// ...
/// warp#n: (WARP_SIZE) (short)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPlan {
    pub n: usize,
    pub block_size: usize,
    /// Number of warp-width chunks in the input.
    pub num_units: usize,
    /// Number of warps owning a non-empty interval.
    pub num_warps: usize,
    pub num_blocks: usize,
    /// Number of chunks each warp walks.
    pub num_iters: usize,
    pub interval_size: usize,
}

impl LaunchPlan {
    pub fn warps_per_block(&self) -> usize {
        self.block_size / WARP_SIZE
    }

    /// Warps launched in the grid, including idle ones in the last block.
    pub fn grid_warps(&self) -> usize {
        self.num_blocks * self.warps_per_block()
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Checks the plan against the device before anything is dispatched.
    pub fn check(&self, limits: &DeviceLimits) -> Result<()> {
        if self.block_size > limits.max_block_size {
            return Err(ScanError::invalid_launch(format!(
                "block size {} exceeds the device limit of {}",
                self.block_size, limits.max_block_size
            )));
        }
        if self.num_blocks > limits.max_grid_blocks {
            return Err(ScanError::invalid_launch(format!(
                "{} blocks exceed the device limit of {}",
                self.num_blocks, limits.max_grid_blocks
            )));
        }
        if self.num_blocks * self.block_size > limits.max_resident_threads {
            return Err(ScanError::invalid_launch(format!(
                "{} blocks of {} threads oversubscribe {} resident threads",
                self.num_blocks, self.block_size, limits.max_resident_threads
            )));
        }
        Ok(())
    }
}

/// Splits `n` elements into warp intervals so that a single wave of blocks
/// covers the whole input without oversubscribing the device.
pub fn plan_intervals(
    n: usize,
    block_size: usize,
    max_resident_threads: usize,
) -> Result<LaunchPlan> {
    if block_size == 0 || block_size % WARP_SIZE != 0 {
        return Err(ScanError::invalid_launch(format!(
            "block size {block_size} is not a non-zero multiple of {WARP_SIZE}"
        )));
    }

    // The number of blocks that can be resident at once.
    let max_blocks = max_resident_threads / block_size;
    if max_blocks == 0 {
        return Err(ScanError::invalid_launch(format!(
            "a block of {block_size} threads does not fit in {max_resident_threads} resident threads"
        )));
    }

    if n == 0 {
        return Ok(LaunchPlan {
            n,
            block_size,
            num_units: 0,
            num_warps: 0,
            num_blocks: 0,
            num_iters: 0,
            interval_size: 0,
        });
    }

    let warps_per_block = block_size / WARP_SIZE;
    let num_units = divide_into(n, WARP_SIZE);
    let num_warps = num_units.min(warps_per_block * max_blocks);
    let num_iters = divide_into(num_units, num_warps);
    // Warps past this one would start beyond the end of the input.
    let num_warps = divide_into(num_units, num_iters);
    let num_blocks = divide_into(num_warps, warps_per_block);

    Ok(LaunchPlan {
        n,
        block_size,
        num_units,
        num_warps,
        num_blocks,
        num_iters,
        interval_size: WARP_SIZE * num_iters,
    })
}
