//! Data-parallel scan and gather primitives executed by warps of lanes on a
//! [`Device`].
//!
//! A scan runs as three launches: every warp scans its own interval and
//! publishes a carry, the carries are scanned, and each warp folds its carry
//! back into its interval.

mod config;
mod device;
mod error;
mod gather;
mod launch;
pub mod scan;

pub use config::{
    CarryStrategy, ScanConfig, DEFAULT_BLOCK_SIZE, DEFAULT_CARRY_SPAN, MAX_BLOCK_SIZE,
};
pub use device::{
    copy_from_host, copy_to_host, default_device, Device, DeviceBuffer, DeviceStats,
    RESIDENT_THREADS_PER_WORKER,
};
pub use error::{Result, ScanError};
pub use gather::{gather, gather_if, swap_ranges};
pub use kernel_tools::WARP_SIZE;
pub use launch::{divide_into, plan_intervals, DeviceLimits, LaunchPlan};
pub use scan::{exclusive_scan, inclusive_scan, sequential_exclusive_scan, sequential_scan};
