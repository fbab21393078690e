//! Per-warp routines for the interval scan and the permutation primitives.
//!
//! Everything here runs inside a single cohort of [`WARP_SIZE`] lanes. The
//! host side decides how intervals are laid out and when one launch may read
//! what an earlier launch wrote.

pub mod interval;
pub mod permute;
mod step;
pub mod update;
pub mod warp;

pub use interval::{scan_interval, IntervalIo};
pub use update::{update_interval, UpdateMode};
pub use warp::{WarpScratch, WARP_SIZE};
