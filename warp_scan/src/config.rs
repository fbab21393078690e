use crate::error::{Result, ScanError};
use kernel_tools::WARP_SIZE;
use std::{fmt, str::FromStr};

/// The default number of threads per block.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// The largest block a launch may request.
pub const MAX_BLOCK_SIZE: usize = 1024;

/// Carry arrays up to this length are scanned by a single warp.
pub const DEFAULT_CARRY_SPAN: usize = WARP_SIZE * 64;

/// Where the per-warp carries are scanned between the partition and update
/// phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarryStrategy {
    /// Scan the carries with the device pipeline.
    Device,
    /// Copy the carries to the host, scan them sequentially and copy them back.
    Host,
    /// Use the host when the carry array holds at most `host_threshold`
    /// elements and the device otherwise.
    Auto { host_threshold: usize },
}

impl CarryStrategy {
    /// Resolves `Auto` against the length of a carry array.
    pub fn on_host(self, carries: usize) -> bool {
        match self {
            Self::Device => false,
            Self::Host => true,
            Self::Auto { host_threshold } => carries <= host_threshold,
        }
    }
}

impl Default for CarryStrategy {
    fn default() -> Self {
        Self::Device
    }
}

impl fmt::Display for CarryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Host => write!(f, "host"),
            Self::Auto { host_threshold } => write!(f, "auto:{host_threshold}"),
        }
    }
}

impl FromStr for CarryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "device" => Ok(Self::Device),
            "host" => Ok(Self::Host),
            "auto" => Ok(Self::Auto {
                host_threshold: WARP_SIZE,
            }),
            other => match other.strip_prefix("auto:") {
                Some(threshold) => threshold
                    .parse()
                    .map(|host_threshold| Self::Auto { host_threshold })
                    .map_err(|e| format!("bad host threshold: {e}")),
                None => Err(format!("unknown carry strategy: {other}")),
            },
        }
    }
}

/// Settings for a [`crate::Device`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Threads per block. Must be a non-zero multiple of the warp width.
    pub block_size: usize,
    /// Size of the worker pool; `None` lets rayon decide.
    pub worker_threads: Option<usize>,
    /// Overrides the occupancy query.
    pub max_resident_threads: Option<usize>,
    pub carry_strategy: CarryStrategy,
    /// Longest carry array scanned by one warp before the device path falls
    /// back to another round of partitioning.
    pub carry_span: usize,
    /// Caps a single scratch allocation.
    pub scratch_limit_bytes: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            worker_threads: None,
            max_resident_threads: None,
            carry_strategy: CarryStrategy::default(),
            carry_span: DEFAULT_CARRY_SPAN,
            scratch_limit_bytes: None,
        }
    }
}

impl ScanConfig {
    /// Defaults overridden by `WARP_SCAN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "WARP_SCAN_BLOCK_SIZE")? {
            config.block_size = v;
        }
        if let Some(v) = parse_var(&lookup, "WARP_SCAN_THREADS")? {
            config.worker_threads = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "WARP_SCAN_MAX_RESIDENT_THREADS")? {
            config.max_resident_threads = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "WARP_SCAN_CARRY")? {
            config.carry_strategy = v;
        }
        if let Some(v) = parse_var(&lookup, "WARP_SCAN_CARRY_SPAN")? {
            config.carry_span = v;
        }
        if let Some(v) = parse_var(&lookup, "WARP_SCAN_SCRATCH_LIMIT")? {
            config.scratch_limit_bytes = Some(v);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn with_max_resident_threads(mut self, threads: usize) -> Self {
        self.max_resident_threads = Some(threads);
        self
    }

    pub fn with_carry_strategy(mut self, strategy: CarryStrategy) -> Self {
        self.carry_strategy = strategy;
        self
    }

    pub fn with_carry_span(mut self, span: usize) -> Self {
        self.carry_span = span;
        self
    }

    pub fn with_scratch_limit_bytes(mut self, limit: usize) -> Self {
        self.scratch_limit_bytes = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0
            || self.block_size % WARP_SIZE != 0
            || self.block_size > MAX_BLOCK_SIZE
        {
            return Err(ScanError::invalid_launch(format!(
                "block size {} must be a non-zero multiple of {WARP_SIZE} no larger than {MAX_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if self.carry_span < WARP_SIZE {
            return Err(ScanError::invalid_launch(format!(
                "carry span {} is smaller than a warp",
                self.carry_span
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(ScanError::invalid_launch("worker pool needs at least one thread"));
        }
        if self.max_resident_threads == Some(0) {
            return Err(ScanError::invalid_launch("device reports no resident threads"));
        }
        Ok(())
    }
}

fn parse_var<V>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<V>>
where
    V: FromStr,
    V::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: V::Err| ScanError::Config {
                key: key.to_string(),
                value,
                reason: e.to_string(),
            }),
    }
}
