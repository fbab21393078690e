use std::collections::TryReserveError;
use thiserror::Error;

pub type Result<T, E = ScanError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scratch request of {bytes} bytes exceeds the device limit of {limit} bytes")]
    OutOfMemory { bytes: usize, limit: usize },

    #[error("failed to allocate scratch for {elements} elements")]
    Alloc {
        elements: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("invalid launch configuration: {reason}")]
    InvalidLaunch { reason: String },

    #[error("destination holds {capacity} elements but {required} are required")]
    DestinationTooSmall { required: usize, capacity: usize },

    #[error("`{name}` holds {actual} elements but at least {expected} are required")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid value {value:?} for {key}: {reason}")]
    Config {
        key: String,
        value: String,
        reason: String,
    },

    #[error("failed to build the worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[cfg(feature = "cuda")]
    #[error("CUDA occupancy query failed")]
    Cuda(#[from] cust::error::CudaError),
}

impl ScanError {
    pub(crate) fn invalid_launch(reason: impl Into<String>) -> Self {
        Self::InvalidLaunch {
            reason: reason.into(),
        }
    }
}
