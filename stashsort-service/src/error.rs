//! Service error types.

use crate::config::ConfigError;
use stashsort_core::ContainerKind;
use thiserror::Error;

/// Errors returned by the service entry points.
///
/// A sort that starts and then stops early is not an error; it is reported
/// through [`stashsort_core::SortReport`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(#[from] stashsort_core::CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] stashsort_storage::StorageError),

    #[error("capture error: {0}")]
    Capture(#[from] stashsort_capture::CaptureError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("container {0} cannot be sorted")]
    NotSortable(ContainerKind),

    #[error("overflow container {0} is the sort destination")]
    OverflowIsDestination(ContainerKind),

    #[error("a sort is already running")]
    SortInProgress,

    #[error("sort worker panicked")]
    WorkerPanicked,
}

impl ServiceError {
    /// Returns whether the error means nothing has been captured yet for the
    /// requested character or container.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::Storage(e) if e.is_not_found())
    }

    /// Returns whether the same call may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Io(_) | ServiceError::SortInProgress => true,
            ServiceError::Capture(e) => e.is_retryable(),
            ServiceError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}
