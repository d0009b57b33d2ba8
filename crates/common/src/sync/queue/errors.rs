use thiserror::Error;

use crate::error::{CommonError, ErrorSeverity};
use crate::storage::StorageError;
use crate::{impl_error_classification, impl_error_conversion};

/// Offline queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Queue is at maximum capacity ({0})")]
    CapacityExceeded(usize),

    /// `sync` was called while the device is offline
    #[error("Device is offline")]
    Offline,

    #[error("A sync pass is already running")]
    SyncInProgress,
}

/// Queue result type
pub type QueueResult<T> = Result<T, QueueError>;

impl_error_conversion!(QueueError, Common);
impl_error_classification!(QueueError, Common,
    Self::Storage(e) => {
        retryable: crate::error::ErrorClassification::is_retryable(e),
        severity: crate::error::ErrorClassification::severity(e),
        critical: crate::error::ErrorClassification::is_critical(e),
    },
    Self::CapacityExceeded(_) => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::Offline => {
        retryable: true,
        severity: ErrorSeverity::Info,
        critical: false,
    },
    Self::SyncInProgress => {
        retryable: true,
        severity: ErrorSeverity::Info,
        critical: false,
    }
);
