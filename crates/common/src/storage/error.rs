//! Storage error types

use thiserror::Error;

use crate::error::{CommonError, ErrorSeverity};
use crate::{impl_error_classification, impl_error_conversion};

/// Storage error type
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Corrupted entry at '{key}': {message}")]
    Corrupted { key: String, message: String },

    #[error(transparent)]
    Common(#[from] CommonError),
}

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn corrupted<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::Corrupted { key: key.into(), message: message.into() }
    }
}

impl_error_conversion!(StorageError, Common);
impl_error_classification!(StorageError, Common,
    Self::InvalidKey(_) => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::Corrupted { .. } => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    }
);
