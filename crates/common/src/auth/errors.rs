//! Error types for backend function calls and session refresh

use std::time::Duration;

use thiserror::Error;

use crate::error::{CommonError, ErrorClassification, ErrorSeverity};
use crate::{impl_error_classification, impl_error_conversion};

/// Failure of a single backend function invocation
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// 401/403: the credential was rejected
    #[error("Unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// 5xx response
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Any other non-success response
    #[error("Client error ({status}): {message}")]
    Client { status: u16, message: String },

    /// Transport failure, no response received
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl InvokeError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// HTTP status carried by the error, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status, .. }
            | Self::Server { status, .. }
            | Self::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Map a non-success HTTP status to the matching variant
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Unauthorized { status, message },
            500..=599 => Self::Server { status, message },
            _ => Self::Client { status, message },
        }
    }
}

impl ErrorClassification for InvokeError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Network(_) | Self::Timeout(_))
            || matches!(self, Self::Client { status: 429, .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Unauthorized { .. } | Self::Network(_) | Self::Timeout(_) => {
                ErrorSeverity::Warning
            }
            Self::Server { .. } | Self::Client { .. } | Self::InvalidResponse(_) => {
                ErrorSeverity::Error
            }
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Failure to refresh a session
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The auth service rejected the refresh token
    #[error("Refresh token rejected: {0}")]
    Rejected(String),

    #[error("Refresh request failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_conversion!(RefreshError, Common);
impl_error_classification!(RefreshError, Common,
    Self::Rejected(_) => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::Transport(_) => {
        retryable: true,
        severity: ErrorSeverity::Warning,
        critical: false,
    }
);

/// Terminal outcome of a guarded backend call
#[derive(Debug, Error)]
pub enum CallError {
    /// No valid session, even after a refresh attempt
    #[error("Session expired, re-authentication required")]
    SessionExpired,

    /// The circuit breaker rejected the call without network I/O
    #[error("Service unstable: circuit breaker is open")]
    CircuitOpen,

    /// Authorization failed again after the allowed refresh-and-retry
    #[error("Unauthorized after session refresh: {0}")]
    Unauthorized(#[source] InvokeError),

    /// Any other invocation failure
    #[error("Backend call failed: {0}")]
    Failed(#[source] InvokeError),
}

impl CallError {
    /// Stable label for structured log fields and queue bookkeeping
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionExpired => "session_expired",
            Self::CircuitOpen => "circuit_open",
            Self::Unauthorized(_) => "unauthorized",
            Self::Failed(_) => "failed",
        }
    }
}

impl ErrorClassification for CallError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitOpen => true,
            Self::SessionExpired | Self::Unauthorized(_) => false,
            Self::Failed(e) => e.is_retryable(),
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::SessionExpired | Self::CircuitOpen | Self::Unauthorized(_) => {
                ErrorSeverity::Warning
            }
            Self::Failed(e) => e.severity(),
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
