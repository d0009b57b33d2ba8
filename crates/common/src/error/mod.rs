//! Shared error vocabulary for the client resilience layer
//!
//! Every module error embeds [`CommonError`] for the failures they have in
//! common (bad configuration, unreadable state, an unreachable backend)
//! and adds its own variants on top. [`ErrorClassification`] gives callers
//! one way to ask any of them whether a retry makes sense and how loudly
//! to report the failure.
//!
//! ```rust,ignore
//! #[derive(Debug, thiserror::Error)]
//! pub enum CartError {
//!     #[error("cart belongs to another context")]
//!     ContextMismatch,
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//!
//! impl_error_conversion!(CartError, Common);
//! impl_error_classification!(CartError, Common,
//!     Self::ContextMismatch => {
//!         retryable: false,
//!         severity: ErrorSeverity::Info,
//!         critical: false,
//!     }
//! );
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Clone, Error)]
pub enum CommonError {
    #[error("Invalid configuration for `{field}`: {message}")]
    Config { field: String, message: String },

    #[error("Could not acquire {resource}")]
    Lock { resource: String },

    #[error("Circuit open for {service}")]
    CircuitBreakerOpen { service: String, retry_after: Option<Duration> },

    #[error("Could not (de)serialize {format}: {message}")]
    Serialization { format: &'static str, message: String },

    /// Local file I/O failed
    #[error("Persistence failed during {operation}: {message}")]
    Persistence { operation: String, message: String },

    /// The key-value store rejected an operation
    #[error("Storage failed for key `{key}`: {message}")]
    Storage { key: String, message: String },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    #[error("Backend call to {function} failed: {message}")]
    Backend { function: String, message: String, retryable: bool },

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Not authorized to {operation}")]
    Unauthorized { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommonError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::config_field("config", message)
    }

    pub fn config_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { field: field.into(), message: message.into() }
    }

    pub fn persistence_op(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence { operation: operation.into(), message: message.into() }
    }

    pub fn circuit_open(service: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::CircuitBreakerOpen { service: service.into(), retry_after }
    }

    pub fn backend(function: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Backend { function: function.into(), message: message.into(), retryable }
    }

    /// Short label for structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Lock { .. } => "lock",
            Self::CircuitBreakerOpen { .. } => "circuit_open",
            Self::Serialization { .. } => "serialization",
            Self::Persistence { .. } => "persistence",
            Self::Storage { .. } => "storage",
            Self::Timeout { .. } => "timeout",
            Self::Backend { .. } => "backend",
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Internal(_) => "internal",
        }
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Lock { .. } | Self::CircuitBreakerOpen { .. } | Self::Timeout { .. } => true,
            Self::Backend { retryable, .. } => *retryable,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound { .. } => ErrorSeverity::Info,
            Self::Lock { .. }
            | Self::CircuitBreakerOpen { .. }
            | Self::Timeout { .. }
            | Self::Unauthorized { .. } => ErrorSeverity::Warning,
            Self::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitBreakerOpen { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization { format: "JSON", message: err.to_string() }
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        Self::persistence_op(format!("{:?}", err.kind()), err.to_string())
    }
}

/// Retry and reporting hints every module error answers
pub trait ErrorClassification {
    /// Transient failures (timeouts, an open breaker, lock contention)
    fn is_retryable(&self) -> bool;

    fn severity(&self) -> ErrorSeverity;

    /// Failures that indicate a bug rather than an environment problem
    fn is_critical(&self) -> bool;

    fn retry_after(&self) -> Option<Duration>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        })
    }
}

/// `From<serde_json::Error>` and `From<std::io::Error>` for a module error
/// whose `$variant` wraps [`CommonError`]
#[macro_export]
macro_rules! impl_error_conversion {
    ($error:ty, $variant:ident) => {
        impl ::std::convert::From<::serde_json::Error> for $error {
            fn from(err: ::serde_json::Error) -> Self {
                Self::$variant(err.into())
            }
        }

        impl ::std::convert::From<::std::io::Error> for $error {
            fn from(err: ::std::io::Error) -> Self {
                Self::$variant(err.into())
            }
        }
    };
}

/// [`ErrorClassification`] for a module error: the `$common` variant
/// delegates to [`CommonError`], every other variant is listed with its
/// classification
#[macro_export]
macro_rules! impl_error_classification {
    (
        $error:ty, $common:ident
        $(, $pattern:pat => {
            retryable: $retryable:expr,
            severity: $severity:expr,
            critical: $critical:expr
            $(, retry_after: $after:expr)?
            $(,)?
        })*
        $(,)?
    ) => {
        impl $crate::error::ErrorClassification for $error {
            fn is_retryable(&self) -> bool {
                use $crate::error::ErrorClassification as _;
                match self {
                    Self::$common(inner) => inner.is_retryable(),
                    $($pattern => $retryable,)*
                }
            }

            fn severity(&self) -> $crate::error::ErrorSeverity {
                use $crate::error::ErrorClassification as _;
                match self {
                    Self::$common(inner) => inner.severity(),
                    $($pattern => $severity,)*
                }
            }

            fn is_critical(&self) -> bool {
                use $crate::error::ErrorClassification as _;
                match self {
                    Self::$common(inner) => inner.is_critical(),
                    $($pattern => $critical,)*
                }
            }

            fn retry_after(&self) -> ::std::option::Option<::std::time::Duration> {
                use $crate::error::ErrorClassification as _;
                match self {
                    Self::$common(inner) => inner.retry_after(),
                    $($($pattern => $after,)?)*
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }
        }
    };
}
