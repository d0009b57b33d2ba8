//! Conversions from adapter and library errors into domain errors.

use superapp_common::auth::{CallError, InvokeError, RefreshError};
use superapp_common::error::CommonError;
use superapp_common::storage::StorageError;
use superapp_common::sync::QueueError;
use superapp_domain::SuperAppError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub SuperAppError);

impl From<InfraError> for SuperAppError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SuperAppError> for InfraError {
    fn from(value: SuperAppError) -> Self {
        InfraError(value)
    }
}

trait IntoSuperAppError {
    fn into_superapp(self) -> SuperAppError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SuperAppError */
/* -------------------------------------------------------------------------- */

impl IntoSuperAppError for reqwest::Error {
    fn into_superapp(self) -> SuperAppError {
        if self.is_timeout() {
            return SuperAppError::Network("HTTP request timed out".into());
        }
        if self.is_connect() {
            return SuperAppError::Network("HTTP connection failure".into());
        }
        if self.is_builder() {
            return SuperAppError::Config(format!("invalid HTTP request: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));
            return match code {
                401 | 403 => SuperAppError::Auth(message),
                404 => SuperAppError::NotFound(message),
                400..=499 if code != 429 => SuperAppError::InvalidInput(message),
                _ => SuperAppError::Network(message),
            };
        }

        SuperAppError::Network(self.to_string())
    }
}

impl From<reqwest::Error> for InfraError {
    fn from(value: reqwest::Error) -> Self {
        InfraError(value.into_superapp())
    }
}

/* -------------------------------------------------------------------------- */
/* superapp-common errors → SuperAppError */
/* -------------------------------------------------------------------------- */

impl IntoSuperAppError for CommonError {
    fn into_superapp(self) -> SuperAppError {
        let message = self.to_string();
        match self {
            CommonError::Config { .. } => SuperAppError::Config(message),
            CommonError::Persistence { .. }
            | CommonError::Storage { .. }
            | CommonError::Serialization { .. } => SuperAppError::Storage(message),
            CommonError::CircuitBreakerOpen { .. } => SuperAppError::CircuitOpen(message),
            CommonError::Timeout { .. } | CommonError::Backend { .. } => {
                SuperAppError::Network(message)
            }
            CommonError::Unauthorized { .. } => SuperAppError::Auth(message),
            CommonError::NotFound { .. } => SuperAppError::NotFound(message),
            CommonError::Validation { .. } => SuperAppError::InvalidInput(message),
            _ => SuperAppError::Internal(message),
        }
    }
}

impl From<CommonError> for InfraError {
    fn from(value: CommonError) -> Self {
        InfraError(value.into_superapp())
    }
}

impl IntoSuperAppError for StorageError {
    fn into_superapp(self) -> SuperAppError {
        match self {
            StorageError::Common(inner) => inner.into_superapp(),
            other => SuperAppError::Storage(other.to_string()),
        }
    }
}

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        InfraError(value.into_superapp())
    }
}

impl IntoSuperAppError for QueueError {
    fn into_superapp(self) -> SuperAppError {
        match self {
            QueueError::Common(inner) => inner.into_superapp(),
            QueueError::Storage(inner) => inner.into_superapp(),
            QueueError::Offline => SuperAppError::Network(self.to_string()),
            other => SuperAppError::Sync(other.to_string()),
        }
    }
}

impl From<QueueError> for InfraError {
    fn from(value: QueueError) -> Self {
        InfraError(value.into_superapp())
    }
}

impl IntoSuperAppError for InvokeError {
    fn into_superapp(self) -> SuperAppError {
        let message = self.to_string();
        match self {
            InvokeError::Unauthorized { .. } => SuperAppError::Auth(message),
            InvokeError::Client { status: 404, .. } => SuperAppError::NotFound(message),
            InvokeError::Client { status, .. } if status != 429 => {
                SuperAppError::InvalidInput(message)
            }
            InvokeError::InvalidResponse(_) => SuperAppError::Internal(message),
            _ => SuperAppError::Network(message),
        }
    }
}

impl IntoSuperAppError for CallError {
    fn into_superapp(self) -> SuperAppError {
        match self {
            CallError::SessionExpired => SuperAppError::SessionExpired(self.to_string()),
            CallError::CircuitOpen => SuperAppError::CircuitOpen(self.to_string()),
            CallError::Unauthorized(inner) => SuperAppError::Auth(inner.to_string()),
            CallError::Failed(inner) => inner.into_superapp(),
        }
    }
}

impl From<CallError> for InfraError {
    fn from(value: CallError) -> Self {
        InfraError(value.into_superapp())
    }
}

impl IntoSuperAppError for RefreshError {
    fn into_superapp(self) -> SuperAppError {
        match self {
            RefreshError::Rejected(_) => SuperAppError::SessionExpired(self.to_string()),
            RefreshError::Transport(_) => SuperAppError::Network(self.to_string()),
            RefreshError::Common(inner) => inner.into_superapp(),
        }
    }
}

impl From<RefreshError> for InfraError {
    fn from(value: RefreshError) -> Self {
        InfraError(value.into_superapp())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
