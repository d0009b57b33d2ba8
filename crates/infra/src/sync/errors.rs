//! Background worker errors

use superapp_domain::SuperAppError;
use thiserror::Error;

use crate::errors::InfraError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker already running")]
    AlreadyRunning,

    #[error("Worker not running")]
    NotRunning,

    /// The task did not finish within the join timeout
    #[error("Worker did not stop within {seconds}s")]
    JoinTimeout { seconds: u64 },

    #[error("Worker task panicked: {0}")]
    TaskPanicked(String),
}

impl From<WorkerError> for InfraError {
    fn from(err: WorkerError) -> Self {
        let superapp_err = match err {
            WorkerError::AlreadyRunning | WorkerError::NotRunning => {
                SuperAppError::InvalidInput(err.to_string())
            }
            _ => SuperAppError::Sync(err.to_string()),
        };
        InfraError(superapp_err)
    }
}

impl From<WorkerError> for SuperAppError {
    fn from(err: WorkerError) -> Self {
        InfraError::from(err).into()
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;
