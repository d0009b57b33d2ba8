//! Scheduler error types

use std::time::Duration;

use superapp_domain::SuperAppError;
use thiserror::Error;
use tokio::time::error::Elapsed;
use tokio_cron_scheduler::JobSchedulerError;

use crate::errors::InfraError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler already running")]
    AlreadyRunning,

    #[error("Scheduler not running")]
    NotRunning,

    /// `start` after `stop`
    #[error("Scheduler has been shut down")]
    ShutDown,

    #[error("Failed to create scheduler: {source}")]
    CreationFailed {
        #[source]
        source: JobSchedulerError,
    },

    #[error("Failed to start scheduler: {source}")]
    StartFailed {
        #[source]
        source: JobSchedulerError,
    },

    #[error("Failed to stop scheduler: {source}")]
    StopFailed {
        #[source]
        source: JobSchedulerError,
    },

    /// Invalid cron expression or rejected job
    #[error("Failed to register job '{job}': {source}")]
    JobRegistrationFailed {
        job: &'static str,
        #[source]
        source: JobSchedulerError,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout {
        duration: Duration,
        #[source]
        source: Elapsed,
    },
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let superapp_err = match err {
            SchedulerError::AlreadyRunning
            | SchedulerError::NotRunning
            | SchedulerError::ShutDown => {
                SuperAppError::InvalidInput(err.to_string())
            }
            SchedulerError::JobRegistrationFailed { .. } => SuperAppError::Config(err.to_string()),
            _ => SuperAppError::Scheduler(err.to_string()),
        };
        InfraError(superapp_err)
    }
}

impl From<SchedulerError> for SuperAppError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
