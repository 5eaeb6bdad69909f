//! Scheduler error types

use std::time::Duration;

use tempo_domain::TempoError;
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

use crate::errors::InfraError;

/// Errors from the queue runtime and the recurring scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler already running")]
    AlreadyRunning,

    #[error("scheduler not running")]
    NotRunning,

    #[error("failed to create scheduler: {source}")]
    CreationFailed { source: JobSchedulerError },

    #[error("failed to start scheduler: {source}")]
    StartFailed { source: JobSchedulerError },

    #[error("failed to stop scheduler: {source}")]
    StopFailed { source: JobSchedulerError },

    #[error("failed to register job: {source}")]
    JobRegistrationFailed { source: JobSchedulerError },

    #[error("operation timed out after {duration:?}")]
    Timeout {
        duration: Duration,
        source: tokio::time::error::Elapsed,
    },

    #[error("task join failed: {0}")]
    TaskJoinFailed(#[from] tokio::task::JoinError),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let mapped = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                TempoError::InvalidInput(err.to_string())
            }
            other => TempoError::Internal(other.to_string()),
        };
        InfraError(mapped)
    }
}

impl From<SchedulerError> for TempoError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
