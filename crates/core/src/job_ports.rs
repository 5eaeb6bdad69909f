//! Job dispatch and handler ports
//!
//! The queue runtime lives in infra; the engine only sees these two traits.

use async_trait::async_trait;
use tempo_domain::{JobId, JobKind, JobPayload, JobSpec, Result, TempoError};

/// Everything a handler knows about the attempt it is running.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: JobPayload,
    /// Completed attempts before this one; 0 on the first run.
    pub attempts_made: u32,
    pub max_attempts: u32,
}

impl JobContext {
    /// True when this run is the last one the attempt budget allows.
    pub fn is_final_attempt(&self) -> bool {
        self.attempts_made + 1 >= self.max_attempts
    }
}

/// How a job run failed.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Re-enqueue after the job's backoff if attempts remain. `payload`
    /// replaces the stored payload for the retry when present (the saga uses
    /// this to carry the created deal id forward).
    #[error("retryable: {reason}")]
    Retry {
        reason: String,
        payload: Option<JobPayload>,
    },
    /// Do not retry regardless of remaining attempts.
    #[error("fatal: {0}")]
    Fatal(TempoError),
}

impl JobError {
    pub fn retry(reason: impl Into<String>) -> Self {
        Self::Retry { reason: reason.into(), payload: None }
    }

    pub fn retry_with_payload(reason: impl Into<String>, payload: JobPayload) -> Self {
        Self::Retry { reason: reason.into(), payload: Some(payload) }
    }
}

/// A job body run on a queue worker slot.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, ctx: JobContext) -> std::result::Result<(), JobError>;
}

/// Enqueue access for components that trigger follow-up work (lead
/// reconciler → saga, webhook relay → immediate sync, sync → replan).
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn enqueue(&self, spec: JobSpec) -> Result<JobId>;
}
