//! Job scheduling primitives
//!
//! The queue runtime dispatches on the closed `JobKind` enum rather than
//! job-name strings, and payloads are typed per kind rather than open JSON.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::integration::Provider;

/// Named queues with independent worker pools.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Provider sync ticks; parallel across providers.
    Sync,
    /// Schedule-mutating work (replan, callback saga); concurrency 1.
    Planning,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Planning => "planning",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of job types the engine runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    CalendarSync,
    CrmSync,
    LeadSync,
    CallbackSaga,
    Replan,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CalendarSync => "calendar_sync",
            Self::CrmSync => "crm_sync",
            Self::LeadSync => "lead_sync",
            Self::CallbackSaga => "callback_saga",
            Self::Replan => "replan",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload for a callback saga job.
///
/// `deal_id` is written back into the retry payload after the first
/// successful deal creation so later attempts never recreate the deal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CallbackJob {
    pub lead_id: String,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub deal_id: Option<String>,
}

/// Typed job payloads, one variant per `JobKind` family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Sync { provider: Provider },
    Callback(CallbackJob),
    Replan,
}

/// Backoff strategy for retryable job failures.
///
/// The custom variant carries the caller-supplied mapping from completed
/// attempts to a delay in milliseconds.
#[derive(Clone)]
pub enum BackoffPolicy {
    /// Exponential: `base_ms * 2^(attempts_made - 1)`.
    Standard { base_ms: u64 },
    Custom(BackoffFn),
}

/// Mapping from `attempts_made` to a delay in milliseconds.
pub type BackoffFn = Arc<dyn Fn(u32) -> u64 + Send + Sync>;

impl BackoffPolicy {
    /// Delay before the next attempt, given the number of completed attempts
    /// (always >= 1 when consulted).
    pub fn delay_ms(&self, attempts_made: u32) -> u64 {
        match self {
            Self::Standard { base_ms } => {
                base_ms.saturating_mul(2u64.saturating_pow(attempts_made.saturating_sub(1)))
            }
            Self::Custom(f) => f(attempts_made),
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Standard { base_ms: 1_000 }
    }
}

impl fmt::Debug for BackoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard { base_ms } => {
                f.debug_struct("Standard").field("base_ms", base_ms).finish()
            }
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Handle identifying an enqueued job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A job submission: queue, kind, payload and retry discipline.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub queue: QueueName,
    pub kind: JobKind,
    pub payload: JobPayload,
    pub delay: Option<Duration>,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl JobSpec {
    /// An immediate single-attempt job.
    pub fn immediate(queue: QueueName, kind: JobKind, payload: JobPayload) -> Self {
        Self { queue, kind, payload, delay: None, max_attempts: 1, backoff: BackoffPolicy::default() }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}
