//! Local record store port interfaces
//!
//! The local store is the only resource written by more than one component
//! (reconcilers and saga). Every write path here is row-scoped and designed
//! to be independently idempotent and re-runnable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempo_domain::{
    CalendarEvent, IntegrationConfig, IntegrationState, NewCalendarEvent, NewTask, Provider,
    Result, Task, TaskStatus,
};

/// Task store operations used by the engine.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Look up a mirrored task by its `(external_id, external_source)` pair.
    /// Must be consulted before any create.
    async fn find_by_external(&self, external_id: &str, external_source: &str)
        -> Result<Option<Task>>;

    async fn insert(&self, task: NewTask) -> Result<Task>;

    /// Whole-row update keyed by internal id.
    async fn update(&self, task: &Task) -> Result<()>;

    /// Flip the callback-processed flag (prevents saga re-trigger).
    async fn set_callback_processed(&self, id: &str) -> Result<()>;

    /// Move a task to a status with an optional due date (saga step 4).
    async fn set_schedule(
        &self,
        id: &str,
        status: TaskStatus,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// Calendar event store operations used by the engine.
#[async_trait]
pub trait CalendarEventRepository: Send + Sync {
    /// Local-origin events in range that have not been pushed yet
    /// (no remote id, not a blocker).
    async fn list_unpushed(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>>;

    /// Record the remote id returned by a successful push. The remote id is
    /// the sole push idempotency key.
    async fn set_remote_id(&self, id: &str, remote_event_id: &str) -> Result<()>;

    async fn find_by_remote_id(&self, remote_event_id: &str) -> Result<Option<CalendarEvent>>;

    async fn insert(&self, event: NewCalendarEvent) -> Result<CalendarEvent>;

    async fn update(&self, event: &CalendarEvent) -> Result<()>;

    /// Blocker mirrors within a time range (drift cleanup and appointment
    /// search both read these).
    async fn list_blockers(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>>;

    /// Delete a local event row. Deleting an already-absent row is a no-op.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Look up a saga-created event by its origin-ref marker.
    async fn find_by_origin_ref(&self, origin_ref: &str) -> Result<Option<CalendarEvent>>;
}

/// Integration state store operations.
#[async_trait]
pub trait IntegrationStateRepository: Send + Sync {
    async fn get(&self, provider: Provider) -> Result<Option<IntegrationState>>;

    async fn upsert(&self, state: &IntegrationState) -> Result<()>;

    /// Persist a refreshed access token and its expiry.
    async fn save_tokens(
        &self,
        provider: Provider,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn set_active(&self, provider: Provider, is_active: bool) -> Result<()>;

    /// Advance the sync cursor and last-sync timestamp after a successful
    /// tick.
    async fn set_sync_cursor(
        &self,
        provider: Provider,
        cursor: Option<&str>,
        last_sync_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Clear all token material and the cursor; used by disconnect. The row
    /// itself is kept (soft disable), never hard-deleted.
    async fn clear_credentials(&self, provider: Provider) -> Result<()>;

    async fn set_config(&self, provider: Provider, config: &IntegrationConfig) -> Result<()>;
}
