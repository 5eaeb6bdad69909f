//! Sqlite-backed implementations of the store ports.

pub mod calendar_event_repository;
pub mod integration_state_repository;
pub mod manager;
pub mod task_repository;

pub use calendar_event_repository::SqliteCalendarEventRepository;
pub use integration_state_repository::SqliteIntegrationStateRepository;
pub use manager::{DbManager, SqliteConnection, SqlitePool};
pub use task_repository::SqliteTaskRepository;

use chrono::{DateTime, Utc};
use tempo_domain::{Result, TempoError};

/// Decode an epoch-seconds column into a UTC timestamp.
pub(crate) fn datetime_from_secs(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| TempoError::Database(format!("timestamp out of range: {secs}")))
}

/// Decode a nullable epoch-seconds column.
pub(crate) fn opt_datetime_from_secs(secs: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    secs.map(datetime_from_secs).transpose()
}
