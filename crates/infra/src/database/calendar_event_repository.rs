//! Sqlite-backed implementation of the CalendarEventRepository port.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tempo_core::CalendarEventRepository;
use tempo_domain::{CalendarEvent, EventSource, NewCalendarEvent, Result, TempoError};
use tracing::instrument;
use uuid::Uuid;

use super::manager::map_sql_error;
use super::{datetime_from_secs, SqlitePool};
use crate::errors::InfraError;

const EVENT_COLUMNS: &str = "id, title, description, location, start_time, end_time, is_blocker, \
                             source, remote_event_id, origin_ref, created_at, updated_at";

/// Sqlite implementation of CalendarEventRepository.
pub struct SqliteCalendarEventRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCalendarEventRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<super::SqliteConnection> {
        self.pool.get().map_err(|e| TempoError::from(InfraError::from(e)))
    }

    fn find_one(&self, where_clause: &str, key: &str) -> Result<Option<CalendarEvent>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {EVENT_COLUMNS} FROM calendar_events WHERE {where_clause}");
        match conn.query_row(&sql, params![key], read_row) {
            Ok(raw) => Ok(Some(into_event(raw)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(map_sql_error(e)),
        }
    }

    fn list_range(
        &self,
        where_clause: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM calendar_events \
             WHERE start_time >= ?1 AND start_time < ?2 AND {where_clause} \
             ORDER BY start_time"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
        let rows = stmt
            .query_map(params![start.timestamp(), end.timestamp()], read_row)
            .map_err(map_sql_error)?;

        let mut events = Vec::new();
        for raw in rows {
            events.push(into_event(raw.map_err(map_sql_error)?)?);
        }
        Ok(events)
    }
}

struct EventRow {
    id: String,
    title: String,
    description: Option<String>,
    location: Option<String>,
    start_time: i64,
    end_time: i64,
    is_blocker: bool,
    source: String,
    remote_event_id: Option<String>,
    origin_ref: Option<String>,
    created_at: i64,
    updated_at: i64,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        location: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        is_blocker: row.get::<_, i64>(6)? != 0,
        source: row.get(7)?,
        remote_event_id: row.get(8)?,
        origin_ref: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn into_event(raw: EventRow) -> Result<CalendarEvent> {
    Ok(CalendarEvent {
        id: raw.id,
        title: raw.title,
        description: raw.description,
        location: raw.location,
        start_time: datetime_from_secs(raw.start_time)?,
        end_time: datetime_from_secs(raw.end_time)?,
        is_blocker: raw.is_blocker,
        source: EventSource::parse(&raw.source).unwrap_or(EventSource::Manual),
        remote_event_id: raw.remote_event_id,
        origin_ref: raw.origin_ref,
        created_at: datetime_from_secs(raw.created_at)?,
        updated_at: datetime_from_secs(raw.updated_at)?,
    })
}

#[async_trait]
impl CalendarEventRepository for SqliteCalendarEventRepository {
    #[instrument(skip(self))]
    async fn list_unpushed(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        self.list_range(
            "source != 'calendar' AND is_blocker = 0 AND remote_event_id IS NULL",
            start,
            end,
        )
    }

    #[instrument(skip(self))]
    async fn list_blockers(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        self.list_range("is_blocker = 1", start, end)
    }

    #[instrument(skip(self))]
    async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<CalendarEvent>> {
        self.find_one("remote_event_id = ?1", remote_id)
    }

    #[instrument(skip(self))]
    async fn find_by_origin_ref(&self, origin_ref: &str) -> Result<Option<CalendarEvent>> {
        self.find_one("origin_ref = ?1", origin_ref)
    }

    #[instrument(skip(self, event), fields(title = %event.title))]
    async fn insert(&self, event: NewCalendarEvent) -> Result<CalendarEvent> {
        let conn = self.conn()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO calendar_events (id, title, description, location, start_time, \
             end_time, is_blocker, source, remote_event_id, origin_ref, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                id,
                event.title,
                event.description,
                event.location,
                event.start_time.timestamp(),
                event.end_time.timestamp(),
                event.is_blocker,
                event.source.as_str(),
                event.remote_event_id,
                event.origin_ref,
                now.timestamp(),
            ],
        )
        .map_err(map_sql_error)?;

        Ok(CalendarEvent {
            id,
            title: event.title,
            description: event.description,
            location: event.location,
            start_time: event.start_time,
            end_time: event.end_time,
            is_blocker: event.is_blocker,
            source: event.source,
            remote_event_id: event.remote_event_id,
            origin_ref: event.origin_ref,
            created_at: now,
            updated_at: now,
        })
    }

    #[instrument(skip(self, event), fields(id = %event.id))]
    async fn update(&self, event: &CalendarEvent) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE calendar_events SET title = ?2, description = ?3, location = ?4, \
                 start_time = ?5, end_time = ?6, is_blocker = ?7, source = ?8, \
                 remote_event_id = ?9, origin_ref = ?10, updated_at = ?11 WHERE id = ?1",
                params![
                    event.id,
                    event.title,
                    event.description,
                    event.location,
                    event.start_time.timestamp(),
                    event.end_time.timestamp(),
                    event.is_blocker,
                    event.source.as_str(),
                    event.remote_event_id,
                    event.origin_ref,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(map_sql_error)?;

        if changed == 0 {
            return Err(TempoError::NotFound(format!("calendar event {}", event.id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_remote_id(&self, id: &str, remote_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE calendar_events SET remote_event_id = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, remote_id, Utc::now().timestamp()],
            )
            .map_err(map_sql_error)?;

        if changed == 0 {
            return Err(TempoError::NotFound(format!("calendar event {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM calendar_events WHERE id = ?1", params![id])
            .map_err(map_sql_error)?;
        Ok(())
    }
}
