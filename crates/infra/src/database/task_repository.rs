//! Sqlite-backed implementation of the TaskRepository port.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tempo_core::TaskRepository;
use tempo_domain::{
    NewTask, Result, Task, TaskCategory, TaskPriority, TaskStatus, TempoError,
};
use tracing::instrument;
use uuid::Uuid;

use super::manager::map_sql_error;
use super::{datetime_from_secs, opt_datetime_from_secs, SqlitePool};
use crate::errors::InfraError;

const TASK_COLUMNS: &str = "id, title, description, status, category, priority, due_at, \
                            estimated_minutes, callback_processed, external_id, external_source, \
                            created_at, updated_at";

/// Sqlite implementation of TaskRepository.
pub struct SqliteTaskRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteTaskRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<super::SqliteConnection> {
        self.pool.get().map_err(|e| TempoError::from(InfraError::from(e)))
    }
}

/// Intermediate row shape; timestamps stay raw so conversion failures
/// surface as domain errors instead of rusqlite ones.
struct TaskRow {
    id: String,
    title: String,
    description: Option<String>,
    status: String,
    category: String,
    priority: String,
    due_at: Option<i64>,
    estimated_minutes: Option<i64>,
    callback_processed: bool,
    external_id: Option<String>,
    external_source: Option<String>,
    created_at: i64,
    updated_at: i64,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        category: row.get(4)?,
        priority: row.get(5)?,
        due_at: row.get(6)?,
        estimated_minutes: row.get(7)?,
        callback_processed: row.get::<_, i64>(8)? != 0,
        external_id: row.get(9)?,
        external_source: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn into_task(raw: TaskRow) -> Result<Task> {
    Ok(Task {
        id: raw.id,
        title: raw.title,
        description: raw.description,
        status: TaskStatus::parse(&raw.status).unwrap_or(TaskStatus::Inbox),
        category: TaskCategory::parse(&raw.category).unwrap_or(TaskCategory::Admin),
        priority: TaskPriority::parse(&raw.priority).unwrap_or(TaskPriority::Medium),
        due_at: opt_datetime_from_secs(raw.due_at)?,
        estimated_minutes: raw.estimated_minutes,
        callback_processed: raw.callback_processed,
        external_id: raw.external_id,
        external_source: raw.external_source,
        created_at: datetime_from_secs(raw.created_at)?,
        updated_at: datetime_from_secs(raw.updated_at)?,
    })
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self))]
    async fn find_by_external(
        &self,
        external_id: &str,
        external_source: &str,
    ) -> Result<Option<Task>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE external_id = ?1 AND external_source = ?2"
        );

        let result = conn.query_row(&sql, params![external_id, external_source], read_row);
        match result {
            Ok(raw) => Ok(Some(into_task(raw)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(map_sql_error(e)),
        }
    }

    #[instrument(skip(self, task), fields(title = %task.title))]
    async fn insert(&self, task: NewTask) -> Result<Task> {
        let conn = self.conn()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO tasks (id, title, description, status, category, priority, due_at, \
             estimated_minutes, callback_processed, external_id, external_source, created_at, \
             updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11, ?11)",
            params![
                id,
                task.title,
                task.description,
                task.status.as_str(),
                task.category.as_str(),
                task.priority.as_str(),
                task.due_at.map(|t| t.timestamp()),
                task.estimated_minutes,
                task.external_id,
                task.external_source,
                now.timestamp(),
            ],
        )
        .map_err(map_sql_error)?;

        Ok(Task {
            id,
            title: task.title,
            description: task.description,
            status: task.status,
            category: task.category,
            priority: task.priority,
            due_at: task.due_at,
            estimated_minutes: task.estimated_minutes,
            callback_processed: false,
            external_id: task.external_id,
            external_source: task.external_source,
            created_at: now,
            updated_at: now,
        })
    }

    #[instrument(skip(self, task), fields(id = %task.id))]
    async fn update(&self, task: &Task) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE tasks SET title = ?2, description = ?3, status = ?4, category = ?5, \
                 priority = ?6, due_at = ?7, estimated_minutes = ?8, updated_at = ?9 \
                 WHERE id = ?1",
                params![
                    task.id,
                    task.title,
                    task.description,
                    task.status.as_str(),
                    task.category.as_str(),
                    task.priority.as_str(),
                    task.due_at.map(|t| t.timestamp()),
                    task.estimated_minutes,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(map_sql_error)?;

        if changed == 0 {
            return Err(TempoError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_callback_processed(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE tasks SET callback_processed = 1, updated_at = ?2 WHERE id = ?1",
                params![id, Utc::now().timestamp()],
            )
            .map_err(map_sql_error)?;

        if changed == 0 {
            return Err(TempoError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_schedule(
        &self,
        id: &str,
        status: TaskStatus,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE tasks SET status = ?2, due_at = ?3, updated_at = ?4 WHERE id = ?1",
                params![
                    id,
                    status.as_str(),
                    due_at.map(|t| t.timestamp()),
                    Utc::now().timestamp()
                ],
            )
            .map_err(map_sql_error)?;

        if changed == 0 {
            return Err(TempoError::NotFound(format!("task {id}")));
        }
        Ok(())
    }
}
