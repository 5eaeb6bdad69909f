//! Sqlite-backed implementation of the IntegrationStateRepository port.
//!
//! The typed per-provider config is persisted as a JSON TEXT column; rows
//! are keyed by provider and upserted, never hard-deleted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tempo_core::IntegrationStateRepository;
use tempo_domain::{IntegrationConfig, IntegrationState, Provider, Result, TempoError};
use tracing::instrument;

use super::manager::map_sql_error;
use super::{opt_datetime_from_secs, SqlitePool};
use crate::errors::InfraError;

/// Sqlite implementation of IntegrationStateRepository.
pub struct SqliteIntegrationStateRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteIntegrationStateRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<super::SqliteConnection> {
        self.pool.get().map_err(|e| TempoError::from(InfraError::from(e)))
    }

    fn update_row(&self, provider: Provider, sql: &str, params: impl rusqlite::Params) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(sql, params).map_err(map_sql_error)?;
        if changed == 0 {
            return Err(TempoError::NotFound(format!(
                "integration state for {provider}"
            )));
        }
        Ok(())
    }
}

struct StateRow {
    provider: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expires_at: Option<i64>,
    sync_cursor: Option<String>,
    config: Option<String>,
    is_active: bool,
    last_sync_at: Option<i64>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StateRow> {
    Ok(StateRow {
        provider: row.get(0)?,
        access_token: row.get(1)?,
        refresh_token: row.get(2)?,
        token_expires_at: row.get(3)?,
        sync_cursor: row.get(4)?,
        config: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
        last_sync_at: row.get(7)?,
    })
}

fn into_state(raw: StateRow) -> Result<IntegrationState> {
    let provider = Provider::parse(&raw.provider).ok_or_else(|| {
        TempoError::Database(format!("unknown provider row '{}'", raw.provider))
    })?;
    let config = match raw.config {
        Some(json) => Some(serde_json::from_str::<IntegrationConfig>(&json).map_err(|e| {
            TempoError::Database(format!("corrupt config for {provider}: {e}"))
        })?),
        None => None,
    };

    Ok(IntegrationState {
        provider,
        access_token: raw.access_token,
        refresh_token: raw.refresh_token,
        token_expires_at: opt_datetime_from_secs(raw.token_expires_at)?,
        sync_cursor: raw.sync_cursor,
        config,
        is_active: raw.is_active,
        last_sync_at: opt_datetime_from_secs(raw.last_sync_at)?,
    })
}

fn config_json(config: &IntegrationConfig) -> Result<String> {
    serde_json::to_string(config)
        .map_err(|e| TempoError::Internal(format!("serialize integration config: {e}")))
}

#[async_trait]
impl IntegrationStateRepository for SqliteIntegrationStateRepository {
    #[instrument(skip(self))]
    async fn get(&self, provider: Provider) -> Result<Option<IntegrationState>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT provider, access_token, refresh_token, token_expires_at, sync_cursor, \
             config, is_active, last_sync_at FROM integration_state WHERE provider = ?1",
            params![provider.as_str()],
            read_row,
        );
        match result {
            Ok(raw) => Ok(Some(into_state(raw)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(map_sql_error(e)),
        }
    }

    #[instrument(skip(self, state), fields(provider = %state.provider))]
    async fn upsert(&self, state: &IntegrationState) -> Result<()> {
        let config = state.config.as_ref().map(config_json).transpose()?;
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO integration_state (provider, access_token, refresh_token, \
             token_expires_at, sync_cursor, config, is_active, last_sync_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT (provider) DO UPDATE SET \
                 access_token = excluded.access_token, \
                 refresh_token = excluded.refresh_token, \
                 token_expires_at = excluded.token_expires_at, \
                 sync_cursor = excluded.sync_cursor, \
                 config = excluded.config, \
                 is_active = excluded.is_active, \
                 last_sync_at = excluded.last_sync_at",
            params![
                state.provider.as_str(),
                state.access_token,
                state.refresh_token,
                state.token_expires_at.map(|t| t.timestamp()),
                state.sync_cursor,
                config,
                state.is_active,
                state.last_sync_at.map(|t| t.timestamp()),
            ],
        )
        .map_err(map_sql_error)?;
        Ok(())
    }

    #[instrument(skip(self, access_token))]
    async fn save_tokens(
        &self,
        provider: Provider,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.update_row(
            provider,
            "UPDATE integration_state SET access_token = ?2, token_expires_at = ?3 \
             WHERE provider = ?1",
            params![
                provider.as_str(),
                access_token,
                expires_at.map(|t| t.timestamp())
            ],
        )
    }

    #[instrument(skip(self))]
    async fn set_active(&self, provider: Provider, is_active: bool) -> Result<()> {
        self.update_row(
            provider,
            "UPDATE integration_state SET is_active = ?2 WHERE provider = ?1",
            params![provider.as_str(), is_active],
        )
    }

    #[instrument(skip(self))]
    async fn set_sync_cursor(
        &self,
        provider: Provider,
        cursor: Option<&str>,
        last_sync_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update_row(
            provider,
            "UPDATE integration_state SET sync_cursor = ?2, last_sync_at = ?3 \
             WHERE provider = ?1",
            params![provider.as_str(), cursor, last_sync_at.timestamp()],
        )
    }

    #[instrument(skip(self))]
    async fn clear_credentials(&self, provider: Provider) -> Result<()> {
        self.update_row(
            provider,
            "UPDATE integration_state SET access_token = NULL, refresh_token = NULL, \
             token_expires_at = NULL, sync_cursor = NULL, is_active = 0 WHERE provider = ?1",
            params![provider.as_str()],
        )
    }

    #[instrument(skip(self, config))]
    async fn set_config(&self, provider: Provider, config: &IntegrationConfig) -> Result<()> {
        let json = config_json(config)?;
        self.update_row(
            provider,
            "UPDATE integration_state SET config = ?2 WHERE provider = ?1",
            params![provider.as_str(), json],
        )
    }
}
