//! Provider connector port interfaces
//!
//! One connector per external system. Connectors are handed an access token
//! by the caller — the token manager is the only component that decides
//! whether a token is usable.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempo_domain::Result;

/// A remote calendar entry as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteEvent {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub cancelled: bool,
    /// True when the provider-side extended-property marker says this entry
    /// was created by this application (already represented locally).
    pub app_origin: bool,
}

/// Fields sent when creating or updating a remote event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventWrite {
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Result of an idempotent remote delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The goal state ("absent") was already achieved.
    AlreadyGone,
}

/// Refreshed token material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenRefresh {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token refresh/revocation operations for providers with expiring tokens.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefresh>;

    /// Best-effort revocation; callers treat failure as non-fatal.
    async fn revoke(&self, token: &str) -> Result<()> {
        let _ = token;
        Ok(())
    }
}

/// Calendar provider operations.
#[async_trait]
pub trait CalendarConnector: Send + Sync {
    async fn fetch_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>>;

    /// Create a remote event tagged with the app-origin marker; returns the
    /// remote event id.
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &EventWrite,
    ) -> Result<String>;

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        remote_id: &str,
        event: &EventWrite,
    ) -> Result<()>;

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        remote_id: &str,
    ) -> Result<DeleteOutcome>;
}

/// A remote CRM deal or field lead, normalized to the sync contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RemoteRecord {
    pub id: String,
    pub title: String,
    /// Provider stage/status vocabulary, mapped through the static tables.
    pub stage: String,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub custom_fields: HashMap<String, String>,
}

/// Outcome of a cursor-based record fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordFetch {
    /// Provider reported no changes since the cursor (HTTP 304). Successful
    /// no-op; the cursor is not advanced.
    NotModified,
    Changed {
        records: Vec<RemoteRecord>,
        next_cursor: Option<String>,
    },
}

/// Record-oriented provider operations (CRM pipeline, lead tracker).
#[async_trait]
pub trait RecordConnector: Send + Sync {
    async fn fetch_records(
        &self,
        access_token: &str,
        since_cursor: Option<&str>,
    ) -> Result<RecordFetch>;
}

/// Fields for a new CRM deal created by the callback saga.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DealWrite {
    pub title: String,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// CRM-specific operations on top of record pulls.
#[async_trait]
pub trait CrmConnector: RecordConnector {
    /// Create a deal; returns the remote deal id.
    async fn create_deal(&self, access_token: &str, deal: &DealWrite) -> Result<String>;
}
