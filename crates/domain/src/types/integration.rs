//! Integration state and per-provider configuration
//!
//! One `IntegrationState` row exists per provider. The provider-specific
//! configuration that the source system kept in untyped JSON blobs is
//! expressed here as per-purpose structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TOKEN_REFRESH_BUFFER_SECS;

/// The three external systems the engine keeps in sync.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Calendar provider (Google Calendar).
    Calendar,
    /// CRM pipeline (Pipedrive).
    Crm,
    /// Field-lead tracker (SalesRabbit).
    Leads,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Calendar, Provider::Crm, Provider::Leads];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Crm => "crm",
            Self::Leads => "leads",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "calendar" => Some(Self::Calendar),
            "crm" => Some(Self::Crm),
            "leads" => Some(Self::Leads),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar routing configuration: where pushes land and which calendars the
/// saga searches for appointments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CalendarRouting {
    /// Calendar that receives pushed local events.
    pub primary_calendar_id: String,
    /// Additional calendars consulted during appointment search.
    pub watched_calendar_ids: Vec<String>,
}

impl CalendarRouting {
    /// Primary plus watched, primary first, no duplicates.
    pub fn search_calendar_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = vec![self.primary_calendar_id.as_str()];
        for id in &self.watched_calendar_ids {
            if id != &self.primary_calendar_id {
                ids.push(id.as_str());
            }
        }
        ids
    }
}

/// Rule that decides which pulled leads trigger the callback saga.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CallbackTriggerRule {
    pub enabled: bool,
    /// Exact status-name match, e.g. `"Callback"`.
    pub status_name_match: Option<String>,
    /// Custom-field name/value match as an alternative trigger.
    pub custom_field: Option<String>,
    pub custom_field_match: Option<String>,
}

/// Typed union of the per-provider configuration payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrationConfig {
    Calendar(CalendarRouting),
    /// Owner-id filter applied to CRM deal pulls.
    Crm { owner_id: Option<String> },
    Leads(CallbackTriggerRule),
}

impl IntegrationConfig {
    pub fn as_calendar(&self) -> Option<&CalendarRouting> {
        match self {
            Self::Calendar(routing) => Some(routing),
            _ => None,
        }
    }

    pub fn as_leads(&self) -> Option<&CallbackTriggerRule> {
        match self {
            Self::Leads(rule) => Some(rule),
            _ => None,
        }
    }
}

/// Persisted credential and sync state for one provider.
///
/// Invariant: `is_active` is false whenever no usable, unexpired-or-
/// refreshable token exists. The engine never calls a provider with
/// `is_active == false`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationState {
    pub provider: Provider,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Absent for non-expiring API keys.
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Opaque, monotonically advancing watermark.
    pub sync_cursor: Option<String>,
    pub config: Option<IntegrationConfig>,
    pub is_active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl IntegrationState {
    /// True when the access token must be refreshed before use: an expiry is
    /// set and falls within the refresh buffer of `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.token_expires_at {
            Some(expires_at) => {
                (expires_at - now).num_seconds() <= TOKEN_REFRESH_BUFFER_SECS
            }
            None => false,
        }
    }
}
