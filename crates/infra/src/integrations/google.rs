//! Google Calendar client
//!
//! Implements the calendar connector and the OAuth token refresher. Events
//! created here carry a private extended property so pull ticks can tell
//! app-created remote events apart from genuinely external ones.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tempo_core::{
    CalendarConnector, DeleteOutcome, EventWrite, RemoteEvent, TokenRefresh, TokenRefresher,
};
use tempo_domain::{Result, TempoError};
use tracing::{debug, instrument, warn};

use crate::config::GoogleConfig;
use crate::errors::InfraError;
use crate::http::HttpClient;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const OAUTH_BASE: &str = "https://oauth2.googleapis.com";

/// Private extended-property key marking events created by this application.
const ORIGIN_PROPERTY: &str = "tempoOrigin";
const ORIGIN_VALUE: &str = "1";

/// Access role required of a calendar-list entry to serve as a push target.
const ACCESS_ROLE_OWNER: &str = "owner";

/// Google Calendar API client.
pub struct GoogleCalendarClient {
    http: HttpClient,
    api_base: String,
    oauth_base: String,
    client_id: String,
    client_secret: String,
}

impl GoogleCalendarClient {
    pub fn new(http: HttpClient, config: &GoogleConfig) -> Self {
        Self {
            http,
            api_base: CALENDAR_API_BASE.to_string(),
            oauth_base: OAUTH_BASE.to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    /// Point both the API and OAuth endpoints at a different base URL.
    /// Used by the wiremock-backed integration tests.
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.api_base = base.clone();
        self.oauth_base = base;
        self
    }

    /// Resolve a calendar by display name, creating it when absent; returns
    /// the calendar id. Two concurrent callers can both miss the lookup and
    /// create duplicate calendars; callers run this once at connect time.
    #[instrument(skip(self, access_token))]
    pub async fn find_or_create_calendar(
        &self,
        access_token: &str,
        name: &str,
    ) -> Result<String> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let response = self
            .http
            .send(self.http.request(Method::GET, &url).bearer_auth(access_token))
            .await?;
        let list: CalendarListResponse = check_json(response).await?;

        // Shared calendars can carry the same display name; only an owned
        // one is a usable push target.
        if let Some(entry) = list.items.iter().find(|entry| {
            entry.summary.as_deref() == Some(name)
                && entry.access_role.as_deref() == Some(ACCESS_ROLE_OWNER)
        }) {
            return Ok(entry.id.clone());
        }

        debug!(name, "calendar not found, creating it");
        let url = format!("{}/calendars", self.api_base);
        let body = CalendarCreateBody { summary: name.to_string() };
        let response = self
            .http
            .send(self.http.request(Method::POST, &url).bearer_auth(access_token).json(&body))
            .await?;
        let created: CalendarListEntry = check_json(response).await?;
        Ok(created.id)
    }
}

/// Consume a response, mapping non-success statuses to domain errors and
/// decoding the success body as JSON.
async fn check_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let response = response.error_for_status().map_err(|e| TempoError::from(InfraError::from(e)))?;
    response
        .json::<T>()
        .await
        .map_err(|e| TempoError::Network(format!("failed to decode provider response: {e}")))
}

/// Consume a response, mapping non-success statuses to domain errors and
/// ignoring the body.
async fn check_status(response: reqwest::Response) -> Result<()> {
    response.error_for_status().map_err(|e| TempoError::from(InfraError::from(e)))?;
    Ok(())
}

#[async_trait]
impl CalendarConnector for GoogleCalendarClient {
    #[instrument(skip(self, access_token))]
    async fn fetch_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>> {
        let url = format!("{}/calendars/{}/events", self.api_base, calendar_id);
        let query = [
            ("timeMin", start.to_rfc3339()),
            ("timeMax", end.to_rfc3339()),
            ("singleEvents", "true".to_string()),
            ("maxResults", "2500".to_string()),
        ];

        let response = self
            .http
            .send(self.http.request(Method::GET, &url).bearer_auth(access_token).query(&query))
            .await?;
        let body: EventsListResponse = check_json(response).await?;

        let mut events = Vec::with_capacity(body.items.len());
        for item in body.items {
            match item.into_remote_event() {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "skipping undecodable remote event"),
            }
        }
        Ok(events)
    }

    #[instrument(skip(self, access_token, event), fields(title = %event.title))]
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &EventWrite,
    ) -> Result<String> {
        let url = format!("{}/calendars/{}/events", self.api_base, calendar_id);
        let body = EventWriteBody::tagged(event);

        let response = self
            .http
            .send(self.http.request(Method::POST, &url).bearer_auth(access_token).json(&body))
            .await?;
        let created: EventCreatedResponse = check_json(response).await?;
        Ok(created.id)
    }

    #[instrument(skip(self, access_token, event))]
    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        remote_id: &str,
        event: &EventWrite,
    ) -> Result<()> {
        let url = format!("{}/calendars/{}/events/{}", self.api_base, calendar_id, remote_id);
        let body = EventWriteBody::plain(event);

        let response = self
            .http
            .send(self.http.request(Method::PATCH, &url).bearer_auth(access_token).json(&body))
            .await?;
        check_status(response).await
    }

    #[instrument(skip(self, access_token))]
    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        remote_id: &str,
    ) -> Result<DeleteOutcome> {
        let url = format!("{}/calendars/{}/events/{}", self.api_base, calendar_id, remote_id);
        let response = self
            .http
            .send(self.http.request(Method::DELETE, &url).bearer_auth(access_token))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(DeleteOutcome::AlreadyGone),
            _ => {
                check_status(response).await?;
                Ok(DeleteOutcome::Deleted)
            }
        }
    }
}

#[async_trait]
impl TokenRefresher for GoogleCalendarClient {
    #[instrument(skip(self, refresh_token))]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefresh> {
        let url = format!("{}/token", self.oauth_base);
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response =
            self.http.send(self.http.request(Method::POST, &url).form(&form)).await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(TempoError::Auth(format!("token refresh failed ({status}): {detail}")));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| TempoError::Auth(format!("failed to decode token response: {e}")))?;

        Ok(TokenRefresh {
            access_token: body.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(body.expires_in),
        })
    }

    #[instrument(skip(self, token))]
    async fn revoke(&self, token: &str) -> Result<()> {
        let url = format!("{}/revoke", self.oauth_base);
        let response = self
            .http
            .send(self.http.request(Method::POST, &url).form(&[("token", token)]))
            .await?;
        check_status(response).await
    }
}

#[derive(Debug, Deserialize)]
struct EventsListResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: String,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    status: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
    #[serde(rename = "extendedProperties")]
    extended_properties: Option<ExtendedProperties>,
}

impl GoogleEvent {
    fn into_remote_event(self) -> Result<RemoteEvent> {
        let cancelled = self.status.as_deref() == Some("cancelled");
        let all_day = self
            .start
            .as_ref()
            .map(|s| s.date.is_some())
            .unwrap_or(false);
        let app_origin = self
            .extended_properties
            .as_ref()
            .and_then(|p| p.private.as_ref())
            .and_then(|m| m.get(ORIGIN_PROPERTY))
            .map(|v| v == ORIGIN_VALUE)
            .unwrap_or(false);

        // Cancelled entries arrive without times; anchor them at the epoch
        // so they still surface with their id.
        let start = self.start.as_ref().map(EventDateTime::resolve).transpose()?;
        let end = self.end.as_ref().map(EventDateTime::resolve).transpose()?;
        let fallback = DateTime::<Utc>::UNIX_EPOCH;

        Ok(RemoteEvent {
            id: self.id,
            title: self.summary.filter(|s| !s.trim().is_empty()),
            description: self.description,
            location: self.location,
            start: start.unwrap_or(fallback),
            end: end.or(start).unwrap_or(fallback),
            all_day,
            cancelled,
            app_origin,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EventDateTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

impl EventDateTime {
    fn resolve(&self) -> Result<DateTime<Utc>> {
        if let Some(ts) = &self.date_time {
            return DateTime::parse_from_rfc3339(ts)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| TempoError::Network(format!("bad event timestamp '{ts}': {e}")));
        }
        if let Some(date) = &self.date {
            let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| TempoError::Network(format!("bad event date '{date}': {e}")))?;
            return Ok(parsed
                .and_hms_opt(0, 0, 0)
                .map(|t| t.and_utc())
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH));
        }
        Err(TempoError::Network("event missing both dateTime and date".into()))
    }
}

#[derive(Debug, Deserialize)]
struct ExtendedProperties {
    private: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct EventWriteBody {
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    start: WriteDateTime,
    end: WriteDateTime,
    #[serde(rename = "extendedProperties", skip_serializing_if = "Option::is_none")]
    extended_properties: Option<WriteExtendedProperties>,
}

impl EventWriteBody {
    /// Body for a create, carrying the app-origin marker.
    fn tagged(event: &EventWrite) -> Self {
        let mut body = Self::plain(event);
        let mut private = HashMap::new();
        private.insert(ORIGIN_PROPERTY.to_string(), ORIGIN_VALUE.to_string());
        body.extended_properties = Some(WriteExtendedProperties { private });
        body
    }

    fn plain(event: &EventWrite) -> Self {
        Self {
            summary: event.title.clone(),
            description: event.description.clone(),
            start: WriteDateTime { date_time: event.start.to_rfc3339() },
            end: WriteDateTime { date_time: event.end.to_rfc3339() },
            extended_properties: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct WriteDateTime {
    #[serde(rename = "dateTime")]
    date_time: String,
}

#[derive(Debug, Serialize)]
struct WriteExtendedProperties {
    private: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct CalendarCreateBody {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

#[derive(Debug, Deserialize)]
struct CalendarListEntry {
    id: String,
    summary: Option<String>,
    #[serde(rename = "accessRole")]
    access_role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventCreatedResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}
