//! Calendar reconciliation worker
//!
//! Keeps the local event store and the remote calendar convergent over the
//! active sync horizon (today .. +8 days):
//!
//! 1. **Push** local events that have no remote id yet; the stored remote id
//!    is the sole idempotency key, so a pushed event is skipped forever after.
//! 2. **Pull** the remote range, skip entries this app created (extended-
//!    property marker), skip cancelled and all-day entries, mirror the rest
//!    as blockers, and update mirrors only on a genuine diff.
//! 3. **Drift cleanup**: local mirrors whose remote id is absent from the
//!    full pulled id set are deleted — externally-deleted events disappear.
//!
//! Push runs strictly before pull within a tick so a just-pushed event is
//! not treated as an unmarked external entry.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tempo_domain::constants::CALENDAR_SYNC_HORIZON_DAYS;
use tempo_domain::{NewCalendarEvent, Provider, Result};
use tracing::{debug, info, instrument, warn};

use crate::auth::TokenManager;
use crate::connector_ports::{CalendarConnector, EventWrite, RemoteEvent};
use crate::store_ports::{CalendarEventRepository, IntegrationStateRepository};

/// Counters reported by one reconciliation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarSyncStats {
    pub pushed: usize,
    pub push_failures: usize,
    pub mirrors_created: usize,
    pub mirrors_updated: usize,
    pub mirrors_deleted: usize,
    pub skipped: usize,
}

impl CalendarSyncStats {
    /// True when the tick produced new blocker mirrors (webhook path uses
    /// this to decide whether a replan is worthwhile).
    pub fn created_blockers(&self) -> bool {
        self.mirrors_created > 0
    }
}

/// Calendar reconciliation worker.
pub struct CalendarReconciler {
    connector: Arc<dyn CalendarConnector>,
    events: Arc<dyn CalendarEventRepository>,
    states: Arc<dyn IntegrationStateRepository>,
    tokens: Arc<TokenManager>,
}

impl CalendarReconciler {
    pub fn new(
        connector: Arc<dyn CalendarConnector>,
        events: Arc<dyn CalendarEventRepository>,
        states: Arc<dyn IntegrationStateRepository>,
        tokens: Arc<TokenManager>,
    ) -> Self {
        Self { connector, events, states, tokens }
    }

    /// Run one full tick: push, then pull/diff/cleanup.
    #[instrument(skip(self))]
    pub async fn run_tick(&self) -> Result<CalendarSyncStats> {
        let (start, end) = sync_horizon(Utc::now());
        let token = self.tokens.get_valid_token(Provider::Calendar).await?;
        let calendar_id = self.primary_calendar_id().await?;

        let mut stats = CalendarSyncStats::default();
        self.push(&token, &calendar_id, start, end, &mut stats).await?;
        self.pull(&token, &calendar_id, start, end, &mut stats).await?;

        self.states.set_sync_cursor(Provider::Calendar, None, Utc::now()).await?;

        info!(
            pushed = stats.pushed,
            created = stats.mirrors_created,
            updated = stats.mirrors_updated,
            deleted = stats.mirrors_deleted,
            "calendar sync tick completed"
        );
        Ok(stats)
    }

    /// Push local events lacking a remote id. A single failed create leaves
    /// the event without a remote id so the next tick retries it; it never
    /// aborts the batch.
    async fn push(
        &self,
        token: &str,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        stats: &mut CalendarSyncStats,
    ) -> Result<()> {
        let pending = self.events.list_unpushed(start, end).await?;
        debug!(count = pending.len(), "local events pending push");

        for event in pending {
            let write = EventWrite {
                title: event.title.clone(),
                description: event.description.clone(),
                start: event.start_time,
                end: event.end_time,
            };

            match self.connector.create_event(token, calendar_id, &write).await {
                Ok(remote_id) => {
                    self.events.set_remote_id(&event.id, &remote_id).await?;
                    stats.pushed += 1;
                }
                Err(err) => {
                    warn!(event_id = %event.id, error = %err, "event push failed, will retry next tick");
                    stats.push_failures += 1;
                }
            }
        }

        Ok(())
    }

    /// Pull the remote range, mirror externally-created entries as blockers,
    /// and delete mirrors whose remote counterpart disappeared.
    async fn pull(
        &self,
        token: &str,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        stats: &mut CalendarSyncStats,
    ) -> Result<()> {
        let remote = self.connector.fetch_events(token, calendar_id, start, end).await?;

        // The drift set covers everything the provider reported, including
        // entries filtered out below.
        let remote_ids: HashSet<&str> = remote.iter().map(|e| e.id.as_str()).collect();

        for event in &remote {
            if event.app_origin || event.cancelled || event.all_day {
                stats.skipped += 1;
                continue;
            }

            if let Err(err) = self.mirror_remote_event(event, stats).await {
                warn!(remote_id = %event.id, error = %err, "failed to mirror remote event, skipping");
            }
        }

        self.drift_cleanup(&remote_ids, start, end, stats).await
    }

    async fn mirror_remote_event(
        &self,
        event: &RemoteEvent,
        stats: &mut CalendarSyncStats,
    ) -> Result<()> {
        let title = event.title.as_deref().unwrap_or("(untitled)");

        match self.events.find_by_remote_id(&event.id).await? {
            None => {
                let mut mirror =
                    NewCalendarEvent::blocker(title, event.start, event.end, event.id.clone());
                mirror.description = event.description.clone();
                mirror.location = event.location.clone();
                self.events.insert(mirror).await?;
                stats.mirrors_created += 1;
            }
            Some(mut existing) => {
                if existing.differs_from(title, event.start, event.end, event.location.as_deref())
                {
                    existing.title = title.to_string();
                    existing.description = event.description.clone();
                    existing.location = event.location.clone();
                    existing.start_time = event.start;
                    existing.end_time = event.end;
                    self.events.update(&existing).await?;
                    stats.mirrors_updated += 1;
                }
            }
        }

        Ok(())
    }

    /// Delete local mirrors in the horizon whose remote id was not reported.
    /// Scoped to the fetched range: ids outside it are not evidence of
    /// deletion.
    async fn drift_cleanup(
        &self,
        remote_ids: &HashSet<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        stats: &mut CalendarSyncStats,
    ) -> Result<()> {
        let mirrors = self.events.list_blockers(start, end).await?;

        for mirror in mirrors {
            let Some(remote_id) = mirror.remote_event_id.as_deref() else {
                continue;
            };

            if !remote_ids.contains(remote_id) {
                debug!(event_id = %mirror.id, remote_id, "remote counterpart gone, deleting mirror");
                self.events.delete(&mirror.id).await?;
                stats.mirrors_deleted += 1;
            }
        }

        Ok(())
    }

    async fn primary_calendar_id(&self) -> Result<String> {
        let state = self.states.get(Provider::Calendar).await?;
        Ok(state
            .and_then(|s| s.config)
            .and_then(|c| c.as_calendar().map(|r| r.primary_calendar_id.clone()))
            .unwrap_or_else(|| "primary".to_string()))
    }
}

/// The active sync horizon: today .. +8 days.
pub fn sync_horizon(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now, now + Duration::days(CALENDAR_SYNC_HORIZON_DAYS))
}
