//! Calendar event domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a local calendar event came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Planned by the assistant; pushed to the provider once.
    AiPlanned,
    /// Entered by the user in the local store.
    Manual,
    /// Mirrored from the calendar provider (blocker).
    Calendar,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiPlanned => "ai_planned",
            Self::Manual => "manual",
            Self::Calendar => "calendar",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ai_planned" => Some(Self::AiPlanned),
            "manual" => Some(Self::Manual),
            "calendar" => Some(Self::Calendar),
            _ => None,
        }
    }

    /// Local-origin events are candidates for push; mirrored ones never are.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Calendar)
    }
}

/// A local time block.
///
/// Invariants: at most one event per `remote_event_id`; an `ai_planned`
/// event acquires its remote id only after a successful push and is never
/// pushed twice. Blocker events (`is_blocker == true`) are externally
/// anchored and immune to planner mutation; they only disappear when their
/// remote counterpart does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_blocker: bool,
    pub source: EventSource,
    /// Remote (Google) event id once mirrored or pushed.
    pub remote_event_id: Option<String>,
    /// Saga idempotency marker, e.g. `callback:sr_42` for prep blocks.
    pub origin_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarEvent {
    /// Genuine-diff check used by the pull path to avoid needless writes.
    pub fn differs_from(
        &self,
        title: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        location: Option<&str>,
    ) -> bool {
        self.title != title
            || self.start_time != start
            || self.end_time != end
            || self.location.as_deref() != location
    }
}

/// Insert parameters for a new local event.
#[derive(Debug, Clone)]
pub struct NewCalendarEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_blocker: bool,
    pub source: EventSource,
    pub remote_event_id: Option<String>,
    pub origin_ref: Option<String>,
}

impl NewCalendarEvent {
    /// A blocker mirror of a remote event.
    pub fn blocker(
        title: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        remote_event_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: None,
            location: None,
            start_time,
            end_time,
            is_blocker: true,
            source: EventSource::Calendar,
            remote_event_id: Some(remote_event_id.into()),
            origin_ref: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn differs_ignores_equal_fields() {
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 14, 0, 0).unwrap();
        let end = start + chrono::Duration::hours(1);
        let event = CalendarEvent {
            id: "e1".into(),
            title: "Appointment: Jane Doe".into(),
            description: None,
            location: Some("12 Elm St".into()),
            start_time: start,
            end_time: end,
            is_blocker: true,
            source: EventSource::Calendar,
            remote_event_id: Some("g1".into()),
            origin_ref: None,
            created_at: start,
            updated_at: start,
        };

        assert!(!event.differs_from("Appointment: Jane Doe", start, end, Some("12 Elm St")));
        assert!(event.differs_from("Appointment: Jane Doe", start, end, None));
        assert!(event.differs_from("Moved", start, end, Some("12 Elm St")));
    }
}
