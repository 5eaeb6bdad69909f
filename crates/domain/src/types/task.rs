//! Task domain types
//!
//! Tasks are the system-of-record for work items. Rows mirrored from an
//! external system carry an `(external_id, external_source)` pair which is
//! unique across the table; the reconciliation engine looks the pair up
//! before creating and never duplicate-creates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Inbox,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inbox" => Some(Self::Inbox),
            "scheduled" => Some(Self::Scheduled),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Task category, derived from the remote stage vocabulary when mirrored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Lead,
    FollowUp,
    Appointment,
    Proposal,
    Admin,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::FollowUp => "follow_up",
            Self::Appointment => "appointment",
            Self::Proposal => "proposal",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "lead" => Some(Self::Lead),
            "follow_up" => Some(Self::FollowUp),
            "appointment" => Some(Self::Appointment),
            "proposal" => Some(Self::Proposal),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// A persisted work item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub due_at: Option<DateTime<Utc>>,
    pub estimated_minutes: Option<i64>,
    /// Prevents re-triggering the callback saga for the same source record.
    pub callback_processed: bool,
    pub external_id: Option<String>,
    pub external_source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert parameters for a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub due_at: Option<DateTime<Utc>>,
    pub estimated_minutes: Option<i64>,
    pub external_id: Option<String>,
    pub external_source: Option<String>,
}

impl NewTask {
    /// A new mirrored task in the default inbox state.
    pub fn mirrored(
        title: impl Into<String>,
        category: TaskCategory,
        priority: TaskPriority,
        external_id: impl Into<String>,
        external_source: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::Inbox,
            category,
            priority,
            due_at: None,
            estimated_minutes: None,
            external_id: Some(external_id.into()),
            external_source: Some(external_source.into()),
        }
    }
}
