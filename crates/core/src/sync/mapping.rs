//! Static stage vocabulary tables
//!
//! Maps each provider's status/stage vocabulary onto the local task category
//! and priority. Terminal stages are never imported as new tasks; updates
//! still flow through once a task already exists. Unknown stages are skipped
//! by the reconciler rather than imported with a default.

use tempo_domain::{TaskCategory, TaskPriority};

/// One row of a stage table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageMapping {
    pub stage: &'static str,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    /// Closed/terminal remote stages: update-only, never create.
    pub terminal: bool,
}

/// SalesRabbit lead statuses.
pub const LEAD_STAGE_MAP: &[StageMapping] = &[
    StageMapping { stage: "New Lead", category: TaskCategory::Lead, priority: TaskPriority::Medium, terminal: false },
    StageMapping { stage: "Callback", category: TaskCategory::FollowUp, priority: TaskPriority::High, terminal: false },
    StageMapping { stage: "Appointment Set", category: TaskCategory::Appointment, priority: TaskPriority::High, terminal: false },
    StageMapping { stage: "Proposal Given", category: TaskCategory::Proposal, priority: TaskPriority::High, terminal: false },
    StageMapping { stage: "Signed", category: TaskCategory::Admin, priority: TaskPriority::Low, terminal: true },
    StageMapping { stage: "Not Interested", category: TaskCategory::Lead, priority: TaskPriority::Low, terminal: true },
    StageMapping { stage: "Disqualified", category: TaskCategory::Lead, priority: TaskPriority::Low, terminal: true },
];

/// Pipedrive deal stages.
pub const CRM_STAGE_MAP: &[StageMapping] = &[
    StageMapping { stage: "Qualified", category: TaskCategory::Lead, priority: TaskPriority::Medium, terminal: false },
    StageMapping { stage: "Contact Made", category: TaskCategory::FollowUp, priority: TaskPriority::Medium, terminal: false },
    StageMapping { stage: "Demo Scheduled", category: TaskCategory::Appointment, priority: TaskPriority::High, terminal: false },
    StageMapping { stage: "Proposal Made", category: TaskCategory::Proposal, priority: TaskPriority::High, terminal: false },
    StageMapping { stage: "Negotiations Started", category: TaskCategory::Proposal, priority: TaskPriority::Urgent, terminal: false },
    StageMapping { stage: "Won", category: TaskCategory::Admin, priority: TaskPriority::Low, terminal: true },
    StageMapping { stage: "Lost", category: TaskCategory::Lead, priority: TaskPriority::Low, terminal: true },
];

/// Case-insensitive stage lookup.
pub fn lookup_stage(table: &'static [StageMapping], stage: &str) -> Option<&'static StageMapping> {
    table.iter().find(|m| m.stage.eq_ignore_ascii_case(stage))
}
