//! # Tempo Domain
//!
//! Pure domain types for the Tempo sync engine: tasks, calendar events,
//! integration state, and job scheduling primitives. No I/O lives here.

pub mod constants;
pub mod errors;
pub mod types;

pub use errors::{Result, TempoError};
pub use types::event::{CalendarEvent, EventSource, NewCalendarEvent};
pub use types::integration::{
    CalendarRouting, CallbackTriggerRule, IntegrationConfig, IntegrationState, Provider,
};
pub use types::job::{
    BackoffFn, BackoffPolicy, CallbackJob, JobId, JobKind, JobPayload, JobSpec, QueueName,
};
pub use types::task::{NewTask, Task, TaskCategory, TaskPriority, TaskStatus};
