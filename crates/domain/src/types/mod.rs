//! Domain types and models

pub mod event;
pub mod integration;
pub mod job;
pub mod task;

pub use event::{CalendarEvent, EventSource, NewCalendarEvent};
pub use integration::{
    CalendarRouting, CallbackTriggerRule, IntegrationConfig, IntegrationState, Provider,
};
pub use job::{BackoffFn, BackoffPolicy, CallbackJob, JobId, JobKind, JobPayload, JobSpec, QueueName};
pub use task::{NewTask, Task, TaskCategory, TaskPriority, TaskStatus};
