//! Job queue runtime and recurring schedule registration.

pub mod error;
pub mod handlers;
pub mod queue;
pub mod recurring;

pub use error::{SchedulerError, SchedulerResult};
pub use handlers::{register_handlers, ReplanJobHandler, SyncJobHandler};
pub use queue::JobQueue;
pub use recurring::{RecurringScheduler, RecurringSchedulerConfig, ScheduleKey};
