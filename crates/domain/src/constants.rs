//! Engine constants
//!
//! Centralized location for the timing and scheduling constants shared by
//! the token manager, reconcilers and callback saga.

// Token lifecycle
/// Refresh tokens this many seconds before expiry. Fixed buffer against the
/// "token looked valid, got rejected mid-call" race.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

// Calendar sync horizon
pub const CALENDAR_SYNC_HORIZON_DAYS: i64 = 8;

// Callback saga
/// Delay before the first saga attempt runs, in milliseconds.
pub const CALLBACK_INITIAL_DELAY_MS: u64 = 600_000;
/// Total attempt budget (completed attempts) for the saga job.
pub const CALLBACK_MAX_ATTEMPTS: u32 = 4;
/// Forward window for appointment search, in days.
pub const CALLBACK_SEARCH_WINDOW_DAYS: i64 = 60;
/// Prep block ends this many minutes before the matched appointment.
pub const CALLBACK_PREP_LEAD_MINUTES: i64 = 15;
/// Default prep block length when not configured, in minutes.
pub const DEFAULT_PREP_DURATION_MINUTES: i64 = 90;

// Queue concurrency
/// Planning/mutation queue is serialized: two writers racing on the same
/// calendar day would clobber each other's blocks.
pub const PLANNING_QUEUE_CONCURRENCY: usize = 1;
/// Sync jobs touch disjoint provider rows and may run in parallel.
pub const SYNC_QUEUE_CONCURRENCY: usize = 3;

// External id prefixes
/// Stable external-id prefix for tasks derived from lead records.
pub const LEAD_EXTERNAL_ID_PREFIX: &str = "sr_";
/// Origin-ref prefix for saga-created prep blocks.
pub const CALLBACK_ORIGIN_REF_PREFIX: &str = "callback:";
