//! # Tempo Core
//!
//! Engine services and the port traits they run over.
//!
//! This crate contains:
//! - Port definitions: record store, provider connectors, job dispatch
//! - Token manager (credential lifecycle per provider)
//! - Reconciliation engine (push/pull/diff/drift cleanup)
//! - Callback saga (lead → deal → task → prep block workflow)
//!
//! All I/O is behind the ports; implementations live in `tempo-infra`.

pub mod auth;
pub mod connector_ports;
pub mod job_ports;
pub mod saga;
pub mod store_ports;
pub mod sync;

pub use auth::{TokenManager, TokenRefreshers};
pub use connector_ports::{
    CalendarConnector, CrmConnector, DealWrite, DeleteOutcome, EventWrite, RecordConnector,
    RecordFetch, RemoteEvent, RemoteRecord, TokenRefresh, TokenRefresher,
};
pub use job_ports::{JobContext, JobDispatcher, JobError, JobHandler};
pub use saga::callback::{callback_backoff, CallbackConfig, CallbackSaga};
pub use store_ports::{CalendarEventRepository, IntegrationStateRepository, TaskRepository};
pub use sync::calendar::{CalendarReconciler, CalendarSyncStats};
pub use sync::records::{LeadReconciler, RecordReconciler, RecordSyncStats};
