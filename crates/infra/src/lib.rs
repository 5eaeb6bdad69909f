//! # Tempo Infra
//!
//! Adapter implementations for the `tempo-core` ports:
//! - sqlite repositories over an r2d2 pool
//! - reqwest provider clients (Google Calendar, Pipedrive, SalesRabbit)
//! - the job queue runtime and cron registration
//! - configuration loading and the engine dependency-injection context

pub mod config;
pub mod context;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod scheduling;
pub mod webhook;

pub use config::{load as load_config, EngineConfig};
pub use context::EngineContext;
pub use errors::InfraError;
pub use http::HttpClient;
