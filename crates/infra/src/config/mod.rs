//! Engine configuration
//!
//! Typed configuration sections plus the env-first loader in [`loader`].

pub mod loader;

use serde::{Deserialize, Serialize};

pub use loader::{load, load_from_env, load_from_file};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub callback: CallbackSettings,
    pub google: GoogleConfig,
    pub pipedrive: PipedriveConfig,
    pub salesrabbit: SalesRabbitConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "tempo.db".to_string(), pool_size: 8 }
    }
}

/// Recurring sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Cron expression for the calendar tick.
    pub calendar_cron: String,
    /// Cron expression for the CRM and lead ticks.
    pub records_cron: String,
    pub enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            calendar_cron: "0 */5 * * * *".to_string(),
            records_cron: "0 */15 * * * *".to_string(),
            enabled: true,
        }
    }
}

/// Callback saga tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackSettings {
    pub prep_duration_minutes: i64,
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self { prep_duration_minutes: 90 }
    }
}

/// Google Calendar OAuth client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    /// Display name of the dedicated calendar to find or create at startup.
    pub calendar_name: Option<String>,
}

/// Pipedrive API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipedriveConfig {
    pub base_url: String,
}

impl Default for PipedriveConfig {
    fn default() -> Self {
        Self { base_url: "https://api.pipedrive.com/v1".to_string() }
    }
}

/// SalesRabbit API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SalesRabbitConfig {
    pub base_url: String,
}

impl Default for SalesRabbitConfig {
    fn default() -> Self {
        Self { base_url: "https://api.salesrabbit.com".to_string() }
    }
}
