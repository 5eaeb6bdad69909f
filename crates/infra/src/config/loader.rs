//! Configuration loader
//!
//! Loads engine configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If the required variables are missing, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports TOML and JSON formats
//!
//! ## Environment Variables
//! - `TEMPO_DB_PATH`: Database file path (required for env loading)
//! - `TEMPO_DB_POOL_SIZE`: Connection pool size
//! - `TEMPO_SYNC_ENABLED`: Whether recurring sync is enabled (true/false)
//! - `TEMPO_CALENDAR_SYNC_CRON`: Cron expression for the calendar tick
//! - `TEMPO_RECORDS_SYNC_CRON`: Cron expression for CRM/lead ticks
//! - `TEMPO_PREP_DURATION_MINUTES`: Callback prep block length
//! - `TEMPO_GOOGLE_CLIENT_ID` / `TEMPO_GOOGLE_CLIENT_SECRET`: OAuth client
//! - `TEMPO_GOOGLE_CALENDAR_NAME`: Dedicated calendar display name
//! - `TEMPO_PIPEDRIVE_BASE_URL`, `TEMPO_SALESRABBIT_BASE_URL`: API endpoints

use std::path::{Path, PathBuf};

use tempo_domain::{Result, TempoError};

use super::{
    CallbackSettings, DatabaseConfig, EngineConfig, GoogleConfig, PipedriveConfig,
    SalesRabbitConfig, SyncConfig,
};

/// Load configuration with automatic fallback strategy.
///
/// # Errors
/// Returns `TempoError::Config` if configuration cannot be loaded from either
/// source or a file has invalid contents.
pub fn load() -> Result<EngineConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "environment configuration incomplete, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables.
///
/// `TEMPO_DB_PATH` must be present; everything else falls back to defaults.
///
/// # Errors
/// Returns `TempoError::Config` if the database path is missing or a numeric
/// variable fails to parse.
pub fn load_from_env() -> Result<EngineConfig> {
    let db_path = env_var("TEMPO_DB_PATH")?;
    let pool_size = match std::env::var("TEMPO_DB_POOL_SIZE") {
        Ok(raw) => raw
            .parse::<u32>()
            .map_err(|e| TempoError::Config(format!("invalid pool size: {e}")))?,
        Err(_) => DatabaseConfig::default().pool_size,
    };

    let defaults = SyncConfig::default();
    let sync = SyncConfig {
        calendar_cron: std::env::var("TEMPO_CALENDAR_SYNC_CRON")
            .unwrap_or(defaults.calendar_cron),
        records_cron: std::env::var("TEMPO_RECORDS_SYNC_CRON").unwrap_or(defaults.records_cron),
        enabled: env_bool("TEMPO_SYNC_ENABLED", defaults.enabled),
    };

    let prep_duration_minutes = match std::env::var("TEMPO_PREP_DURATION_MINUTES") {
        Ok(raw) => raw
            .parse::<i64>()
            .map_err(|e| TempoError::Config(format!("invalid prep duration: {e}")))?,
        Err(_) => CallbackSettings::default().prep_duration_minutes,
    };

    Ok(EngineConfig {
        database: DatabaseConfig { path: db_path, pool_size },
        sync,
        callback: CallbackSettings { prep_duration_minutes },
        google: GoogleConfig {
            client_id: std::env::var("TEMPO_GOOGLE_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("TEMPO_GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            calendar_name: std::env::var("TEMPO_GOOGLE_CALENDAR_NAME").ok(),
        },
        pipedrive: PipedriveConfig {
            base_url: std::env::var("TEMPO_PIPEDRIVE_BASE_URL")
                .unwrap_or_else(|_| PipedriveConfig::default().base_url),
        },
        salesrabbit: SalesRabbitConfig {
            base_url: std::env::var("TEMPO_SALESRABBIT_BASE_URL")
                .unwrap_or_else(|_| SalesRabbitConfig::default().base_url),
        },
    })
}

/// Load configuration from a file.
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// extension (`.toml` or `.json`).
///
/// # Errors
/// Returns `TempoError::Config` if no file is found or parsing fails.
pub fn load_from_file(path: Option<PathBuf>) -> Result<EngineConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TempoError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            TempoError::Config("no config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TempoError::Config(format!("failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<EngineConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TempoError::Config(format!("invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TempoError::Config(format!("invalid JSON format: {e}"))),
        _ => Err(TempoError::Config(format!("unsupported config format: {extension}"))),
    }
}

/// Probe the working directory and its parents for a config file.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("tempo.toml"),
            cwd.join("config.toml"),
            cwd.join("tempo.json"),
            cwd.join("config.json"),
            cwd.join("../tempo.toml"),
            cwd.join("../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.push(exe_dir.join("tempo.toml"));
            candidates.push(exe_dir.join("config.toml"));
        }
    }

    candidates.into_iter().find(|p| p.exists())
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| TempoError::Config(format!("environment variable {name} not set")))
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_round_trips_all_sections() {
        let raw = r#"
            [database]
            path = "/tmp/tempo-test.db"
            pool_size = 4

            [sync]
            calendar_cron = "0 */2 * * * *"
            records_cron = "0 */10 * * * *"
            enabled = false

            [callback]
            prep_duration_minutes = 60

            [google]
            client_id = "abc"
            client_secret = "shh"
            calendar_name = "Tempo"
        "#;

        let config = parse_config(raw, Path::new("tempo.toml")).unwrap();
        assert_eq!(config.database.path, "/tmp/tempo-test.db");
        assert_eq!(config.database.pool_size, 4);
        assert!(!config.sync.enabled);
        assert_eq!(config.callback.prep_duration_minutes, 60);
        assert_eq!(config.google.calendar_name.as_deref(), Some("Tempo"));
        // Untouched sections keep their defaults.
        assert_eq!(config.pipedrive.base_url, "https://api.pipedrive.com/v1");
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let raw = r#"
            [database]
            path = "x.db"
        "#;

        let config = parse_config(raw, Path::new("tempo.toml")).unwrap();
        assert_eq!(config.database.pool_size, 8);
        assert!(config.sync.enabled);
        assert_eq!(config.callback.prep_duration_minutes, 90);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(parse_config("", Path::new("tempo.yaml")).is_err());
    }
}
