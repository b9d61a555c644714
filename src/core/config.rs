//! Process configuration read once from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::backup::DEFAULT_MAX_BACKUPS;
use crate::core::paths::{default_backup_dir, default_database_path};
use crate::error::{PitcherError, Result};
use crate::mlb::rate_limit::RetryPolicy;

pub const RATE_LIMIT_MS_ENV_VAR: &str = "MLB_RATE_LIMIT_MS";
pub const BACKUP_INTERVAL_DAYS_ENV_VAR: &str = "BACKUP_INTERVAL_DAYS";
pub const MAX_RETRIES_ENV_VAR: &str = "MLB_MAX_RETRIES";
pub const BACKOFF_BASE_ENV_VAR: &str = "MLB_RETRY_BACKOFF_BASE";
pub const MAX_RETRY_AFTER_ENV_VAR: &str = "MLB_MAX_RETRY_AFTER_SECONDS";
pub const MAX_BACKUPS_ENV_VAR: &str = "MLB_MAX_BACKUPS";
pub const TIMEOUT_SECONDS_ENV_VAR: &str = "MLB_TIMEOUT_SECONDS";
pub const API_BASE_URL_ENV_VAR: &str = "MLB_API_BASE_URL";
pub const API_KEY_ENV_VAR: &str = "MLB_API_KEY";
pub const DATABASE_ENV_VAR: &str = "MLB_PITCHERS_DB";
pub const BACKUP_DIR_ENV_VAR: &str = "MLB_PITCHERS_BACKUP_DIR";
pub const LOG_LEVEL_ENV_VAR: &str = "LOG_LEVEL";

/// Root of the MLB Stats API.
pub const DEFAULT_API_BASE_URL: &str = "https://statsapi.mlb.com/api/v1";

/// Everything the pipeline needs to know about its environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub rate_limit: Duration,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub backup_interval_days: u32,
    /// Artifacts kept after rotation; 0 keeps all.
    pub max_backups: usize,
    pub database_path: PathBuf,
    pub backup_dir: PathBuf,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        let database_path = default_database_path();
        let backup_dir = default_backup_dir(&database_path);
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            rate_limit: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(10),
            backup_interval_days: 7,
            max_backups: DEFAULT_MAX_BACKUPS,
            database_path,
            backup_dir,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(url) = lookup(API_BASE_URL_ENV_VAR) {
            settings.api_base_url = url.trim_end_matches('/').to_string();
        }
        settings.api_key = lookup(API_KEY_ENV_VAR).filter(|k| !k.trim().is_empty());

        if let Some(ms) = parse_var::<u64, _>(&lookup, RATE_LIMIT_MS_ENV_VAR)? {
            settings.rate_limit = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32, _>(&lookup, MAX_RETRIES_ENV_VAR)? {
            if attempts == 0 {
                return Err(PitcherError::Config {
                    key: MAX_RETRIES_ENV_VAR.to_string(),
                    message: "at least one attempt is required".to_string(),
                });
            }
            settings.retry.max_attempts = attempts;
        }
        if let Some(base) = parse_var::<f64, _>(&lookup, BACKOFF_BASE_ENV_VAR)? {
            if !(base >= 1.0) {
                return Err(PitcherError::Config {
                    key: BACKOFF_BASE_ENV_VAR.to_string(),
                    message: format!("backoff base must be >= 1.0, got {base}"),
                });
            }
            settings.retry.backoff_base = base;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, MAX_RETRY_AFTER_ENV_VAR)? {
            settings.retry.max_retry_after = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, TIMEOUT_SECONDS_ENV_VAR)? {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(days) = parse_var::<u32, _>(&lookup, BACKUP_INTERVAL_DAYS_ENV_VAR)? {
            settings.backup_interval_days = days;
        }
        if let Some(keep) = parse_var::<usize, _>(&lookup, MAX_BACKUPS_ENV_VAR)? {
            settings.max_backups = keep;
        }

        if let Some(path) = lookup(DATABASE_ENV_VAR) {
            settings.database_path = PathBuf::from(path);
            settings.backup_dir = default_backup_dir(&settings.database_path);
        }
        if let Some(dir) = lookup(BACKUP_DIR_ENV_VAR) {
            settings.backup_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV_VAR) {
            settings.log_level = level.to_lowercase();
        }

        Ok(settings)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| PitcherError::Config {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}
