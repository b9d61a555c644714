//! Error types for the MLB pitcher data pipeline

use rusqlite::ErrorCode;
use thiserror::Error;


pub type Result<T> = std::result::Result<T, PitcherError>;

/// A record that could not be normalized.
///
/// Carries the field that was missing or malformed and the raw fragment it
/// came from, so the offending input can be found and fixed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason} `{field}`{} in {raw}", row_suffix(.row))]
pub struct ParseError {
    pub field: String,
    pub reason: ParseReason,
    pub raw: String,
    pub row: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseReason {
    Missing,
    Malformed,
}

impl std::fmt::Display for ParseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseReason::Missing => write!(f, "missing field"),
            ParseReason::Malformed => write!(f, "malformed field"),
        }
    }
}

fn row_suffix(row: &Option<u64>) -> String {
    row.map(|r| format!(" (row {r})")).unwrap_or_default()
}

/// Raw fragments are truncated so a huge payload doesn't flood the terminal.
const RAW_FRAGMENT_LIMIT: usize = 240;

impl ParseError {
    pub fn missing(field: impl Into<String>, raw: impl ToString) -> Self {
        Self::new(field, ParseReason::Missing, raw)
    }

    pub fn malformed(field: impl Into<String>, raw: impl ToString) -> Self {
        Self::new(field, ParseReason::Malformed, raw)
    }

    fn new(field: impl Into<String>, reason: ParseReason, raw: impl ToString) -> Self {
        let mut raw = raw.to_string();
        if raw.len() > RAW_FRAGMENT_LIMIT {
            let mut cut = RAW_FRAGMENT_LIMIT;
            while !raw.is_char_boundary(cut) {
                cut -= 1;
            }
            raw.truncate(cut);
            raw.push_str("...");
        }
        Self {
            field: field.into(),
            reason,
            raw,
            row: None,
        }
    }

    /// Attach the 1-based data row number of a CSV record.
    pub fn at_row(mut self, row: u64) -> Self {
        self.row = Some(row);
        self
    }
}

#[derive(Error, Debug)]
pub enum PitcherError {
    #[error("network request failed: {message}")]
    Network { message: String },

    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("request issued {retry_in_ms}ms before the rate limit allows")]
    RateLimitExceeded { retry_in_ms: u64 },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("incompatible or corrupt database: {message}")]
    Schema { message: String },

    #[error("constraint violation: {message}")]
    Constraint { message: String },

    #[error("storage I/O failure: {message}")]
    StorageIo { message: String },

    #[error("unmet dependency: {message}")]
    Dependency { message: String },

    #[error("backup failed: {message}")]
    Backup { message: String },

    #[error("restore failed: {message}")]
    Restore { message: String },

    #[error("invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PitcherError {
    /// Name of the error kind as reported by the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            PitcherError::Network { .. } => "NetworkError",
            PitcherError::Api { .. } => "ApiError",
            PitcherError::RateLimitExceeded { .. } => "RateLimitExceeded",
            PitcherError::Parse(_) => "ParseError",
            PitcherError::Schema { .. } => "SchemaError",
            PitcherError::Constraint { .. } => "ConstraintError",
            PitcherError::StorageIo { .. } => "StorageIOError",
            PitcherError::Dependency { .. } => "DependencyError",
            PitcherError::Backup { .. } => "BackupError",
            PitcherError::Restore { .. } => "RestoreError",
            PitcherError::Config { .. } => "ConfigError",
            PitcherError::Json(_) => "ParseError",
            PitcherError::Io(_) => "IOError",
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        PitcherError::Schema {
            message: message.into(),
        }
    }

    pub fn storage_io(message: impl Into<String>) -> Self {
        PitcherError::StorageIo {
            message: message.into(),
        }
    }

    pub fn backup(message: impl Into<String>) -> Self {
        PitcherError::Backup {
            message: message.into(),
        }
    }

    pub fn restore(message: impl Into<String>) -> Self {
        PitcherError::Restore {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for PitcherError {
    fn from(err: rusqlite::Error) -> Self {
        let message = err.to_string();
        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => PitcherError::Constraint { message },
            Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
                PitcherError::Schema { message }
            }
            _ => PitcherError::StorageIo { message },
        }
    }
}

impl From<reqwest::Error> for PitcherError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => PitcherError::Api {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => PitcherError::Network {
                message: err.to_string(),
            },
        }
    }
}

impl From<reqwest::header::InvalidHeaderValue> for PitcherError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        PitcherError::Config {
            key: "header".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<std::num::ParseIntError> for PitcherError {
    fn from(err: std::num::ParseIntError) -> Self {
        PitcherError::Config {
            key: "integer".to_string(),
            message: err.to_string(),
        }
    }
}
