//! Core error types for stayfocused-core.
//!
//! This module defines the error hierarchy using thiserror. Validation
//! failures are reported to the caller as-is; host API failures carry the
//! message the host produced.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for stayfocused-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Failures reported by a host API (rule engine, storage, alarms)
    #[error("Host API error: {0}")]
    Host(#[from] HostApiError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// The data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors. Never silently corrected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Nothing to enforce
    #[error("Add at least one site to block before starting focus mode")]
    EmptyBlockList,

    /// Timed session with zero hours and zero minutes
    #[error("Duration must be at least 1 minute")]
    ZeroDuration,

    /// Malformed domain on list edit
    #[error("Invalid domain '{0}' (expected something like example.com)")]
    InvalidDomain(String),

    /// Domain already present in the target list
    #[error("{domain} is already in the {list} sites list")]
    DuplicateSite { domain: String, list: String },

    /// Start requested while a session is running
    #[error("A focus session is already active")]
    AlreadyActive,

    /// Clock time not in HH:MM form
    #[error("Invalid clock time '{0}' (expected HH:MM)")]
    InvalidClockTime(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors surfaced by the host platform seams.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostApiError {
    /// The rule engine rejected an update
    #[error("Rule update rejected: {0}")]
    RuleUpdateRejected(String),

    /// More dynamic rules than the rule engine accepts
    #[error("Rule limit exceeded: {requested} rules requested, at most {max} allowed")]
    RuleLimitExceeded { requested: usize, max: usize },

    /// Storage read or write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Alarm creation or cancellation failed
    #[error("Alarm error: {0}")]
    Alarm(String),

    /// A message could not be delivered to a recipient
    #[error("Delivery to '{recipient}' failed: {message}")]
    Delivery { recipient: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<DatabaseError> for HostApiError {
    fn from(err: DatabaseError) -> Self {
        HostApiError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for HostApiError {
    fn from(err: serde_json::Error) -> Self {
        HostApiError::Storage(format!("malformed stored value: {err}"))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
