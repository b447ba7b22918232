//! Core error types for foqos-core.
//!
//! Two channels, kept deliberately separate: [`SessionError`] is the
//! user-facing taxonomy returned by lifecycle and token operations (expected
//! conditions, surfaced as messages, never fatal), while [`DatabaseError`] and
//! [`ConfigError`] cover infrastructure failures.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for foqos-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Expected, user-facing session conditions
    #[error("{0}")]
    Session(#[from] SessionError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

impl CoreError {
    /// The session-level condition, if this error is one.
    ///
    /// Callers use this to distinguish expected conditions (show a message)
    /// from infrastructure failures (fatal channel).
    pub fn as_session_error(&self) -> Option<&SessionError> {
        match self {
            CoreError::Session(e) => Some(e),
            _ => None,
        }
    }
}

/// Expected session/token conditions reported to the caller.
///
/// Every variant's `Display` text is the message shown to the user; none of
/// these should ever crash the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A session is already active")]
    SessionAlreadyActive,

    #[error("No active session")]
    NoActiveSession,

    #[error("Remote lock active. Present an unlock token to end this session")]
    RemoteLockActive,

    #[error("Session is already paused")]
    AlreadyPaused,

    #[error("Session is not paused")]
    NotPaused,

    #[error("Emergency unlock is not enabled for this profile")]
    EmergencyDisabled,

    #[error("Cooldown active. Wait {minutes_remaining} more minutes")]
    CooldownActive { minutes_remaining: i64 },

    #[error("All emergency attempts used. Cooldown activated")]
    AttemptsExhausted,

    #[error("Remote lock is not enabled for this profile")]
    RemoteLockDisabled,

    #[error("No unlock tokens configured. Add an unlock token first")]
    NoTokensConfigured,

    #[error("Remote lock is not active")]
    RemoteLockNotActive,

    #[error("Profile not found")]
    ProfileNotFound,

    #[error("Unknown unlock token")]
    UnknownToken,

    #[error("Invalid QR code")]
    InvalidCode,

    #[error("Custom token mode is not implemented")]
    NotImplemented,
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

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_carry_user_messages() {
        assert_eq!(
            SessionError::SessionAlreadyActive.to_string(),
            "A session is already active"
        );
        assert_eq!(
            SessionError::CooldownActive {
                minutes_remaining: 12
            }
            .to_string(),
            "Cooldown active. Wait 12 more minutes"
        );
    }

    #[test]
    fn core_error_exposes_session_condition() {
        let err = CoreError::from(SessionError::UnknownToken);
        assert_eq!(err.as_session_error(), Some(&SessionError::UnknownToken));

        let err = CoreError::Custom("boom".into());
        assert!(err.as_session_error().is_none());
    }
}
