//! SQLite-backed store for profiles and sessions.
//!
//! List-valued columns (blocked apps, paused intervals, unlock tokens) are
//! JSON-encoded TEXT; timestamps are RFC 3339 TEXT. The partial unique index
//! on `sessions` enforces the single-active-session invariant at the store
//! level, backing up the lock-protected check in the lifecycle manager.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::DatabaseError;

use super::data_dir;

/// SQLite database holding profile and session records.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/foqos/foqos.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let path = data_dir()
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?
            .join("foqos.db");
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database, for tests.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        // Cascade from profile deletion to its sessions.
        conn.pragma_update(None, "foreign_keys", true)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS profiles (
                    id                          TEXT PRIMARY KEY,
                    name                        TEXT NOT NULL,
                    blocked_apps                TEXT NOT NULL DEFAULT '[]',
                    blocked_domains             TEXT,
                    strategy                    TEXT NOT NULL DEFAULT 'nfc',
                    apps_allow_mode             INTEGER NOT NULL DEFAULT 0,
                    domains_allow_mode          INTEGER NOT NULL DEFAULT 0,
                    block_all_browsers          INTEGER NOT NULL DEFAULT 0,
                    unlock_tokens               TEXT,
                    strict_token_id             TEXT,
                    qr_code_id                  TEXT,
                    strict_unlock_qr_code       TEXT,
                    emergency_enabled           INTEGER NOT NULL DEFAULT 0,
                    emergency_max_attempts      INTEGER NOT NULL DEFAULT 3,
                    emergency_cooldown_minutes  INTEGER NOT NULL DEFAULT 60,
                    remote_lock_enabled         INTEGER NOT NULL DEFAULT 0,
                    schedule                    TEXT,
                    breaks_enabled              INTEGER NOT NULL DEFAULT 1,
                    reminders                   TEXT,
                    strict_mode                 INTEGER NOT NULL DEFAULT 0,
                    disable_background_stops    INTEGER NOT NULL DEFAULT 0,
                    created_at                  TEXT NOT NULL,
                    updated_at                  TEXT NOT NULL,
                    display_order               INTEGER NOT NULL DEFAULT 0,
                    gradient_id                 INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    id                          TEXT PRIMARY KEY,
                    profile_id                  TEXT NOT NULL
                        REFERENCES profiles(id) ON DELETE CASCADE,
                    strategy                    TEXT NOT NULL,
                    started_at                  TEXT NOT NULL,
                    ended_at                    TEXT,
                    break_started_at            TEXT,
                    paused_durations            TEXT NOT NULL DEFAULT '[]',
                    blocked_apps                TEXT NOT NULL DEFAULT '[]',
                    blocked_domains             TEXT NOT NULL DEFAULT '[]',
                    timer_duration_min          INTEGER,
                    emergency_attempts_used     INTEGER NOT NULL DEFAULT 0,
                    emergency_cooldown_until    TEXT,
                    last_emergency_attempt      TEXT,
                    remote_lock_activated_at    TEXT,
                    remote_lock_activated_by    TEXT
                );

                -- At most one session with NULL ended_at, system-wide.
                CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_single_active
                    ON sessions ((1)) WHERE ended_at IS NULL;
                CREATE INDEX IF NOT EXISTS idx_sessions_profile
                    ON sessions(profile_id);
                CREATE INDEX IF NOT EXISTS idx_sessions_started_at
                    ON sessions(started_at);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }
}

// === Column helpers shared by the profile and session impl blocks ===

/// Parse datetime from RFC 3339 string with fallback to current time.
pub(super) fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(super) fn parse_optional_datetime(dt_str: Option<String>) -> Option<DateTime<Utc>> {
    dt_str.map(|s| parse_datetime_fallback(&s))
}

pub(super) fn format_optional_datetime(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(|d| d.to_rfc3339())
}

/// Parse a UUID column, falling back to nil on corruption.
pub(super) fn parse_uuid_fallback(id_str: &str) -> Uuid {
    Uuid::parse_str(id_str).unwrap_or(Uuid::nil())
}

pub(super) fn to_json<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::QueryFailed(e.to_string()))
}

/// Decode a JSON column, treating malformed content as the type's default.
pub(super) fn from_json_lossy<T: DeserializeOwned + Default>(json: &str) -> T {
    serde_json::from_str(json).unwrap_or_default()
}

pub(super) fn optional_json<T: Serialize>(
    value: &Option<T>,
) -> Result<Option<String>, DatabaseError> {
    value.as_ref().map(|v| to_json(v)).transpose()
}
