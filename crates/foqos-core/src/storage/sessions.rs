//! Session store: CRUD over session records.
//!
//! Mutations flow through the lifecycle manager; this layer only guarantees
//! that each read or write of a session row is a single atomic statement.

use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::profile::BlockingStrategy;
use crate::session::{PausedInterval, Session};

use super::database::{
    format_optional_datetime, from_json_lossy, parse_datetime_fallback, parse_optional_datetime,
    parse_uuid_fallback, to_json,
};
use super::Database;

const SESSION_COLUMNS: &str = "id, profile_id, strategy, started_at, ended_at, \
     break_started_at, paused_durations, blocked_apps, blocked_domains, \
     timer_duration_min, emergency_attempts_used, emergency_cooldown_until, \
     last_emergency_attempt, remote_lock_activated_at, remote_lock_activated_by";

fn row_to_session(row: &Row) -> Result<Session, rusqlite::Error> {
    let id: String = row.get(0)?;
    let profile_id: String = row.get(1)?;
    let strategy: String = row.get(2)?;
    let started_at: String = row.get(3)?;
    let ended_at: Option<String> = row.get(4)?;
    let break_started_at: Option<String> = row.get(5)?;
    let paused_durations: String = row.get(6)?;
    let blocked_apps: String = row.get(7)?;
    let blocked_domains: String = row.get(8)?;
    let emergency_cooldown_until: Option<String> = row.get(11)?;
    let last_emergency_attempt: Option<String> = row.get(12)?;
    let remote_lock_activated_at: Option<String> = row.get(13)?;

    Ok(Session {
        id: parse_uuid_fallback(&id),
        profile_id: parse_uuid_fallback(&profile_id),
        strategy: BlockingStrategy::from_str_lossy(&strategy),
        started_at: parse_datetime_fallback(&started_at),
        ended_at: parse_optional_datetime(ended_at),
        break_started_at: parse_optional_datetime(break_started_at),
        paused_durations: from_json_lossy::<Vec<PausedInterval>>(&paused_durations),
        blocked_apps: from_json_lossy(&blocked_apps),
        blocked_domains: from_json_lossy(&blocked_domains),
        timer_duration_min: row.get(9)?,
        emergency_attempts_used: row.get(10)?,
        emergency_cooldown_until: parse_optional_datetime(emergency_cooldown_until),
        last_emergency_attempt: parse_optional_datetime(last_emergency_attempt),
        remote_lock_activated_at: parse_optional_datetime(remote_lock_activated_at),
        remote_lock_activated_by: row.get(14)?,
    })
}

impl Database {
    /// Insert a session record.
    ///
    /// The partial unique index rejects a second active session even if the
    /// caller's check-then-act was somehow bypassed.
    pub fn insert_session(&self, session: &Session) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT INTO sessions (id, profile_id, strategy, started_at, ended_at,
                break_started_at, paused_durations, blocked_apps, blocked_domains,
                timer_duration_min, emergency_attempts_used, emergency_cooldown_until,
                last_emergency_attempt, remote_lock_activated_at, remote_lock_activated_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                session.id.to_string(),
                session.profile_id.to_string(),
                session.strategy.as_str(),
                session.started_at.to_rfc3339(),
                format_optional_datetime(session.ended_at),
                format_optional_datetime(session.break_started_at),
                to_json(&session.paused_durations)?,
                to_json(&session.blocked_apps)?,
                to_json(&session.blocked_domains)?,
                session.timer_duration_min,
                session.emergency_attempts_used,
                format_optional_datetime(session.emergency_cooldown_until),
                format_optional_datetime(session.last_emergency_attempt),
                format_optional_datetime(session.remote_lock_activated_at),
                session.remote_lock_activated_by,
            ],
        )?;
        Ok(())
    }

    /// Fetch a session by id.
    pub fn session(&self, id: Uuid) -> Result<Option<Session>, DatabaseError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
        let session = self
            .conn()
            .query_row(&sql, params![id.to_string()], row_to_session)
            .optional()?;
        Ok(session)
    }

    /// The session with no end time, if any.
    pub fn active_session(&self) -> Result<Option<Session>, DatabaseError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE ended_at IS NULL");
        let session = self.conn().query_row(&sql, [], row_to_session).optional()?;
        Ok(session)
    }

    /// Persist session changes.
    pub fn update_session(&self, session: &Session) -> Result<(), DatabaseError> {
        let changed = self.conn().execute(
            "UPDATE sessions SET ended_at = ?2, break_started_at = ?3,
                paused_durations = ?4, timer_duration_min = ?5,
                emergency_attempts_used = ?6, emergency_cooldown_until = ?7,
                last_emergency_attempt = ?8, remote_lock_activated_at = ?9,
                remote_lock_activated_by = ?10
             WHERE id = ?1",
            params![
                session.id.to_string(),
                format_optional_datetime(session.ended_at),
                format_optional_datetime(session.break_started_at),
                to_json(&session.paused_durations)?,
                session.timer_duration_min,
                session.emergency_attempts_used,
                format_optional_datetime(session.emergency_cooldown_until),
                format_optional_datetime(session.last_emergency_attempt),
                format_optional_datetime(session.remote_lock_activated_at),
                session.remote_lock_activated_by,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::QueryFailed(format!(
                "session {} does not exist",
                session.id
            )));
        }
        Ok(())
    }

    /// All sessions started from the given profile, newest first.
    pub fn sessions_for_profile(&self, profile_id: Uuid) -> Result<Vec<Session>, DatabaseError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE profile_id = ?1
             ORDER BY started_at DESC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![profile_id.to_string()], row_to_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    /// All completed sessions across profiles, newest first.
    pub fn completed_sessions(&self) -> Result<Vec<Session>, DatabaseError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE ended_at IS NOT NULL
             ORDER BY started_at DESC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], row_to_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }
}
