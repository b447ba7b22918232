//! Session lifecycle manager.
//!
//! The sole authority for session state transitions: start, stop, pause,
//! resume, timer expiration, emergency unlock and remote lock all pass
//! through here. Every public operation holds the store mutex for its whole
//! read-modify-write, so near-simultaneous triggers (a manual stop racing a
//! timer expiration, two token scans) can never double-apply effects.
//!
//! ## State machine
//!
//! ```text
//! [none] --start--> ACTIVE --stop/expire/emergency--> ENDED (terminal)
//! ACTIVE --pause--> PAUSED --resume--> ACTIVE
//! ACTIVE --activate_remote_lock--> ACTIVE(remote-locked)
//! ACTIVE(remote-locked) --token unlock--> ENDED
//! ACTIVE(remote-locked) --stop (direct)--> RemoteLockActive error
//! ACTIVE(remote-locked) --emergency--> ENDED (always permitted)
//! ```
//!
//! Paused and remote-locked are independent flags, not a single enum; a
//! session can be both at once.

use std::sync::{Arc, Weak};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::error::{CoreError, Result, SessionError};
use crate::events::{EndReason, Event};
use crate::scheduler::ExpirationScheduler;
use crate::session::{PausedInterval, Session};
use crate::storage::Database;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Result of [`SessionLifecycle::toggle_pause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseToggle {
    Paused,
    Resumed,
}

/// Result of a successful emergency unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyUnlock {
    pub attempts_remaining: u32,
    /// Set when this was the last permitted attempt and the cooldown started.
    pub cooldown_started: bool,
}

/// Orchestrates session state transitions over the store.
pub struct SessionLifecycle {
    db: Arc<Mutex<Database>>,
    scheduler: Arc<dyn ExpirationScheduler>,
    events: broadcast::Sender<Event>,
}

impl SessionLifecycle {
    pub fn new(db: Arc<Mutex<Database>>, scheduler: Arc<dyn ExpirationScheduler>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            db,
            scheduler,
            events,
        }
    }

    /// Subscribe to lifecycle events. Each successful mutation broadcasts
    /// exactly one event (emergency unlock broadcasts its own event plus the
    /// session end).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Start a session from a profile, snapshotting its blocked lists.
    ///
    /// Fails with [`SessionError::SessionAlreadyActive`] when any session is
    /// still active. With a timer duration, registers a deferred expiration
    /// callback tagged with the new session id.
    pub async fn start(
        self: &Arc<Self>,
        profile_id: Uuid,
        timer_duration_min: Option<u32>,
    ) -> Result<Session> {
        let session = {
            let db = self.db.lock().await;
            let profile = db
                .profile(profile_id)?
                .ok_or(SessionError::ProfileNotFound)?;
            if db.active_session()?.is_some() {
                return Err(SessionError::SessionAlreadyActive.into());
            }
            let session = Session::begin(&profile, timer_duration_min, Utc::now());
            db.insert_session(&session)?;
            session
        };

        if let Some(minutes) = timer_duration_min {
            self.schedule_expiration(session.id, minutes);
        }

        self.emit(Event::SessionStarted {
            session_id: session.id,
            profile_id,
            timer_duration_min,
            at: session.started_at,
        });
        Ok(session)
    }

    /// Ordinary stop from the UI.
    ///
    /// Rejected with [`SessionError::RemoteLockActive`] while a remote lock
    /// holds; an unlock token or emergency unlock must be used instead.
    pub async fn stop(&self, session_id: Uuid) -> Result<()> {
        let db = self.db.lock().await;
        let session = load_active(&db, session_id)?;
        if session.is_remote_locked() {
            return Err(SessionError::RemoteLockActive.into());
        }
        self.end_locked(&db, session, EndReason::Manual)
    }

    /// Stop sanctioned by a physical token or QR match.
    ///
    /// Unlike [`stop`](Self::stop) this bypasses the remote-lock guard:
    /// possession of the configured token is the intended way to end a
    /// remote-locked session.
    pub(crate) async fn stop_via_token(&self, session_id: Uuid, reason: EndReason) -> Result<()> {
        let db = self.db.lock().await;
        let session = load_active(&db, session_id)?;
        self.end_locked(&db, session, reason)
    }

    /// Deferred-expiration callback target.
    ///
    /// Idempotent: a session that is gone or already ended (e.g. manually
    /// stopped a moment before the timer fired) is a silent no-op. The
    /// remote-lock guard does not apply; timers are a safety net independent
    /// of remote-lock semantics.
    pub async fn expire_by_timer(&self, session_id: Uuid) -> Result<()> {
        let db = self.db.lock().await;
        let session = match db.session(session_id)? {
            Some(s) if s.is_active() => s,
            _ => return Ok(()),
        };
        self.end_locked(&db, session, EndReason::TimerExpired)
    }

    /// Open a break. Fails with [`SessionError::AlreadyPaused`] when one is
    /// already open.
    pub async fn pause(&self, session_id: Uuid) -> Result<()> {
        let db = self.db.lock().await;
        let session = load_active(&db, session_id)?;
        if session.is_paused() {
            return Err(SessionError::AlreadyPaused.into());
        }
        self.pause_locked(&db, session)
    }

    /// Close the open break, appending it to the finalized pause list.
    pub async fn resume(&self, session_id: Uuid) -> Result<()> {
        let db = self.db.lock().await;
        let session = load_active(&db, session_id)?;
        if !session.is_paused() {
            return Err(SessionError::NotPaused.into());
        }
        self.resume_locked(&db, session)
    }

    /// Primary UI action: resume if paused, pause otherwise. Never fails on
    /// pause state.
    pub async fn toggle_pause(&self, session_id: Uuid) -> Result<PauseToggle> {
        let db = self.db.lock().await;
        let session = load_active(&db, session_id)?;
        if session.is_paused() {
            self.resume_locked(&db, session)?;
            Ok(PauseToggle::Resumed)
        } else {
            self.pause_locked(&db, session)?;
            Ok(PauseToggle::Paused)
        }
    }

    /// Consume an emergency-unlock attempt and end the session.
    ///
    /// Attempt accounting follows the profile budget: the cooldown starts on
    /// the last permitted attempt, and once attempts are exhausted each
    /// further call refreshes the cooldown without consuming anything.
    /// A successful emergency unlock always ends the session, remote lock or
    /// not.
    pub async fn use_emergency_unlock(&self, session_id: Uuid) -> Result<EmergencyUnlock> {
        let db = self.db.lock().await;
        let mut session = load_active(&db, session_id)?;
        let profile = db
            .profile(session.profile_id)?
            .ok_or(SessionError::ProfileNotFound)?;

        if !profile.emergency.enabled {
            return Err(SessionError::EmergencyDisabled.into());
        }

        let now = Utc::now();
        if let Some(cooldown_until) = session.emergency_cooldown_until {
            if now < cooldown_until {
                return Err(SessionError::CooldownActive {
                    minutes_remaining: minutes_remaining(cooldown_until, now),
                }
                .into());
            }
        }

        let max_attempts = profile.emergency.max_attempts;
        let cooldown = Duration::minutes(i64::from(profile.emergency.cooldown_minutes));

        if session.emergency_attempts_used >= max_attempts {
            // No attempt left to consume; refresh the cooldown instead.
            session.emergency_cooldown_until = Some(now + cooldown);
            session.last_emergency_attempt = Some(now);
            db.update_session(&session)?;
            return Err(SessionError::AttemptsExhausted.into());
        }

        session.emergency_attempts_used += 1;
        session.last_emergency_attempt = Some(now);
        let cooldown_started = session.emergency_attempts_used >= max_attempts;
        if cooldown_started {
            session.emergency_cooldown_until = Some(now + cooldown);
        }
        db.update_session(&session)?;

        let attempts_remaining = max_attempts - session.emergency_attempts_used;
        self.emit(Event::EmergencyUnlockUsed {
            session_id,
            attempts_remaining,
            at: now,
        });
        self.end_locked(&db, session, EndReason::Emergency)?;

        Ok(EmergencyUnlock {
            attempts_remaining,
            cooldown_started,
        })
    }

    /// Lock the session so only a physical token can end it.
    ///
    /// Requires the profile to allow remote lock and to have at least one
    /// configured token; otherwise the lock would be irreversible.
    pub async fn activate_remote_lock(
        &self,
        session_id: Uuid,
        activated_by: impl Into<String>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let mut session = load_active(&db, session_id)?;
        if session.is_remote_locked() {
            return Err(SessionError::RemoteLockActive.into());
        }
        let profile = db
            .profile(session.profile_id)?
            .ok_or(SessionError::ProfileNotFound)?;
        if !profile.remote_lock_enabled {
            return Err(SessionError::RemoteLockDisabled.into());
        }
        if !profile.has_tokens() {
            return Err(SessionError::NoTokensConfigured.into());
        }

        let now = Utc::now();
        let activated_by = activated_by.into();
        session.remote_lock_activated_at = Some(now);
        session.remote_lock_activated_by = Some(activated_by.clone());
        db.update_session(&session)?;
        self.emit(Event::RemoteLockActivated {
            session_id,
            activated_by,
            at: now,
        });
        Ok(())
    }

    /// Clear the remote lock. Invoked by the token validator on a
    /// remote-lock-toggle token, not by ordinary UI stop.
    pub async fn deactivate_remote_lock(&self, session_id: Uuid) -> Result<()> {
        let db = self.db.lock().await;
        let mut session = load_active(&db, session_id)?;
        if !session.is_remote_locked() {
            return Err(SessionError::RemoteLockNotActive.into());
        }
        session.remote_lock_activated_at = None;
        session.remote_lock_activated_by = None;
        db.update_session(&session)?;
        self.emit(Event::RemoteLockDeactivated {
            session_id,
            at: Utc::now(),
        });
        Ok(())
    }

    /// The active session, if any.
    pub async fn active_session(&self) -> Result<Option<Session>> {
        let db = self.db.lock().await;
        Ok(db.active_session()?)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn pause_locked(&self, db: &Database, mut session: Session) -> Result<()> {
        let now = Utc::now();
        session.break_started_at = Some(now);
        db.update_session(&session)?;
        self.emit(Event::SessionPaused {
            session_id: session.id,
            at: now,
        });
        Ok(())
    }

    fn resume_locked(&self, db: &Database, mut session: Session) -> Result<()> {
        let Some(break_started_at) = session.break_started_at.take() else {
            return Err(SessionError::NotPaused.into());
        };
        let now = Utc::now();
        session.paused_durations.push(PausedInterval {
            started_at: break_started_at,
            ended_at: now,
        });
        db.update_session(&session)?;
        self.emit(Event::SessionResumed {
            session_id: session.id,
            paused_ms: (now - break_started_at).num_milliseconds(),
            at: now,
        });
        Ok(())
    }

    /// Finalize a session while holding the store lock. An open break is
    /// closed at the end instant so the pause bookkeeping stays consistent.
    fn end_locked(&self, db: &Database, mut session: Session, reason: EndReason) -> Result<()> {
        let now = Utc::now();
        if let Some(break_started_at) = session.break_started_at.take() {
            session.paused_durations.push(PausedInterval {
                started_at: break_started_at,
                ended_at: now,
            });
        }
        session.ended_at = Some(now);
        db.update_session(&session)?;
        // Best effort; expire_by_timer tolerates an uncancelled callback.
        self.scheduler.cancel(session.id);
        self.emit(Event::SessionEnded {
            session_id: session.id,
            reason,
            at: now,
        });
        Ok(())
    }

    fn schedule_expiration(self: &Arc<Self>, session_id: Uuid, minutes: u32) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = StdDuration::from_secs(u64::from(minutes) * 60);
        self.scheduler.schedule(
            session_id,
            delay,
            Box::new(move || {
                let weak = weak.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(lifecycle) => lifecycle.expire_by_timer(session_id).await,
                        None => Ok(()),
                    }
                })
            }),
        );
    }

    fn emit(&self, event: Event) {
        // A send error only means nobody is subscribed.
        let _ = self.events.send(event);
    }
}

/// Load a session that must still be active.
fn load_active(db: &Database, session_id: Uuid) -> Result<Session, CoreError> {
    match db.session(session_id)? {
        Some(session) if session.is_active() => Ok(session),
        _ => Err(SessionError::NoActiveSession.into()),
    }
}

/// Ceiling of the remaining cooldown in minutes, matching the user message.
fn minutes_remaining(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (until - now).num_milliseconds().max(0);
    (ms + 59_999) / 60_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_minutes_round_up() {
        let now = Utc::now();
        assert_eq!(minutes_remaining(now + Duration::seconds(61), now), 2);
        assert_eq!(minutes_remaining(now + Duration::seconds(60), now), 1);
        assert_eq!(minutes_remaining(now + Duration::seconds(1), now), 1);
        assert_eq!(minutes_remaining(now - Duration::seconds(1), now), 0);
    }
}
