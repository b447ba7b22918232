//! Session records and focus-duration math.
//!
//! A session is one timed instance of active blocking tied to a profile.
//! The blocked lists and strategy are snapshotted at start so later profile
//! edits never retroactively change an in-flight session.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profile::{BlockingStrategy, Profile};

/// A finalized pause: `break_started_at .. ended_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausedInterval {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl PausedInterval {
    pub fn duration(&self) -> Duration {
        self.ended_at - self.started_at
    }
}

/// One blocking session.
///
/// `ended_at == None` marks the active session; at most one exists at any
/// instant. An open pause is represented only by `break_started_at`; closing
/// it appends a [`PausedInterval`] and clears the field. The two remote-lock
/// fields are both `None` or both set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub profile_id: Uuid,
    /// Strategy copied from the profile at start; immutable afterwards.
    pub strategy: BlockingStrategy,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub break_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused_durations: Vec<PausedInterval>,
    #[serde(default)]
    pub blocked_apps: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    #[serde(default)]
    pub timer_duration_min: Option<u32>,
    #[serde(default)]
    pub emergency_attempts_used: u32,
    #[serde(default)]
    pub emergency_cooldown_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_emergency_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remote_lock_activated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remote_lock_activated_by: Option<String>,
}

impl Session {
    /// Snapshot a new active session from a profile.
    pub fn begin(profile: &Profile, timer_duration_min: Option<u32>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile_id: profile.id,
            strategy: profile.strategy,
            started_at: now,
            ended_at: None,
            break_started_at: None,
            paused_durations: Vec::new(),
            blocked_apps: profile.blocked_apps.clone(),
            blocked_domains: profile.blocked_domains.clone().unwrap_or_default(),
            timer_duration_min,
            emergency_attempts_used: 0,
            emergency_cooldown_until: None,
            last_emergency_attempt: None,
            remote_lock_activated_at: None,
            remote_lock_activated_by: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn is_paused(&self) -> bool {
        self.break_started_at.is_some()
    }

    pub fn is_remote_locked(&self) -> bool {
        self.remote_lock_activated_at.is_some()
    }

    /// Sum of all finalized pauses.
    pub fn total_paused(&self) -> Duration {
        self.paused_durations
            .iter()
            .fold(Duration::zero(), |acc, p| acc + p.duration())
    }

    /// Time spent in the currently open pause, zero when not paused.
    pub fn current_pause(&self, now: DateTime<Utc>) -> Duration {
        match self.break_started_at {
            Some(start) => (now - start).max(Duration::zero()),
            None => Duration::zero(),
        }
    }

    /// Effective focus time: wall time minus all pauses, open pause included.
    /// An open pause is clamped at the end time for finished sessions.
    pub fn elapsed_focus(&self, now: DateTime<Utc>) -> Duration {
        let end = self.ended_at.unwrap_or(now);
        let elapsed = (end - self.started_at) - self.total_paused() - self.current_pause(end);
        elapsed.max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(start: DateTime<Utc>) -> Session {
        let profile = Profile::new("Test");
        Session::begin(&profile, None, start)
    }

    #[test]
    fn begin_snapshots_profile() {
        let mut profile = Profile::new("Work");
        profile.blocked_apps = vec!["com.example.social".into()];
        profile.blocked_domains = Some(vec!["example.com".into()]);

        let now = Utc::now();
        let session = Session::begin(&profile, Some(45), now);

        assert_eq!(session.profile_id, profile.id);
        assert_eq!(session.blocked_apps, profile.blocked_apps);
        assert_eq!(session.blocked_domains, vec!["example.com".to_string()]);
        assert_eq!(session.timer_duration_min, Some(45));
        assert!(session.is_active());
        assert!(!session.is_paused());
        assert_eq!(session.emergency_attempts_used, 0);
    }

    #[test]
    fn elapsed_excludes_finalized_pauses() {
        let start = Utc::now();
        let mut session = session_at(start);
        session.paused_durations.push(PausedInterval {
            started_at: start + Duration::minutes(10),
            ended_at: start + Duration::minutes(15),
        });

        let now = start + Duration::minutes(30);
        assert_eq!(session.elapsed_focus(now), Duration::minutes(25));
    }

    #[test]
    fn elapsed_excludes_open_pause() {
        let start = Utc::now();
        let mut session = session_at(start);
        session.break_started_at = Some(start + Duration::minutes(20));

        let now = start + Duration::minutes(30);
        assert_eq!(session.elapsed_focus(now), Duration::minutes(20));
    }

    #[test]
    fn elapsed_stops_at_end_time() {
        let start = Utc::now();
        let mut session = session_at(start);
        session.ended_at = Some(start + Duration::minutes(40));

        let much_later = start + Duration::hours(5);
        assert_eq!(session.elapsed_focus(much_later), Duration::minutes(40));
    }

    #[test]
    fn elapsed_never_negative() {
        let start = Utc::now();
        let session = session_at(start);
        // Clock skew: "now" before the start time.
        let before = start - Duration::minutes(1);
        assert_eq!(session.elapsed_focus(before), Duration::zero());
    }
}
