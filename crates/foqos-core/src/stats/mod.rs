//! Aggregated statistics over session lists.
//!
//! Pure derivations; callers feed in sessions from the store (typically
//! `sessions_for_profile` or `completed_sessions`) after each lifecycle
//! event.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Per-profile usage summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub total_sessions: u64,
    pub total_focus_ms: i64,
    pub last_used: Option<DateTime<Utc>>,
    /// Share of sessions (0..=100) completed without any emergency attempt.
    pub success_rate: f64,
    pub average_session_ms: i64,
}

impl ProfileStats {
    /// Compute stats over completed sessions; active ones are ignored.
    pub fn from_sessions(sessions: &[Session]) -> Self {
        let now = Utc::now();
        let completed: Vec<&Session> = sessions.iter().filter(|s| !s.is_active()).collect();

        if completed.is_empty() {
            return Self {
                total_sessions: 0,
                total_focus_ms: 0,
                last_used: None,
                success_rate: 0.0,
                average_session_ms: 0,
            };
        }

        let total = completed.len() as u64;
        let total_focus_ms: i64 = completed
            .iter()
            .map(|s| s.elapsed_focus(now).num_milliseconds())
            .sum();
        let last_used = completed.iter().map(|s| s.started_at).max();
        let successful = completed
            .iter()
            .filter(|s| s.emergency_attempts_used == 0)
            .count() as f64;
        let success_rate = successful / total as f64 * 100.0;
        let average_session_ms = total_focus_ms / total as i64;

        Self {
            total_sessions: total,
            total_focus_ms,
            last_used,
            success_rate,
            average_session_ms,
        }
    }
}

/// Focus time accumulated today (sessions that started today, local to UTC).
pub fn today_focus(sessions: &[Session], now: DateTime<Utc>) -> Duration {
    let today = now.date_naive();
    sessions
        .iter()
        .filter(|s| s.started_at.date_naive() == today)
        .fold(Duration::zero(), |acc, s| acc + s.elapsed_focus(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profile;

    fn completed(start: DateTime<Utc>, minutes: i64, emergency_attempts: u32) -> Session {
        let profile = Profile::new("Test");
        let mut session = Session::begin(&profile, None, start);
        session.ended_at = Some(start + Duration::minutes(minutes));
        session.emergency_attempts_used = emergency_attempts;
        session
    }

    #[test]
    fn empty_sessions_yield_zeroes() {
        let stats = ProfileStats::from_sessions(&[]);
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.last_used, None);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[test]
    fn aggregates_completed_sessions_only() {
        let start = Utc::now() - Duration::hours(5);
        let profile = Profile::new("Test");
        let sessions = vec![
            completed(start, 60, 0),
            completed(start + Duration::hours(2), 30, 1),
            // Still active; must not count.
            Session::begin(&profile, None, Utc::now()),
        ];

        let stats = ProfileStats::from_sessions(&sessions);
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_focus_ms, 90 * 60 * 1000);
        assert_eq!(stats.average_session_ms, 45 * 60 * 1000);
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.last_used, Some(start + Duration::hours(2)));
    }

    #[test]
    fn pauses_reduce_focus_totals() {
        let start = Utc::now() - Duration::hours(2);
        let mut session = completed(start, 60, 0);
        session.paused_durations.push(crate::session::PausedInterval {
            started_at: start + Duration::minutes(10),
            ended_at: start + Duration::minutes(25),
        });

        let stats = ProfileStats::from_sessions(&[session]);
        assert_eq!(stats.total_focus_ms, 45 * 60 * 1000);
    }

    #[test]
    fn today_focus_ignores_older_sessions() {
        use chrono::TimeZone;
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let today = completed(now - Duration::hours(3), 60, 0);
        let yesterday = completed(now - Duration::hours(30), 120, 0);

        let focus = today_focus(&[today, yesterday], now);
        assert_eq!(focus, Duration::minutes(60));
    }
}
