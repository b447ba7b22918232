//! Lifecycle events.
//!
//! Every successful session mutation broadcasts exactly one [`Event`].
//! Observers (UI, stats overlays) subscribe via
//! [`SessionLifecycle::subscribe`](crate::lifecycle::SessionLifecycle::subscribe);
//! the core only notifies, it does not own the subscription mechanism.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Ordinary stop from the UI.
    Manual,
    /// Deferred expiration fired for a timed session.
    TimerExpired,
    /// Emergency unlock consumed an attempt.
    Emergency,
    /// A configured unlock token was presented.
    Token,
    /// A matching QR payload was presented.
    Qr,
}

/// Every state change in the session lifecycle produces an Event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: Uuid,
        profile_id: Uuid,
        timer_duration_min: Option<u32>,
        at: DateTime<Utc>,
    },
    SessionEnded {
        session_id: Uuid,
        reason: EndReason,
        at: DateTime<Utc>,
    },
    SessionPaused {
        session_id: Uuid,
        at: DateTime<Utc>,
    },
    SessionResumed {
        session_id: Uuid,
        /// Length of the pause that just closed, in milliseconds.
        paused_ms: i64,
        at: DateTime<Utc>,
    },
    EmergencyUnlockUsed {
        session_id: Uuid,
        attempts_remaining: u32,
        at: DateTime<Utc>,
    },
    RemoteLockActivated {
        session_id: Uuid,
        activated_by: String,
        at: DateTime<Utc>,
    },
    RemoteLockDeactivated {
        session_id: Uuid,
        at: DateTime<Utc>,
    },
}
