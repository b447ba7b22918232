//! # Foqos Core Library
//!
//! This library provides the core business logic for Foqos, an app/website
//! blocker for self-imposed focus sessions that are unlocked by physical
//! tokens (NFC tags or QR codes). GUI shells are thin layers over this
//! library; all state transitions live here.
//!
//! ## Architecture
//!
//! - **Session Lifecycle**: the sole authority for session state
//!   transitions, serialized behind a single store lock
//! - **Token Validator**: maps scanned NFC/QR identifiers to lifecycle
//!   actions using the active session's profile configuration
//! - **Storage**: SQLite-based profile/session storage and TOML-based
//!   configuration
//! - **Scheduler**: deferred one-shot expiration callbacks for timed
//!   sessions
//!
//! ## Key Components
//!
//! - [`SessionLifecycle`]: start/stop/pause/resume, emergency unlock,
//!   remote lock
//! - [`TokenValidator`]: NFC and QR dispatch
//! - [`Database`]: profile and session persistence
//! - [`Config`]: application configuration management

pub mod error;
pub mod events;
pub mod lifecycle;
pub mod profile;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod storage;
pub mod tokens;

pub use error::{ConfigError, CoreError, DatabaseError, SessionError};
pub use events::{EndReason, Event};
pub use lifecycle::{EmergencyUnlock, PauseToggle, SessionLifecycle};
pub use profile::{
    BlockingStrategy, EmergencySettings, Profile, ReminderSettings, TokenMode, UnlockToken,
    WeeklySchedule,
};
pub use scheduler::{ExpirationScheduler, TokioExpirationScheduler};
pub use session::{PausedInterval, Session};
pub use stats::ProfileStats;
pub use storage::{Config, Database};
pub use tokens::{ActionResult, TokenValidator};
