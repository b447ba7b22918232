//! Blocking profiles and their unlock-token configuration.
//!
//! A profile names what gets blocked (apps, domains) and how a running
//! session may be unlocked again: a list of physical tokens (NFC tag UIDs or
//! QR payloads) each carrying a mode, optional strict/QR identifiers, and the
//! emergency-unlock budget.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a session started from this profile is meant to be unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingStrategy {
    Nfc,
    Qr,
    NfcOrQr,
    /// Timer-only profiles; sessions end manually or by expiration.
    Manual,
}

impl BlockingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockingStrategy::Nfc => "nfc",
            BlockingStrategy::Qr => "qr",
            BlockingStrategy::NfcOrQr => "nfc_or_qr",
            BlockingStrategy::Manual => "manual",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "qr" => BlockingStrategy::Qr,
            "nfc_or_qr" => BlockingStrategy::NfcOrQr,
            "manual" => BlockingStrategy::Manual,
            _ => BlockingStrategy::Nfc,
        }
    }
}

/// Action a configured token performs when scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenMode {
    Unlock,
    Pause,
    Resume,
    Emergency,
    RemoteLockToggle,
    /// Reserved; rejected at dispatch.
    Custom,
}

/// A physical unlock token configured against a profile.
///
/// `token_id` is opaque: a hex-encoded NFC tag UID or a QR string. Matching
/// is exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockToken {
    pub token_id: String,
    pub mode: TokenMode,
    #[serde(default)]
    pub label: Option<String>,
}

impl UnlockToken {
    pub fn new(token_id: impl Into<String>, mode: TokenMode) -> Self {
        Self {
            token_id: token_id.into(),
            mode,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Emergency-unlock budget for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_cooldown_minutes() -> u32 {
    60
}

impl Default for EmergencySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: default_max_attempts(),
            cooldown_minutes: default_cooldown_minutes(),
        }
    }
}

/// Periodic reminder shown while a session is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSettings {
    pub interval_secs: u32,
    #[serde(default)]
    pub message: Option<String>,
}

/// Recurring weekly window during which the profile should auto-apply.
///
/// Days use ISO numbering, 1 = Monday through 7 = Sunday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub days_of_week: Vec<u8>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl WeeklySchedule {
    /// Whether the window covers the given weekday and local time.
    ///
    /// Windows where `end_time <= start_time` wrap past midnight.
    pub fn covers(&self, weekday: Weekday, time: NaiveTime) -> bool {
        let day = weekday.number_from_monday() as u8;
        if !self.days_of_week.contains(&day) {
            return false;
        }
        if self.start_time < self.end_time {
            time >= self.start_time && time < self.end_time
        } else {
            time >= self.start_time || time < self.end_time
        }
    }
}

/// A named blocking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    /// App identifiers to block (or allow, when `apps_allow_mode` is set).
    #[serde(default)]
    pub blocked_apps: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Option<Vec<String>>,
    pub strategy: BlockingStrategy,
    /// Invert semantics: the app list is an allow-list instead.
    #[serde(default)]
    pub apps_allow_mode: bool,
    #[serde(default)]
    pub domains_allow_mode: bool,
    #[serde(default)]
    pub block_all_browsers: bool,
    /// `None` when no tokens are configured; never `Some(vec![])`.
    #[serde(default)]
    pub unlock_tokens: Option<Vec<UnlockToken>>,
    /// Single designated token for heightened-restriction profiles,
    /// distinct from the general token list.
    #[serde(default)]
    pub strict_token_id: Option<String>,
    #[serde(default)]
    pub qr_code_id: Option<String>,
    #[serde(default)]
    pub strict_unlock_qr_code: Option<String>,
    #[serde(default)]
    pub emergency: EmergencySettings,
    #[serde(default)]
    pub remote_lock_enabled: bool,
    #[serde(default)]
    pub schedule: Option<WeeklySchedule>,
    #[serde(default)]
    pub breaks_enabled: bool,
    #[serde(default)]
    pub reminders: Option<ReminderSettings>,
    /// Device-admin strict mode.
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default)]
    pub disable_background_stops: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default)]
    pub gradient_id: i64,
}

impl Profile {
    /// Create a profile with the given name and defaults for everything else.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            blocked_apps: Vec::new(),
            blocked_domains: None,
            strategy: BlockingStrategy::Nfc,
            apps_allow_mode: false,
            domains_allow_mode: false,
            block_all_browsers: false,
            unlock_tokens: None,
            strict_token_id: None,
            qr_code_id: None,
            strict_unlock_qr_code: None,
            emergency: EmergencySettings::default(),
            remote_lock_enabled: false,
            schedule: None,
            breaks_enabled: true,
            reminders: None,
            strict_mode: false,
            disable_background_stops: false,
            created_at: now,
            updated_at: now,
            display_order: 0,
            gradient_id: 0,
        }
    }

    /// All configured tokens, empty slice when none.
    pub fn tokens(&self) -> &[UnlockToken] {
        self.unlock_tokens.as_deref().unwrap_or_default()
    }

    pub fn has_tokens(&self) -> bool {
        !self.tokens().is_empty()
    }

    /// Exact-match lookup in the configured token list.
    pub fn find_token(&self, token_id: &str) -> Option<&UnlockToken> {
        self.tokens().iter().find(|t| t.token_id == token_id)
    }

    /// Add a token, replacing any existing entry with the same id.
    pub fn add_token(&mut self, token: UnlockToken) {
        let tokens = self.unlock_tokens.get_or_insert_with(Vec::new);
        tokens.retain(|t| t.token_id != token.token_id);
        tokens.push(token);
    }

    /// Remove a token by id. Removing the last one clears the list back to
    /// `None` rather than leaving an empty marker.
    pub fn remove_token(&mut self, token_id: &str) {
        if let Some(tokens) = self.unlock_tokens.as_mut() {
            tokens.retain(|t| t.token_id != token_id);
            if tokens.is_empty() {
                self.unlock_tokens = None;
            }
        }
    }
}
