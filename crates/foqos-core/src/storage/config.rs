//! TOML-based application configuration.
//!
//! Stores user preferences applied when creating profiles and sessions:
//! - Session defaults (timer length, background-stop behavior)
//! - Emergency-unlock defaults (attempt budget, cooldown)
//! - Reminder notification defaults
//!
//! Configuration is stored at `~/.config/foqos/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

use super::data_dir;

/// Defaults applied to new sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDefaults {
    /// Pre-filled timer duration; `None` means untimed by default.
    #[serde(default)]
    pub default_timer_minutes: Option<u32>,
    /// When set, background process kills do not end the session.
    #[serde(default)]
    pub disable_background_stops: bool,
}

/// Defaults applied to new profiles' emergency-unlock settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyDefaults {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
}

/// Reminder notification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reminder_interval")]
    pub reminder_interval_secs: u32,
    #[serde(default)]
    pub reminder_message: Option<String>,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_cooldown_minutes() -> u32 {
    60
}
fn default_reminder_interval() -> u32 {
    300
}
fn default_true() -> bool {
    true
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            default_timer_minutes: None,
            disable_background_stops: false,
        }
    }
}

impl Default for EmergencyDefaults {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            cooldown_minutes: default_cooldown_minutes(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reminder_interval_secs: default_reminder_interval(),
            reminder_message: None,
        }
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/foqos/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionDefaults,
    #[serde(default)]
    pub emergency: EmergencyDefaults,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    // Tests that redirect HOME must not interleave.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn home_in_tempdir() -> (tempfile::TempDir, MutexGuard<'static, ()>) {
        let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", dir.path());
        std::env::set_var("FOQOS_ENV", "dev");
        (dir, guard)
    }

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let parsed: Config = toml::from_str("[emergency]\nmax_attempts = 5\n").unwrap();
        assert_eq!(parsed.emergency.max_attempts, 5);
        assert_eq!(parsed.emergency.cooldown_minutes, 60);
        assert!(parsed.notifications.enabled);
        assert_eq!(parsed.session.default_timer_minutes, None);
    }

    #[test]
    fn save_and_load_round_trip_on_disk() {
        let (_dir, _guard) = home_in_tempdir();

        let mut cfg = Config::default();
        cfg.emergency.max_attempts = 7;
        cfg.notifications.reminder_message = Some("Back to work".into());
        cfg.save().unwrap();

        let loaded = Config::load().unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let (_dir, _guard) = home_in_tempdir();

        let path = data_dir().unwrap().join("config.toml");
        std::fs::write(&path, "this is [not toml").unwrap();

        match Config::load() {
            Err(ConfigError::ParseFailed(_)) => {}
            other => panic!("expected ParseFailed, got {other:?}"),
        }
    }
}
