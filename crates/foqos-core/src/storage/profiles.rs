//! Profile store: CRUD over blocking-profile configuration.

use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::profile::{BlockingStrategy, Profile, UnlockToken};

use super::database::{
    from_json_lossy, optional_json, parse_datetime_fallback, parse_uuid_fallback, to_json,
};
use super::Database;

const PROFILE_COLUMNS: &str = "id, name, blocked_apps, blocked_domains, strategy, \
     apps_allow_mode, domains_allow_mode, block_all_browsers, unlock_tokens, \
     strict_token_id, qr_code_id, strict_unlock_qr_code, emergency_enabled, \
     emergency_max_attempts, emergency_cooldown_minutes, remote_lock_enabled, \
     schedule, breaks_enabled, reminders, strict_mode, disable_background_stops, \
     created_at, updated_at, display_order, gradient_id";

fn row_to_profile(row: &Row) -> Result<Profile, rusqlite::Error> {
    let id: String = row.get(0)?;
    let blocked_apps: String = row.get(2)?;
    let blocked_domains: Option<String> = row.get(3)?;
    let strategy: String = row.get(4)?;
    let unlock_tokens: Option<String> = row.get(8)?;
    let schedule: Option<String> = row.get(16)?;
    let reminders: Option<String> = row.get(18)?;
    let created_at: String = row.get(21)?;
    let updated_at: String = row.get(22)?;

    Ok(Profile {
        id: parse_uuid_fallback(&id),
        name: row.get(1)?,
        blocked_apps: from_json_lossy(&blocked_apps),
        blocked_domains: blocked_domains.map(|j| from_json_lossy(&j)),
        strategy: BlockingStrategy::from_str_lossy(&strategy),
        apps_allow_mode: row.get(5)?,
        domains_allow_mode: row.get(6)?,
        block_all_browsers: row.get(7)?,
        unlock_tokens: unlock_tokens
            .map(|j| from_json_lossy::<Vec<UnlockToken>>(&j))
            .filter(|tokens| !tokens.is_empty()),
        strict_token_id: row.get(9)?,
        qr_code_id: row.get(10)?,
        strict_unlock_qr_code: row.get(11)?,
        emergency: crate::profile::EmergencySettings {
            enabled: row.get(12)?,
            max_attempts: row.get(13)?,
            cooldown_minutes: row.get(14)?,
        },
        remote_lock_enabled: row.get(15)?,
        schedule: schedule.and_then(|j| serde_json::from_str(&j).ok()),
        breaks_enabled: row.get(17)?,
        reminders: reminders.and_then(|j| serde_json::from_str(&j).ok()),
        strict_mode: row.get(19)?,
        disable_background_stops: row.get(20)?,
        created_at: parse_datetime_fallback(&created_at),
        updated_at: parse_datetime_fallback(&updated_at),
        display_order: row.get(23)?,
        gradient_id: row.get(24)?,
    })
}

impl Database {
    /// Insert a new profile.
    pub fn insert_profile(&self, profile: &Profile) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT INTO profiles (id, name, blocked_apps, blocked_domains, strategy,
                apps_allow_mode, domains_allow_mode, block_all_browsers, unlock_tokens,
                strict_token_id, qr_code_id, strict_unlock_qr_code, emergency_enabled,
                emergency_max_attempts, emergency_cooldown_minutes, remote_lock_enabled,
                schedule, breaks_enabled, reminders, strict_mode, disable_background_stops,
                created_at, updated_at, display_order, gradient_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
            params![
                profile.id.to_string(),
                profile.name,
                to_json(&profile.blocked_apps)?,
                optional_json(&profile.blocked_domains)?,
                profile.strategy.as_str(),
                profile.apps_allow_mode,
                profile.domains_allow_mode,
                profile.block_all_browsers,
                optional_json(&profile.unlock_tokens)?,
                profile.strict_token_id,
                profile.qr_code_id,
                profile.strict_unlock_qr_code,
                profile.emergency.enabled,
                profile.emergency.max_attempts,
                profile.emergency.cooldown_minutes,
                profile.remote_lock_enabled,
                optional_json(&profile.schedule)?,
                profile.breaks_enabled,
                optional_json(&profile.reminders)?,
                profile.strict_mode,
                profile.disable_background_stops,
                profile.created_at.to_rfc3339(),
                profile.updated_at.to_rfc3339(),
                profile.display_order,
                profile.gradient_id,
            ],
        )?;
        Ok(())
    }

    /// Fetch a profile by id.
    pub fn profile(&self, id: Uuid) -> Result<Option<Profile>, DatabaseError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1");
        let profile = self
            .conn()
            .query_row(&sql, params![id.to_string()], row_to_profile)
            .optional()?;
        Ok(profile)
    }

    /// Persist profile changes, bumping `updated_at`.
    pub fn update_profile(&self, profile: &mut Profile) -> Result<(), DatabaseError> {
        profile.updated_at = chrono::Utc::now();
        let changed = self.conn().execute(
            "UPDATE profiles SET name = ?2, blocked_apps = ?3, blocked_domains = ?4,
                strategy = ?5, apps_allow_mode = ?6, domains_allow_mode = ?7,
                block_all_browsers = ?8, unlock_tokens = ?9, strict_token_id = ?10,
                qr_code_id = ?11, strict_unlock_qr_code = ?12, emergency_enabled = ?13,
                emergency_max_attempts = ?14, emergency_cooldown_minutes = ?15,
                remote_lock_enabled = ?16, schedule = ?17, breaks_enabled = ?18,
                reminders = ?19, strict_mode = ?20, disable_background_stops = ?21,
                updated_at = ?22, display_order = ?23, gradient_id = ?24
             WHERE id = ?1",
            params![
                profile.id.to_string(),
                profile.name,
                to_json(&profile.blocked_apps)?,
                optional_json(&profile.blocked_domains)?,
                profile.strategy.as_str(),
                profile.apps_allow_mode,
                profile.domains_allow_mode,
                profile.block_all_browsers,
                optional_json(&profile.unlock_tokens)?,
                profile.strict_token_id,
                profile.qr_code_id,
                profile.strict_unlock_qr_code,
                profile.emergency.enabled,
                profile.emergency.max_attempts,
                profile.emergency.cooldown_minutes,
                profile.remote_lock_enabled,
                optional_json(&profile.schedule)?,
                profile.breaks_enabled,
                optional_json(&profile.reminders)?,
                profile.strict_mode,
                profile.disable_background_stops,
                profile.updated_at.to_rfc3339(),
                profile.display_order,
                profile.gradient_id,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::QueryFailed(format!(
                "profile {} does not exist",
                profile.id
            )));
        }
        Ok(())
    }

    /// Delete a profile; its sessions cascade away with it.
    pub fn delete_profile(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.conn()
            .execute("DELETE FROM profiles WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    /// All profiles, in display order.
    pub fn list_profiles(&self) -> Result<Vec<Profile>, DatabaseError> {
        let sql =
            format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY display_order, name");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], row_to_profile)?;
        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }

    /// Move a profile within the display ordering.
    pub fn set_display_order(&self, id: Uuid, order: i64) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE profiles SET display_order = ?2 WHERE id = ?1",
            params![id.to_string(), order],
        )?;
        Ok(())
    }

    /// Add (or replace by id) an unlock token on a profile.
    pub fn add_unlock_token(
        &self,
        profile_id: Uuid,
        token: UnlockToken,
    ) -> Result<(), DatabaseError> {
        let mut profile = self.profile(profile_id)?.ok_or_else(|| {
            DatabaseError::QueryFailed(format!("profile {profile_id} does not exist"))
        })?;
        profile.add_token(token);
        self.update_profile(&mut profile)
    }

    /// Remove an unlock token from a profile by token id.
    pub fn remove_unlock_token(
        &self,
        profile_id: Uuid,
        token_id: &str,
    ) -> Result<(), DatabaseError> {
        let mut profile = self.profile(profile_id)?.ok_or_else(|| {
            DatabaseError::QueryFailed(format!("profile {profile_id} does not exist"))
        })?;
        profile.remove_token(token_id);
        self.update_profile(&mut profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{EmergencySettings, ReminderSettings, TokenMode, WeeklySchedule};
    use chrono::NaiveTime;

    #[test]
    fn insert_and_fetch_round_trip() {
        let db = Database::open_memory().unwrap();

        let mut profile = Profile::new("Deep Work");
        profile.blocked_apps = vec!["com.example.social".into(), "com.example.video".into()];
        profile.blocked_domains = Some(vec!["news.example.com".into()]);
        profile.strategy = BlockingStrategy::NfcOrQr;
        profile.emergency = EmergencySettings {
            enabled: true,
            max_attempts: 2,
            cooldown_minutes: 30,
        };
        profile.schedule = Some(WeeklySchedule {
            days_of_week: vec![1, 2, 3],
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        });
        profile.reminders = Some(ReminderSettings {
            interval_secs: 300,
            message: Some("Stay focused".into()),
        });
        profile.add_token(UnlockToken::new("aa:bb:cc", TokenMode::Unlock));

        db.insert_profile(&profile).unwrap();
        let loaded = db.profile(profile.id).unwrap().unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn missing_profile_is_none() {
        let db = Database::open_memory().unwrap();
        assert!(db.profile(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn update_bumps_updated_at() {
        let db = Database::open_memory().unwrap();
        let mut profile = Profile::new("Work");
        db.insert_profile(&profile).unwrap();

        let before = profile.updated_at;
        profile.name = "Renamed".into();
        db.update_profile(&mut profile).unwrap();

        let loaded = db.profile(profile.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
        assert!(loaded.updated_at >= before);
    }

    #[test]
    fn token_helpers_keep_none_for_empty_list() {
        let db = Database::open_memory().unwrap();
        let profile = Profile::new("Work");
        db.insert_profile(&profile).unwrap();

        db.add_unlock_token(profile.id, UnlockToken::new("t1", TokenMode::Unlock))
            .unwrap();
        let loaded = db.profile(profile.id).unwrap().unwrap();
        assert_eq!(loaded.tokens().len(), 1);

        db.remove_unlock_token(profile.id, "t1").unwrap();
        let loaded = db.profile(profile.id).unwrap().unwrap();
        assert_eq!(loaded.unlock_tokens, None);
    }

    #[test]
    fn list_orders_by_display_order() {
        let db = Database::open_memory().unwrap();
        let mut a = Profile::new("A");
        a.display_order = 2;
        let mut b = Profile::new("B");
        b.display_order = 1;
        db.insert_profile(&a).unwrap();
        db.insert_profile(&b).unwrap();

        let names: Vec<String> = db
            .list_profiles()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn set_display_order_moves_profile_in_listing() {
        let db = Database::open_memory().unwrap();
        let mut a = Profile::new("A");
        a.display_order = 1;
        let mut b = Profile::new("B");
        b.display_order = 2;
        db.insert_profile(&a).unwrap();
        db.insert_profile(&b).unwrap();

        db.set_display_order(a.id, 5).unwrap();

        let profiles = db.list_profiles().unwrap();
        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(profiles[1].display_order, 5);
    }
}
