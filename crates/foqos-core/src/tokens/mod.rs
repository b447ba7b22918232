//! Unlock token validation and dispatch.
//!
//! Translates an opaque scanned identifier (NFC tag UID or QR payload) into
//! a session-lifecycle action using the active session's profile
//! configuration. Each handled scan emits exactly one [`ActionResult`] on the
//! broadcast channel; never zero, never more.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::error::{CoreError, SessionError};
use crate::events::EndReason;
use crate::lifecycle::SessionLifecycle;
use crate::profile::{Profile, TokenMode};
use crate::storage::Database;

const RESULT_CHANNEL_CAPACITY: usize = 16;

/// QR payload prefixes that carry a profile identifier.
const QR_URL_PREFIX: &str = "https://foqos.app/profile/";
const QR_SCHEME_PREFIX: &str = "foqos://profile/";

/// Outcome of one handled scan, surfaced to the UI as a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum ActionResult {
    Success(String),
    Error(String),
}

impl ActionResult {
    pub fn message(&self) -> &str {
        match self {
            ActionResult::Success(m) | ActionResult::Error(m) => m,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success(_))
    }
}

/// Maps scanned tokens to lifecycle operations.
pub struct TokenValidator {
    lifecycle: Arc<SessionLifecycle>,
    db: Arc<Mutex<Database>>,
    results: broadcast::Sender<ActionResult>,
}

impl TokenValidator {
    pub fn new(lifecycle: Arc<SessionLifecycle>, db: Arc<Mutex<Database>>) -> Self {
        let (results, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        Self {
            lifecycle,
            db,
            results,
        }
    }

    /// Subscribe to scan results.
    pub fn subscribe(&self) -> broadcast::Receiver<ActionResult> {
        self.results.subscribe()
    }

    /// Handle a scanned NFC token id. Emits exactly one result.
    pub async fn handle_token(&self, token_id: &str) -> ActionResult {
        let result = match self.dispatch_token(token_id).await {
            Ok(message) => ActionResult::Success(message),
            Err(err) => ActionResult::Error(err.to_string()),
        };
        let _ = self.results.send(result.clone());
        result
    }

    /// Handle a scanned QR payload. Emits exactly one result.
    ///
    /// The payload must carry a profile identifier
    /// (`foqos://profile/{id}` or `https://foqos.app/profile/{id}`) matching
    /// the active session's configured QR id or strict QR id; once either is
    /// configured the session's own profile id is also accepted. A match
    /// performs an unconditional stop. Profiles without any QR identifier
    /// reject every payload.
    pub async fn handle_qr(&self, payload: &str) -> ActionResult {
        let result = match self.dispatch_qr(payload).await {
            Ok(message) => ActionResult::Success(message),
            Err(err) => ActionResult::Error(err.to_string()),
        };
        let _ = self.results.send(result.clone());
        result
    }

    async fn dispatch_token(&self, token_id: &str) -> Result<String, CoreError> {
        // Look up under the store lock, then release before re-entering the
        // lifecycle; its operations re-validate state under their own guard.
        let (session_id, remote_locked, mode) = {
            let db = self.db.lock().await;
            let session = db
                .active_session()?
                .ok_or(SessionError::NoActiveSession)?;
            let profile = db
                .profile(session.profile_id)?
                .ok_or(SessionError::ProfileNotFound)?;
            let mode = resolve_token_mode(&profile, token_id)?;
            (session.id, session.is_remote_locked(), mode)
        };

        match mode {
            TokenMode::Unlock => {
                self.lifecycle
                    .stop_via_token(session_id, EndReason::Token)
                    .await?;
                Ok("Session ended".to_string())
            }
            TokenMode::Pause => {
                self.lifecycle.pause(session_id).await?;
                Ok("Session paused".to_string())
            }
            TokenMode::Resume => {
                self.lifecycle.resume(session_id).await?;
                Ok("Session resumed".to_string())
            }
            TokenMode::Emergency => self.emergency_unlock(session_id).await,
            TokenMode::RemoteLockToggle => {
                // A token can only release a remote lock; activation stays a
                // UI-side operation.
                if !remote_locked {
                    return Err(SessionError::RemoteLockNotActive.into());
                }
                self.lifecycle.deactivate_remote_lock(session_id).await?;
                Ok("Remote lock deactivated".to_string())
            }
            TokenMode::Custom => Err(SessionError::NotImplemented.into()),
        }
    }

    async fn emergency_unlock(&self, session_id: Uuid) -> Result<String, CoreError> {
        let unlock = self.lifecycle.use_emergency_unlock(session_id).await?;
        if unlock.attempts_remaining > 0 {
            Ok(format!(
                "Emergency unlock used. {} attempts remaining",
                unlock.attempts_remaining
            ))
        } else {
            Ok("Last emergency attempt used. Cooldown activated".to_string())
        }
    }

    async fn dispatch_qr(&self, payload: &str) -> Result<String, CoreError> {
        // Malformed payloads are rejected before any session state is read.
        let scanned_id = extract_profile_id(payload).ok_or(SessionError::InvalidCode)?;

        let session_id = {
            let db = self.db.lock().await;
            let session = db
                .active_session()?
                .ok_or(SessionError::NoActiveSession)?;
            let profile = db
                .profile(session.profile_id)?
                .ok_or(SessionError::ProfileNotFound)?;

            // A profile with no QR identifier configured cannot be unlocked
            // by QR at all; the profile-id fallback only applies once one is.
            let has_qr_configured =
                profile.qr_code_id.is_some() || profile.strict_unlock_qr_code.is_some();
            let matches = profile.qr_code_id.as_deref() == Some(scanned_id)
                || profile.strict_unlock_qr_code.as_deref() == Some(scanned_id)
                || (has_qr_configured && session.profile_id.to_string() == scanned_id);
            if !matches {
                return Err(SessionError::InvalidCode.into());
            }
            session.id
        };

        self.lifecycle
            .stop_via_token(session_id, EndReason::Qr)
            .await?;
        Ok("Session ended".to_string())
    }
}

/// Resolve the action mode for a scanned token against a profile.
///
/// A configured strict token id always unlocks, and while one is set it is
/// the only id accepted for unlock-mode tokens.
fn resolve_token_mode(profile: &Profile, token_id: &str) -> Result<TokenMode, SessionError> {
    if let Some(strict) = profile.strict_token_id.as_deref() {
        if strict == token_id {
            return Ok(TokenMode::Unlock);
        }
    }
    let token = profile
        .find_token(token_id)
        .ok_or(SessionError::UnknownToken)?;
    if token.mode == TokenMode::Unlock && profile.strict_token_id.is_some() {
        // Strict profiles accept only the designated unlock token.
        return Err(SessionError::UnknownToken);
    }
    Ok(token.mode)
}

/// Extract the profile identifier from a QR payload.
fn extract_profile_id(payload: &str) -> Option<&str> {
    payload
        .strip_prefix(QR_URL_PREFIX)
        .or_else(|| payload.strip_prefix(QR_SCHEME_PREFIX))
        .filter(|id| !id.is_empty())
}
