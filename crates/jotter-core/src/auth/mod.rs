//! Identity collaborators.
//!
//! The sync coordinator and query bus only ever ask "who is signed in";
//! the rest of this module exists so front ends can drive sign-up, sign-in,
//! sign-out and password reset through one interface.

mod static_provider;
mod supabase;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::util::now_seconds;

pub use static_provider::StaticAuthProvider;
pub use supabase::{normalize_auth_url, SignUpOutcome, SupabaseAuthClient, SupabaseAuthProvider};

const EXPIRY_SKEW_SECONDS: i64 = 60;
const MIN_PASSWORD_LEN: usize = 6;

/// Signed-in identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as Unix seconds
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= now_seconds() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Result of a user-facing auth action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The action left this user signed in
    Success(AuthUser),
    /// The action completed without a session (signed out, email sent, confirmation pending)
    Notice(String),
    /// Human-readable failure, safe to show as-is
    Failure(String),
}

impl AuthOutcome {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Message to show the user
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Success(user) => {
                let label = user
                    .display_name
                    .as_deref()
                    .or(user.email.as_deref())
                    .unwrap_or(&user.id);
                format!("Signed in as {label}")
            }
            Self::Notice(message) | Self::Failure(message) => message.clone(),
        }
    }
}

impl From<AuthError> for AuthOutcome {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Validation(message) => Self::Failure(message),
            other => Self::Failure(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Auth is not configured for this build.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Session storage error: {0}")]
    SessionStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Identity source consumed by the sync coordinator, query bus and HTTP remote.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Id of the signed-in user, `None` when signed out
    fn current_user_id(&self) -> Option<String>;

    /// Bearer token for remote requests, when signed in
    fn access_token(&self) -> Option<String>;

    /// Watch the signed-in user
    fn auth_state(&self) -> watch::Receiver<Option<AuthUser>>;

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> AuthOutcome;

    async fn sign_in(&self, email: &str, password: &str) -> AuthOutcome;

    async fn sign_out(&self) -> AuthOutcome;

    async fn reset_password(&self, email: &str) -> AuthOutcome;
}

/// Where a provider keeps its session between runs
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Session kept only for the lifetime of the process
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    session: Arc<Mutex<Option<AuthSession>>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionPersistence for MemorySessionStore {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear_session(&self) -> AuthResult<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Check sign-in form input
pub fn validate_sign_in(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::Validation("Email is required".to_string()));
    }
    if password.trim().is_empty() {
        return Err(AuthError::Validation("Password is required".to_string()));
    }
    Ok(())
}

/// Check sign-up form input
pub fn validate_sign_up(email: &str, password: &str, display_name: &str) -> AuthResult<()> {
    if display_name.trim().is_empty() {
        return Err(AuthError::Validation("Display name is required".to_string()));
    }
    validate_sign_in(email, password)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::Validation("Email is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AuthSession {
        AuthSession {
            access_token: "secret-access-token".to_string(),
            refresh_token: "secret-refresh-token".to_string(),
            expires_at: 1_700_000_000,
            user: AuthUser {
                id: "user".to_string(),
                email: None,
                display_name: None,
            },
        }
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let rendered = format!("{:?}", session());
        assert!(!rendered.contains("secret-access-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn old_session_is_expired() {
        assert!(session().is_expired());
    }

    #[test]
    fn sign_up_validation_matches_form_rules() {
        assert!(validate_sign_up("a@b.c", "secret", "Ann").is_ok());
        let message = |result: AuthResult<()>| match result {
            Err(AuthError::Validation(message)) => message,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert_eq!(
            message(validate_sign_up("a@b.c", "secret", " ")),
            "Display name is required"
        );
        assert_eq!(message(validate_sign_up("", "secret", "Ann")), "Email is required");
        assert_eq!(
            message(validate_sign_up("a@b.c", "12345", "Ann")),
            "Password must be at least 6 characters"
        );
        assert_eq!(message(validate_sign_in("a@b.c", "  ")), "Password is required");
    }

    #[test]
    fn validation_errors_become_failures() {
        let outcome = AuthOutcome::from(AuthError::Validation("Email is required".into()));
        assert_eq!(outcome, AuthOutcome::Failure("Email is required".into()));
        assert!(outcome.is_failure());
    }

    #[test]
    fn memory_session_store_roundtrip() {
        let store = MemorySessionStore::new();
        assert!(store.load_session().unwrap().is_none());
        store.save_session(&session()).unwrap();
        assert_eq!(store.load_session().unwrap(), Some(session()));
        store.clear_session().unwrap();
        assert!(store.load_session().unwrap().is_none());
    }
}
