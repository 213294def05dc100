//! Supabase email/password auth.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::watch;

use super::{
    validate_email, validate_sign_in, validate_sign_up, AuthError, AuthOutcome, AuthProvider,
    AuthResult, AuthSession, AuthUser, SessionPersistence,
};
use crate::util::{compact_text, is_http_url, normalize_text_option, now_seconds};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    ConfirmationRequired,
}

/// REST client for the Supabase auth endpoints
#[derive(Clone)]
pub struct SupabaseAuthClient<S: SessionPersistence> {
    auth_url: String,
    anon_key: String,
    client: Client,
    store: S,
}

impl<S: SessionPersistence> SupabaseAuthClient<S> {
    pub fn new(url: impl AsRef<str>, anon_key: impl AsRef<str>, store: S) -> AuthResult<Self> {
        let auth_url = normalize_auth_url(url.as_ref())?;
        let anon_key = normalize_text_option(Some(anon_key.as_ref())).ok_or(
            AuthError::InvalidConfiguration("Supabase anon key must not be empty"),
        )?;

        Ok(Self {
            auth_url,
            anon_key,
            client: Client::builder().build()?,
            store,
        })
    }

    /// Load the persisted session, refreshing it when expired.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored_session) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored_session.is_expired() {
            return Ok(Some(stored_session));
        }

        match self.refresh_session(&stored_session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {error}");
                self.store.clear_session()?;
                Ok(None)
            }
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AuthResult<SignUpOutcome> {
        validate_sign_up(email, password, display_name)?;

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
            "data": { "display_name": display_name.trim() },
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/signup", self.auth_url))
                .json(&payload),
        );
        let response = self.send_auth_request(request).await?;
        match response.into_session()? {
            Some(session) => {
                self.store.save_session(&session)?;
                Ok(SignUpOutcome::SignedIn(session))
            }
            None => Ok(SignUpOutcome::ConfirmationRequired),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        validate_sign_in(email, password)?;

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "password")])
                .json(&payload),
        );

        let response = self.send_auth_request(request).await?;
        let session = response.into_session()?.ok_or_else(|| {
            AuthError::Api("Sign-in response did not include an active session".to_string())
        })?;

        self.store.save_session(&session)?;
        Ok(session)
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let payload = serde_json::json!({ "refresh_token": refresh_token });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "refresh_token")])
                .json(&payload),
        );
        let response = self.send_auth_request(request).await?;
        let session = response.into_session()?.ok_or_else(|| {
            AuthError::Api("Refresh response did not include an active session".to_string())
        })?;

        self.store.save_session(&session)?;
        Ok(session)
    }

    /// Revoke the session server-side and forget it locally.
    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let request = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);

        let response = request.send().await?;
        if !(response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED) {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }

        self.store.clear_session()?;
        Ok(())
    }

    /// Ask the server to email a password reset link.
    pub async fn recover(&self, email: &str) -> AuthResult<()> {
        validate_email(email)?;

        let payload = serde_json::json!({ "email": email.trim() });
        let request = self.public_request(
            self.client
                .post(format!("{}/recover", self.auth_url))
                .json(&payload),
        );
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(())
    }

    pub fn clear_local_session(&self) -> AuthResult<()> {
        self.store.clear_session()
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    async fn send_auth_request(&self, request: RequestBuilder) -> AuthResult<SupabaseAuthResponse> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<SupabaseAuthResponse>().await?)
    }
}

/// [`AuthProvider`] backed by [`SupabaseAuthClient`].
///
/// Call [`SupabaseAuthProvider::restore`] once at startup to pick up a
/// persisted session.
pub struct SupabaseAuthProvider<S: SessionPersistence> {
    client: SupabaseAuthClient<S>,
    session: Mutex<Option<AuthSession>>,
    state: watch::Sender<Option<AuthUser>>,
}

impl<S: SessionPersistence> SupabaseAuthProvider<S> {
    #[must_use]
    pub fn new(client: SupabaseAuthClient<S>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            client,
            session: Mutex::new(None),
            state,
        }
    }

    /// Restore (and refresh if needed) the persisted session.
    pub async fn restore(&self) -> AuthResult<Option<AuthUser>> {
        let session = self.client.restore_session().await?;
        let user = session.as_ref().map(|session| session.user.clone());
        self.set_session(session);
        Ok(user)
    }

    /// Expiry of the active session (Unix seconds)
    pub fn session_expires_at(&self) -> Option<i64> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.expires_at)
    }

    fn set_session(&self, session: Option<AuthSession>) {
        let user = session.as_ref().map(|session| session.user.clone());
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
        self.state.send_replace(user);
    }

    fn current_access_token(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.access_token.clone())
    }
}

#[async_trait]
impl<S: SessionPersistence> AuthProvider for SupabaseAuthProvider<S> {
    fn current_user_id(&self) -> Option<String> {
        self.state.borrow().as_ref().map(|user| user.id.clone())
    }

    fn access_token(&self) -> Option<String> {
        self.current_access_token()
    }

    fn auth_state(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> AuthOutcome {
        match self.client.sign_up(email, password, display_name).await {
            Ok(SignUpOutcome::SignedIn(session)) => {
                let user = session.user.clone();
                self.set_session(Some(session));
                AuthOutcome::Success(user)
            }
            Ok(SignUpOutcome::ConfirmationRequired) => AuthOutcome::Notice(
                "Account created. Confirm your email address, then sign in.".to_string(),
            ),
            Err(error) => error.into(),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthOutcome {
        match self.client.sign_in(email, password).await {
            Ok(session) => {
                let user = session.user.clone();
                self.set_session(Some(session));
                AuthOutcome::Success(user)
            }
            Err(error) => error.into(),
        }
    }

    async fn sign_out(&self) -> AuthOutcome {
        let result = match self.current_access_token() {
            Some(token) => self.client.sign_out(&token).await,
            None => self.client.clear_local_session(),
        };
        match result {
            Ok(()) => {
                self.set_session(None);
                AuthOutcome::Notice("Signed out".to_string())
            }
            Err(error) => error.into(),
        }
    }

    async fn reset_password(&self, email: &str) -> AuthOutcome {
        match self.client.recover(email).await {
            Ok(()) => AuthOutcome::Notice(format!("Password reset email sent to {}", email.trim())),
            Err(error) => error.into(),
        }
    }
}

pub fn normalize_auth_url(url: &str) -> AuthResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must not be empty",
        ));
    }
    if !is_http_url(trimmed) {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must include http:// or https://",
        ));
    }
    if trimmed.ends_with("/auth/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/auth/v1"))
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseAuthResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<SupabaseUser>,
    session: Option<SupabaseAuthResponseSession>,
}

impl SupabaseAuthResponse {
    fn into_session(self) -> AuthResult<Option<AuthSession>> {
        let nested = self.session;
        let access_token = self
            .access_token
            .or_else(|| nested.as_ref().and_then(|session| session.access_token.clone()));
        let refresh_token = self
            .refresh_token
            .or_else(|| nested.as_ref().and_then(|session| session.refresh_token.clone()));
        let expires_at = self
            .expires_at
            .or_else(|| nested.as_ref().and_then(|session| session.expires_at))
            .or_else(|| {
                self.expires_in
                    .or_else(|| nested.as_ref().and_then(|session| session.expires_in))
                    .map(|expires_in| now_seconds().saturating_add(expires_in))
            });
        let user = self
            .user
            .or_else(|| nested.and_then(|session| session.user))
            .map(Into::into);

        match (access_token, refresh_token, expires_at, user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                Ok(Some(AuthSession {
                    access_token,
                    refresh_token,
                    expires_at,
                    user,
                }))
            }
            (None, None, None, Some(_)) => Ok(None),
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseAuthResponseSession {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<SupabaseUser>,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<SupabaseUserMetadata>,
}

#[derive(Debug, Deserialize)]
struct SupabaseUserMetadata {
    display_name: Option<String>,
}

impl From<SupabaseUser> for AuthUser {
    fn from(value: SupabaseUser) -> Self {
        Self {
            id: value.id,
            email: value.email,
            display_name: value
                .user_metadata
                .and_then(|metadata| normalize_text_option(metadata.display_name)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<SupabaseErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
