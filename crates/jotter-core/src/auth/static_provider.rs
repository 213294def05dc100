//! Fixed identity for local-only use and tests.

use async_trait::async_trait;
use tokio::sync::watch;

use super::{validate_email, validate_sign_in, validate_sign_up, AuthOutcome, AuthProvider, AuthUser};

/// Provider that signs users in locally without talking to a server.
///
/// Sign-in derives the user id from the normalized email address, so the
/// same email always maps to the same local owner.
pub struct StaticAuthProvider {
    state: watch::Sender<Option<AuthUser>>,
    access_token: Option<String>,
}

impl StaticAuthProvider {
    /// Nobody signed in
    #[must_use]
    pub fn anonymous() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state,
            access_token: None,
        }
    }

    /// Start signed in as `user_id`
    #[must_use]
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(Some(AuthUser {
            id: user_id.into(),
            email: None,
            display_name: None,
        }));
        Self {
            state,
            access_token: None,
        }
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Replace the signed-in user directly
    pub fn set_user(&self, user: Option<AuthUser>) {
        self.state.send_replace(user);
    }
}

fn local_user(email: &str, display_name: Option<&str>) -> AuthUser {
    let email = email.trim().to_lowercase();
    AuthUser {
        id: email.clone(),
        email: Some(email),
        display_name: display_name.map(|name| name.trim().to_string()),
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    fn current_user_id(&self) -> Option<String> {
        self.state
            .borrow()
            .as_ref()
            .map(|user| user.id.clone())
            .filter(|id| !id.is_empty())
    }

    fn access_token(&self) -> Option<String> {
        if self.state.borrow().is_some() {
            self.access_token.clone()
        } else {
            None
        }
    }

    fn auth_state(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> AuthOutcome {
        if let Err(error) = validate_sign_up(email, password, display_name) {
            return error.into();
        }
        let user = local_user(email, Some(display_name));
        self.set_user(Some(user.clone()));
        AuthOutcome::Success(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthOutcome {
        if let Err(error) = validate_sign_in(email, password) {
            return error.into();
        }
        let user = local_user(email, None);
        self.set_user(Some(user.clone()));
        AuthOutcome::Success(user)
    }

    async fn sign_out(&self) -> AuthOutcome {
        self.set_user(None);
        AuthOutcome::Notice("Signed out".to_string())
    }

    async fn reset_password(&self, email: &str) -> AuthOutcome {
        if let Err(error) = validate_email(email) {
            return error.into();
        }
        AuthOutcome::Notice("Password reset is not available for local accounts".to_string())
    }
}
