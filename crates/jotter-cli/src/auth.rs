//! Supabase session persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use jotter_core::auth::{
    AuthError, AuthResult, AuthSession, SessionPersistence, SupabaseAuthClient,
    SupabaseAuthProvider,
};

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "jotter-cli";

/// Keychain entry holding one profile's session
#[derive(Clone)]
pub struct KeychainSessionStore {
    username: String,
}

impl KeychainSessionStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            username: format!("supabase_session:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| AuthError::SessionStorage(error.to_string()))
    }
}

impl SessionPersistence for KeychainSessionStore {
    #[cfg(not(test))]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        match self.entry()?.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AuthError::SessionStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SessionStorage(error.to_string()))?;
        match guard.get(&self.username) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    #[cfg(not(test))]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&raw)
            .map_err(|error| AuthError::SessionStorage(error.to_string()))
    }

    #[cfg(test)]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        Self::test_store()
            .lock()
            .map_err(|error| AuthError::SessionStorage(error.to_string()))?
            .insert(self.username.clone(), raw);
        Ok(())
    }

    #[cfg(not(test))]
    fn clear_session(&self) -> AuthResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(AuthError::SessionStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear_session(&self) -> AuthResult<()> {
        Self::test_store()
            .lock()
            .map_err(|error| AuthError::SessionStorage(error.to_string()))?
            .remove(&self.username);
        Ok(())
    }
}

pub type CliAuthProvider = SupabaseAuthProvider<KeychainSessionStore>;

/// Build the profile's Supabase provider and restore its stored session.
pub async fn supabase_provider(
    profile_name: &str,
    url: &str,
    anon_key: &str,
) -> AuthResult<CliAuthProvider> {
    let client = SupabaseAuthClient::new(url, anon_key, KeychainSessionStore::new(profile_name))?;
    let provider = SupabaseAuthProvider::new(client);
    if let Err(error) = provider.restore().await {
        tracing::warn!("Could not restore session for profile '{profile_name}': {error}");
    }
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use jotter_core::auth::AuthUser;

    use super::*;

    #[test]
    fn session_store_is_scoped_per_profile() {
        let work = KeychainSessionStore::new("work-test");
        let home = KeychainSessionStore::new("home-test");
        let session = AuthSession {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: 1,
            user: AuthUser {
                id: "u1".to_string(),
                email: None,
                display_name: None,
            },
        };

        work.save_session(&session).unwrap();
        assert_eq!(work.load_session().unwrap(), Some(session));
        assert_eq!(home.load_session().unwrap(), None);

        work.clear_session().unwrap();
        assert_eq!(work.load_session().unwrap(), None);
    }
}
