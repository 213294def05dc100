//! Runtime configuration.
//!
//! One JSON document configures the remote mirror, the auth endpoints and
//! the sync/query tuning knobs. Every field is optional; environment
//! variables override the file for deployment-specific endpoints.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::QueryOptions;
use crate::remote::HttpRemoteConfig;
use crate::sync::{RetryPolicy, SyncOptions};
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_REMOTE_URL: &str = "JOTTER_REMOTE_URL";
pub const ENV_REMOTE_API_KEY: &str = "JOTTER_REMOTE_API_KEY";
pub const ENV_SUPABASE_URL: &str = "JOTTER_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "JOTTER_SUPABASE_ANON_KEY";

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JotterConfig {
    /// Base URL of the remote document API; absent means local-only
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub remote_api_key: Option<String>,
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub query: QuerySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub remote_timeout_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let options = SyncOptions::default();
        Self {
            remote_timeout_ms: duration_ms(options.remote_timeout),
            retry_max_attempts: options.retry.max_attempts,
            retry_initial_backoff_ms: duration_ms(options.retry.initial_backoff),
            retry_max_backoff_ms: duration_ms(options.retry.max_backoff),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySettings {
    pub debounce_ms: u64,
    pub idle_grace_ms: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        let options = QueryOptions::default();
        Self {
            debounce_ms: duration_ms(options.debounce),
            idle_grace_ms: duration_ms(options.idle_grace),
        }
    }
}

impl JotterConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_json(&raw),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(error.into()),
        }
    }

    /// Apply `JOTTER_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup; blank values are ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| normalize_text_option(lookup(key));
        if let Some(url) = lookup(ENV_REMOTE_URL) {
            self.remote_url = Some(url);
        }
        if let Some(key) = lookup(ENV_REMOTE_API_KEY) {
            self.remote_api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_SUPABASE_URL) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = lookup(ENV_SUPABASE_ANON_KEY) {
            self.supabase_anon_key = Some(key);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(url) = normalize_text_option(self.remote_url.as_deref()) {
            if !is_http_url(&url) {
                return Err(Error::Config(
                    "remote_url must include http:// or https://".to_string(),
                ));
            }
        }
        if self.sync.retry_max_attempts == 0 {
            return Err(Error::Config(
                "sync.retry_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.sync.remote_timeout_ms == 0 {
            return Err(Error::Config(
                "sync.remote_timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.supabase()?;
        Ok(())
    }

    /// HTTP remote settings, `None` for local-only mode
    pub fn remote(&self) -> Option<HttpRemoteConfig> {
        let url = normalize_text_option(self.remote_url.as_deref())?;
        let mut remote = HttpRemoteConfig::new(url)
            .with_timeout(Duration::from_millis(self.sync.remote_timeout_ms));
        if let Some(api_key) = normalize_text_option(self.remote_api_key.as_deref()) {
            remote = remote.with_api_key(api_key);
        }
        Some(remote)
    }

    /// Supabase `(url, anon_key)`; both or neither must be set.
    pub fn supabase(&self) -> Result<Option<(String, String)>> {
        let url = normalize_text_option(self.supabase_url.as_deref());
        let anon_key = normalize_text_option(self.supabase_anon_key.as_deref());
        match (url, anon_key) {
            (None, None) => Ok(None),
            (Some(url), Some(anon_key)) => Ok(Some((url, anon_key))),
            _ => Err(Error::Config(
                "supabase_url and supabase_anon_key must be set together".to_string(),
            )),
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            remote_timeout: Duration::from_millis(self.sync.remote_timeout_ms),
            retry: RetryPolicy {
                max_attempts: self.sync.retry_max_attempts.max(1),
                initial_backoff: Duration::from_millis(self.sync.retry_initial_backoff_ms),
                max_backoff: Duration::from_millis(self.sync.retry_max_backoff_ms),
            },
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            debounce: Duration::from_millis(self.query.debounce_ms),
            idle_grace: Duration::from_millis(self.query.idle_grace_ms),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
