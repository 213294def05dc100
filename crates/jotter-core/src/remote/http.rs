//! Hosted document API client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{RemoteStore, NOTES_COLLECTION};
use crate::auth::AuthProvider;
use crate::error::{RemoteError, RemoteResult};
use crate::models::{Note, NoteId, RemoteNote, RemoteNoteWrite};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection settings for [`HttpRemoteStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRemoteConfig {
    /// Base URL of the document API, e.g. `https://api.example.com`
    pub base_url: String,
    /// Project key sent as the `apikey` header
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl HttpRemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = normalize_text_option(Some(api_key.into()));
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Remote store speaking the JSON document API:
///
/// - `PUT    {base}/v1/collections/notes/documents/{id}`
/// - `DELETE {base}/v1/collections/notes/documents/{id}`
/// - `GET    {base}/v1/collections/notes/documents?userId={uid}`
#[derive(Clone)]
pub struct HttpRemoteStore {
    collection_url: String,
    api_key: Option<String>,
    client: Client,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl HttpRemoteStore {
    pub fn new(config: HttpRemoteConfig) -> RemoteResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            collection_url: format!("{base_url}/v1/collections/{NOTES_COLLECTION}/documents"),
            api_key: config.api_key,
            client: Client::builder().timeout(config.timeout).build()?,
            auth: None,
        })
    }

    /// Send the signed-in user's access token with every request
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    fn document_url(&self, id: NoteId) -> String {
        format!(
            "{}/{}",
            self.collection_url,
            urlencoding::encode(&id.remote_key())
        )
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(api_key) = &self.api_key {
            request = request.header("apikey", api_key);
        }
        if let Some(token) = self.auth.as_ref().and_then(|auth| auth.access_token()) {
            request = request.bearer_auth(token);
        }
        request.header(reqwest::header::ACCEPT, "application/json")
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upsert(&self, note: &Note) -> RemoteResult<()> {
        let id = note
            .id
            .ok_or_else(|| RemoteError::Payload("cannot mirror a note without an id".into()))?;
        let payload = RemoteNoteWrite::from_note(note)
            .ok_or_else(|| RemoteError::Payload("cannot mirror a note without an id".into()))?;

        let request = self.authorize(self.client.put(self.document_url(id)).json(&payload));
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }

        tracing::debug!("Note mirrored to remote: {id}");
        Ok(())
    }

    async fn delete(&self, id: NoteId) -> RemoteResult<()> {
        let request = self.authorize(self.client.delete(self.document_url(id)));
        let response = request.send().await?;
        let status = response.status();
        if !(status.is_success() || status == StatusCode::NOT_FOUND) {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }

        tracing::debug!("Note deleted from remote: {id}");
        Ok(())
    }

    async fn fetch_all_for_user(&self, user_id: &str) -> RemoteResult<Vec<RemoteNote>> {
        let request = self.authorize(
            self.client
                .get(&self.collection_url)
                .query(&[("userId", user_id)]),
        );
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }

        let body = response.text().await?;
        let listing = serde_json::from_str::<DocumentListing>(&body)
            .map_err(|error| RemoteError::Payload(format!("invalid document listing: {error}")))?;
        Ok(listing.documents)
    }
}

#[derive(Debug, Deserialize)]
struct DocumentListing {
    #[serde(default)]
    documents: Vec<RemoteNote>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
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

fn normalize_base_url(raw: &str) -> RemoteResult<String> {
    let base_url = normalize_text_option(Some(raw.to_string())).ok_or_else(|| {
        RemoteError::InvalidConfiguration("remote base URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::InvalidConfiguration(
            "remote base URL must include http:// or https://".to_string(),
        ))
    }
}
