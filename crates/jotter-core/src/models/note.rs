//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Locally assigned note identifier.
///
/// The remote document key is the decimal string form of this id
/// (see [`NoteId::remote_key`]). Two devices assigning ids independently
/// can therefore produce the same remote key for different notes; a
/// globally unique key (or a local-to-remote id mapping) is required before
/// notes from several local stores can share one remote collection safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(i64);

impl NoteId {
    /// Wrap a raw row id
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw integer value as stored in the local table
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Document id used by the remote collection
    #[must_use]
    pub fn remote_key(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<i64> for NoteId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// A note in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Local identifier; `None` until the note has been persisted
    pub id: Option<NoteId>,
    pub title: String,
    pub content: String,
    /// Owning user; empty means not yet attributed to a signed-in identity
    pub user_id: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Color tag, 0 means default
    pub color: i32,
}

impl Note {
    /// Create an unsaved note stamped with the current time
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            user_id: String::new(),
            created_at: now,
            updated_at: now,
            color: 0,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    #[must_use]
    pub const fn with_color(mut self, color: i32) -> Self {
        self.color = color;
        self
    }

    #[must_use]
    pub const fn with_id(mut self, id: NoteId) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether the note has been assigned a local id
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Title and content are both blank (whitespace-only counts as blank)
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.content.trim().is_empty()
    }

    /// Title, or the first line of the content when the title is blank
    #[must_use]
    pub fn display_title(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.content.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.trim().chars().take(max_len).collect()
    }
}
