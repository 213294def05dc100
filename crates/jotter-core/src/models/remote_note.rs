//! Remote projection of a note

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::note::{Note, NoteId};
use crate::error::ParseFault;

/// A note document as stored in the remote `notes` collection.
///
/// Remote documents are not schema-enforced, so every field is optional on
/// the read side. Timestamps are assigned by the remote server's clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteNote {
    pub id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub user_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub color: Option<i64>,
}

/// Fields written by the client when mirroring a note.
///
/// Timestamps are deliberately absent: the server stamps them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNoteWrite {
    pub id: String,
    pub title: String,
    pub content: String,
    pub user_id: String,
    pub color: i64,
}

impl RemoteNoteWrite {
    /// Build the write payload for a persisted note.
    ///
    /// Returns `None` for a note without a local id.
    #[must_use]
    pub fn from_note(note: &Note) -> Option<Self> {
        let id = note.id?;
        Some(Self {
            id: id.remote_key(),
            title: note.title.clone(),
            content: note.content.clone(),
            user_id: note.user_id.clone(),
            color: i64::from(note.color),
        })
    }
}

impl RemoteNote {
    /// Convert into a local record.
    ///
    /// Missing text fields default to empty and missing timestamps to
    /// `fallback_ms`; an unusable id or color is a [`ParseFault`].
    pub fn into_local(self, fallback_ms: i64) -> Result<Note, ParseFault> {
        let raw_id = self.id.ok_or(ParseFault::MissingId)?;
        let id = raw_id
            .trim()
            .parse::<NoteId>()
            .ok()
            .filter(|id| id.get() > 0)
            .ok_or_else(|| ParseFault::InvalidId(raw_id.clone()))?;

        let color = match self.color {
            Some(color) => i32::try_from(color).map_err(|_| ParseFault::ColorOutOfRange(color))?,
            None => 0,
        };

        let created_at = self
            .created_at
            .map_or(fallback_ms, |stamp| stamp.timestamp_millis());
        let updated_at = self
            .updated_at
            .map_or(fallback_ms, |stamp| stamp.timestamp_millis());

        Ok(Note {
            id: Some(id),
            title: self.title.unwrap_or_default(),
            content: self.content.unwrap_or_default(),
            user_id: self.user_id.unwrap_or_default(),
            created_at,
            updated_at: updated_at.max(created_at),
            color,
        })
    }
}
