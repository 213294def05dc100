//! In-process remote document store

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use super::RemoteStore;
use crate::error::{RemoteError, RemoteResult};
use crate::models::{Note, NoteId, RemoteNote, RemoteNoteWrite};

/// Remote store kept in memory, stamping documents with its own clock.
///
/// Behaves like the hosted collection (server timestamps, idempotent
/// deletes) and is used for offline demos and tests.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    documents: Mutex<BTreeMap<String, RemoteNote>>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw document as-is, bypassing server stamping.
    pub fn seed(&self, document_id: impl Into<String>, document: RemoteNote) {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document_id.into(), document);
    }

    /// Current document for `document_id`
    pub fn document(&self, document_id: &str) -> Option<RemoteNote> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document_id)
            .cloned()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert(&self, note: &Note) -> RemoteResult<()> {
        let write = RemoteNoteWrite::from_note(note)
            .ok_or_else(|| RemoteError::Payload("cannot mirror a note without an id".into()))?;
        let now = Utc::now();

        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        let created_at = documents
            .get(&write.id)
            .and_then(|existing| existing.created_at)
            .unwrap_or(now);

        documents.insert(
            write.id.clone(),
            RemoteNote {
                id: Some(write.id),
                title: Some(write.title),
                content: Some(write.content),
                user_id: Some(write.user_id),
                created_at: Some(created_at),
                updated_at: Some(now),
                color: Some(write.color),
            },
        );
        Ok(())
    }

    async fn delete(&self, id: NoteId) -> RemoteResult<()> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id.remote_key());
        Ok(())
    }

    async fn fetch_all_for_user(&self, user_id: &str) -> RemoteResult<Vec<RemoteNote>> {
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(documents
            .values()
            .filter(|document| document.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }
}
