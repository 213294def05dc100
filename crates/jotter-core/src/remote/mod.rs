//! Remote document store for note mirroring.
//!
//! The remote collection is a best-effort mirror keyed by the string form of
//! the local note id. It is eventually consistent and every operation may
//! fail; callers outside the sync coordinator should never need to handle
//! these failures.

mod http;
mod memory;

use async_trait::async_trait;

use crate::error::RemoteResult;
use crate::models::{Note, NoteId, RemoteNote};

pub use http::{HttpRemoteConfig, HttpRemoteStore};
pub use memory::MemoryRemoteStore;

/// Name of the remote collection holding note documents
pub const NOTES_COLLECTION: &str = "notes";

/// Remote document store operations
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create or replace the document for a persisted note.
    ///
    /// The server stamps `updatedAt` on every write and `createdAt` on the
    /// first one.
    async fn upsert(&self, note: &Note) -> RemoteResult<()>;

    /// Remove the document for `id`; removing a missing document succeeds.
    async fn delete(&self, id: NoteId) -> RemoteResult<()>;

    /// One-shot read of every document owned by `user_id`.
    async fn fetch_all_for_user(&self, user_id: &str) -> RemoteResult<Vec<RemoteNote>>;
}
