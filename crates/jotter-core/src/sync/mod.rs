//! Sync coordinator.
//!
//! Local writes are authoritative and awaited; the remote copy is a
//! best-effort mirror updated in the background. A remote failure never
//! fails, delays or rolls back a local write. Reconciliation pulls the
//! remote collection for one user and overwrites matching local records
//! (remote wins per record, no timestamp comparison).

mod mirror;
mod options;

use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::AuthProvider;
use crate::error::{ParseFault, Result};
use crate::models::{Note, NoteId};
use crate::remote::RemoteStore;
use crate::store::LocalStore;
use crate::util::now_millis;

use mirror::{Mirror, MirrorOp};

pub use mirror::SyncStatus;
pub use options::{RetryPolicy, SyncOptions};

/// Remote document that could not be merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    pub document_id: String,
    pub reason: ParseFault,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub user_id: String,
    /// Documents returned by the remote
    pub fetched: usize,
    /// Documents written into the local store
    pub merged: usize,
    pub skipped: Vec<SkippedDocument>,
    /// Local notes overwritten by a document owned by a different user.
    ///
    /// Two devices that assigned the same local id to different notes end
    /// up here; the remote copy wins.
    pub collisions: Vec<NoteId>,
    /// Set when the remote could not be read; nothing was merged
    pub remote_error: Option<String>,
}

impl ReconcileReport {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Self::default()
        }
    }
}

/// Coordinates the local store and the remote mirror.
#[derive(Clone)]
pub struct SyncCoordinator {
    local: LocalStore,
    auth: Arc<dyn AuthProvider>,
    mirror: Arc<Mirror>,
}

impl SyncCoordinator {
    /// Build a coordinator; `remote = None` runs in local-only mode.
    pub fn new(
        local: LocalStore,
        remote: Option<Arc<dyn RemoteStore>>,
        auth: Arc<dyn AuthProvider>,
        options: SyncOptions,
    ) -> Self {
        Self {
            local,
            auth,
            mirror: Arc::new(Mirror::new(remote, options)),
        }
    }

    pub const fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn is_local_only(&self) -> bool {
        self.mirror.remote().is_none()
    }

    /// Save a note and schedule its remote mirror.
    ///
    /// A note whose title and content are both blank is not saved and
    /// yields `None`. Otherwise the note is attributed to the signed-in
    /// user when it has no owner, timestamped, and written locally; the
    /// returned id is final even if mirroring later fails.
    pub async fn create_or_update(&self, mut note: Note) -> Result<Option<NoteId>> {
        if note.is_blank() {
            tracing::debug!("Skipping save of blank note {:?}", note.id);
            return Ok(None);
        }

        if note.user_id.trim().is_empty() {
            if let Some(user_id) = self.auth.current_user_id() {
                note.user_id = user_id;
            }
        }
        let now = now_millis();
        if !note.is_persisted() {
            note.created_at = now;
        }
        note.updated_at = now.max(note.updated_at);

        let id = self.local.insert(&note).await?;
        self.mirror.enqueue(id, MirrorOp::Upsert(note.with_id(id)));
        Ok(Some(id))
    }

    /// Delete a note locally and schedule the remote delete.
    pub async fn delete(&self, note: &Note) -> Result<bool> {
        match note.id {
            Some(id) => self.delete_by_id(id).await,
            None => Ok(false),
        }
    }

    pub async fn delete_by_id(&self, id: NoteId) -> Result<bool> {
        let removed = self.local.delete_by_id(id).await?;
        self.mirror.enqueue(id, MirrorOp::Delete(id));
        Ok(removed)
    }

    /// Drop every local note (logout / account switch); the remote is untouched.
    pub async fn clear_local(&self) -> Result<u64> {
        self.local.delete_all().await
    }

    /// Pull every remote document of `user_id` into the local store.
    ///
    /// Remote failures are reported in [`ReconcileReport::remote_error`];
    /// only local storage faults are returned as errors.
    pub async fn reconcile(&self, user_id: &str) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new(user_id);
        let Some(remote) = self.mirror.remote() else {
            report.remote_error = Some("no remote store configured".to_string());
            return Ok(report);
        };

        let fetched = self
            .mirror
            .options()
            .run("fetch", || remote.fetch_all_for_user(user_id))
            .await;
        let documents = match fetched {
            Ok(documents) => documents,
            Err(error) => {
                tracing::warn!("Reconcile for {user_id} could not read the remote: {error}");
                report.remote_error = Some(error.to_string());
                return Ok(report);
            }
        };

        report.fetched = documents.len();
        let now = now_millis();
        for (index, document) in documents.into_iter().enumerate() {
            let document_id = document
                .id
                .clone()
                .unwrap_or_else(|| format!("<document {index}>"));
            let note = match document.into_local(now) {
                Ok(note) => note,
                Err(reason) => {
                    tracing::warn!("Skipping remote document {document_id}: {reason}");
                    report.skipped.push(SkippedDocument {
                        document_id,
                        reason,
                    });
                    continue;
                }
            };

            if let Some(id) = note.id {
                if let Some(existing) = self.local.find(id).await? {
                    if !existing.user_id.is_empty() && existing.user_id != note.user_id {
                        tracing::warn!(
                            "Note {id} is owned by {} locally but by {} remotely; remote copy wins",
                            existing.user_id,
                            note.user_id
                        );
                        report.collisions.push(id);
                    }
                }
            }

            self.local.insert(&note).await?;
            report.merged += 1;
        }

        self.local.mark_reconciled(user_id, now).await?;
        tracing::info!(
            "Reconciled {user_id}: fetched {}, merged {}, skipped {}",
            report.fetched,
            report.merged,
            report.skipped.len()
        );
        Ok(report)
    }

    /// When `user_id` was last reconciled successfully (Unix ms)
    pub async fn last_reconciled_at(&self, user_id: &str) -> Result<Option<i64>> {
        self.local.last_reconciled_at(user_id).await
    }

    /// Wait for every queued mirror operation to finish
    pub async fn flush(&self) {
        self.mirror.flush().await;
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.mirror.status()
    }

    /// Notes whose mirror operations have not finished yet
    pub fn pending_notes(&self) -> Vec<NoteId> {
        self.mirror.pending_notes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthProvider;
    use crate::error::{RemoteError, RemoteResult};
    use crate::models::RemoteNote;
    use crate::remote::MemoryRemoteStore;
    use crate::state::SyncState;
    use crate::store::NoteQuery;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Remote that rejects every call
    #[derive(Default)]
    struct FailingRemote {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteStore for FailingRemote {
        async fn upsert(&self, _note: &Note) -> RemoteResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Api("remote unavailable (503)".into()))
        }

        async fn delete(&self, _id: NoteId) -> RemoteResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Api("remote unavailable (503)".into()))
        }

        async fn fetch_all_for_user(&self, _user_id: &str) -> RemoteResult<Vec<RemoteNote>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Api("remote unavailable (503)".into()))
        }
    }

    /// Remote that logs every call; upserts are slow
    #[derive(Default)]
    struct RecordingRemote {
        inner: MemoryRemoteStore,
        log: Mutex<Vec<String>>,
    }

    impl RecordingRemote {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteStore for RecordingRemote {
        async fn upsert(&self, note: &Note) -> RemoteResult<()> {
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.inner.upsert(note).await?;
            self.log
                .lock()
                .unwrap()
                .push(format!("upsert:{}:{}", note.id.unwrap(), note.title));
            Ok(())
        }

        async fn delete(&self, id: NoteId) -> RemoteResult<()> {
            self.inner.delete(id).await?;
            self.log.lock().unwrap().push(format!("delete:{id}"));
            Ok(())
        }

        async fn fetch_all_for_user(&self, user_id: &str) -> RemoteResult<Vec<RemoteNote>> {
            self.inner.fetch_all_for_user(user_id).await
        }
    }

    async fn coordinator(remote: Option<Arc<dyn RemoteStore>>) -> SyncCoordinator {
        let local = LocalStore::open_in_memory().await.unwrap();
        SyncCoordinator::new(
            local,
            remote,
            Arc::new(StaticAuthProvider::signed_in("u1")),
            SyncOptions::default(),
        )
    }

    fn document(id: &str, title: &str, user_id: &str) -> RemoteNote {
        let stamp = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        RemoteNote {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
            content: Some(String::new()),
            user_id: Some(user_id.to_string()),
            created_at: Some(stamp),
            updated_at: Some(stamp),
            color: Some(0),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blank_note_is_not_saved() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let sync = coordinator(Some(remote.clone())).await;

        let id = sync.create_or_update(Note::new("  ", "\n")).await.unwrap();
        sync.flush().await;

        assert_eq!(id, None);
        assert!(sync.local().snapshot(&NoteQuery::All).await.unwrap().is_empty());
        assert!(remote.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_stamps_owner_and_mirrors() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let sync = coordinator(Some(remote.clone())).await;

        let id = sync
            .create_or_update(Note::new("Groceries", "milk"))
            .await
            .unwrap()
            .unwrap();
        sync.flush().await;

        let saved = sync.local().find(id).await.unwrap().unwrap();
        assert_eq!(saved.user_id, "u1");
        assert!(saved.updated_at >= saved.created_at);

        let mirrored = remote.document(&id.remote_key()).unwrap();
        assert_eq!(mirrored.title.as_deref(), Some("Groceries"));
        assert_eq!(mirrored.user_id.as_deref(), Some("u1"));

        let status = sync.status().borrow().clone();
        assert_eq!(status.state, SyncState::Synced);
        assert_eq!(status.completed, 1);
        assert_eq!(status.pending, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_never_moves_updated_at_backwards() {
        let sync = coordinator(None).await;
        let future = now_millis() + 60_000;
        let mut note = Note::new("t", "c");
        note.updated_at = future;

        let id = sync.create_or_update(note).await.unwrap().unwrap();
        let saved = sync.local().find(id).await.unwrap().unwrap();
        assert_eq!(saved.updated_at, future);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn edit_keeps_original_creation_time() {
        let sync = coordinator(None).await;
        let mut note = Note::new("t", "c");
        note.created_at = 1_000;

        let id = sync.create_or_update(note).await.unwrap().unwrap();
        let mut saved = sync.local().find(id).await.unwrap().unwrap();
        let created_at = saved.created_at;
        assert!(created_at > 1_000);

        saved.content = "edited".to_string();
        sync.create_or_update(saved).await.unwrap();
        let edited = sync.local().find(id).await.unwrap().unwrap();
        assert_eq!(edited.created_at, created_at);
        assert!(edited.updated_at >= created_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_failure_does_not_affect_local_write() {
        let remote = Arc::new(FailingRemote::default());
        let sync = coordinator(Some(remote.clone())).await;

        let id = sync
            .create_or_update(Note::new("Offline", "still saved"))
            .await
            .unwrap()
            .expect("note should be saved");
        let live = sync.local().get_by_id(id).await.unwrap();
        assert_eq!(live.current().unwrap().title, "Offline");

        sync.flush().await;
        let status = sync.status().borrow().clone();
        assert_eq!(status.state, SyncState::Error);
        assert_eq!(status.failed, 1);
        assert!(status.last_error.unwrap().contains("remote unavailable"));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert!(sync.local().find(id).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mirror_preserves_per_note_order() {
        let remote = Arc::new(RecordingRemote::default());
        let sync = coordinator(Some(remote.clone())).await;

        let id = sync
            .create_or_update(Note::new("v1", ""))
            .await
            .unwrap()
            .unwrap();
        let mut edited = sync.local().find(id).await.unwrap().unwrap();
        edited.title = "v2".to_string();
        sync.create_or_update(edited).await.unwrap();
        sync.delete_by_id(id).await.unwrap();

        assert_eq!(sync.pending_notes(), vec![id]);
        sync.flush().await;

        assert_eq!(
            remote.log(),
            vec![
                format!("upsert:{id}:v1"),
                format!("upsert:{id}:v2"),
                format!("delete:{id}"),
            ]
        );
        assert!(remote.inner.is_empty());
        assert!(sync.pending_notes().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_leaves_no_pending_lanes() {
        let remote = Arc::new(RecordingRemote::default());
        let sync = coordinator(Some(remote)).await;

        for round in 0..20 {
            let id = sync
                .create_or_update(Note::new(format!("round {round}"), ""))
                .await
                .unwrap()
                .unwrap();
            sync.delete_by_id(id).await.unwrap();
            sync.flush().await;

            assert_eq!(sync.status().borrow().pending, 0);
            assert!(sync.pending_notes().is_empty(), "lane left after round {round}");
        }
        assert_eq!(sync.status().borrow().completed, 40);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_is_idempotent_and_mirrored() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let sync = coordinator(Some(remote.clone())).await;
        let id = sync
            .create_or_update(Note::new("bye", ""))
            .await
            .unwrap()
            .unwrap();

        assert!(sync.delete_by_id(id).await.unwrap());
        assert!(!sync.delete_by_id(id).await.unwrap());
        sync.flush().await;

        assert!(remote.is_empty());
        assert_eq!(sync.status().borrow().failed, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconcile_merges_and_skips_bad_ids() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.seed("1", document("1", "X", "u1"));
        remote.seed("2", document("2", "Y", "u1"));
        remote.seed("abc", document("abc", "Broken", "u1"));
        remote.seed("9", document("9", "Other user", "u2"));
        let sync = coordinator(Some(remote)).await;

        let report = sync.reconcile("u1").await.unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.merged, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].document_id, "abc");
        assert_eq!(
            report.skipped[0].reason,
            ParseFault::InvalidId("abc".to_string())
        );
        assert_eq!(report.remote_error, None);

        let first = sync.local().find(NoteId::new(1)).await.unwrap().unwrap();
        let second = sync.local().find(NoteId::new(2)).await.unwrap().unwrap();
        assert_eq!(first.title, "X");
        assert_eq!(second.title, "Y");
        assert!(sync.local().find(NoteId::new(9)).await.unwrap().is_none());
        assert!(sync.last_reconciled_at("u1").await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconcile_remote_wins_and_flags_collisions() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let sync = coordinator(Some(remote.clone())).await;
        sync.local()
            .insert(&Note::new("local draft", "").with_user("u1").with_id(NoteId::new(1)))
            .await
            .unwrap();
        sync.local()
            .insert(&Note::new("someone else", "").with_user("u7").with_id(NoteId::new(2)))
            .await
            .unwrap();
        remote.seed("1", document("1", "remote copy", "u1"));
        remote.seed("2", document("2", "mine", "u1"));

        let report = sync.reconcile("u1").await.unwrap();

        assert_eq!(report.merged, 2);
        assert_eq!(report.collisions, vec![NoteId::new(2)]);
        let first = sync.local().find(NoteId::new(1)).await.unwrap().unwrap();
        assert_eq!(first.title, "remote copy");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconcile_reports_remote_failure() {
        let sync = coordinator(Some(Arc::new(FailingRemote::default()))).await;
        sync.local().insert(&Note::new("kept", "")).await.unwrap();

        let report = sync.reconcile("u1").await.unwrap();

        assert!(report.remote_error.unwrap().contains("remote unavailable"));
        assert_eq!(report.merged, 0);
        assert_eq!(sync.local().snapshot(&NoteQuery::All).await.unwrap().len(), 1);
        assert_eq!(sync.last_reconciled_at("u1").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_only_mode_never_mirrors() {
        let sync = coordinator(None).await;
        assert!(sync.is_local_only());

        let id = sync.create_or_update(Note::new("solo", "")).await.unwrap();
        sync.flush().await;

        assert!(id.is_some());
        assert_eq!(sync.status().borrow().state, SyncState::Offline);
        assert!(sync.pending_notes().is_empty());
        let report = sync.reconcile("u1").await.unwrap();
        assert!(report.remote_error.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_local_leaves_remote() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let sync = coordinator(Some(remote.clone())).await;
        sync.create_or_update(Note::new("a", "")).await.unwrap();
        sync.flush().await;

        assert_eq!(sync.clear_local().await.unwrap(), 1);
        assert_eq!(remote.len(), 1);
    }
}
