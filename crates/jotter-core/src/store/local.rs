//! Local authoritative note store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, Weak};

use libsql::Connection;
use tokio::sync::{watch, Mutex, MutexGuard};

use super::live::{LiveChannel, LiveNote, LiveQuery, NoteQuery};
use crate::db::{
    Database, LibSqlNoteRepository, LibSqlSyncMetaRepository, NoteRepository, SyncMetaRepository,
};
use crate::error::Result;
use crate::models::{Note, NoteId};

struct Inner {
    db: Mutex<Database>,
    /// Read connection for snapshots and live refreshes; `None` in memory
    reader: Option<Mutex<Connection>>,
    db_path: Option<PathBuf>,
    /// Bumped after every committed mutation
    changes: watch::Sender<u64>,
    live: std::sync::Mutex<HashMap<NoteQuery, Weak<LiveChannel>>>,
}

/// Connection a read runs on
enum ReadGuard<'a> {
    Reader(MutexGuard<'a, Connection>),
    Writer(MutexGuard<'a, Database>),
}

impl ReadGuard<'_> {
    fn connection(&self) -> &Connection {
        match self {
            Self::Reader(conn) => conn,
            Self::Writer(db) => db.connection(),
        }
    }
}

impl Inner {
    /// Reads never queue behind the writer when a reader connection exists.
    async fn read(&self) -> ReadGuard<'_> {
        match &self.reader {
            Some(reader) => ReadGuard::Reader(reader.lock().await),
            None => ReadGuard::Writer(self.db.lock().await),
        }
    }

    async fn run_query(&self, query: &NoteQuery) -> Result<Vec<Note>> {
        let conn = self.read().await;
        let repo = LibSqlNoteRepository::new(conn.connection());
        match query {
            NoteQuery::All => repo.list_all().await,
            NoteQuery::ByUser(user_id) => repo.list_by_user(user_id).await,
            NoteQuery::Search(term) => repo.search(term).await,
            NoteQuery::ById(id) => Ok(repo.get(*id).await?.into_iter().collect()),
        }
    }

    fn publish(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn existing_channel(&self, query: &NoteQuery) -> Option<Arc<LiveChannel>> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.retain(|_, channel| channel.strong_count() > 0);
        live.get(query).and_then(Weak::upgrade)
    }
}

/// Thread-safe handle to the local note table.
///
/// Mutations go through one async mutex around the write connection, so
/// they are linearised. A file-backed store reads (snapshots and live
/// refreshes) on its own connection, so open subscriptions never make a
/// writer wait; WAL guarantees a reader only sees committed writes.
/// Cloning is cheap and shares the same database and live queries.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<Inner>,
}

impl LocalStore {
    /// Open a store backed by a database file at the given path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let db = Database::open(&db_path).await?;
        let reader = db.open_reader().await?;
        Ok(Self::from_database(db, reader, Some(db_path)))
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db, None, None))
    }

    fn from_database(db: Database, reader: Option<Connection>, db_path: Option<PathBuf>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                db: Mutex::new(db),
                reader: reader.map(Mutex::new),
                db_path,
                changes,
                live: std::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Path of the backing database file, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.inner.db_path.as_deref()
    }

    /// Persist a note, assigning an id when it has none.
    ///
    /// A note that already carries an id replaces the stored record.
    pub async fn insert(&self, note: &Note) -> Result<NoteId> {
        let db = self.inner.db.lock().await;
        let repo = LibSqlNoteRepository::new(db.connection());
        let id = repo.insert(note).await?;
        self.inner.publish();
        tracing::debug!("Inserted note {id}");
        Ok(id)
    }

    /// Replace the record matching `note.id`.
    ///
    /// Updating a note that does not exist (or has no id) does nothing and
    /// returns `false`.
    pub async fn update(&self, note: &Note) -> Result<bool> {
        let db = self.inner.db.lock().await;
        let repo = LibSqlNoteRepository::new(db.connection());
        let updated = repo.update(note).await?;
        if updated {
            self.inner.publish();
        } else {
            tracing::debug!("Ignoring update for missing note {:?}", note.id);
        }
        Ok(updated)
    }

    /// Delete a note; deleting an unsaved or missing note is not an error.
    pub async fn delete(&self, note: &Note) -> Result<bool> {
        match note.id {
            Some(id) => self.delete_by_id(id).await,
            None => Ok(false),
        }
    }

    /// Delete a note by id; idempotent.
    pub async fn delete_by_id(&self, id: NoteId) -> Result<bool> {
        let db = self.inner.db.lock().await;
        let repo = LibSqlNoteRepository::new(db.connection());
        let removed = repo.delete_by_id(id).await?;
        if removed {
            self.inner.publish();
            tracing::debug!("Deleted note {id}");
        }
        Ok(removed)
    }

    /// Remove every note (logout / account switch).
    pub async fn delete_all(&self) -> Result<u64> {
        let db = self.inner.db.lock().await;
        let repo = LibSqlNoteRepository::new(db.connection());
        let removed = repo.delete_all().await?;
        self.inner.publish();
        tracing::info!("Cleared {removed} local notes");
        Ok(removed)
    }

    /// Live view of a single note.
    pub async fn get_by_id(&self, id: NoteId) -> Result<LiveNote> {
        Ok(LiveNote::new(self.subscribe(NoteQuery::ById(id)).await?))
    }

    /// Live view of every note, most recently updated first.
    pub async fn get_all(&self) -> Result<LiveQuery> {
        self.subscribe(NoteQuery::All).await
    }

    /// Live view of one user's notes, most recently updated first.
    pub async fn get_by_user(&self, user_id: &str) -> Result<LiveQuery> {
        self.subscribe(NoteQuery::ByUser(user_id.to_string())).await
    }

    /// Live view of notes whose title or content contains `term`.
    pub async fn search(&self, term: &str) -> Result<LiveQuery> {
        self.subscribe(NoteQuery::Search(term.to_string())).await
    }

    /// One-shot lookup of a single note.
    pub async fn find(&self, id: NoteId) -> Result<Option<Note>> {
        let conn = self.inner.read().await;
        let repo = LibSqlNoteRepository::new(conn.connection());
        repo.get(id).await
    }

    /// One-shot evaluation of a query.
    pub async fn snapshot(&self, query: &NoteQuery) -> Result<Vec<Note>> {
        self.inner.run_query(query).await
    }

    /// Subscribe to a live query, sharing the upstream with existing subscribers.
    pub async fn subscribe(&self, query: NoteQuery) -> Result<LiveQuery> {
        if let Some(channel) = self.inner.existing_channel(&query) {
            return Ok(LiveQuery::attach(query, channel));
        }

        // Subscribe to changes before the first read so nothing slips between them
        let changes = self.inner.changes.subscribe();
        let initial = self.inner.run_query(&query).await?;
        let (tx, rx) = watch::channel(initial);
        let task = tokio::spawn(refresh_loop(
            Arc::clone(&self.inner),
            query.clone(),
            changes,
            tx,
        ));
        let channel = Arc::new(LiveChannel::new(rx, task.abort_handle()));

        let mut live = self.inner.live.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = live.get(&query).and_then(Weak::upgrade) {
            // Lost a race with another subscriber; ours is dropped and aborted
            return Ok(LiveQuery::attach(query, existing));
        }
        live.insert(query.clone(), Arc::downgrade(&channel));
        drop(live);

        tracing::debug!("Opened live query {query}");
        Ok(LiveQuery::attach(query, channel))
    }

    /// Number of distinct live queries currently open.
    pub fn live_query_count(&self) -> usize {
        let live = self.inner.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.values().filter(|channel| channel.strong_count() > 0).count()
    }

    /// When `user_id` was last reconciled from the remote (Unix ms).
    pub async fn last_reconciled_at(&self, user_id: &str) -> Result<Option<i64>> {
        let conn = self.inner.read().await;
        let repo = LibSqlSyncMetaRepository::new(conn.connection());
        repo.last_reconciled_at(user_id).await
    }

    pub(crate) async fn mark_reconciled(&self, user_id: &str, at_ms: i64) -> Result<()> {
        let db = self.inner.db.lock().await;
        let repo = LibSqlSyncMetaRepository::new(db.connection());
        repo.set_last_reconciled_at(user_id, at_ms).await
    }
}

/// Re-evaluate `query` after every committed mutation.
///
/// Evaluations run one after another and each starts after the change that
/// triggered it, so emissions never go backwards in time.
async fn refresh_loop(
    inner: Arc<Inner>,
    query: NoteQuery,
    mut changes: watch::Receiver<u64>,
    tx: watch::Sender<Vec<Note>>,
) {
    while changes.changed().await.is_ok() {
        changes.borrow_and_update();
        match inner.run_query(&query).await {
            Ok(fresh) => {
                let emitted = tx.send_if_modified(|current| {
                    if *current == fresh {
                        false
                    } else {
                        *current = fresh;
                        true
                    }
                });
                if emitted {
                    tracing::trace!("Live query {query} re-emitted");
                }
            }
            Err(error) => {
                tracing::warn!("Failed to refresh live query {query}: {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn note(title: &str, content: &str, updated_at: i64) -> Note {
        Note {
            id: None,
            title: title.to_string(),
            content: content.to_string(),
            user_id: String::new(),
            created_at: updated_at,
            updated_at,
            color: 0,
        }
    }

    async fn wait_until(live: &mut LiveQuery, predicate: impl Fn(&[Note]) -> bool) -> Vec<Note> {
        timeout(WAIT, async {
            loop {
                let current = live.current();
                if predicate(&current) {
                    return current;
                }
                live.changed().await.unwrap();
            }
        })
        .await
        .expect("live query did not reach expected state")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_then_find_roundtrip() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let original = note("Title", "Body", 10).with_user("u1").with_color(2);

        let id = store.insert(&original).await.unwrap();
        let live = store.get_by_id(id).await.unwrap();

        assert_eq!(live.current(), Some(original.with_id(id)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn live_all_reemits_on_insert() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let mut live = store.get_all().await.unwrap();
        assert!(live.current().is_empty());

        store.insert(&note("first", "", 1)).await.unwrap();
        let emitted = timeout(WAIT, live.changed()).await.unwrap().unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].title, "first");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn live_note_follows_latest_operation() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let id = store.insert(&note("v1", "", 1)).await.unwrap();
        let mut live = store.subscribe(NoteQuery::ById(id)).await.unwrap();

        for version in 2..=6 {
            store
                .update(&note(&format!("v{version}"), "", version).with_id(id))
                .await
                .unwrap();
        }

        let settled = wait_until(&mut live, |notes| {
            notes.first().is_some_and(|note| note.title == "v6")
        })
        .await;
        assert_eq!(settled[0].updated_at, 6);

        store.delete_by_id(id).await.unwrap();
        let settled = wait_until(&mut live, <[Note]>::is_empty).await;
        assert!(settled.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn live_emissions_never_go_backwards() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let id = store.insert(&note("0", "", 0)).await.unwrap();
        let mut live = store.get_by_id(id).await.unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for version in 1..=50 {
                    store
                        .insert(&note(&version.to_string(), "", version).with_id(id))
                        .await
                        .unwrap();
                }
            })
        };

        let mut last_seen = 0;
        timeout(WAIT, async {
            while last_seen < 50 {
                let current = live.changed().await.unwrap().unwrap();
                assert!(current.updated_at >= last_seen);
                last_seen = current.updated_at;
            }
        })
        .await
        .unwrap();
        writer.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn by_user_and_search_are_filtered() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let mut mine = store.get_by_user("u1").await.unwrap();
        let mut apples = store.search("apple").await.unwrap();

        store.insert(&note("Apple pie", "", 1).with_user("u1")).await.unwrap();
        store.insert(&note("Pear", "apple sauce", 2).with_user("u2")).await.unwrap();
        store.insert(&note("Plum", "", 3).with_user("u1")).await.unwrap();

        let mine = wait_until(&mut mine, |notes| notes.len() == 2).await;
        assert_eq!(mine[0].title, "Plum");
        assert_eq!(mine[1].title, "Apple pie");

        let apples = wait_until(&mut apples, |notes| notes.len() == 2).await;
        assert_eq!(apples[0].title, "Pear");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_share_one_upstream_until_dropped() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let first = store.get_all().await.unwrap();
        let second = store.get_all().await.unwrap();
        let _other = store.search("x").await.unwrap();
        assert_eq!(store.live_query_count(), 2);

        drop(first);
        assert_eq!(store.live_query_count(), 2);
        drop(second);
        assert_eq!(store.live_query_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_twice_is_harmless() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let id = store.insert(&note("bye", "", 1)).await.unwrap();

        assert!(store.delete_by_id(id).await.unwrap());
        assert!(!store.delete_by_id(id).await.unwrap());
        assert!(!store.delete(&note("unsaved", "", 1)).await.unwrap());
        assert!(store.find(id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_of_missing_note_is_ignored() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let updated = store
            .update(&note("ghost", "", 1).with_id(NoteId::new(404)))
            .await
            .unwrap();

        assert!(!updated);
        assert!(store.snapshot(&NoteQuery::All).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_all_empties_live_views() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store.insert(&note("a", "", 1)).await.unwrap();
        store.insert(&note("b", "", 2)).await.unwrap();
        let mut live = store.get_all().await.unwrap();
        assert_eq!(live.current().len(), 2);

        assert_eq!(store.delete_all().await.unwrap(), 2);
        wait_until(&mut live, <[Note]>::is_empty).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_backed_store_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.db");

        let id = {
            let store = LocalStore::open_path(&path).await.unwrap();
            store.insert(&note("kept", "", 1)).await.unwrap()
        };

        let reopened = LocalStore::open_path(&path).await.unwrap();
        let found = reopened.find(id).await.unwrap().unwrap();
        assert_eq!(found.title, "kept");
        assert_eq!(reopened.path(), Some(path.as_path()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writes_do_not_wait_for_live_refreshes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open_path(tmp.path().join("notes.db"))
            .await
            .unwrap();
        let mut live = store.get_all().await.unwrap();
        let _search = store.search("busy").await.unwrap();

        // Occupy the read side as a slow refresh would
        let reader = store.inner.reader.as_ref().expect("file store has a reader");
        let busy = reader.lock().await;

        for i in 0..5 {
            timeout(Duration::from_secs(1), store.insert(&note("busy", "", i)))
                .await
                .expect("write waited for a live refresh")
                .unwrap();
        }
        drop(busy);

        let notes = wait_until(&mut live, |notes| notes.len() == 5).await;
        assert!(notes.iter().all(|note| note.title == "busy"));
    }
}
