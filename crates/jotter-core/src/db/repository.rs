//! Note repository implementation

use crate::error::Result;
use crate::models::{Note, NoteId};
use libsql::{params, Connection};

const NOTE_COLUMNS: &str = "id, title, content, user_id, created_at, updated_at, color";

/// Trait for note storage operations (async)
#[allow(async_fn_in_trait)]
pub trait NoteRepository {
    /// Persist a note, assigning an id when it has none.
    ///
    /// A note that already carries an id replaces the stored record.
    async fn insert(&self, note: &Note) -> Result<NoteId>;

    /// Replace the record matching `note.id`; `false` when no such record
    async fn update(&self, note: &Note) -> Result<bool>;

    /// Remove a note by id; `false` when nothing was removed
    async fn delete_by_id(&self, id: NoteId) -> Result<bool>;

    /// Remove every note, returning how many were removed
    async fn delete_all(&self) -> Result<u64>;

    /// Get a note by id
    async fn get(&self, id: NoteId) -> Result<Option<Note>>;

    /// All notes, most recently updated first
    async fn list_all(&self) -> Result<Vec<Note>>;

    /// Notes owned by `user_id`, most recently updated first
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Note>>;

    /// Notes whose title or content contains `term`, most recently updated first
    async fn search(&self, term: &str) -> Result<Vec<Note>>;
}

/// libSQL implementation of `NoteRepository`
pub struct LibSqlNoteRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlNoteRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a note from a database row
    fn parse_note(row: &libsql::Row) -> Result<Note> {
        Ok(Note {
            id: Some(NoteId::new(row.get::<i64>(0)?)),
            title: row.get(1)?,
            content: row.get(2)?,
            user_id: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            color: row.get(6)?,
        })
    }

    async fn collect(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Note>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next().await? {
            notes.push(Self::parse_note(&row)?);
        }
        Ok(notes)
    }
}

/// Escape `LIKE` wildcards so the search term matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl NoteRepository for LibSqlNoteRepository<'_> {
    async fn insert(&self, note: &Note) -> Result<NoteId> {
        let color = i64::from(note.color);

        if let Some(id) = note.id {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO notes (id, title, content, user_id, created_at, updated_at, color)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                    params![
                        id.get(),
                        note.title.as_str(),
                        note.content.as_str(),
                        note.user_id.as_str(),
                        note.created_at,
                        note.updated_at,
                        color
                    ],
                )
                .await?;
            return Ok(id);
        }

        self.conn
            .execute(
                "INSERT INTO notes (title, content, user_id, created_at, updated_at, color)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    note.title.as_str(),
                    note.content.as_str(),
                    note.user_id.as_str(),
                    note.created_at,
                    note.updated_at,
                    color
                ],
            )
            .await?;

        Ok(NoteId::new(self.conn.last_insert_rowid()))
    }

    async fn update(&self, note: &Note) -> Result<bool> {
        let Some(id) = note.id else {
            return Ok(false);
        };

        let rows = self
            .conn
            .execute(
                "UPDATE notes
                 SET title = ?, content = ?, user_id = ?, created_at = ?, updated_at = ?, color = ?
                 WHERE id = ?",
                params![
                    note.title.as_str(),
                    note.content.as_str(),
                    note.user_id.as_str(),
                    note.created_at,
                    note.updated_at,
                    i64::from(note.color),
                    id.get()
                ],
            )
            .await?;

        Ok(rows > 0)
    }

    async fn delete_by_id(&self, id: NoteId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM notes WHERE id = ?", params![id.get()])
            .await?;
        Ok(rows > 0)
    }

    async fn delete_all(&self) -> Result<u64> {
        Ok(self.conn.execute("DELETE FROM notes", ()).await?)
    }

    async fn get(&self, id: NoteId) -> Result<Option<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?");
        let mut notes = self.collect(&sql, params![id.get()]).await?;
        Ok(notes.pop())
    }

    async fn list_all(&self) -> Result<Vec<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY updated_at DESC, id ASC");
        self.collect(&sql, ()).await
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE user_id = ?
             ORDER BY updated_at DESC, id ASC"
        );
        self.collect(&sql, params![user_id]).await
    }

    async fn search(&self, term: &str) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE title LIKE '%' || ?1 || '%' ESCAPE '\\'
                OR content LIKE '%' || ?1 || '%' ESCAPE '\\'
             ORDER BY updated_at DESC, id ASC"
        );
        self.collect(&sql, params![escape_like(term)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn note_at(title: &str, content: &str, updated_at: i64) -> Note {
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

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_get_roundtrip() {
        let db = setup().await;
        let repo = LibSqlNoteRepository::new(db.connection());

        let note = note_at("Hello", "world", 100).with_user("u1").with_color(4);
        let id = repo.insert(&note).await.unwrap();

        let fetched = repo.get(id).await.unwrap().unwrap();
        assert_eq!(fetched, Note { id: Some(id), ..note });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_with_id_replaces() {
        let db = setup().await;
        let repo = LibSqlNoteRepository::new(db.connection());

        let id = repo.insert(&note_at("v1", "", 1)).await.unwrap();
        let replaced = note_at("v2", "", 2).with_id(id);
        assert_eq!(repo.insert(&replaced).await.unwrap(), id);

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "v2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_missing_is_noop() {
        let db = setup().await;
        let repo = LibSqlNoteRepository::new(db.connection());

        let ghost = note_at("ghost", "", 1).with_id(NoteId::new(99));
        assert!(!repo.update(&ghost).await.unwrap());
        assert!(!repo.update(&note_at("unsaved", "", 1)).await.unwrap());
        assert!(repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_existing() {
        let db = setup().await;
        let repo = LibSqlNoteRepository::new(db.connection());

        let id = repo.insert(&note_at("before", "", 1)).await.unwrap();
        assert!(repo.update(&note_at("after", "", 2).with_id(id)).await.unwrap());
        assert_eq!(repo.get(id).await.unwrap().unwrap().title, "after");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_is_idempotent() {
        let db = setup().await;
        let repo = LibSqlNoteRepository::new(db.connection());

        let id = repo.insert(&note_at("bye", "", 1)).await.unwrap();
        assert!(repo.delete_by_id(id).await.unwrap());
        assert!(!repo.delete_by_id(id).await.unwrap());
        assert!(repo.get(id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ids_not_reused_after_delete_all() {
        let db = setup().await;
        let repo = LibSqlNoteRepository::new(db.connection());

        let first = repo.insert(&note_at("a", "", 1)).await.unwrap();
        let second = repo.insert(&note_at("b", "", 1)).await.unwrap();
        assert_eq!(repo.delete_all().await.unwrap(), 2);

        let third = repo.insert(&note_at("c", "", 1)).await.unwrap();
        assert!(third > first);
        assert!(third > second);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_orders_by_updated_desc_with_stable_ties() {
        let db = setup().await;
        let repo = LibSqlNoteRepository::new(db.connection());

        let old = repo.insert(&note_at("old", "", 10)).await.unwrap();
        let tie_a = repo.insert(&note_at("tie a", "", 20)).await.unwrap();
        let tie_b = repo.insert(&note_at("tie b", "", 20)).await.unwrap();
        let newest = repo.insert(&note_at("newest", "", 30)).await.unwrap();

        let ids: Vec<_> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .filter_map(|note| note.id)
            .collect();
        assert_eq!(ids, vec![newest, tie_a, tie_b, old]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_by_user() {
        let db = setup().await;
        let repo = LibSqlNoteRepository::new(db.connection());

        repo.insert(&note_at("mine", "", 1).with_user("u1")).await.unwrap();
        repo.insert(&note_at("theirs", "", 2).with_user("u2")).await.unwrap();
        repo.insert(&note_at("anon", "", 3)).await.unwrap();

        let notes = repo.list_by_user("u1").await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "mine");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_by_user_orders_ties_by_insertion() {
        let db = setup().await;
        let repo = LibSqlNoteRepository::new(db.connection());

        let first = repo.insert(&note_at("first", "", 50).with_user("u1")).await.unwrap();
        repo.insert(&note_at("other", "", 50).with_user("u2")).await.unwrap();
        let second = repo.insert(&note_at("second", "", 50).with_user("u1")).await.unwrap();
        let newer = repo.insert(&note_at("newer", "", 60).with_user("u1")).await.unwrap();
        let third = repo.insert(&note_at("third", "", 50).with_user("u1")).await.unwrap();

        let ids: Vec<_> = repo
            .list_by_user("u1")
            .await
            .unwrap()
            .into_iter()
            .filter_map(|note| note.id)
            .collect();
        assert_eq!(ids, vec![newer, first, second, third]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_title_or_content() {
        let db = setup().await;
        let repo = LibSqlNoteRepository::new(db.connection());

        repo.insert(&note_at("Hello world", "", 1)).await.unwrap();
        repo.insert(&note_at("Greeting", "goodbye WORLD", 2)).await.unwrap();
        repo.insert(&note_at("Something else", "", 3)).await.unwrap();

        let results = repo.search("world").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Greeting");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_treats_wildcards_literally() {
        let db = setup().await;
        let repo = LibSqlNoteRepository::new(db.connection());

        repo.insert(&note_at("100% done", "", 1)).await.unwrap();
        repo.insert(&note_at("1000 items", "", 2)).await.unwrap();

        let results = repo.search("0%").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "100% done");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a_b%c\\"), "a\\_b\\%c\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
