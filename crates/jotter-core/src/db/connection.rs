//! Database connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::{Path, PathBuf};

use super::migrations;

const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Database wrapper for a local libSQL connection
pub struct Database {
    db: LibSqlDatabase,
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        let database = Self {
            db,
            conn,
            path: Some(path),
        };
        database.configure().await?;
        database.migrate().await?;
        tracing::debug!("Opened local note database at {path_str}");
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;

        let database = Self {
            db,
            conn,
            path: None,
        };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure `SQLite` for local use
    async fn configure(&self) -> Result<()> {
        // WAL is not available for in-memory databases
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        set_busy_timeout(&self.conn).await
    }

    /// Open a second connection for readers.
    ///
    /// With WAL a reader never blocks the writer. An in-memory database is
    /// private to its connection, so there is no reader and `None` is
    /// returned; callers read through [`Database::connection`] instead.
    pub async fn open_reader(&self) -> Result<Option<Connection>> {
        if self.path.is_none() {
            return Ok(None);
        }
        let reader = self.db.connect()?;
        set_busy_timeout(&reader).await?;
        Ok(Some(reader))
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Filesystem path of the database, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

async fn set_busy_timeout(conn: &Connection) -> Result<()> {
    // The pragma echoes the new value back as a row
    conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"), ())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(db.path().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_creates_parent_directories() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("jotter.db");

        let db = Database::open(&db_path).await.unwrap();
        assert_eq!(db.path(), Some(db_path.as_path()));
        assert!(db_path.exists());

        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM notes", ())
            .await
            .expect("notes table should exist");
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reader_sees_committed_writes() {
        let tmp = tempdir().unwrap();
        let db = Database::open(tmp.path().join("jotter.db")).await.unwrap();
        let reader = db.open_reader().await.unwrap().expect("file database has a reader");

        db.connection()
            .execute(
                "INSERT INTO notes (title, content, created_at, updated_at) VALUES ('a', '', 1, 1)",
                (),
            )
            .await
            .unwrap();

        let mut rows = reader.query("SELECT COUNT(*) FROM notes", ()).await.unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_in_memory_has_no_reader() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(db.open_reader().await.unwrap().is_none());
    }
}
