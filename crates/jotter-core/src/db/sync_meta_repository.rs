//! Sync bookkeeping repository implementation

use crate::error::Result;
use libsql::Connection;

/// Trait for sync metadata storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncMetaRepository {
    /// When `user_id` was last reconciled from the remote (Unix ms)
    async fn last_reconciled_at(&self, user_id: &str) -> Result<Option<i64>>;

    /// Record a successful reconcile for `user_id`
    async fn set_last_reconciled_at(&self, user_id: &str, at_ms: i64) -> Result<()>;
}

/// libSQL implementation of `SyncMetaRepository`
pub struct LibSqlSyncMetaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncMetaRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn reconciled_key(user_id: &str) -> String {
    format!("last_reconciled_at:{user_id}")
}

impl SyncMetaRepository for LibSqlSyncMetaRepository<'_> {
    async fn last_reconciled_at(&self, user_id: &str) -> Result<Option<i64>> {
        let value = self.get_value(&reconciled_key(user_id)).await?;
        Ok(value.and_then(|value| value.parse().ok()))
    }

    async fn set_last_reconciled_at(&self, user_id: &str, at_ms: i64) -> Result<()> {
        self.set_value(&reconciled_key(user_id), &at_ms.to_string())
            .await
    }
}

impl LibSqlSyncMetaRepository<'_> {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_meta WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}
