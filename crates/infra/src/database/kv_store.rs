//! SQLite-backed [`DurableStore`].
//!
//! rusqlite is blocking, so every call hops onto the blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use outpost_core::DurableStore;
use outpost_domain::{OutpostError, Result};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::manager::{map_sql_error, DbConnection, DbManager};

/// Key/value store persisted in the `kv_store` table.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    db: Arc<DbManager>,
}

impl SqliteKeyValueStore {
    /// Wrap a manager. Runs migrations so the table is guaranteed to exist.
    pub fn new(db: Arc<DbManager>) -> Result<Self> {
        db.run_migrations()?;
        Ok(Self { db })
    }

    async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DbConnection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            op(&conn)
        })
        .await
        .map_err(|e| OutpostError::Internal(format!("kv store task failed: {e}")))?
    }
}

#[async_trait]
impl DurableStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_owned();
        self.with_connection(move |conn| {
            conn.query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(map_sql_error)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_owned();
        let value = value.to_owned();
        let bytes = value.len();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) \
                 VALUES (?1, ?2, CAST(strftime('%s','now') AS INTEGER)) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value],
            )
            .map_err(map_sql_error)?;
            debug!(key = %key, bytes, "kv value written");
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_owned();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }
}
