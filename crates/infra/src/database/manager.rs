//! Database connection manager backed by an r2d2 SQLite pool.
//!
//! When an encryption key is configured every pooled connection is keyed
//! through `PRAGMA key` before first use (SQLCipher).

use std::path::{Path, PathBuf};
use std::time::Duration;

use outpost_domain::{OutpostError, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::{info, instrument};

use crate::errors::InfraError;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pooled SQLite connection.
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Owns the connection pool for the outbox database.
pub struct DbManager {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
    encrypted: bool,
}

impl DbManager {
    /// Open (or create) the database at `db_path`.
    ///
    /// Fails if the file cannot be opened or the key does not match an
    /// existing encrypted database.
    #[instrument(skip(encryption_key), fields(db_path = %db_path.as_ref().display()))]
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        pool_size: u32,
        encryption_key: Option<&str>,
    ) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let key = encryption_key.map(ToOwned::to_owned);
        let encrypted = key.is_some();

        let manager = SqliteConnectionManager::file(&path).with_init(move |conn| {
            if let Some(key) = &key {
                conn.pragma_update(None, "key", key)?;
            }
            conn.execute_batch("PRAGMA journal_mode=WAL;\nPRAGMA synchronous=NORMAL;")?;
            conn.busy_timeout(BUSY_TIMEOUT)
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)
            .map_err(|e| OutpostError::from(InfraError::from(e)))?;

        info!(
            db_path = %path.display(),
            max_connections = pool.max_size(),
            encrypted,
            "sqlite pool initialised"
        );

        Ok(Self { pool, path, encrypted })
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<DbConnection> {
        self.pool.get().map_err(|e| OutpostError::from(InfraError::from(e)))
    }

    /// Ensure the schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, CAST(strftime('%s','now') AS INTEGER))",
            params![SCHEMA_VERSION],
        )
        .map_err(map_sql_error)?;
        Ok(())
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Acquire a connection and run a trivial query.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(map_sql_error)?;
        Ok(())
    }
}

pub(crate) fn map_sql_error(err: rusqlite::Error) -> OutpostError {
    OutpostError::from(InfraError::from(err))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const TEST_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    #[test]
    fn migrations_create_schema_version() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, 2, Some(TEST_KEY)).expect("manager created");
        manager.run_migrations().expect("migrations run");
        // idempotent
        manager.run_migrations().expect("migrations rerun");

        let conn = manager.get_connection().expect("connection acquired");
        let version: i32 =
            conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        assert!(manager.is_encrypted());
    }

    #[test]
    fn health_check_succeeds_without_encryption() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("plain.db");

        let manager = DbManager::new(&db_path, 1, None).expect("manager created");
        manager.health_check().expect("health check passed");
        assert!(!manager.is_encrypted());
        assert_eq!(manager.path(), db_path.as_path());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("keyed.db");

        {
            let manager = DbManager::new(&db_path, 1, Some(TEST_KEY)).expect("manager created");
            manager.run_migrations().expect("migrations run");
        }

        let reopened = DbManager::new(&db_path, 1, Some("a-different-key"))
            .and_then(|manager| manager.run_migrations());
        assert!(matches!(reopened, Err(OutpostError::Database(_))));
    }
}
