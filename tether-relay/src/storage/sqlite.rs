//! SQLite storage backend for tether-relay.

use super::SessionStore;
use crate::error::StorageError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tether_types::{SessionId, SessionInfo, SessionStatus};

/// SQLite-based session store.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

/// One row of the `sessions` table.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    device_id: String,
    device_name: String,
    cwd: String,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SessionRow> for SessionInfo {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status =
            SessionStatus::from_wire(&row.status).ok_or_else(|| StorageError::Corrupt {
                session_id: row.id.clone(),
                reason: format!("unknown status {:?}", row.status),
            })?;
        Ok(SessionInfo {
            id: SessionId::from_raw(row.id),
            device_id: row.device_id,
            device_name: row.device_name,
            cwd: row.cwd,
            status,
            created_at: row.created_at.max(0) as u64,
            updated_at: row.updated_at.max(0) as u64,
        })
    }
}

impl SqliteStore {
    /// Create a new SQLite store from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let raw = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(raw)
            .map_err(StorageError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // Each in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                device_name TEXT NOT NULL,
                cwd TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_status_updated ON sessions(status, updated_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn save_session(&self, info: &SessionInfo) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, device_id, device_name, cwd, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                device_id = excluded.device_id,
                device_name = excluded.device_name,
                cwd = excluded.cwd,
                status = excluded.status,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(info.id.as_str())
        .bind(&info.device_id)
        .bind(&info.device_name)
        .bind(&info.cwd)
        .bind(info.status.as_str())
        .bind(info.created_at as i64)
        .bind(info.updated_at as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_session(&self, id: &SessionId) -> Result<Option<SessionInfo>, StorageError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, device_id, device_name, cwd, status, created_at, updated_at
            FROM sessions
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionInfo::try_from).transpose()
    }

    async fn count_sessions(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn purge_detached_before(&self, cutoff_ms: u64) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM sessions WHERE status = 'detached' AND updated_at < ?1")
            .bind(cutoff_ms as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
