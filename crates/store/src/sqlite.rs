//! SQLite session backend.
//!
//! A single `sessions` table keyed by session id. The message list is
//! stored as a JSON document so one `INSERT .. ON CONFLICT` replaces a
//! session atomically.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use toolwright_core::error::StoreError;
use toolwright_core::session::{Session, SessionBackend, SessionId};
use tracing::{debug, info};

/// A SQLite-backed session store.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every in-memory connection is its own database
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        info!("SQLite session backend initialized at {path}");
        Ok(backend)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id                TEXT PRIMARY KEY NOT NULL,
                messages          TEXT NOT NULL,
                awaiting_approval INTEGER NOT NULL DEFAULT 0,
                created_at        TEXT NOT NULL,
                updated_at        TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("sessions table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StoreError> {
        let column = |name: &str, e: sqlx::Error| StoreError::Storage(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let messages_json: String = row.try_get("messages").map_err(|e| column("messages", e))?;
        let awaiting_approval: bool = row
            .try_get("awaiting_approval")
            .map_err(|e| column("awaiting_approval", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        let updated_at: String = row.try_get("updated_at").map_err(|e| column("updated_at", e))?;

        let messages = serde_json::from_str(&messages_json).map_err(|e| {
            StoreError::Serialization {
                session: id.clone(),
                reason: e.to_string(),
            }
        })?;

        let parse_time = |s: &str| {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        };

        Ok(Session {
            id: SessionId::from(id),
            messages,
            awaiting_approval,
            created_at: parse_time(&created_at),
            updated_at: parse_time(&updated_at),
        })
    }
}

#[async_trait]
impl SessionBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT failed: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_session(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let messages_json =
            serde_json::to_string(&session.messages).map_err(|e| StoreError::Serialization {
                session: session.id.to_string(),
                reason: e.to_string(),
            })?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, messages, awaiting_approval, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                messages = excluded.messages,
                awaiting_approval = excluded.awaiting_approval,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session.id.as_str())
        .bind(&messages_json)
        .bind(session.awaiting_approval)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT failed: {e}")))?;

        debug!(session = %session.id, messages = session.messages.len(), "Session saved to SQLite");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        let rows = sqlx::query("SELECT id FROM sessions ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("LIST failed: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("id")
                    .map(SessionId::from)
                    .map_err(|e| StoreError::Storage(format!("id column: {e}")))
            })
            .collect()
    }
}
