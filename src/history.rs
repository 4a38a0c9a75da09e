//! Append-only conversational log keyed by session.
//!
//! Sessions exist implicitly: a session is the set of messages sharing a
//! `session_id`, created by the first append and removed by `purge`. The
//! first message of a session carries the title annotations; the display
//! title resolves custom > generated > default.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::config::DEFAULT_SESSION_TITLE;
use crate::core::errors::ApiError;

const SCHEMA_VERSION: i64 = 1;
const MAX_HISTORY_LIMIT: i64 = 1000;
const MAX_TITLE_LEN: usize = 160;

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// A message to append. Immutable once written.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Present only on the first user message of a session.
    pub generated_title: Option<String>,
}

impl NewMessage {
    pub fn new(role: &str, content: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            role: normalize_role(role).to_string(),
            content: content.trim().to_string(),
            created_at,
            generated_title: None,
        }
    }

    pub fn with_generated_title(mut self, title: Option<String>) -> Self {
        self.generated_title = title;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_db().await?;
        Ok(store)
    }

    async fn init_db(&self) -> Result<(), ApiError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        if version != SCHEMA_VERSION {
            self.rebuild_schema().await?;
        }

        Ok(())
    }

    async fn rebuild_schema(&self) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("DROP TABLE IF EXISTS messages")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "\
            CREATE TABLE messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('user', 'model')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                generated_title TEXT,
                custom_title TEXT
            )",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX idx_messages_session_id_id ON messages(session_id, id)")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        let pragma = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
        sqlx::query(&pragma)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// Used only to detect the first message of a session.
    pub async fn count_prior_messages(&self, session_id: &str) -> Result<i64, ApiError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE session_id = ?1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)
    }

    /// Returns the most recent `limit` messages, oldest first within the
    /// returned window.
    pub async fn load_recent(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        let limit = sanitize_limit(limit);

        let rows = sqlx::query(
            "\
            SELECT role, content, created_at
            FROM (
                SELECT id, role, content, created_at
                FROM messages
                WHERE session_id = ?1
                ORDER BY id DESC
                LIMIT ?2
            )
            ORDER BY id ASC",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(|row| {
                Ok(StoredMessage {
                    role: row.try_get("role")?,
                    content: row.try_get("content")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(ApiError::internal)
    }

    /// Full transcript of a session, oldest first.
    pub async fn load_all(&self, session_id: &str) -> Result<Vec<StoredMessage>, ApiError> {
        let rows = sqlx::query(
            "\
            SELECT role, content, created_at
            FROM messages
            WHERE session_id = ?1
            ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(|row| {
                Ok(StoredMessage {
                    role: row.try_get("role")?,
                    content: row.try_get("content")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(ApiError::internal)
    }

    /// Appends a batch of messages in one transaction. Entries with
    /// empty content are dropped; an all-empty batch is skipped.
    pub async fn append(&self, session_id: &str, entries: &[NewMessage]) -> Result<(), ApiError> {
        let usable: Vec<&NewMessage> = entries
            .iter()
            .filter(|entry| !entry.content.is_empty())
            .collect();

        if usable.is_empty() {
            tracing::warn!("[{}] Skipping save of empty message batch", session_id);
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for entry in usable {
            sqlx::query(
                "\
                INSERT INTO messages (session_id, role, content, created_at, generated_title)
                VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(session_id)
            .bind(normalize_role(&entry.role))
            .bind(&entry.content)
            .bind(entry.created_at.to_rfc3339())
            .bind(&entry.generated_title)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// All sessions ordered by most recent activity, with resolved titles.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ApiError> {
        let rows = sqlx::query(
            "\
            SELECT s.session_id,
                   (SELECT custom_title FROM messages
                    WHERE session_id = s.session_id ORDER BY id ASC LIMIT 1) AS custom_title,
                   (SELECT generated_title FROM messages
                    WHERE session_id = s.session_id ORDER BY id ASC LIMIT 1) AS generated_title
            FROM (
                SELECT session_id, MAX(id) AS last_id
                FROM messages
                GROUP BY session_id
            ) s
            ORDER BY s.last_id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(|row| {
                let custom: Option<String> = row.try_get("custom_title")?;
                let generated: Option<String> = row.try_get("generated_title")?;
                Ok(SessionSummary {
                    id: row.try_get("session_id")?,
                    title: resolve_title(custom, generated),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(ApiError::internal)
    }

    /// Sets the custom title override on the session's first message.
    /// An empty or default-valued title clears the override so the
    /// generated (or default) title shows through again.
    pub async fn set_custom_title(&self, session_id: &str, title: &str) -> Result<bool, ApiError> {
        let first_id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM messages WHERE session_id = ?1 ORDER BY id ASC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let Some(first_id) = first_id else {
            tracing::warn!("[{}] Cannot set title: session has no messages", session_id);
            return Ok(false);
        };

        let clean: String = title.trim().chars().take(MAX_TITLE_LEN).collect();

        let result = if clean.is_empty() || clean == DEFAULT_SESSION_TITLE {
            tracing::info!("[{}] Clearing custom title", session_id);
            sqlx::query("UPDATE messages SET custom_title = NULL WHERE id = ?1")
                .bind(first_id)
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?
        } else {
            tracing::info!("[{}] Setting custom title to '{}'", session_id, clean);
            sqlx::query("UPDATE messages SET custom_title = ?1 WHERE id = ?2")
                .bind(&clean)
                .bind(first_id)
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every message of the session, returning the count.
    pub async fn purge(&self, session_id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM messages WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected())
    }
}

fn resolve_title(custom: Option<String>, generated: Option<String>) -> String {
    custom
        .filter(|t| !t.trim().is_empty())
        .or(generated.filter(|t| !t.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string())
}

fn sanitize_limit(limit: i64) -> i64 {
    if limit <= 0 {
        return 1;
    }
    limit.min(MAX_HISTORY_LIMIT)
}

fn normalize_role(role: &str) -> &'static str {
    match role {
        "model" => "model",
        _ => "user",
    }
}
