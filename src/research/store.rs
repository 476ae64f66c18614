// SPDX-License-Identifier: MIT

//! SQLite storage for research sessions
//!
//! Provides persistence for:
//! - users (created on demand by the HTTP boundary)
//! - research sessions, one per chat request
//! - the message log and produced summaries of each session

use crate::adk::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Error reports written by the HTTP boundary
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResearchSession {
    pub id: i64,
    pub user_id: i64,
    pub query: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub session_id: i64,
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SummaryRecord {
    pub id: i64,
    pub session_id: i64,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// A session together with its ordered message log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHistory {
    pub session: ResearchSession,
    pub messages: Vec<Message>,
}

/// The writes a workflow run makes. Nothing is read back.
#[async_trait]
pub trait ResearchStore: Send + Sync {
    /// Append the user's query to the session log
    async fn save_user_message(&self, session_id: i64, content: &str) -> StoreResult<()>;

    /// Append the assistant answer and its summary record atomically
    async fn save_assistant_summary(&self, session_id: i64, summary: &str) -> StoreResult<()>;
}

/// Storage handle for SQLite operations
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory storage for testing.
    ///
    /// Every pooled connection to `sqlite::memory:` is its own database, so
    /// the pool holds exactly one connection that never expires.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS research_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                query TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES research_sessions(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES research_sessions(id),
                summary TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON research_sessions(user_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Users ====================

    /// Fetch a user, creating a placeholder record if it does not exist
    pub async fn ensure_user(&self, user_id: i64) -> StoreResult<User> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO users (id, name, email)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(format!("User {}", user_id))
        .bind(format!("user{}@example.com", user_id))
        .execute(&self.pool)
        .await?;

        self.get_user(user_id).await
    }

    pub async fn get_user(&self, user_id: i64) -> StoreResult<User> {
        sqlx::query_as::<_, User>("SELECT id, name, email FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
    }

    // ==================== Sessions ====================

    pub async fn create_session(&self, user_id: i64, query: &str) -> StoreResult<ResearchSession> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO research_sessions (user_id, query, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(query)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(ResearchSession {
            id: result.last_insert_rowid(),
            user_id,
            query: query.to_string(),
            created_at,
        })
    }

    /// All sessions of a user, newest first
    pub async fn list_sessions(&self, user_id: i64) -> StoreResult<Vec<ResearchSession>> {
        let sessions = sqlx::query_as::<_, ResearchSession>(
            r#"
            SELECT id, user_id, query, created_at
            FROM research_sessions
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Sessions of a user, newest first, each with its messages in order
    pub async fn history(&self, user_id: i64) -> StoreResult<Vec<SessionHistory>> {
        let sessions = self.list_sessions(user_id).await?;
        let mut history = Vec::with_capacity(sessions.len());
        for session in sessions {
            let messages = self.list_messages(session.id).await?;
            history.push(SessionHistory { session, messages });
        }
        Ok(history)
    }

    // ==================== Messages & Summaries ====================

    pub async fn append_message(
        &self,
        session_id: i64,
        role: Role,
        content: &str,
    ) -> StoreResult<Message> {
        let timestamp = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO messages (session_id, role, content, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        Ok(Message {
            id: result.last_insert_rowid(),
            session_id,
            role: role.as_str().to_string(),
            content: content.to_string(),
            timestamp,
        })
    }

    /// Append an assistant message and a summary record in one transaction
    pub async fn append_assistant_summary(
        &self,
        session_id: i64,
        summary: &str,
    ) -> StoreResult<(Message, SummaryRecord)> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let message_id = sqlx::query(
            r#"
            INSERT INTO messages (session_id, role, content, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(Role::Assistant.as_str())
        .bind(summary)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let summary_id = sqlx::query(
            r#"
            INSERT INTO summaries (session_id, summary, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(summary)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        Ok((
            Message {
                id: message_id,
                session_id,
                role: Role::Assistant.as_str().to_string(),
                content: summary.to_string(),
                timestamp: now,
            },
            SummaryRecord {
                id: summary_id,
                session_id,
                summary: summary.to_string(),
                created_at: now,
            },
        ))
    }

    /// Messages of a session in insertion order
    pub async fn list_messages(&self, session_id: i64) -> StoreResult<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, session_id, role, content, timestamp
            FROM messages
            WHERE session_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    pub async fn list_summaries(&self, session_id: i64) -> StoreResult<Vec<SummaryRecord>> {
        let summaries = sqlx::query_as::<_, SummaryRecord>(
            r#"
            SELECT id, session_id, summary, created_at
            FROM summaries
            WHERE session_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(summaries)
    }
}

#[async_trait]
impl ResearchStore for Storage {
    async fn save_user_message(&self, session_id: i64, content: &str) -> StoreResult<()> {
        self.append_message(session_id, Role::User, content).await?;
        Ok(())
    }

    async fn save_assistant_summary(&self, session_id: i64, summary: &str) -> StoreResult<()> {
        self.append_assistant_summary(session_id, summary).await?;
        Ok(())
    }
}
