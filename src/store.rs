//! SQLite-backed conversation persistence.
//!
//! The HTTP layer talks to [`ConversationStore`] directly for CRUD; the
//! generation loop only sees the narrow [`TurnStore`] trait.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::error::ServiceError;
use crate::model::{ChatMessage, Role};

/// What the generation loop needs from persistence: prior turns in, one
/// assistant turn out. The read and the write are separate,
/// non-transactional operations; concurrent requests against the same
/// conversation id may interleave them.
pub trait TurnStore: Send + Sync {
    /// Prior turns, oldest first. Empty for conversation ids <= 0.
    fn history(&self, conversation_id: i64) -> Result<Vec<ChatMessage>, ServiceError>;

    fn save_turn(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<i64, ServiceError>;
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Role::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub id: i64,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub messages: Vec<MessageRecord>,
}

pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    pub fn open(path: &Path) -> Result<Self, ServiceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::with_connection(conn)
    }

    /// Private in-memory database, used by tests.
    pub fn in_memory() -> Result<Self, ServiceError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, ServiceError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), ServiceError> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL
                    REFERENCES conversations (id) ON DELETE CASCADE,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;
        Ok(())
    }

    pub fn create_conversation(&self, title: &str) -> Result<i64, ServiceError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversations (title) VALUES (?1)",
            params![title],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>, ServiceError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at
             FROM conversations
             ORDER BY updated_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ConversationSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_conversation(
        &self,
        conversation_id: i64,
    ) -> Result<Option<ConversationDetail>, ServiceError> {
        let conn = self.conn.lock();
        let header = conn
            .query_row(
                "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, title, created_at, updated_at)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT role, content, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY id ASC",
        )?;
        let messages = stmt
            .query_map(params![conversation_id], |row| {
                Ok(MessageRecord {
                    role: row.get(0)?,
                    content: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(ConversationDetail {
            id,
            title,
            created_at,
            updated_at,
            messages,
        }))
    }

    pub fn delete_conversation(&self, conversation_id: i64) -> Result<bool, ServiceError> {
        let deleted = self.conn.lock().execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![conversation_id],
        )?;
        Ok(deleted > 0)
    }

    /// Append a message and bump the conversation's updated_at.
    pub fn save_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<i64, ServiceError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO messages (conversation_id, role, content) VALUES (?1, ?2, ?3)",
            params![conversation_id, role, content],
        )?;
        let message_id = conn.last_insert_rowid();
        conn.execute(
            "UPDATE conversations SET updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
            params![conversation_id],
        )?;
        Ok(message_id)
    }

    /// Retention sweep: drop conversations untouched for more than `days`
    /// days. Messages go with them via the cascade.
    pub fn cleanup_older_than(&self, days: i64) -> Result<usize, ServiceError> {
        let cutoff = format!("-{days} days");
        let deleted = self.conn.lock().execute(
            "DELETE FROM conversations WHERE updated_at < datetime('now', ?1)",
            params![cutoff],
        )?;
        Ok(deleted)
    }
}

impl TurnStore for ConversationStore {
    fn history(&self, conversation_id: i64) -> Result<Vec<ChatMessage>, ServiceError> {
        if conversation_id <= 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT role, content FROM messages WHERE conversation_id = ?1 ORDER BY id ASC",
        )?;
        let messages = stmt
            .query_map(params![conversation_id], |row| {
                Ok(ChatMessage {
                    role: row.get(0)?,
                    content: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    fn save_turn(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<i64, ServiceError> {
        self.save_message(conversation_id, role, content)
    }
}
