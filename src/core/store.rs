//! Message persistence using SQLite
//!
//! There is no conversations table; the message log is the source of truth
//! and conversation views are derived from it (see
//! [`conversation::aggregate`](crate::conversation::aggregate)).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::conversation::{Sender, StoredMessage};

/// Errors from the message store, split by the recovery they allow: a failed
/// write rolls back optimistic state, a failed read keeps prior state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store read failed: {0}")]
    Read(String),

    #[error("store write failed: {0}")]
    Write(String),
}

/// A message about to be inserted; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub user_id: String,
    pub sender: Sender,
    pub content: String,
    pub image_url: Option<String>,
}

/// The append-only message log consumed by the session controller.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends one message and returns the row with its assigned id and
    /// timestamp.
    async fn insert(&self, message: NewMessage) -> Result<StoredMessage, StoreError>;

    /// Every message belonging to the given user, across all conversations.
    async fn select_by_owner(&self, user_id: &str) -> Result<Vec<StoredMessage>, StoreError>;

    /// Messages of one conversation, ordered by creation time ascending.
    async fn select_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, StoreError>;
}

/// SQLite-backed message store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store backed by the given SQLite database path.
    pub async fn new(db_path: &Path) -> Result<Self, sqlx::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                content TEXT NOT NULL,
                image_url TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_user
            ON messages(user_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

type MessageRow = (
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
);

fn row_to_message(row: MessageRow) -> StoredMessage {
    let (id, conversation_id, user_id, sender, content, image_url, created_at) = row;
    StoredMessage {
        id,
        conversation_id,
        user_id,
        sender: Sender::from_column(&sender),
        content,
        image_url,
        created_at,
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, user_id, sender, content, image_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.conversation_id)
        .bind(&message.user_id)
        .bind(message.sender.as_str())
        .bind(&message.content)
        .bind(&message.image_url)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Write(e.to_string()))?;

        Ok(StoredMessage {
            id: result.last_insert_rowid(),
            conversation_id: message.conversation_id,
            user_id: message.user_id,
            sender: message.sender,
            content: message.content,
            image_url: message.image_url,
            created_at,
        })
    }

    async fn select_by_owner(&self, user_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, user_id, sender, content, image_url, created_at
            FROM messages
            WHERE user_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Read(e.to_string()))?;

        Ok(rows.into_iter().map(row_to_message).collect())
    }

    async fn select_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, user_id, sender, content, image_url, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Read(e.to_string()))?;

        Ok(rows.into_iter().map(row_to_message).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_message(conversation_id: &str, user_id: &str, text: &str) -> NewMessage {
        NewMessage {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            sender: Sender::User,
            content: text.to_string(),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_round_trips() {
        let store = SqliteStore::new_in_memory().await.unwrap();

        let first = store
            .insert(user_message("conv-1", "alice", "Hello"))
            .await
            .unwrap();
        let second = store
            .insert(NewMessage {
                conversation_id: "conv-1".to_string(),
                user_id: "alice".to_string(),
                sender: Sender::Ai,
                content: r#"{"advice":"Hi there!"}"#.to_string(),
                image_url: None,
            })
            .await
            .unwrap();

        assert!(second.id > first.id);

        let messages = store.select_by_conversation("conv-1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Ai);
    }

    #[tokio::test]
    async fn select_by_owner_spans_conversations() {
        let store = SqliteStore::new_in_memory().await.unwrap();

        store
            .insert(user_message("conv-1", "alice", "first"))
            .await
            .unwrap();
        store
            .insert(user_message("conv-2", "alice", "second"))
            .await
            .unwrap();
        store
            .insert(user_message("conv-3", "bob", "other user"))
            .await
            .unwrap();

        let messages = store.select_by_owner("alice").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.user_id == "alice"));
    }

    #[tokio::test]
    async fn conversation_select_is_ordered_ascending() {
        let store = SqliteStore::new_in_memory().await.unwrap();

        for text in ["one", "two", "three"] {
            store
                .insert(user_message("conv-1", "alice", text))
                .await
                .unwrap();
        }

        let messages = store.select_by_conversation("conv-1").await.unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert!(messages.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn image_url_round_trips() {
        let store = SqliteStore::new_in_memory().await.unwrap();

        store
            .insert(NewMessage {
                conversation_id: "conv-1".to_string(),
                user_id: "alice".to_string(),
                sender: Sender::User,
                content: "rash".to_string(),
                image_url: Some("data:image/png;base64,AAAA".to_string()),
            })
            .await
            .unwrap();

        let messages = store.select_by_conversation("conv-1").await.unwrap();
        assert_eq!(
            messages[0].image_url.as_deref(),
            Some("data:image/png;base64,AAAA")
        );
    }
}
