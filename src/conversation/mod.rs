//! Conversation domain types
//!
//! A conversation is never stored as its own row. The store holds a flat
//! message log; previews and threads are derived from it (see [`aggregate`]).

pub mod aggregate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use aggregate::{build_previews, build_thread};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Ai => "ai",
        }
    }

    pub fn from_column(value: &str) -> Self {
        match value {
            "ai" => Sender::Ai,
            _ => Sender::User,
        }
    }
}

/// A message row as persisted in the store.
///
/// `content` holds plain text for user rows and a serialized [`AiPayload`]
/// for ai rows. AI rows carry the id of the user they answered, so one
/// `user_id` scan returns every message that user has ever touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: String,
    pub user_id: String,
    pub sender: Sender,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The structured body of an AI reply.
///
/// `advice` is mandatory; the rest default to empty so a partially filled
/// provider response still deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiPayload {
    pub advice: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub knowledge_sources: String,
    #[serde(default)]
    pub disclaimer: String,
}

/// One displayable entry in a conversation thread.
///
/// `local_id` is the stable key used to replace entries in place during
/// optimistic updates; `stored_id` is set once the store confirms the row.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadEntry {
    pub local_id: Uuid,
    pub stored_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: EntryBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum EntryBody {
    User {
        text: String,
        image_url: Option<String>,
    },
    Ai {
        payload: AiPayload,
        malformed: bool,
    },
    /// Ephemeral placeholder shown while the AI reply is in flight.
    #[serde(rename = "pending")]
    PendingAi,
}

impl ThreadEntry {
    pub fn user(text: String, image_url: Option<String>) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            stored_id: None,
            created_at: Utc::now(),
            body: EntryBody::User { text, image_url },
        }
    }

    pub fn ai(payload: AiPayload) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            stored_id: None,
            created_at: Utc::now(),
            body: EntryBody::Ai {
                payload,
                malformed: false,
            },
        }
    }

    pub fn pending_ai() -> Self {
        Self {
            local_id: Uuid::new_v4(),
            stored_id: None,
            created_at: Utc::now(),
            body: EntryBody::PendingAi,
        }
    }
}

/// A derived summary of one conversation for the history list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationPreview {
    pub id: String,
    pub title: String,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
}
