//! Session controller: optimistic sends, history loading, reconciliation
//!
//! One controller owns the working state of one user's chat session: the
//! active conversation id, the displayed thread, and the busy flag that
//! gates sends. Every mutation goes through here; the HTTP layer only reads
//! snapshots. Collaborator failures never escape as errors - they become
//! notices or error-bearing entries in the published snapshot.
//!
//! Send walks a fixed sequence: optimistic user entry, store insert,
//! pending placeholder, AI call, AI store insert. The first store failure
//! rolls the optimistic entry back; an AI failure replaces the placeholder
//! with an error entry; a failed AI persist is demoted to a warning because
//! the answer must still reach the user. After every await the controller
//! re-checks that the session is still on the conversation the send started
//! in, and discards the result when it is not.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::config::prompts;
use crate::conversation::{build_thread, AiPayload, EntryBody, Sender, ThreadEntry};
use crate::core::store::{MessageStore, NewMessage};
use crate::providers::AiResponder;

/// Disclaimer attached to error-bearing AI entries.
const RETRY_DISCLAIMER: &str = "Please try sending your message again.";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("another message is already being processed")]
    Busy,

    #[error("message text or an image is required")]
    EmptyInput,
}

/// The state published to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub conversation_id: String,
    pub entries: Vec<ThreadEntry>,
    pub busy: bool,
    pub notice: Option<String>,
}

struct SessionInner {
    conversation_id: String,
    entries: Vec<ThreadEntry>,
    busy: bool,
    notice: Option<String>,
}

impl SessionInner {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversation_id: self.conversation_id.clone(),
            entries: self.entries.clone(),
            busy: self.busy,
            notice: self.notice.clone(),
        }
    }
}

pub struct SessionController {
    user_id: String,
    store: Arc<dyn MessageStore>,
    responder: Arc<dyn AiResponder>,
    inner: Mutex<SessionInner>,
    updates: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    /// Creates a session for an already-authenticated user, seeded with a
    /// fresh conversation and the greeting entry.
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn MessageStore>,
        responder: Arc<dyn AiResponder>,
    ) -> Self {
        let inner = SessionInner {
            conversation_id: Uuid::new_v4().to_string(),
            entries: vec![ThreadEntry::ai(prompts::initial_greeting())],
            busy: false,
            notice: None,
        };
        let (updates, _) = watch::channel(inner.snapshot());

        Self {
            user_id: user_id.into(),
            store,
            responder,
            inner: Mutex::new(inner),
            updates,
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn is_busy(&self) -> bool {
        self.inner.lock().await.busy
    }

    /// Subscribes to snapshot updates; a value is published after every
    /// state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    /// Submits a symptom description. Rejected while a previous send is
    /// still in flight; collaborator failures surface through the snapshot,
    /// not as errors.
    pub async fn send(&self, text: &str, image_url: Option<String>) -> Result<(), SessionError> {
        if text.trim().is_empty() && image_url.is_none() {
            return Err(SessionError::EmptyInput);
        }

        // Optimistic append under the lock; the awaits below run without it.
        let (conversation_id, draft_id) = {
            let mut inner = self.inner.lock().await;
            if inner.busy {
                return Err(SessionError::Busy);
            }
            inner.busy = true;
            inner.notice = None;

            let draft = ThreadEntry::user(text.to_string(), image_url.clone());
            let draft_id = draft.local_id;
            inner.entries.push(draft);
            self.publish(&inner);
            (inner.conversation_id.clone(), draft_id)
        };

        let inserted = self
            .store
            .insert(NewMessage {
                conversation_id: conversation_id.clone(),
                user_id: self.user_id.clone(),
                sender: Sender::User,
                content: text.to_string(),
                image_url: image_url.clone(),
            })
            .await;

        let pending_id = match inserted {
            Err(err) => {
                tracing::warn!(error = %err, "user message insert failed, rolling back");
                let mut inner = self.inner.lock().await;
                // Roll back by identity, never by position.
                inner.entries.retain(|e| e.local_id != draft_id);
                inner.notice = Some(format!("Could not save your message: {err}"));
                inner.busy = false;
                self.publish(&inner);
                return Ok(());
            }
            Ok(stored) => {
                let mut inner = self.inner.lock().await;
                if inner.conversation_id != conversation_id {
                    // The session moved on while the insert was in flight.
                    inner.busy = false;
                    self.publish(&inner);
                    return Ok(());
                }
                if let Some(entry) = inner.entries.iter_mut().find(|e| e.local_id == draft_id) {
                    entry.stored_id = Some(stored.id);
                    entry.created_at = stored.created_at;
                }
                let pending = ThreadEntry::pending_ai();
                let pending_id = pending.local_id;
                inner.entries.push(pending);
                self.publish(&inner);
                pending_id
            }
        };

        match self.responder.respond(text, image_url.as_deref()).await {
            Err(err) => {
                tracing::warn!(error = %err, "ai responder failed");
                let mut inner = self.inner.lock().await;
                if inner.conversation_id != conversation_id {
                    inner.busy = false;
                    self.publish(&inner);
                    return Ok(());
                }
                let message = format!("Error: {err}");
                self.resolve_pending(
                    &mut inner,
                    pending_id,
                    None,
                    AiPayload {
                        advice: message.clone(),
                        suggestions: Vec::new(),
                        knowledge_sources: String::new(),
                        disclaimer: RETRY_DISCLAIMER.to_string(),
                    },
                );
                inner.notice = Some(message);
                inner.busy = false;
                self.publish(&inner);
            }
            Ok(payload) => {
                {
                    let mut inner = self.inner.lock().await;
                    if inner.conversation_id != conversation_id {
                        // Stale: the answer belongs to a conversation that is
                        // no longer on screen. Drop it before persisting.
                        inner.busy = false;
                        self.publish(&inner);
                        return Ok(());
                    }
                }

                let saved = self.persist_ai_reply(&conversation_id, &payload).await;

                let mut inner = self.inner.lock().await;
                if inner.conversation_id != conversation_id {
                    inner.busy = false;
                    self.publish(&inner);
                    return Ok(());
                }
                let stored_id = match saved {
                    Ok(id) => Some(id),
                    Err(err) => {
                        tracing::warn!(error = %err, "ai message insert failed");
                        inner.notice = Some(
                            "Your answer is shown below but could not be saved to history."
                                .to_string(),
                        );
                        None
                    }
                };
                // The answer reaches the user whether or not it persisted.
                self.resolve_pending(&mut inner, pending_id, stored_id, payload);
                inner.busy = false;
                self.publish(&inner);
            }
        }

        Ok(())
    }

    /// Switches the session to another conversation, replacing the thread
    /// with the stored history. On a read failure the previous thread stays
    /// in place.
    pub async fn load_conversation(&self, conversation_id: &str) {
        match self.store.select_by_conversation(conversation_id).await {
            Ok(messages) => {
                let entries = build_thread(&messages, conversation_id);
                let mut inner = self.inner.lock().await;
                inner.conversation_id = conversation_id.to_string();
                inner.entries = entries;
                inner.notice = None;
                self.publish(&inner);
            }
            Err(err) => {
                tracing::warn!(error = %err, conversation_id, "history load failed");
                let mut inner = self.inner.lock().await;
                inner.notice = Some(format!("Could not load that conversation: {err}"));
                self.publish(&inner);
            }
        }
    }

    /// Starts a fresh conversation with a new client-generated id and a
    /// local greeting entry. Nothing is persisted until the first send.
    pub async fn start_new(&self) {
        let mut inner = self.inner.lock().await;
        inner.conversation_id = Uuid::new_v4().to_string();
        inner.entries = vec![ThreadEntry::ai(prompts::new_chat_greeting())];
        inner.notice = None;
        self.publish(&inner);
    }

    async fn persist_ai_reply(
        &self,
        conversation_id: &str,
        payload: &AiPayload,
    ) -> Result<i64, String> {
        let content = serde_json::to_string(payload).map_err(|e| e.to_string())?;
        let stored = self
            .store
            .insert(NewMessage {
                conversation_id: conversation_id.to_string(),
                user_id: self.user_id.clone(),
                sender: Sender::Ai,
                content,
                image_url: None,
            })
            .await
            .map_err(|e| e.to_string())?;
        Ok(stored.id)
    }

    /// Replaces the pending placeholder in place, matched by its local id.
    fn resolve_pending(
        &self,
        inner: &mut SessionInner,
        pending_id: Uuid,
        stored_id: Option<i64>,
        payload: AiPayload,
    ) {
        if let Some(entry) = inner.entries.iter_mut().find(|e| e.local_id == pending_id) {
            entry.stored_id = stored_id;
            entry.created_at = chrono::Utc::now();
            entry.body = EntryBody::Ai {
                payload,
                malformed: false,
            };
        }
    }

    fn publish(&self, inner: &SessionInner) {
        self.updates.send_replace(inner.snapshot());
    }
}

/// Lazily creates one [`SessionController`] per authenticated user.
pub struct SessionRegistry {
    store: Arc<dyn MessageStore>,
    responder: Arc<dyn AiResponder>,
    sessions: Mutex<HashMap<String, Arc<SessionController>>>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn MessageStore>, responder: Arc<dyn AiResponder>) -> Self {
        Self {
            store,
            responder,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn session_for(&self, user_id: &str) -> Arc<SessionController> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(SessionController::new(
                    user_id,
                    Arc::clone(&self.store),
                    Arc::clone(&self.responder),
                ))
            })
            .clone()
    }
}
