//! Derives conversation views from the flat message log
//!
//! The store keeps one append-only table of messages. Everything the UI
//! shows about a conversation (the history sidebar, the thread itself) is
//! recomputed from that log here. Both functions are pure folds over their
//! input; no I/O happens in this module.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::{AiPayload, ConversationPreview, EntryBody, Sender, StoredMessage, ThreadEntry};

/// Maximum preview title length in characters before the ellipsis kicks in.
const TITLE_MAX_CHARS: usize = 50;

/// Advice text substituted when a stored ai row fails to deserialize.
const MALFORMED_ADVICE: &str =
    "This response could not be read from the stored history. It may have been saved incorrectly.";

/// Advice text substituted when a stored ai row has no content at all.
const MISSING_ADVICE: &str = "This response is missing from the stored history.";

struct PreviewAccumulator {
    first_user: Option<(DateTime<Utc>, String)>,
    earliest: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    message_count: usize,
}

/// Builds one preview per distinct conversation owned by `owner`, most
/// recently active first.
///
/// The input must contain every message belonging to `owner`; a partial log
/// produces partial previews. Ties on `last_activity` keep the order in
/// which conversations were first encountered in the input.
pub fn build_previews(messages: &[StoredMessage], owner: &str) -> Vec<ConversationPreview> {
    let mut groups: HashMap<&str, PreviewAccumulator> = HashMap::new();
    let mut encounter_order: Vec<&str> = Vec::new();

    for message in messages.iter().filter(|m| m.user_id == owner) {
        let acc = groups
            .entry(message.conversation_id.as_str())
            .or_insert_with(|| {
                encounter_order.push(message.conversation_id.as_str());
                PreviewAccumulator {
                    first_user: None,
                    earliest: message.created_at,
                    last_activity: message.created_at,
                    message_count: 0,
                }
            });

        acc.message_count += 1;
        acc.earliest = acc.earliest.min(message.created_at);
        acc.last_activity = acc.last_activity.max(message.created_at);

        if message.sender == Sender::User {
            let is_earlier_user = acc
                .first_user
                .as_ref()
                .map(|(at, _)| message.created_at < *at)
                .unwrap_or(true);
            if is_earlier_user {
                acc.first_user = Some((message.created_at, message.content.clone()));
            }
        }
    }

    let mut previews: Vec<ConversationPreview> = encounter_order
        .into_iter()
        .map(|id| {
            let acc = &groups[id];
            let title = match &acc.first_user {
                Some((_, text)) => preview_title(text),
                None => format!("Chat from {}", acc.earliest.format("%Y-%m-%d %H:%M")),
            };
            ConversationPreview {
                id: id.to_string(),
                title,
                last_activity: acc.last_activity,
                message_count: acc.message_count,
            }
        })
        .collect();

    // Stable sort keeps encounter order for equal timestamps.
    previews.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    previews
}

/// Reconstructs the displayable thread for one conversation, oldest first.
///
/// Every filtered message yields exactly one entry. An ai row whose content
/// is absent or not a valid payload becomes an entry flagged `malformed`
/// with placeholder advice, so corrupt history never hides the rest of the
/// thread.
pub fn build_thread(messages: &[StoredMessage], conversation_id: &str) -> Vec<ThreadEntry> {
    let mut selected: Vec<&StoredMessage> = messages
        .iter()
        .filter(|m| m.conversation_id == conversation_id)
        .collect();
    // Stable: input (store) order breaks createdAt ties.
    selected.sort_by_key(|m| m.created_at);

    selected.into_iter().map(entry_from_stored).collect()
}

fn entry_from_stored(message: &StoredMessage) -> ThreadEntry {
    let body = match message.sender {
        Sender::User => EntryBody::User {
            text: message.content.clone(),
            image_url: message.image_url.clone(),
        },
        Sender::Ai => {
            if message.content.trim().is_empty() {
                EntryBody::Ai {
                    payload: placeholder_payload(MISSING_ADVICE),
                    malformed: true,
                }
            } else {
                match serde_json::from_str::<AiPayload>(&message.content) {
                    Ok(payload) => EntryBody::Ai {
                        payload,
                        malformed: false,
                    },
                    Err(err) => {
                        tracing::warn!(
                            message_id = message.id,
                            error = %err,
                            "stored ai payload failed to deserialize"
                        );
                        EntryBody::Ai {
                            payload: placeholder_payload(MALFORMED_ADVICE),
                            malformed: true,
                        }
                    }
                }
            }
        }
    };

    ThreadEntry {
        local_id: uuid::Uuid::new_v4(),
        stored_id: Some(message.id),
        created_at: message.created_at,
        body,
    }
}

fn placeholder_payload(advice: &str) -> AiPayload {
    AiPayload {
        advice: advice.to_string(),
        suggestions: Vec::new(),
        knowledge_sources: String::new(),
        disclaimer: crate::config::prompts::STANDARD_DISCLAIMER.to_string(),
    }
}

/// Truncates a first user message into a sidebar title.
pub fn preview_title(text: &str) -> String {
    let mut title: String = text.chars().take(TITLE_MAX_CHARS).collect();
    if text.chars().count() > TITLE_MAX_CHARS {
        title.push('…');
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 10, minute, 0).unwrap()
    }

    fn user_message(
        id: i64,
        conversation_id: &str,
        owner: &str,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> StoredMessage {
        StoredMessage {
            id,
            conversation_id: conversation_id.to_string(),
            user_id: owner.to_string(),
            sender: Sender::User,
            content: text.to_string(),
            image_url: None,
            created_at,
        }
    }

    fn ai_message(
        id: i64,
        conversation_id: &str,
        owner: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> StoredMessage {
        StoredMessage {
            id,
            conversation_id: conversation_id.to_string(),
            user_id: owner.to_string(),
            sender: Sender::Ai,
            content: content.to_string(),
            image_url: None,
            created_at,
        }
    }

    fn valid_payload_json() -> String {
        serde_json::to_string(&AiPayload {
            advice: "Rest and stay hydrated.".to_string(),
            suggestions: vec!["Have you had a fever?".to_string()],
            knowledge_sources: "General medical texts.".to_string(),
            disclaimer: "Not a substitute for a doctor.".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn previews_are_deterministic_and_owner_scoped() {
        let mut messages = vec![
            user_message(1, "conv-a", "alice", "headache", at(1)),
            ai_message(2, "conv-a", "alice", &valid_payload_json(), at(2)),
            user_message(3, "conv-b", "alice", "sore throat", at(3)),
        ];

        let first = build_previews(&messages, "alice");
        let second = build_previews(&messages, "alice");
        assert_eq!(first, second);

        // A message owned by someone else never changes alice's previews.
        messages.push(user_message(4, "conv-z", "bob", "dizzy", at(9)));
        let third = build_previews(&messages, "alice");
        assert_eq!(first, third);
    }

    #[test]
    fn previews_sort_by_last_activity_descending() {
        let messages = vec![
            user_message(1, "conv-a", "alice", "a", at(5)),
            user_message(2, "conv-b", "alice", "b", at(2)),
            user_message(3, "conv-c", "alice", "c", at(8)),
        ];

        let previews = build_previews(&messages, "alice");
        let order: Vec<&str> = previews.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(order, vec!["conv-c", "conv-a", "conv-b"]);
    }

    #[test]
    fn preview_tracks_count_and_last_activity() {
        let messages = vec![
            user_message(1, "conv-a", "alice", "headache for two days", at(1)),
            ai_message(2, "conv-a", "alice", &valid_payload_json(), at(2)),
            user_message(3, "conv-a", "alice", "it got worse", at(6)),
        ];

        let previews = build_previews(&messages, "alice");
        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].message_count, 3);
        assert_eq!(previews[0].last_activity, at(6));
        assert_eq!(previews[0].title, "headache for two days");
    }

    #[test]
    fn title_is_first_user_message_even_when_log_is_unordered() {
        let messages = vec![
            user_message(3, "conv-a", "alice", "follow-up question", at(7)),
            user_message(1, "conv-a", "alice", "original complaint", at(1)),
        ];

        let previews = build_previews(&messages, "alice");
        assert_eq!(previews[0].title, "original complaint");
    }

    #[test]
    fn title_truncates_at_fifty_characters() {
        let long = "x".repeat(80);
        let title = preview_title(&long);
        assert_eq!(title.chars().count(), 51);
        assert!(title.ends_with('…'));
        assert_eq!(&title[..50], "x".repeat(50).as_str());

        let short = "y".repeat(30);
        assert_eq!(preview_title(&short), short);
    }

    #[test]
    fn conversation_without_user_messages_gets_timestamp_title() {
        let messages = vec![ai_message(
            1,
            "conv-a",
            "alice",
            &valid_payload_json(),
            at(30),
        )];

        let previews = build_previews(&messages, "alice");
        assert_eq!(previews[0].title, "Chat from 2026-03-14 10:30");
    }

    #[test]
    fn thread_length_matches_stored_count_despite_malformed_rows() {
        let messages = vec![
            user_message(1, "conv-a", "alice", "rash on my arm", at(1)),
            ai_message(2, "conv-a", "alice", "{not json at all", at(2)),
            ai_message(3, "conv-a", "alice", "", at(3)),
            ai_message(4, "conv-a", "alice", &valid_payload_json(), at(4)),
            user_message(5, "conv-other", "alice", "unrelated", at(5)),
        ];

        let thread = build_thread(&messages, "conv-a");
        assert_eq!(thread.len(), 4);

        let malformed: Vec<bool> = thread
            .iter()
            .filter_map(|e| match &e.body {
                EntryBody::Ai { malformed, .. } => Some(*malformed),
                _ => None,
            })
            .collect();
        assert_eq!(malformed, vec![true, true, false]);
    }

    #[test]
    fn thread_is_sorted_ascending_by_created_at() {
        let messages = vec![
            ai_message(2, "conv-a", "alice", &valid_payload_json(), at(8)),
            user_message(1, "conv-a", "alice", "first", at(1)),
        ];

        let thread = build_thread(&messages, "conv-a");
        assert_eq!(thread[0].stored_id, Some(1));
        assert_eq!(thread[1].stored_id, Some(2));
    }

    #[test]
    fn thread_entries_carry_store_ids_and_timestamps() {
        let messages = vec![user_message(7, "conv-a", "alice", "hello", at(4))];
        let thread = build_thread(&messages, "conv-a");
        assert_eq!(thread[0].stored_id, Some(7));
        assert_eq!(thread[0].created_at, at(4));
    }
}
