//! Conversation history for agentlane.
//!
//! Every pair of participants shares one append-only log. The log is keyed by
//! a canonical id built from the sorted pair, so A->B and B->A land in the
//! same conversation.

use serde::Serialize;
use std::collections::HashMap;

use crate::protocol::Attachment;

/// Order-independent conversation id for a pair of participants.
///
/// The pair is ordered by byte (code point) order. Names outside the Basic
/// Multilingual Plane may therefore sort differently than under UTF-16 code
/// unit ordering.
pub fn canonical_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}-{}", a, b)
    } else {
        format!("{}-{}", b, a)
    }
}

/// Current time in unix milliseconds.
pub(crate) fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One stored message. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Unique ID (ULID)
    pub id: String,

    /// Sender name
    pub from: String,

    pub text: String,

    /// Unix timestamp (ms)
    pub timestamp: i64,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl StoredMessage {
    fn new(from: &str, text: &str, attachments: Vec<Attachment>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            from: from.to_string(),
            text: text.to_string(),
            timestamp: now_timestamp(),
            attachments,
        }
    }
}

/// The shared log between two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,

    /// Sorted participant pair
    pub participants: [String; 2],

    /// Whether one side is the human operator. Decided when the
    /// conversation is created.
    pub is_human: bool,

    /// Messages in insertion order
    pub messages: Vec<StoredMessage>,
}

impl Conversation {
    fn new(a: &str, b: &str, is_human: bool) -> Self {
        let mut participants = [a.to_string(), b.to_string()];
        participants.sort();
        Self {
            id: canonical_id(a, b),
            participants,
            is_human,
            messages: Vec::new(),
        }
    }
}

/// All conversations, created lazily and never removed.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<String, Conversation>,
    /// Conversation ids in creation order, for stable snapshots.
    order: Vec<String>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message from `from` to `to`, creating the conversation if
    /// this is the first message between the pair.
    pub fn store(
        &mut self,
        from: &str,
        to: &str,
        text: &str,
        is_human: bool,
        attachments: Vec<Attachment>,
    ) -> StoredMessage {
        let id = canonical_id(from, to);
        let message = StoredMessage::new(from, text, attachments);

        if !self.conversations.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.conversations
            .entry(id.clone())
            .or_insert_with(|| Conversation::new(from, to, is_human))
            .messages
            .push(message.clone());

        tracing::debug!(conversation = %id, from = %from, "Stored message");
        message
    }

    /// Look up the conversation between two participants.
    pub fn between(&self, a: &str, b: &str) -> Option<&Conversation> {
        self.conversations.get(&canonical_id(a, b))
    }

    /// Snapshot of every conversation, oldest first.
    pub fn snapshot(&self) -> Vec<Conversation> {
        self.order
            .iter()
            .filter_map(|id| self.conversations.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
