//! Payload types carried by protocol frames.

use serde::{Deserialize, Serialize};

/// Sender name used for the human operator.
pub const HUMAN_SENDER: &str = "user";

/// Sender name used when a human request is answered.
pub const HUMAN_RESPONSE_SENDER: &str = "human";

/// Sender name used for scheduled-job firings.
pub const SCHEDULER_SENDER: &str = "scheduler";

/// Names that can never be used for an agent.
pub const RESERVED_NAMES: [&str; 3] = [HUMAN_SENDER, HUMAN_RESPONSE_SENDER, SCHEDULER_SENDER];

/// A file the operator attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub media_type: String,
    /// Where the worker can fetch the file from.
    pub url: String,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

/// A message waiting in (or delivered from) an agent's mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    pub fn new(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Render the message as the prompt text a reasoner sees.
    ///
    /// Images are referenced by URL; other files get a one-line marker.
    pub fn to_prompt(&self) -> String {
        let mut prompt = format!("Message from {}: {}", self.from, self.content);
        for att in &self.attachments {
            if att.is_image() {
                prompt.push_str(&format!("\n[Attached image: {} ({})]", att.filename, att.url));
            } else {
                prompt.push_str(&format!(
                    "\n[Attached file: {} ({})]",
                    att.filename, att.media_type
                ));
            }
        }
        prompt
    }
}

/// Agent activity as seen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Working,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Working => write!(f, "working"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_without_attachments() {
        let msg = InboundMessage::new("user", "hello");
        assert_eq!(msg.to_prompt(), "Message from user: hello");
    }

    #[test]
    fn test_prompt_with_attachments() {
        let msg = InboundMessage::new("user", "see files").with_attachments(vec![
            Attachment {
                id: "a1".to_string(),
                filename: "chart.png".to_string(),
                media_type: "image/png".to_string(),
                url: "/api/uploads/a1.png".to_string(),
            },
            Attachment {
                id: "a2".to_string(),
                filename: "notes.txt".to_string(),
                media_type: "text/plain".to_string(),
                url: "/api/uploads/a2.txt".to_string(),
            },
        ]);

        let prompt = msg.to_prompt();
        assert!(prompt.starts_with("Message from user: see files"));
        assert!(prompt.contains("[Attached image: chart.png (/api/uploads/a1.png)]"));
        assert!(prompt.contains("[Attached file: notes.txt (text/plain)]"));
    }

    #[test]
    fn test_attachments_skipped_when_empty() {
        let json = serde_json::to_value(InboundMessage::new("a", "b")).unwrap();
        assert!(json.get("attachments").is_none());
    }
}
