//! Notification sink: the router's fire-and-forget view to the outside world.
//!
//! Every notification carries owned snapshots, never references into router
//! state.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::core::HumanRequestRecord;
use crate::protocol::AgentStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Notification {
    Status {
        agent: String,
        status: AgentStatus,
    },
    #[serde(rename = "inter-agent")]
    InterAgent {
        from: String,
        to: String,
        message: String,
    },
    TurnStart {
        agent: String,
        turn_id: String,
    },
    Thinking {
        agent: String,
        turn_id: String,
        text: String,
    },
    ToolUse {
        agent: String,
        turn_id: String,
        tool_use_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    ToolResult {
        agent: String,
        turn_id: String,
        tool_use_id: String,
        is_error: bool,
    },
    HumanRequest {
        request: HumanRequestRecord,
    },
    /// The entry agent replied to the operator.
    Response {
        agent: String,
        turn_id: String,
        text: String,
    },
}

/// Receives router notifications. Implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        match &notification {
            Notification::Status { agent, status } => {
                tracing::info!(agent = %agent, "Status -> {}", status)
            }
            Notification::InterAgent { from, to, .. } => {
                tracing::info!("[{}] -> [{}]", from, to)
            }
            Notification::HumanRequest { request } => {
                tracing::info!(agent = %request.agent_name, "Human request: {}", request.title)
            }
            other => tracing::debug!(?other, "Notification"),
        }
    }
}

/// Fans notifications out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, notification: Notification) {
        // No subscribers is not an error.
        let _ = self.tx.send(notification);
    }
}

impl NotificationSink for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        let _ = self.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(Notification::TurnStart {
            agent: "coder".to_string(),
            turn_id: "t1".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "turn_start", "agent": "coder", "turnId": "t1"}));

        let value = serde_json::to_value(Notification::InterAgent {
            from: "a".to_string(),
            to: "b".to_string(),
            message: "m".to_string(),
        })
        .unwrap();
        assert_eq!(value["type"], "inter-agent");
    }

    #[tokio::test]
    async fn test_broadcast_sink_without_subscribers() {
        let sink = BroadcastSink::new(8);
        sink.notify(Notification::Status {
            agent: "a".to_string(),
            status: AgentStatus::Idle,
        });

        let mut rx = sink.subscribe();
        sink.notify(Notification::Status {
            agent: "a".to_string(),
            status: AgentStatus::Working,
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::Status {
                agent: "a".to_string(),
                status: AgentStatus::Working
            }
        );
    }
}
