//! The router <-> worker message contract.
//!
//! Both directions are a closed set of tagged shapes. Frames travel as JSON
//! values and are validated on receipt: a frame is turned into a typed
//! message only if it matches exactly one known shape, otherwise it is
//! rejected before it can touch any state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::InboundMessage;

/// Raw frame as it crosses the worker boundary.
pub type Frame = serde_json::Value;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{direction} frame is not an object with a string \"type\" field")]
    MissingKind { direction: &'static str },

    #[error("unknown {direction} message kind \"{kind}\"")]
    UnknownKind { direction: &'static str, kind: String },

    #[error("malformed {direction} \"{kind}\" message: {reason}")]
    Malformed {
        direction: &'static str,
        kind: String,
        reason: String,
    },

    #[error("failed to encode {direction} message: {reason}")]
    Encode {
        direction: &'static str,
        reason: String,
    },
}

/// Messages sent from the router to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RouterMessage {
    /// Sent once when the worker is started.
    Init {
        agent_name: String,
        workspace: String,
        peer_agent_names: Vec<String>,
    },
    /// One mailbox delivery; starts a turn.
    Process { message: InboundMessage },
    /// The operator answered (or dismissed) a request the agent raised.
    ResolveHumanRequest {
        request_id: String,
        response: String,
        dismissed: bool,
    },
}

/// Events emitted by a worker back to the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WorkerEvent {
    Send {
        to: String,
        message: String,
    },
    #[serde(rename = "turn_start")]
    TurnStarted {
        turn_id: String,
    },
    Thinking {
        turn_id: String,
        text: String,
    },
    ToolUse {
        turn_id: String,
        tool_use_id: String,
        tool_name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        turn_id: String,
        tool_use_id: String,
        is_error: bool,
    },
    Done {
        turn_id: String,
        visible_text: String,
    },
    CronFire {
        job_id: String,
        job_name: String,
        message: String,
    },
    HumanRequest {
        request_id: String,
        agent_name: String,
        title: String,
        description: String,
    },
}

impl WorkerEvent {
    /// Wire name of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Send { .. } => "send",
            WorkerEvent::TurnStarted { .. } => "turn_start",
            WorkerEvent::Thinking { .. } => "thinking",
            WorkerEvent::ToolUse { .. } => "tool_use",
            WorkerEvent::ToolResult { .. } => "tool_result",
            WorkerEvent::Done { .. } => "done",
            WorkerEvent::CronFire { .. } => "cron_fire",
            WorkerEvent::HumanRequest { .. } => "human_request",
        }
    }
}

/// A message set that can cross the worker boundary.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Human-readable direction, used in errors and logs.
    const DIRECTION: &'static str;
    /// Every `type` tag the set accepts.
    const KINDS: &'static [&'static str];
}

impl WireMessage for RouterMessage {
    const DIRECTION: &'static str = "router->worker";
    const KINDS: &'static [&'static str] = &["init", "process", "resolve_human_request"];
}

impl WireMessage for WorkerEvent {
    const DIRECTION: &'static str = "worker->router";
    const KINDS: &'static [&'static str] = &[
        "send",
        "turn_start",
        "thinking",
        "tool_use",
        "tool_result",
        "done",
        "cron_fire",
        "human_request",
    ];
}

/// Validate a frame against the closed set `T` and return the typed message.
pub fn decode<T: WireMessage>(frame: Frame) -> Result<T, ProtocolError> {
    let kind = frame
        .get("type")
        .and_then(|k| k.as_str())
        .ok_or(ProtocolError::MissingKind {
            direction: T::DIRECTION,
        })?
        .to_string();

    if !T::KINDS.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownKind {
            direction: T::DIRECTION,
            kind,
        });
    }

    serde_json::from_value(frame).map_err(|e| ProtocolError::Malformed {
        direction: T::DIRECTION,
        kind,
        reason: e.to_string(),
    })
}

/// Encode a typed message into a frame.
pub fn encode<T: WireMessage>(message: &T) -> Result<Frame, ProtocolError> {
    serde_json::to_value(message).map_err(|e| ProtocolError::Encode {
        direction: T::DIRECTION,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_send() {
        let event: WorkerEvent =
            decode(json!({"type": "send", "to": "b", "message": "ping"})).unwrap();
        assert_eq!(
            event,
            WorkerEvent::Send {
                to: "b".to_string(),
                message: "ping".to_string()
            }
        );
    }

    #[test]
    fn test_decode_uses_camel_case_fields() {
        let event: WorkerEvent =
            decode(json!({"type": "done", "turnId": "t1", "visibleText": "hi"})).unwrap();
        assert_eq!(event.kind(), "done");

        let err = decode::<WorkerEvent>(json!({"type": "done", "turn_id": "t1", "visible_text": "hi"}))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn test_tool_use_input_defaults_to_null() {
        let event: WorkerEvent = decode(json!({
            "type": "tool_use",
            "turnId": "t1",
            "toolUseId": "u1",
            "toolName": "team_chat"
        }))
        .unwrap();
        match event {
            WorkerEvent::ToolUse { input, .. } => assert!(input.is_null()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = decode::<WorkerEvent>(json!({"type": "explode"})).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnknownKind {
                direction: "worker->router",
                kind: "explode".to_string()
            }
        );
    }

    #[test]
    fn test_missing_kind_rejected() {
        assert!(matches!(
            decode::<WorkerEvent>(json!({"to": "b"})),
            Err(ProtocolError::MissingKind { .. })
        ));
        assert!(matches!(
            decode::<RouterMessage>(json!("process")),
            Err(ProtocolError::MissingKind { .. })
        ));
    }

    #[test]
    fn test_router_kind_not_accepted_as_worker_event() {
        let frame = json!({"type": "process", "message": {"from": "a", "content": "b"}});
        assert!(decode::<RouterMessage>(frame.clone()).is_ok());
        assert!(matches!(
            decode::<WorkerEvent>(frame),
            Err(ProtocolError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_wrong_field_type_rejected() {
        let err = decode::<WorkerEvent>(json!({
            "type": "tool_result",
            "turnId": "t1",
            "toolUseId": "u1",
            "isError": "no"
        }))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { ref kind, .. } if kind == "tool_result"));
    }

    #[test]
    fn test_encode_router_message_shape() {
        let frame = encode(&RouterMessage::ResolveHumanRequest {
            request_id: "r1".to_string(),
            response: "ok".to_string(),
            dismissed: false,
        })
        .unwrap();
        assert_eq!(
            frame,
            json!({
                "type": "resolve_human_request",
                "requestId": "r1",
                "response": "ok",
                "dismissed": false
            })
        );
    }

    #[test]
    fn test_every_event_kind_is_listed() {
        let samples = vec![
            WorkerEvent::Send { to: "b".into(), message: "m".into() },
            WorkerEvent::TurnStarted { turn_id: "t".into() },
            WorkerEvent::Thinking { turn_id: "t".into(), text: "x".into() },
            WorkerEvent::ToolUse {
                turn_id: "t".into(),
                tool_use_id: "u".into(),
                tool_name: "n".into(),
                input: json!({}),
            },
            WorkerEvent::ToolResult { turn_id: "t".into(), tool_use_id: "u".into(), is_error: false },
            WorkerEvent::Done { turn_id: "t".into(), visible_text: String::new() },
            WorkerEvent::CronFire { job_id: "j".into(), job_name: "n".into(), message: "m".into() },
            WorkerEvent::HumanRequest {
                request_id: "r".into(),
                agent_name: "a".into(),
                title: "t".into(),
                description: "d".into(),
            },
        ];
        for event in samples {
            let frame = encode(&event).unwrap();
            assert_eq!(frame["type"], event.kind());
            assert!(WorkerEvent::KINDS.contains(&event.kind()));
        }
    }
}
