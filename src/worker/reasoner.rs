//! The reasoning seam of a worker.
//!
//! A `Reasoner` turns one inbound message into the agent's visible reply,
//! optionally thinking out loud and calling tools through the [`Turn`] it is
//! handed. Whatever model or process sits behind it is opaque to the router.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use super::runtime::Turn;
use crate::protocol::{InboundMessage, HUMAN_SENDER};

#[derive(Error, Debug)]
pub enum ReasonerError {
    #[error("Reasoner failed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, ReasonerError>;

#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Reasoner name, for logs.
    fn name(&self) -> &str;

    /// Handle one delivered message and return the visible text of the turn.
    ///
    /// An empty string means the turn produced nothing for the operator.
    async fn respond(&self, message: &InboundMessage, turn: &mut Turn<'_>) -> Result<String>;
}

/// Built-in reasoner used by `agentlane run`.
///
/// It echoes what it receives and understands a few directives so the whole
/// fleet can be exercised from a terminal:
///
/// - `@<peer> <text>` sends `<text>` to a teammate
/// - `!remind <seconds> <text>` schedules a one-time reminder
/// - `!cron <pattern> | <text>` schedules a recurring job
/// - `!jobs` lists scheduled jobs
/// - `!ask <title>: <description>` raises a human request
/// - `!email <to> <subject> | <body>` sends an email
/// - `!requests` lists human requests
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoReasoner;

impl EchoReasoner {
    fn run_directive(&self, content: &str, turn: &mut Turn<'_>) -> Option<String> {
        if let Some(rest) = content.strip_prefix('@') {
            let (to, text) = rest.split_once(char::is_whitespace)?;
            let out = turn.call_tool("team_chat", json!({"to": to, "message": text.trim()}));
            return Some(out.text);
        }

        let rest = content.strip_prefix('!')?;
        let (command, args) = rest
            .split_once(char::is_whitespace)
            .map(|(c, a)| (c, a.trim()))
            .unwrap_or((rest, ""));

        let out = match command {
            "remind" => {
                let (seconds, text) = args.split_once(char::is_whitespace)?;
                turn.call_tool(
                    "schedule",
                    json!({
                        "name": "reminder",
                        "message": text.trim(),
                        "scheduleType": "seconds",
                        "schedule": seconds,
                    }),
                )
            }
            "cron" => {
                let (pattern, text) = args.split_once('|')?;
                turn.call_tool(
                    "schedule",
                    json!({
                        "name": "recurring",
                        "message": text.trim(),
                        "scheduleType": "cron-pattern",
                        "schedule": pattern.trim(),
                    }),
                )
            }
            "jobs" => turn.call_tool("list_schedules", json!({})),
            "ask" => {
                let (title, description) = args.split_once(':').unwrap_or((args, ""));
                turn.call_tool(
                    "request_human",
                    json!({"title": title.trim(), "description": description.trim()}),
                )
            }
            "requests" => turn.call_tool("list_human_requests", json!({})),
            "email" => {
                let (head, body) = args.split_once('|')?;
                let (to, subject) = head.trim().split_once(char::is_whitespace)?;
                turn.call_tool(
                    "send_email",
                    json!({"to": to, "subject": subject.trim(), "body": body.trim()}),
                )
            }
            _ => return None,
        };
        Some(out.text)
    }
}

#[async_trait]
impl Reasoner for EchoReasoner {
    fn name(&self) -> &str {
        "echo"
    }

    async fn respond(&self, message: &InboundMessage, turn: &mut Turn<'_>) -> Result<String> {
        turn.think(&format!(
            "Handling message from {} in {}",
            message.from,
            turn.workspace().display()
        ));

        let content = message.content.trim();
        if let Some(reply) = self.run_directive(content, turn) {
            return Ok(reply);
        }

        if message.from == HUMAN_SENDER {
            Ok(format!("[{}] {}", turn.agent(), message.to_prompt()))
        } else {
            // Replies to teammates stay internal.
            tracing::debug!(agent = %turn.agent(), turn_id = %turn.id(), "{}", message.to_prompt());
            Ok(String::new())
        }
    }
}
