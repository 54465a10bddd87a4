//! Worker session loop.
//!
//! One task per agent. It owns the agent's toolbox (schedules and human
//! requests) and runs the reasoner for each delivered message. The router is
//! reached only through the shared event channel.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::mailer::Mailer;
use super::reasoner::Reasoner;
use super::tools::{ToolOutput, Toolbox};
use crate::protocol::{decode, encode, Frame, InboundMessage, RouterMessage, WorkerEvent};

/// Worker -> router events, tagged with the emitting agent.
pub type EventSender = mpsc::UnboundedSender<(String, Frame)>;

/// An agent's handle on the shared event channel.
#[derive(Debug, Clone)]
pub struct EventPort {
    agent: String,
    tx: EventSender,
}

impl EventPort {
    pub fn new(agent: impl Into<String>, tx: EventSender) -> Self {
        Self {
            agent: agent.into(),
            tx,
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Encode and send an event. Returns `false` if the router is gone.
    pub fn emit(&self, event: WorkerEvent) -> bool {
        let frame = match encode(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(agent = %self.agent, "{}", e);
                return false;
            }
        };
        if self.tx.send((self.agent.clone(), frame)).is_err() {
            tracing::debug!(agent = %self.agent, "Router gone, dropping {}", event.kind());
            return false;
        }
        true
    }
}

/// One turn in progress: what a reasoner can see and do while handling a
/// message.
pub struct Turn<'a> {
    id: String,
    port: &'a EventPort,
    toolbox: &'a mut Toolbox,
    workspace: &'a Path,
}

impl<'a> Turn<'a> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent(&self) -> &str {
        self.port.agent()
    }

    pub fn peers(&self) -> &[String] {
        self.toolbox.peers()
    }

    pub fn workspace(&self) -> &Path {
        self.workspace
    }

    /// Report intermediate reasoning.
    pub fn think(&self, text: &str) {
        self.port.emit(WorkerEvent::Thinking {
            turn_id: self.id.clone(),
            text: text.to_string(),
        });
    }

    /// Invoke a tool, reporting the call and its outcome.
    pub fn call_tool(&mut self, name: &str, input: Value) -> ToolOutput {
        let tool_use_id = uuid::Uuid::new_v4().to_string();
        self.port.emit(WorkerEvent::ToolUse {
            turn_id: self.id.clone(),
            tool_use_id: tool_use_id.clone(),
            tool_name: name.to_string(),
            input: input.clone(),
        });

        let output = self.toolbox.call(name, &input);
        if output.is_error {
            tracing::debug!(agent = %self.port.agent(), tool = %name, "Tool error: {}", output.text);
        }

        self.port.emit(WorkerEvent::ToolResult {
            turn_id: self.id.clone(),
            tool_use_id,
            is_error: output.is_error,
        });
        output
    }
}

/// State created by `init`.
struct Session {
    workspace: PathBuf,
    toolbox: Toolbox,
}

impl Session {
    async fn process(&mut self, reasoner: &dyn Reasoner, port: &EventPort, message: InboundMessage) {
        let turn_id = uuid::Uuid::new_v4().to_string();
        port.emit(WorkerEvent::TurnStarted {
            turn_id: turn_id.clone(),
        });
        tracing::debug!(agent = %port.agent(), turn_id = %turn_id, from = %message.from, "Turn started");

        let mut turn = Turn {
            id: turn_id.clone(),
            port,
            toolbox: &mut self.toolbox,
            workspace: &self.workspace,
        };
        let visible_text = match reasoner.respond(&message, &mut turn).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(agent = %port.agent(), reasoner = %reasoner.name(), "Turn failed: {}", e);
                format!("Error: {}", e)
            }
        };

        port.emit(WorkerEvent::Done {
            turn_id,
            visible_text,
        });
    }
}

/// Spawn the session task for `agent`.
///
/// Returns the inbound channel for router frames. The session ends, and its
/// scheduled jobs are stopped, when that channel is closed.
pub fn spawn_worker(
    agent: &str,
    reasoner: Arc<dyn Reasoner>,
    mailer: Arc<dyn Mailer>,
    events: EventSender,
) -> (mpsc::UnboundedSender<Frame>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let port = EventPort::new(agent, events);
    let handle = tokio::spawn(run_session(rx, reasoner, mailer, port));
    (tx, handle)
}

async fn run_session(
    mut rx: mpsc::UnboundedReceiver<Frame>,
    reasoner: Arc<dyn Reasoner>,
    mailer: Arc<dyn Mailer>,
    port: EventPort,
) {
    let mut session: Option<Session> = None;

    while let Some(frame) = rx.recv().await {
        let message: RouterMessage = match decode(frame) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(agent = %port.agent(), "Rejected frame: {}", e);
                continue;
            }
        };

        match message {
            RouterMessage::Init {
                agent_name,
                workspace,
                peer_agent_names,
            } => {
                if agent_name != port.agent() {
                    tracing::warn!(agent = %port.agent(), "init names \"{}\"", agent_name);
                }
                if let Some(mut old) = session.take() {
                    old.toolbox.cleanup();
                }
                tracing::info!(agent = %port.agent(), workspace = %workspace, "Session initialized");
                session = Some(Session {
                    workspace: PathBuf::from(workspace),
                    toolbox: Toolbox::new(
                        port.agent(),
                        peer_agent_names,
                        port.clone(),
                        mailer.clone(),
                    ),
                });
            }
            RouterMessage::Process { message } => match session.as_mut() {
                Some(s) => s.process(reasoner.as_ref(), &port, message).await,
                None => {
                    // Still end the turn so the router does not stall.
                    tracing::warn!(agent = %port.agent(), "process before init");
                    port.emit(WorkerEvent::Done {
                        turn_id: uuid::Uuid::new_v4().to_string(),
                        visible_text: String::new(),
                    });
                }
            },
            RouterMessage::ResolveHumanRequest {
                request_id,
                response,
                dismissed,
            } => match session.as_mut() {
                Some(s) => s.toolbox.resolve_request(&request_id, &response, dismissed),
                None => tracing::warn!(agent = %port.agent(), "resolve before init"),
            },
        }
    }

    if let Some(mut s) = session {
        s.toolbox.cleanup();
    }
    tracing::info!(agent = %port.agent(), "Session ended");
}
