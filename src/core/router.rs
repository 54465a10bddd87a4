//! Message router and per-agent session state.
//!
//! The router owns every mailbox, the idle/working flag of each agent, the
//! conversation store and the human request registry. Each operation is a
//! short synchronous step; reasoning happens in the workers, which the router
//! only reaches through their inbound channel.
//!
//! Per agent:
//!
//! ```text
//! Idle --(mailbox non-empty)--> Working --(done)--> Idle, drain again
//! ```
//!
//! There is no turn timeout. A worker that never reports `done` keeps its
//! agent `working` and its mailbox blocked.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::conversation::{Conversation, ConversationStore};
use super::queue::{Mailbox, MailboxStats};
use super::requests::{HumanRequestRecord, HumanRequestRegistry};
use crate::error::{Error, Result};
use crate::notify::{Notification, NotificationSink};
use crate::protocol::{
    decode, encode, AgentStatus, Attachment, Frame, InboundMessage, RouterMessage,
    WorkerEvent, HUMAN_RESPONSE_SENDER, HUMAN_SENDER, RESERVED_NAMES, SCHEDULER_SENDER,
};

/// Router-side state for one agent.
#[derive(Debug)]
struct AgentLane {
    description: String,
    status: AgentStatus,
    mailbox: Mailbox,
    /// Inbound channel of the agent's worker. `None` once shut down.
    worker: Option<mpsc::UnboundedSender<Frame>>,
}

/// Snapshot of an agent for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
    pub status: AgentStatus,
}

pub struct Router {
    entry_agent: String,
    lanes: BTreeMap<String, AgentLane>,
    conversations: ConversationStore,
    requests: HumanRequestRegistry,
    sink: Arc<dyn NotificationSink>,
}

impl Router {
    pub fn new(entry_agent: impl Into<String>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            entry_agent: entry_agent.into(),
            lanes: BTreeMap::new(),
            conversations: ConversationStore::new(),
            requests: HumanRequestRegistry::new(),
            sink,
        }
    }

    /// Register an agent and the inbound channel of its worker.
    pub fn add_agent(
        &mut self,
        name: &str,
        description: &str,
        worker: mpsc::UnboundedSender<Frame>,
    ) -> Result<()> {
        if name.is_empty() || RESERVED_NAMES.contains(&name) {
            return Err(Error::Config(format!("\"{}\" cannot be used as an agent name", name)));
        }
        if self.lanes.contains_key(name) {
            return Err(Error::Config(format!("agent \"{}\" registered twice", name)));
        }
        self.lanes.insert(
            name.to_string(),
            AgentLane {
                description: description.to_string(),
                status: AgentStatus::Idle,
                mailbox: Mailbox::new(),
                worker: Some(worker),
            },
        );
        tracing::debug!(agent = %name, "Registered agent");
        Ok(())
    }

    pub fn is_agent(&self, name: &str) -> bool {
        self.lanes.contains_key(name)
    }

    /// Send the `init` message to every registered worker.
    pub fn init_workers(&self, workspace_for: impl Fn(&str) -> String) {
        let names: Vec<String> = self.lanes.keys().cloned().collect();
        for name in &names {
            let peers = names.iter().filter(|n| *n != name).cloned().collect();
            self.forward(
                name,
                &RouterMessage::Init {
                    agent_name: name.clone(),
                    workspace: workspace_for(name),
                    peer_agent_names: peers,
                },
            );
            tracing::info!("[{}] spawned", name);
        }
    }

    /// Enqueue `message` for `target` and try to start a turn.
    ///
    /// Messages for unknown agents are dropped.
    pub fn dispatch(&mut self, target: &str, message: InboundMessage) {
        let Some(lane) = self.lanes.get_mut(target) else {
            tracing::debug!(target = %target, from = %message.from, "Dropping message for unknown agent");
            return;
        };
        tracing::debug!(target = %target, from = %message.from, "Enqueued message");
        lane.mailbox.push(message);
        self.drain(target);
    }

    /// Deliver the mailbox head if the agent is idle.
    ///
    /// The head leaves the mailbox only once the worker has accepted it. If
    /// the worker channel is closed the message stays queued and the agent
    /// stays idle.
    pub fn drain(&mut self, agent: &str) {
        loop {
            let Some(lane) = self.lanes.get_mut(agent) else {
                return;
            };
            if lane.status == AgentStatus::Working {
                return;
            }
            let Some(head) = lane.mailbox.peek() else {
                return;
            };
            let Some(worker) = lane.worker.as_ref() else {
                tracing::warn!(agent = %agent, "Worker is gone; leaving {} message(s) queued", lane.mailbox.len());
                return;
            };

            let frame = match encode(&RouterMessage::Process {
                message: head.clone(),
            }) {
                Ok(frame) => frame,
                Err(e) => {
                    // Unencodable messages can never be delivered.
                    tracing::error!(agent = %agent, "Dropping undeliverable message: {}", e);
                    lane.mailbox.pop();
                    continue;
                }
            };
            if worker.send(frame).is_err() {
                tracing::warn!(agent = %agent, "Worker channel closed; leaving {} message(s) queued", lane.mailbox.len());
                return;
            }

            lane.mailbox.pop();
            lane.status = AgentStatus::Working;
            self.sink.notify(Notification::Status {
                agent: agent.to_string(),
                status: AgentStatus::Working,
            });
            return;
        }
    }

    /// Validate a raw frame from `agent`'s worker and apply it.
    ///
    /// A frame that matches no known shape is rejected and changes nothing.
    pub fn handle_frame(&mut self, agent: &str, frame: Frame) -> Result<()> {
        let event: WorkerEvent = decode(frame)?;
        self.on_worker_event(agent, event);
        Ok(())
    }

    /// Apply one event emitted by `agent`'s worker.
    pub fn on_worker_event(&mut self, agent: &str, event: WorkerEvent) {
        if !self.is_agent(agent) {
            tracing::warn!(agent = %agent, kind = event.kind(), "Event from unknown agent ignored");
            return;
        }

        match event {
            WorkerEvent::Send { to, message } => {
                tracing::info!("[{}] -> [{}]", agent, to);
                self.conversations.store(agent, &to, &message, false, Vec::new());
                self.sink.notify(Notification::InterAgent {
                    from: agent.to_string(),
                    to: to.clone(),
                    message: message.clone(),
                });
                self.dispatch(&to, InboundMessage::new(agent, message));
            }
            WorkerEvent::TurnStarted { turn_id } => {
                self.sink.notify(Notification::TurnStart {
                    agent: agent.to_string(),
                    turn_id,
                });
            }
            WorkerEvent::Thinking { turn_id, text } => {
                self.sink.notify(Notification::Thinking {
                    agent: agent.to_string(),
                    turn_id,
                    text,
                });
            }
            WorkerEvent::ToolUse {
                turn_id,
                tool_use_id,
                tool_name,
                input,
            } => {
                self.sink.notify(Notification::ToolUse {
                    agent: agent.to_string(),
                    turn_id,
                    tool_use_id,
                    tool_name,
                    input,
                });
            }
            WorkerEvent::ToolResult {
                turn_id,
                tool_use_id,
                is_error,
            } => {
                self.sink.notify(Notification::ToolResult {
                    agent: agent.to_string(),
                    turn_id,
                    tool_use_id,
                    is_error,
                });
            }
            WorkerEvent::Done {
                turn_id,
                visible_text,
            } => self.finish_turn(agent, turn_id, visible_text),
            WorkerEvent::CronFire {
                job_id, job_name, message,
            } => {
                tracing::debug!(agent = %agent, job_id = %job_id, "Scheduled job fired");
                self.dispatch(
                    agent,
                    InboundMessage::new(
                        SCHEDULER_SENDER,
                        format!("[Scheduled job \"{}\" fired] {}", job_name, message),
                    ),
                );
            }
            WorkerEvent::HumanRequest {
                request_id,
                agent_name,
                title,
                description,
            } => {
                if agent_name != agent {
                    tracing::warn!(
                        agent = %agent,
                        claimed = %agent_name,
                        "Human request names another agent; recording it for the sender"
                    );
                }
                if let Some(record) = self.requests.create(&request_id, agent, &title, &description) {
                    self.sink.notify(Notification::HumanRequest { request: record });
                }
            }
        }
    }

    fn finish_turn(&mut self, agent: &str, turn_id: String, visible_text: String) {
        if let Some(lane) = self.lanes.get_mut(agent) {
            if lane.status != AgentStatus::Working {
                tracing::warn!(agent = %agent, turn_id = %turn_id, "done received while idle");
            }
            lane.status = AgentStatus::Idle;
        }
        self.sink.notify(Notification::Status {
            agent: agent.to_string(),
            status: AgentStatus::Idle,
        });
        self.drain(agent);

        // Only the entry agent talks to the operator directly.
        if agent == self.entry_agent && !visible_text.is_empty() {
            self.conversations
                .store(agent, HUMAN_SENDER, &visible_text, true, Vec::new());
            self.sink.notify(Notification::Response {
                agent: agent.to_string(),
                turn_id,
                text: visible_text,
            });
        }
    }

    /// Operator message to the entry agent. It is stored before dispatch so
    /// it shows up in history even before the agent reacts.
    pub fn send(&mut self, text: &str, attachments: Vec<Attachment>) {
        let entry = self.entry_agent.clone();
        self.conversations
            .store(HUMAN_SENDER, &entry, text, true, attachments.clone());
        self.dispatch(
            &entry,
            InboundMessage::new(HUMAN_SENDER, text).with_attachments(attachments),
        );
    }

    /// Route an inbound email to the entry agent as an operator message.
    pub fn send_email(&mut self, from: &str, subject: &str, body: &str) {
        let content = format!("[Email from {}]\nSubject: {}\n{}", from, subject, body);
        self.send(&content, Vec::new());
    }

    /// Settle a pending human request.
    ///
    /// Returns `false` (and changes nothing) when the request is unknown or
    /// already settled. Otherwise the worker is told, and unless dismissed
    /// the answer is queued for the agent as an ordinary message.
    pub fn resolve_human_request(&mut self, request_id: &str, response: &str, dismissed: bool) -> bool {
        let Some(record) = self.requests.resolve(request_id, response, dismissed) else {
            return false;
        };
        tracing::info!(
            agent = %record.agent_name,
            request_id = %request_id,
            "Human request {}",
            record.status
        );

        self.forward(
            &record.agent_name,
            &RouterMessage::ResolveHumanRequest {
                request_id: request_id.to_string(),
                response: response.to_string(),
                dismissed,
            },
        );

        if !dismissed {
            self.dispatch(
                &record.agent_name,
                InboundMessage::new(
                    HUMAN_RESPONSE_SENDER,
                    format!("[Response to your request \"{}\"] {}", record.title, response),
                ),
            );
        }
        true
    }

    /// Send a control message straight to a worker, bypassing the mailbox.
    fn forward(&self, agent: &str, message: &RouterMessage) {
        let Some(worker) = self.lanes.get(agent).and_then(|l| l.worker.as_ref()) else {
            tracing::debug!(agent = %agent, "No worker to forward to");
            return;
        };
        match encode(message) {
            Ok(frame) => {
                if worker.send(frame).is_err() {
                    tracing::warn!(agent = %agent, "Worker channel closed");
                }
            }
            Err(e) => tracing::error!(agent = %agent, "{}", e),
        }
    }

    /// Close every worker's inbound channel, ending their sessions.
    pub fn shutdown(&mut self) {
        for (name, lane) in self.lanes.iter_mut() {
            if lane.worker.take().is_some() {
                tracing::debug!(agent = %name, "Closed worker channel");
            }
        }
    }

    pub fn status(&self, agent: &str) -> Option<AgentStatus> {
        self.lanes.get(agent).map(|l| l.status)
    }

    pub fn agents(&self) -> Vec<AgentInfo> {
        self.lanes
            .iter()
            .map(|(name, lane)| AgentInfo {
                name: name.clone(),
                description: lane.description.clone(),
                status: lane.status,
            })
            .collect()
    }

    pub fn mailbox_stats(&self) -> Vec<MailboxStats> {
        self.lanes
            .iter()
            .map(|(name, lane)| lane.mailbox.stats(name, lane.status))
            .collect()
    }

    /// Messages still waiting in an agent's mailbox.
    pub fn queued(&self, agent: &str) -> Vec<InboundMessage> {
        self.lanes
            .get(agent)
            .map(|l| l.mailbox.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn conversation(&self, a: &str, b: &str) -> Option<&Conversation> {
        self.conversations.between(a, b)
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.snapshot()
    }

    pub fn human_request(&self, request_id: &str) -> Option<&HumanRequestRecord> {
        self.requests.get(request_id)
    }

    pub fn human_requests(&self) -> Vec<HumanRequestRecord> {
        self.requests.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct Harness {
        router: Router,
        workers: HashMap<String, mpsc::UnboundedReceiver<Frame>>,
        notifications: mpsc::UnboundedReceiver<Notification>,
    }

    impl Harness {
        fn new(entry: &str, agents: &[&str]) -> Self {
            let (tx, notifications) = mpsc::unbounded_channel();
            let mut router = Router::new(entry, Arc::new(tx));
            let mut workers = HashMap::new();
            for name in agents {
                let (wtx, wrx) = mpsc::unbounded_channel();
                router.add_agent(name, "", wtx).unwrap();
                workers.insert(name.to_string(), wrx);
            }
            Self {
                router,
                workers,
                notifications,
            }
        }

        /// Frames the worker for `agent` has received so far.
        fn frames(&mut self, agent: &str) -> Vec<RouterMessage> {
            let rx = self.workers.get_mut(agent).unwrap();
            let mut out = Vec::new();
            while let Ok(frame) = rx.try_recv() {
                out.push(decode::<RouterMessage>(frame).unwrap());
            }
            out
        }

        fn deliveries(&mut self, agent: &str) -> Vec<InboundMessage> {
            self.frames(agent)
                .into_iter()
                .filter_map(|m| match m {
                    RouterMessage::Process { message } => Some(message),
                    _ => None,
                })
                .collect()
        }

        fn notifications(&mut self) -> Vec<Notification> {
            let mut out = Vec::new();
            while let Ok(n) = self.notifications.try_recv() {
                out.push(n);
            }
            out
        }

        fn done(&mut self, agent: &str, text: &str) {
            self.router.on_worker_event(
                agent,
                WorkerEvent::Done {
                    turn_id: "t".to_string(),
                    visible_text: text.to_string(),
                },
            );
        }
    }

    #[test]
    fn test_dispatch_to_idle_agent_delivers() {
        let mut h = Harness::new("ceo", &["ceo", "coder"]);
        h.router.dispatch("coder", InboundMessage::new("ceo", "build it"));

        let delivered = h.deliveries("coder");
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].content, "build it");
        assert_eq!(h.router.status("coder"), Some(AgentStatus::Working));
        assert_eq!(
            h.notifications(),
            vec![Notification::Status {
                agent: "coder".to_string(),
                status: AgentStatus::Working
            }]
        );
    }

    #[test]
    fn test_unknown_target_dropped() {
        let mut h = Harness::new("ceo", &["ceo"]);
        h.router.dispatch("ghost", InboundMessage::new("ceo", "hello?"));
        assert!(h.notifications().is_empty());
        assert!(h.deliveries("ceo").is_empty());
        assert!(h.router.queued("ghost").is_empty());
    }

    #[test]
    fn test_single_flight_and_fifo() {
        let mut h = Harness::new("ceo", &["ceo", "coder"]);
        for i in 0..3 {
            h.router
                .dispatch("coder", InboundMessage::new("ceo", format!("job {}", i)));
        }

        // Only the first is in flight.
        assert_eq!(h.deliveries("coder").len(), 1);
        assert_eq!(h.router.queued("coder").len(), 2);

        h.done("coder", "");
        let next = h.deliveries("coder");
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].content, "job 1");

        h.done("coder", "");
        assert_eq!(h.deliveries("coder")[0].content, "job 2");

        h.done("coder", "");
        assert!(h.deliveries("coder").is_empty());
        assert_eq!(h.router.status("coder"), Some(AgentStatus::Idle));
    }

    #[test]
    fn test_send_to_busy_agent_is_deferred() {
        let mut h = Harness::new("ceo", &["ceo", "a", "b"]);
        h.router.dispatch("b", InboundMessage::new("ceo", "work"));
        h.deliveries("b");

        h.router.on_worker_event(
            "a",
            WorkerEvent::Send {
                to: "b".to_string(),
                message: "ping".to_string(),
            },
        );

        let conv = h.router.conversation("a", "b").unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].text, "ping");
        assert_eq!(conv.messages[0].from, "a");
        assert!(h.deliveries("b").is_empty());

        h.done("b", "");
        let delivered = h.deliveries("b");
        assert_eq!(delivered, vec![InboundMessage::new("a", "ping")]);
    }

    #[test]
    fn test_send_notifies_inter_agent() {
        let mut h = Harness::new("ceo", &["ceo", "a"]);
        h.router.on_worker_event(
            "ceo",
            WorkerEvent::Send {
                to: "a".to_string(),
                message: "hi".to_string(),
            },
        );
        let notes = h.notifications();
        assert_eq!(
            notes[0],
            Notification::InterAgent {
                from: "ceo".to_string(),
                to: "a".to_string(),
                message: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_entry_conversation_order() {
        let mut h = Harness::new("ceo", &["ceo"]);
        h.router.send("hello", vec![]);

        let conv = h.router.conversation("ceo", HUMAN_SENDER).unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.is_human);

        h.router.on_worker_event(
            "ceo",
            WorkerEvent::TurnStarted {
                turn_id: "t1".to_string(),
            },
        );
        h.router.on_worker_event(
            "ceo",
            WorkerEvent::Done {
                turn_id: "t1".to_string(),
                visible_text: "hi there".to_string(),
            },
        );

        let conv = h.router.conversation("user", "ceo").unwrap();
        let log: Vec<(&str, &str)> = conv
            .messages
            .iter()
            .map(|m| (m.from.as_str(), m.text.as_str()))
            .collect();
        assert_eq!(log, vec![("user", "hello"), ("ceo", "hi there")]);
        assert!(h.notifications().contains(&Notification::Response {
            agent: "ceo".to_string(),
            turn_id: "t1".to_string(),
            text: "hi there".to_string()
        }));
    }

    #[test]
    fn test_non_entry_visible_text_not_stored() {
        let mut h = Harness::new("ceo", &["ceo", "coder"]);
        h.router.dispatch("coder", InboundMessage::new("ceo", "x"));
        h.done("coder", "internal musing");
        assert!(h.router.conversation("coder", HUMAN_SENDER).is_none());
    }

    #[test]
    fn test_empty_visible_text_not_stored() {
        let mut h = Harness::new("ceo", &["ceo"]);
        h.router.send("hello", vec![]);
        h.done("ceo", "");
        assert_eq!(h.router.conversation("ceo", "user").unwrap().messages.len(), 1);
    }

    #[test]
    fn test_cron_fire_goes_through_mailbox() {
        let mut h = Harness::new("ceo", &["ceo"]);
        h.router.dispatch("ceo", InboundMessage::new("user", "busy"));
        h.deliveries("ceo");

        h.router.on_worker_event(
            "ceo",
            WorkerEvent::CronFire {
                job_id: "ceo-1".to_string(),
                job_name: "daily-check".to_string(),
                message: "check the build".to_string(),
            },
        );
        assert!(h.deliveries("ceo").is_empty());

        h.done("ceo", "");
        let delivered = h.deliveries("ceo");
        assert_eq!(
            delivered,
            vec![InboundMessage::new(
                "scheduler",
                "[Scheduled job \"daily-check\" fired] check the build"
            )]
        );
    }

    fn raise_request(h: &mut Harness, agent: &str, id: &str) {
        h.router.on_worker_event(
            agent,
            WorkerEvent::HumanRequest {
                request_id: id.to_string(),
                agent_name: agent.to_string(),
                title: "Need approval".to_string(),
                description: "Ship it?".to_string(),
            },
        );
    }

    #[test]
    fn test_dismissed_request_enqueues_nothing() {
        let mut h = Harness::new("ceo", &["ceo"]);
        h.router.dispatch("ceo", InboundMessage::new("user", "busy"));
        h.frames("ceo");
        raise_request(&mut h, "ceo", "r1");

        let pending = h.router.human_requests();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].is_pending());

        assert!(h.router.resolve_human_request("r1", "", true));
        let record = h.router.human_request("r1").unwrap();
        assert_eq!(record.status, super::super::RequestStatus::Dismissed);
        assert!(h.router.queued("ceo").is_empty());

        let frames = h.frames("ceo");
        assert_eq!(
            frames,
            vec![RouterMessage::ResolveHumanRequest {
                request_id: "r1".to_string(),
                response: String::new(),
                dismissed: true
            }]
        );
    }

    #[test]
    fn test_resolved_request_enqueues_answer() {
        let mut h = Harness::new("ceo", &["ceo"]);
        h.router.dispatch("ceo", InboundMessage::new("user", "busy"));
        h.frames("ceo");
        raise_request(&mut h, "ceo", "r1");

        assert!(h.router.resolve_human_request("r1", "ok", false));
        assert_eq!(
            h.router.human_request("r1").unwrap().status,
            super::super::RequestStatus::Resolved
        );

        let queued = h.router.queued("ceo");
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].from, HUMAN_RESPONSE_SENDER);
        assert_eq!(queued[0].content, "[Response to your request \"Need approval\"] ok");
    }

    #[test]
    fn test_resolve_twice_is_noop() {
        let mut h = Harness::new("ceo", &["ceo"]);
        raise_request(&mut h, "ceo", "r1");
        assert!(h.router.resolve_human_request("r1", "ok", false));
        let first = h.router.human_request("r1").unwrap().clone();
        h.frames("ceo");

        assert!(!h.router.resolve_human_request("r1", "no", true));
        assert_eq!(h.router.human_request("r1").unwrap(), &first);
        assert!(h.frames("ceo").is_empty());
        assert!(!h.router.resolve_human_request("missing", "ok", false));
    }

    #[test]
    fn test_protocol_violation_changes_nothing() {
        crate::logging::init_test();
        let mut h = Harness::new("ceo", &["ceo", "b"]);
        let err = h
            .router
            .handle_frame("ceo", json!({"type": "send", "to": "b"}))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(crate::protocol::ProtocolError::Malformed { .. })
        ));
        assert!(h.router.conversations().is_empty());
        assert!(h.deliveries("b").is_empty());
        assert!(h.notifications().is_empty());

        assert!(h.router.handle_frame("ceo", json!({"type": "bogus"})).is_err());
        assert!(h
            .router
            .handle_frame("ceo", json!({"type": "send", "to": "b", "message": "ok"}))
            .is_ok());
        assert_eq!(h.deliveries("b").len(), 1);
    }

    #[test]
    fn test_reserved_and_duplicate_names_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut router = Router::new("ceo", Arc::new(crate::notify::TracingSink));
        assert!(router.add_agent("user", "", tx.clone()).is_err());
        assert!(router.add_agent("scheduler", "", tx.clone()).is_err());
        router.add_agent("ceo", "", tx.clone()).unwrap();
        assert!(router.add_agent("ceo", "", tx).is_err());
    }

    #[test]
    fn test_init_lists_peers() {
        let mut h = Harness::new("ceo", &["ceo", "coder", "qa"]);
        h.router.init_workers(|name| format!("/ws/{}", name));
        assert_eq!(
            h.frames("coder"),
            vec![RouterMessage::Init {
                agent_name: "coder".to_string(),
                workspace: "/ws/coder".to_string(),
                peer_agent_names: vec!["ceo".to_string(), "qa".to_string()]
            }]
        );
    }

    #[test]
    fn test_email_becomes_entry_message() {
        let mut h = Harness::new("ceo", &["ceo"]);
        h.router.send_email("bob@example.com", "Invoice", "Please pay");
        let delivered = h.deliveries("ceo");
        assert_eq!(
            delivered[0].content,
            "[Email from bob@example.com]\nSubject: Invoice\nPlease pay"
        );
        assert_eq!(delivered[0].from, HUMAN_SENDER);
    }

    #[test]
    fn test_send_keeps_attachments() {
        let mut h = Harness::new("ceo", &["ceo"]);
        let diagram = Attachment {
            id: "1".to_string(),
            filename: "diagram.png".to_string(),
            media_type: "image/png".to_string(),
            url: "https://files.example.com/1".to_string(),
        };
        h.router.send("see attached", vec![diagram.clone()]);

        let conv = h.router.conversation("ceo", HUMAN_SENDER).unwrap();
        assert_eq!(conv.messages[0].attachments, vec![diagram.clone()]);

        match h.frames("ceo").as_slice() {
            [RouterMessage::Process { message }] => {
                assert_eq!(message.content, "see attached");
                assert_eq!(message.attachments, vec![diagram]);
            }
            other => panic!("unexpected frames {:?}", other),
        }
    }

    #[test]
    fn test_closed_worker_keeps_message_queued() {
        let mut h = Harness::new("ceo", &["ceo", "coder"]);
        drop(h.workers.remove("coder"));

        h.router.dispatch("coder", InboundMessage::new("ceo", "build it"));
        assert_eq!(h.router.status("coder"), Some(AgentStatus::Idle));
        assert_eq!(h.router.queued("coder"), vec![InboundMessage::new("ceo", "build it")]);
        assert!(h.notifications().is_empty());

        let stats = h.router.mailbox_stats();
        let coder = stats.iter().find(|s| s.agent == "coder").unwrap();
        assert_eq!(coder.total_delivered, 0);
    }

    #[test]
    fn test_shutdown_stops_delivery() {
        let mut h = Harness::new("ceo", &["ceo"]);
        h.router.shutdown();
        h.router.dispatch("ceo", InboundMessage::new("user", "anyone?"));
        assert_eq!(h.router.status("ceo"), Some(AgentStatus::Idle));
        assert_eq!(h.router.queued("ceo").len(), 1);
    }
}
