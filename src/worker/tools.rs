//! Tools a reasoner can call during a turn.
//!
//! Every tool returns short text. Failures come back as an error result,
//! never as a Rust error crossing the worker boundary.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::mailer::Mailer;
use super::runtime::EventPort;
use crate::core::HumanRequestRegistry;
use crate::protocol::WorkerEvent;
use crate::schedule::{FireCallback, ScheduleKind, ScheduleRegistry, ScheduledFire};

/// Tool names, in the order they are advertised.
pub const TOOL_NAMES: [&str; 8] = [
    "team_chat",
    "schedule",
    "list_schedules",
    "cancel_schedule",
    "request_human",
    "list_human_requests",
    "cancel_human_request",
    "send_email",
];

/// Result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TeamChatArgs {
    to: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleArgs {
    name: String,
    message: String,
    schedule_type: String,
    schedule: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelScheduleArgs {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct RequestHumanArgs {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelHumanRequestArgs {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct SendEmailArgs {
    to: String,
    subject: String,
    body: String,
}

fn parse_args<T: DeserializeOwned>(tool: &str, input: &Value) -> Result<T, ToolOutput> {
    T::deserialize(input)
        .map_err(|e| ToolOutput::error(format!("Invalid arguments for {}: {}", tool, e)))
}

/// Per-agent tool state: who the agent may talk to, its scheduled jobs and
/// the human requests it has raised.
pub struct Toolbox {
    agent: String,
    peers: Vec<String>,
    port: EventPort,
    schedules: ScheduleRegistry,
    requests: HumanRequestRegistry,
    mailer: Arc<dyn Mailer>,
}

impl Toolbox {
    /// Must be called from within a tokio runtime.
    pub fn new(agent: &str, peers: Vec<String>, port: EventPort, mailer: Arc<dyn Mailer>) -> Self {
        let fire_port = port.clone();
        let on_fire: FireCallback = Arc::new(move |fire: ScheduledFire| {
            fire_port.emit(WorkerEvent::CronFire {
                job_id: fire.job_id,
                job_name: fire.job_name,
                message: fire.message,
            });
        });

        Self {
            agent: agent.to_string(),
            peers,
            port,
            schedules: ScheduleRegistry::new(agent, on_fire),
            requests: HumanRequestRegistry::new(),
            mailer,
        }
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    pub fn schedules(&self) -> &ScheduleRegistry {
        &self.schedules
    }

    pub fn requests(&self) -> &HumanRequestRegistry {
        &self.requests
    }

    /// Run a tool by name.
    pub fn call(&mut self, name: &str, input: &Value) -> ToolOutput {
        let result = match name {
            "team_chat" => parse_args::<TeamChatArgs>(name, input).map(|a| self.team_chat(a)),
            "schedule" => parse_args::<ScheduleArgs>(name, input).map(|a| self.schedule(a)),
            "list_schedules" => Ok(self.list_schedules()),
            "cancel_schedule" => {
                parse_args::<CancelScheduleArgs>(name, input).map(|a| self.cancel_schedule(a))
            }
            "request_human" => {
                parse_args::<RequestHumanArgs>(name, input).map(|a| self.request_human(a))
            }
            "list_human_requests" => Ok(self.list_human_requests()),
            "cancel_human_request" => {
                parse_args::<CancelHumanRequestArgs>(name, input)
                    .map(|a| self.cancel_human_request(a))
            }
            "send_email" => parse_args::<SendEmailArgs>(name, input).map(|a| self.send_email(a)),
            _ => Err(ToolOutput::error(format!("Unknown tool: {}", name))),
        };
        result.unwrap_or_else(|e| e)
    }

    fn team_chat(&self, args: TeamChatArgs) -> ToolOutput {
        if args.to == self.agent {
            return ToolOutput::error("Cannot message yourself");
        }
        if !self.peers.contains(&args.to) {
            return ToolOutput::error(format!(
                "Unknown agent \"{}\". Available: {}",
                args.to,
                self.peers.join(", ")
            ));
        }
        self.port.emit(WorkerEvent::Send {
            to: args.to.clone(),
            message: args.message,
        });
        ToolOutput::ok(format!("Message sent to {}", args.to))
    }

    fn schedule(&self, args: ScheduleArgs) -> ToolOutput {
        let scheduled = args
            .schedule_type
            .parse::<ScheduleKind>()
            .and_then(|kind| {
                self.schedules
                    .schedule(&args.name, &args.message, kind, &args.schedule)
            });
        match scheduled {
            Ok(job) => {
                let next = job
                    .next_run
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string());
                ToolOutput::ok(format!(
                    "Scheduled job \"{}\" ({}). Next run: {}.",
                    args.name, job.job_id, next
                ))
            }
            Err(e) => ToolOutput::error(format!("Failed to schedule job: {}", e)),
        }
    }

    fn list_schedules(&self) -> ToolOutput {
        let jobs = self.schedules.list();
        if jobs.is_empty() {
            return ToolOutput::ok("No active scheduled jobs.");
        }
        let lines: Vec<String> = jobs.iter().map(|j| j.to_string()).collect();
        ToolOutput::ok(lines.join("\n"))
    }

    fn cancel_schedule(&self, args: CancelScheduleArgs) -> ToolOutput {
        match self.schedules.cancel(&args.job_id) {
            Some(job) => ToolOutput::ok(format!("Cancelled job \"{}\" ({}).", job.name, job.id)),
            None => ToolOutput::error(format!("No active job found with ID \"{}\".", args.job_id)),
        }
    }

    fn request_human(&mut self, args: RequestHumanArgs) -> ToolOutput {
        let id = uuid::Uuid::new_v4().to_string();
        if self
            .requests
            .create(&id, &self.agent, &args.title, &args.description)
            .is_none()
        {
            return ToolOutput::error("Failed to record request");
        }
        self.port.emit(WorkerEvent::HumanRequest {
            request_id: id.clone(),
            agent_name: self.agent.clone(),
            title: args.title,
            description: args.description,
        });
        ToolOutput::ok(format!(
            "Request submitted ({}). The human will be notified. Continue working on other tasks; the response will arrive as a message.",
            id
        ))
    }

    fn list_human_requests(&self) -> ToolOutput {
        let records = self.requests.list();
        if records.is_empty() {
            return ToolOutput::ok("No human requests have been made.");
        }
        let lines: Vec<String> = records.iter().map(|r| r.to_string()).collect();
        ToolOutput::ok(lines.join("\n"))
    }

    fn cancel_human_request(&mut self, args: CancelHumanRequestArgs) -> ToolOutput {
        match self.requests.cancel(&args.request_id) {
            Ok(record) => ToolOutput::ok(format!(
                "Cancelled request \"{}\" ({}).",
                record.title, record.id
            )),
            Err(e) => ToolOutput::error(e.to_string()),
        }
    }

    fn send_email(&self, args: SendEmailArgs) -> ToolOutput {
        match self.mailer.send(&args.to, &args.subject, &args.body) {
            Ok(()) => ToolOutput::ok(format!("Email sent to {}", args.to)),
            Err(e) => {
                tracing::warn!(agent = %self.agent, to = %args.to, "Email failed: {}", e);
                ToolOutput::error(format!("Failed to send email: {}", e))
            }
        }
    }

    /// Apply the operator's answer to a request this agent raised.
    pub fn resolve_request(&mut self, request_id: &str, response: &str, dismissed: bool) {
        if self.requests.resolve(request_id, response, dismissed).is_none() {
            tracing::debug!(agent = %self.agent, request_id = %request_id, "No pending request to resolve");
        }
    }

    /// Stop every scheduled job.
    pub fn cleanup(&mut self) {
        self.schedules.cleanup();
        tracing::debug!(agent = %self.agent, "Toolbox cleaned up");
    }
}
