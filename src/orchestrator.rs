//! Orchestrator: the router actor and its handle.
//!
//! The router runs in a single task that selects over operator commands and
//! worker events, so every state change is one short synchronous step.
//! Callers talk to it through [`OrchestratorHandle`]; queries are answered
//! with snapshots over a oneshot channel.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{validate_settings, Settings};
use crate::core::{AgentInfo, Conversation, HumanRequestRecord, MailboxStats, Router};
use crate::error::{Error, Result};
use crate::notify::NotificationSink;
use crate::protocol::{Attachment, Frame};
use crate::worker::{spawn_worker, LogMailer, Mailer, Reasoner};

enum Command {
    Send {
        text: String,
        attachments: Vec<Attachment>,
    },
    Email {
        from: String,
        subject: String,
        body: String,
    },
    Resolve {
        request_id: String,
        response: String,
        dismissed: bool,
        reply: oneshot::Sender<bool>,
    },
    Agents(oneshot::Sender<Vec<AgentInfo>>),
    Conversations(oneshot::Sender<Vec<Conversation>>),
    HumanRequests(oneshot::Sender<Vec<HumanRequestRecord>>),
    MailboxStats(oneshot::Sender<Vec<MailboxStats>>),
    Shutdown,
}

/// Start one worker per configured agent and the router task.
///
/// `reasoner_for` picks the reasoner hosted by each agent's worker. Outbound
/// email only goes to the log. Must be called from within a tokio runtime.
pub fn start<F>(
    settings: &Settings,
    reasoner_for: F,
    sink: Arc<dyn NotificationSink>,
) -> Result<OrchestratorHandle>
where
    F: Fn(&str) -> Arc<dyn Reasoner>,
{
    start_with_mailer(settings, reasoner_for, Arc::new(LogMailer), sink)
}

/// Like [`start`], with every agent's `send_email` tool going to `mailer`.
pub fn start_with_mailer<F>(
    settings: &Settings,
    reasoner_for: F,
    mailer: Arc<dyn Mailer>,
    sink: Arc<dyn NotificationSink>,
) -> Result<OrchestratorHandle>
where
    F: Fn(&str) -> Arc<dyn Reasoner>,
{
    validate_settings(settings)?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut router = Router::new(settings.entry_agent.clone(), sink);
    let mut workers = Vec::with_capacity(settings.agents.len());

    for (name, agent) in &settings.agents {
        let workspace = settings.workspace_for(name);
        if let Err(e) = std::fs::create_dir_all(&workspace) {
            tracing::warn!(agent = %name, "Could not create workspace {}: {}", workspace.display(), e);
        }

        let (tx, handle) = spawn_worker(name, reasoner_for(name), mailer.clone(), events_tx.clone());
        router.add_agent(name, &agent.description, tx)?;
        workers.push(handle);
    }
    drop(events_tx);

    router.init_workers(|name| settings.workspace_for(name).display().to_string());

    let (commands, commands_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_router(router, commands_rx, events_rx, workers));

    tracing::info!(
        entry = %settings.entry_agent,
        agents = settings.agents.len(),
        "Orchestrator started"
    );
    Ok(OrchestratorHandle { commands, task })
}

async fn run_router(
    mut router: Router,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<(String, Frame)>,
    workers: Vec<JoinHandle<()>>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => apply(&mut router, command),
            },
            Some((agent, frame)) = events.recv() => {
                if let Err(e) = router.handle_frame(&agent, frame) {
                    tracing::warn!(agent = %agent, "Rejected worker frame: {}", e);
                }
            }
        }
    }

    tracing::info!("Orchestrator shutting down");
    router.shutdown();
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!("Worker task failed: {}", e);
        }
    }
}

fn apply(router: &mut Router, command: Command) {
    match command {
        Command::Send { text, attachments } => router.send(&text, attachments),
        Command::Email {
            from,
            subject,
            body,
        } => router.send_email(&from, &subject, &body),
        Command::Resolve {
            request_id,
            response,
            dismissed,
            reply,
        } => {
            let _ = reply.send(router.resolve_human_request(&request_id, &response, dismissed));
        }
        Command::Agents(reply) => {
            let _ = reply.send(router.agents());
        }
        Command::Conversations(reply) => {
            let _ = reply.send(router.conversations());
        }
        Command::HumanRequests(reply) => {
            let _ = reply.send(router.human_requests());
        }
        Command::MailboxStats(reply) => {
            let _ = reply.send(router.mailbox_stats());
        }
        // Handled by the loop.
        Command::Shutdown => {}
    }
}

/// Handle on a running orchestrator.
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    fn submit(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Channel("orchestrator stopped".to_string()))
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.submit(make(tx))?;
        rx.await
            .map_err(|_| Error::Channel("orchestrator dropped the reply".to_string()))
    }

    /// Operator message to the entry agent.
    pub fn send(&self, text: impl Into<String>, attachments: Vec<Attachment>) -> Result<()> {
        self.submit(Command::Send {
            text: text.into(),
            attachments,
        })
    }

    pub fn send_email(&self, from: &str, subject: &str, body: &str) -> Result<()> {
        self.submit(Command::Email {
            from: from.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }

    /// Answer a human request. `Ok(false)` when it was unknown or already
    /// settled.
    pub async fn resolve_human_request(
        &self,
        request_id: &str,
        response: &str,
        dismissed: bool,
    ) -> Result<bool> {
        let request_id = request_id.to_string();
        let response = response.to_string();
        self.query(|reply| Command::Resolve {
            request_id,
            response,
            dismissed,
            reply,
        })
        .await
    }

    pub async fn agents(&self) -> Result<Vec<AgentInfo>> {
        self.query(Command::Agents).await
    }

    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        self.query(Command::Conversations).await
    }

    pub async fn human_requests(&self) -> Result<Vec<HumanRequestRecord>> {
        self.query(Command::HumanRequests).await
    }

    pub async fn mailbox_stats(&self) -> Result<Vec<MailboxStats>> {
        self.query(Command::MailboxStats).await
    }

    /// Stop the router, end every worker session and wait for them.
    pub async fn shutdown(self) -> Result<()> {
        // Already stopped is fine.
        let _ = self.commands.send(Command::Shutdown);
        self.task
            .await
            .map_err(|e| Error::Other(format!("orchestrator task failed: {}", e)))
    }
}
