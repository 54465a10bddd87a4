//! CLI commands for agentlane using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use crate::config::{
    get_settings_path, load_settings_from, load_settings_or_default, save_settings, Settings,
};
use crate::notify::{BroadcastSink, Notification};
use crate::orchestrator::{self, OrchestratorHandle};
use crate::worker::{EchoReasoner, Reasoner};

/// agentlane - Run a team of agents behind per-agent mailboxes.
#[derive(Parser)]
#[command(name = "agentlane")]
#[command(version)]
#[command(about = "agentlane - Mailbox-routed multi-agent orchestrator", long_about = None)]
pub struct Commands {
    /// Settings file (defaults to ~/.agentlane/settings.json)
    #[arg(long, global = true, env = "AGENTLANE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the agents and chat with the entry agent on stdin
    Run,

    /// List configured agents
    Agents,

    /// Validate the settings file
    Check,

    /// Write a default settings file
    Setup {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Run => cmd_run(self.config.as_deref()).await,
            Command::Agents => cmd_agents(self.config.as_deref()),
            Command::Check => cmd_check(self.config.as_deref()),
            Command::Setup { force } => cmd_setup(self.config.as_deref(), *force),
        }
    }
}

/// An explicit path must load; the default location falls back to defaults.
fn settings(config: Option<&Path>) -> Result<Settings> {
    match config {
        Some(path) => Ok(load_settings_from(path)?),
        None => Ok(load_settings_or_default(None)),
    }
}

// Command implementations

async fn cmd_run(config: Option<&Path>) -> Result<()> {
    let settings = settings(config)?;
    let sink = Arc::new(BroadcastSink::new(256));
    let notifications = sink.subscribe();

    let reasoner: Arc<dyn Reasoner> = Arc::new(EchoReasoner);
    let handle = orchestrator::start(&settings, |_| reasoner.clone(), sink)?;

    println!(
        "agentlane running with {} agent(s); talking to '{}'. Type /help for commands.",
        settings.agents.len(),
        settings.entry_agent
    );

    let result = repl(&handle, notifications).await;
    handle.shutdown().await?;
    println!("Bye.");
    result
}

async fn repl(
    handle: &OrchestratorHandle,
    mut notifications: broadcast::Receiver<Notification>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { return Ok(()) };
                if !handle_line(handle, line.trim()).await? {
                    return Ok(());
                }
            }
            note = notifications.recv() => match note {
                Ok(note) => print_notification(&note),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Missed {} notifications", n);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }
}

/// Returns `false` when the operator asked to quit.
async fn handle_line(handle: &OrchestratorHandle, line: &str) -> Result<bool> {
    if line.is_empty() {
        return Ok(true);
    }
    let Some(command) = line.strip_prefix('/') else {
        handle.send(line, Vec::new())?;
        return Ok(true);
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((command, ""));

    match name {
        "quit" | "exit" => return Ok(false),
        "help" => print_help(),
        "agents" => {
            for agent in handle.agents().await? {
                println!("  {:<16} {:<8} {}", agent.name, agent.status, agent.description);
            }
        }
        "mailboxes" => {
            for stats in handle.mailbox_stats().await? {
                println!("  {}", stats);
            }
        }
        "history" => {
            for conv in handle.conversations().await? {
                println!("== {} ==", conv.id);
                for msg in &conv.messages {
                    println!("  {}: {}", msg.from, msg.text);
                }
            }
        }
        "requests" => {
            let requests = handle.human_requests().await?;
            if requests.is_empty() {
                println!("No human requests.");
            }
            for request in requests {
                println!("{} (from {})", request, request.agent_name);
            }
        }
        "resolve" => {
            let Some((id, response)) = rest.split_once(char::is_whitespace) else {
                println!("Usage: /resolve <request-id> <response>");
                return Ok(true);
            };
            report_resolution(id, handle.resolve_human_request(id, response.trim(), false).await?);
        }
        "dismiss" => {
            if rest.is_empty() {
                println!("Usage: /dismiss <request-id>");
                return Ok(true);
            }
            report_resolution(rest, handle.resolve_human_request(rest, "", true).await?);
        }
        "email" => {
            // /email <from> <subject> | <body>
            let parsed = rest
                .split_once(char::is_whitespace)
                .and_then(|(from, rest)| rest.split_once('|').map(|(s, b)| (from, s.trim(), b.trim())));
            match parsed {
                Some((from, subject, body)) => handle.send_email(from, subject, body)?,
                None => println!("Usage: /email <from> <subject> | <body>"),
            }
        }
        other => println!("Unknown command: /{}", other),
    }
    Ok(true)
}

fn report_resolution(id: &str, applied: bool) {
    if applied {
        println!("Request {} settled.", id);
    } else {
        println!("No pending request with ID {}.", id);
    }
}

fn print_help() {
    println!("  <text>                         message the entry agent");
    println!("  /agents                        list agents and status");
    println!("  /mailboxes                     mailbox statistics");
    println!("  /history                       print all conversations");
    println!("  /requests                      list human requests");
    println!("  /resolve <id> <response>       answer a human request");
    println!("  /dismiss <id>                  dismiss a human request");
    println!("  /email <from> <subject> | <body>");
    println!("  /quit                          stop all agents");
}

fn print_notification(note: &Notification) {
    match note {
        Notification::Response { agent, text, .. } => println!("[{}] {}", agent, text),
        Notification::InterAgent { from, to, message } => {
            println!("  ({} -> {}) {}", from, to, message)
        }
        Notification::HumanRequest { request } => {
            println!(
                "  ! {} asks: {} ({})\n    {}\n    /resolve {} <response>  or  /dismiss {}",
                request.agent_name,
                request.title,
                request.id,
                request.description,
                request.id,
                request.id
            );
        }
        Notification::ToolUse {
            agent, tool_name, ..
        } => tracing::debug!(agent = %agent, tool = %tool_name, "Tool use"),
        _ => {}
    }
}

fn cmd_agents(config: Option<&Path>) -> Result<()> {
    let settings = settings(config)?;
    println!("Agents:");
    for (name, agent) in &settings.agents {
        let marker = if *name == settings.entry_agent { "*" } else { " " };
        println!(
            " {} {:<16} {:<32} {}",
            marker,
            name,
            agent.description,
            settings.workspace_for(name).display()
        );
    }
    println!("\n* entry agent");
    Ok(())
}

fn settings_path(config: Option<&Path>) -> Result<PathBuf> {
    match config {
        Some(p) => Ok(p.to_path_buf()),
        None => Ok(get_settings_path()?),
    }
}

fn cmd_check(config: Option<&Path>) -> Result<()> {
    let path = settings_path(config)?;
    let settings = load_settings_from(&path)?;
    println!(
        "✓ {} is valid: {} agent(s), entry agent '{}'",
        path.display(),
        settings.agents.len(),
        settings.entry_agent
    );
    Ok(())
}

fn cmd_setup(config: Option<&Path>, force: bool) -> Result<()> {
    let path = settings_path(config)?;
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let settings = Settings::default();
    save_settings(&settings, &path)?;
    println!("✓ Saved settings to {}", path.display());
    println!("  Entry agent: '{}'", settings.entry_agent);
    println!("\nNext: run 'agentlane run' to start the agents");
    Ok(())
}
