//! agentlane library root.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod protocol;
pub mod schedule;
pub mod worker;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use crate::core::{ConversationStore, HumanRequestRegistry, Router};
pub use error::{Error, Result};
pub use notify::{Notification, NotificationSink};
pub use orchestrator::OrchestratorHandle;
pub use worker::{EchoReasoner, Reasoner};
