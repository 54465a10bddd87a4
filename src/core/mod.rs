//! Core module - Mailboxes, routing, and conversation management.
//!
//! This module contains the heart of agentlane's message processing:
//! - Per-agent FIFO mailboxes
//! - The router state machine
//! - Conversation and human request bookkeeping

pub mod conversation;
pub mod queue;
pub mod requests;
pub mod router;

pub use conversation::{canonical_id, Conversation, ConversationStore, StoredMessage};
pub use queue::{Mailbox, MailboxStats};
pub use requests::{CancelError, HumanRequestRecord, HumanRequestRegistry, RequestStatus};
pub use router::{AgentInfo, Router};
