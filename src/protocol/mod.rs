//! Router <-> worker protocol for agentlane.
//!
//! This module defines the contract that crosses the execution boundary:
//! - Payload types (inbound messages, attachments, agent status)
//! - The closed router->worker and worker->router message sets
//! - Frame validation on receipt

pub mod message;
pub mod types;

pub use message::{decode, encode, Frame, ProtocolError, RouterMessage, WireMessage, WorkerEvent};
pub use types::{
    AgentStatus, Attachment, InboundMessage, HUMAN_RESPONSE_SENDER, HUMAN_SENDER,
    RESERVED_NAMES, SCHEDULER_SENDER,
};
