//! Per-agent mailboxes.
//!
//! A mailbox is a plain FIFO lane: no priorities, no reordering, no size
//! limit. The router is the only owner.

use serde::Serialize;
use std::collections::VecDeque;

use crate::protocol::{AgentStatus, InboundMessage};

/// Pending inbound messages for one agent.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: VecDeque<InboundMessage>,

    /// Total messages ever enqueued
    total_received: u64,

    /// Total messages handed to the worker
    total_delivered: u64,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the tail.
    pub fn push(&mut self, message: InboundMessage) {
        self.queue.push_back(message);
        self.total_received += 1;
    }

    /// Take the head of the lane.
    pub fn pop(&mut self) -> Option<InboundMessage> {
        let message = self.queue.pop_front()?;
        self.total_delivered += 1;
        Some(message)
    }

    pub fn peek(&self) -> Option<&InboundMessage> {
        self.queue.front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InboundMessage> {
        self.queue.iter()
    }

    pub fn stats(&self, agent: &str, status: AgentStatus) -> MailboxStats {
        MailboxStats {
            agent: agent.to_string(),
            status,
            pending: self.queue.len(),
            total_received: self.total_received,
            total_delivered: self.total_delivered,
        }
    }
}

/// Mailbox statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxStats {
    pub agent: String,
    pub status: AgentStatus,
    pub pending: usize,
    pub total_received: u64,
    pub total_delivered: u64,
}

impl std::fmt::Display for MailboxStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<16} {:<8} pending: {:<4} received: {:<6} delivered: {}",
            self.agent, self.status, self.pending, self.total_received, self.total_delivered
        )
    }
}
