//! Human-in-the-loop requests.
//!
//! A request starts `pending` and moves exactly once, to `resolved` or
//! `dismissed`. The same registry type backs both sides of the worker
//! boundary: the router keeps the operator-facing copy, each worker keeps its
//! own so the agent can inspect and cancel what it asked for.

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

use super::conversation::now_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Resolved => write!(f, "resolved"),
            RequestStatus::Dismissed => write!(f, "dismissed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanRequestRecord {
    pub id: String,

    /// Agent that raised the request
    pub agent_name: String,

    pub title: String,
    pub description: String,
    pub status: RequestStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// Unix timestamp (ms)
    pub created_at: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
}

impl HumanRequestRecord {
    pub fn new(id: &str, agent_name: &str, title: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            agent_name: agent_name.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            status: RequestStatus::Pending,
            response: None,
            created_at: now_timestamp(),
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Apply the operator's answer. Only a pending record changes; the
    /// return value says whether it did.
    pub fn resolve(&mut self, response: &str, dismissed: bool) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = if dismissed {
            RequestStatus::Dismissed
        } else {
            RequestStatus::Resolved
        };
        self.response = Some(response.to_string());
        self.resolved_at = Some(now_timestamp());
        true
    }
}

impl std::fmt::Display for HumanRequestRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "- {} \"{}\" - {}", self.id, self.title, self.status)?;
        if let Some(response) = &self.response {
            write!(f, " | Response: {}", response)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CancelError {
    #[error("No request found with ID \"{0}\".")]
    NotFound(String),

    #[error("Request \"{id}\" is already {status}.")]
    NotPending { id: String, status: RequestStatus },
}

/// Records keyed by request id, listed in creation order.
#[derive(Debug, Default)]
pub struct HumanRequestRegistry {
    records: HashMap<String, HumanRequestRecord>,
    order: Vec<String>,
}

impl HumanRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending record. A duplicate id leaves the existing record
    /// untouched and returns `None`.
    pub fn create(
        &mut self,
        id: &str,
        agent_name: &str,
        title: &str,
        description: &str,
    ) -> Option<HumanRequestRecord> {
        if self.records.contains_key(id) {
            tracing::warn!(request_id = %id, "Ignoring duplicate human request id");
            return None;
        }
        let record = HumanRequestRecord::new(id, agent_name, title, description);
        self.order.push(id.to_string());
        self.records.insert(id.to_string(), record.clone());
        Some(record)
    }

    /// Resolve a pending record. Returns the updated record, or `None` when
    /// the id is unknown or the record already left `pending`.
    pub fn resolve(
        &mut self,
        id: &str,
        response: &str,
        dismissed: bool,
    ) -> Option<HumanRequestRecord> {
        let record = self.records.get_mut(id)?;
        if !record.resolve(response, dismissed) {
            tracing::debug!(request_id = %id, status = %record.status, "Request already settled");
            return None;
        }
        Some(record.clone())
    }

    /// Withdraw a request nobody has answered yet. The record is removed.
    pub fn cancel(&mut self, id: &str) -> Result<HumanRequestRecord, CancelError> {
        let record = self
            .records
            .get(id)
            .ok_or_else(|| CancelError::NotFound(id.to_string()))?;
        if !record.is_pending() {
            return Err(CancelError::NotPending {
                id: id.to_string(),
                status: record.status,
            });
        }
        self.order.retain(|r| r != id);
        self.records
            .remove(id)
            .ok_or_else(|| CancelError::NotFound(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<&HumanRequestRecord> {
        self.records.get(id)
    }

    /// Snapshot of every record, oldest first.
    pub fn list(&self) -> Vec<HumanRequestRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
