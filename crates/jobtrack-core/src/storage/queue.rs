//! Mutation queue entries
//!
//! Every local mutation made while disconnected is recorded here and
//! replayed against the remote backend once connectivity returns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{EntityType, Row};

/// What a queued mutation does to its row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(MutationKind::Create),
            "update" => Ok(MutationKind::Update),
            "delete" => Ok(MutationKind::Delete),
            other => Err(format!("unknown mutation kind '{}'", other)),
        }
    }
}

/// A mutation about to be appended to the queue
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueEntry {
    pub kind: MutationKind,
    pub entity: EntityType,
    /// The full row, or `{id}` for deletes
    pub payload: Row,
    /// Enqueue time, epoch milliseconds
    pub timestamp: i64,
}

impl NewQueueEntry {
    /// Entry stamped with the current time
    pub fn now(kind: MutationKind, entity: EntityType, payload: Row) -> Self {
        Self {
            kind,
            entity,
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Delete entry carrying only the identifier
    pub fn delete(entity: EntityType, id: &str) -> Self {
        let mut payload = Row::new();
        payload.insert("id".to_string(), id.into());
        Self::now(MutationKind::Delete, entity, payload)
    }
}

/// A persisted queue entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    /// Auto-incrementing sequence number
    pub seq: i64,
    pub kind: MutationKind,
    pub entity: EntityType,
    pub payload: Row,
    pub timestamp: i64,
}
