//! Declarative query and mutation descriptors
//!
//! A [`Descriptor`] is everything needed to run one request against a
//! collection, whether locally or on the remote backend. It is plain data:
//! builders produce it, executors consume it.

use serde::Serialize;

use super::filter::Filter;
use super::response::QueryError;
use crate::models::{EntityType, Row};

/// Sort on a single column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// What the request does
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Action {
    Select,
    Insert {
        rows: Vec<Row>,
    },
    /// Merge `changes` into every filter match
    Update {
        changes: Row,
    },
    /// Remove every filter match
    Delete,
    /// Update the row matching all conflict columns, else insert
    Upsert {
        rows: Vec<Row>,
        on_conflict: Vec<String>,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Insert { .. } => "insert",
            Action::Update { .. } => "update",
            Action::Delete => "delete",
            Action::Upsert { .. } => "upsert",
        }
    }
}

/// A composed request against one collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptor {
    pub entity: EntityType,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    /// Inclusive, zero-based bounds; applied before `limit`
    pub range: Option<(usize, usize)>,
    /// Exactly one row expected
    pub single: bool,
    /// Report the result size alongside the payload
    pub count: bool,
    /// Report the count only, with no payload
    pub head: bool,
    pub action: Action,
    /// Mutations hand back the affected rows
    pub returning: bool,
}

impl Descriptor {
    /// A plain select over the whole collection
    pub fn new(entity: EntityType) -> Self {
        Self {
            entity,
            filters: Vec::new(),
            order: None,
            limit: None,
            range: None,
            single: false,
            count: false,
            head: false,
            action: Action::Select,
            returning: false,
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self.action, Action::Select)
    }

    /// Reject combinations that have no meaningful result
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.head && self.single {
            return Err(QueryError::InvalidDescriptor(
                "head and single cannot be combined".to_string(),
            ));
        }
        if let Action::Upsert { on_conflict, .. } = &self.action {
            if on_conflict.is_empty() {
                return Err(QueryError::InvalidDescriptor(
                    "upsert needs at least one conflict column".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Apply range then limit to an ordered result set
    pub fn paginate(&self, rows: Vec<Row>) -> Vec<Row> {
        let mut rows = match self.range {
            Some((from, to)) if to >= from => {
                rows.into_iter()
                    .skip(from)
                    .take(to.saturating_sub(from).saturating_add(1))
                    .collect()
            }
            Some(_) => Vec::new(),
            None => rows,
        };
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}
