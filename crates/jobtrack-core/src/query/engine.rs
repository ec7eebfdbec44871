//! Local query execution
//!
//! Runs descriptors against a snapshot of the [`LocalStore`], reproducing
//! the remote backend's filter, ordering, pagination and relation
//! semantics. Every query is a full scan.

use std::sync::Arc;

use super::compare::compare_values;
use super::descriptor::{Action, Descriptor};
use super::filter::Matcher;
use super::response::{QueryError, QueryResponse};
use super::write::{apply_update, prepare_insert};
use crate::models::{row_id, EntityType, Row};
use crate::relations::{attach, sanitize};
use crate::storage::{LocalStore, MutationKind};

/// A row written or removed by a local mutation
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub kind: MutationKind,
    pub entity: EntityType,
    /// The stored row; for deletes, the row as it was before removal
    pub row: Row,
}

/// Result of a local execution plus the rows it touched
#[derive(Debug, Clone, Default)]
pub struct Executed {
    pub response: QueryResponse,
    pub changes: Vec<Change>,
}

impl Executed {
    fn failed(error: QueryError) -> Self {
        Self {
            response: QueryResponse::failure(error),
            changes: Vec::new(),
        }
    }
}

/// Query emulator over the local store
pub struct QueryEngine {
    store: Arc<LocalStore>,
    /// Acting user recorded on written rows
    user_id: Option<String>,
}

impl QueryEngine {
    pub fn new(store: Arc<LocalStore>, user_id: Option<String>) -> Self {
        Self { store, user_id }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Execute a descriptor; failures come back inside the response
    pub fn execute(&self, descriptor: &Descriptor) -> Executed {
        match self.try_execute(descriptor) {
            Ok(executed) => executed,
            Err(error) => Executed::failed(error),
        }
    }

    fn try_execute(&self, descriptor: &Descriptor) -> Result<Executed, QueryError> {
        descriptor.validate()?;
        let matcher = Matcher::new(&descriptor.filters).map_err(|e| {
            QueryError::InvalidDescriptor(format!("unusable ilike pattern: {}", e))
        })?;

        match &descriptor.action {
            Action::Select => self.select(descriptor, &matcher),
            Action::Insert { rows } => self.insert(descriptor, rows),
            Action::Update { changes } => self.update(descriptor, &matcher, changes),
            Action::Delete => self.delete(descriptor, &matcher),
            Action::Upsert { rows, on_conflict } => self.upsert(descriptor, rows, on_conflict),
        }
    }

    fn select(&self, descriptor: &Descriptor, matcher: &Matcher<'_>) -> Result<Executed, QueryError> {
        let entity = descriptor.entity;
        let snapshot = self.store.snapshot()?;

        let mut results: Vec<Row> = snapshot
            .rows(entity)
            .iter()
            .filter(|row| matcher.matches(row))
            .cloned()
            .collect();

        if let Some(order) = &descriptor.order {
            results.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let results = descriptor.paginate(results);
        let count = descriptor.count.then_some(results.len());

        if descriptor.head {
            return Ok(Executed {
                response: QueryResponse::shaped(None, count, false),
                changes: Vec::new(),
            });
        }

        let rows = attach(entity, results, &snapshot);
        Ok(Executed {
            response: QueryResponse::shaped(Some(rows), count, descriptor.single),
            changes: Vec::new(),
        })
    }

    fn insert(&self, descriptor: &Descriptor, rows: &[Row]) -> Result<Executed, QueryError> {
        let entity = descriptor.entity;
        let prepared: Vec<Row> = rows
            .iter()
            .map(|row| prepare_insert(entity, row, self.user_id.as_deref()))
            .collect();
        self.store.put_many(entity, &prepared)?;

        let changes = prepared
            .iter()
            .map(|row| Change {
                kind: MutationKind::Create,
                entity,
                row: row.clone(),
            })
            .collect();
        self.finish(descriptor, prepared, changes)
    }

    fn update(
        &self,
        descriptor: &Descriptor,
        matcher: &Matcher<'_>,
        changes: &Row,
    ) -> Result<Executed, QueryError> {
        let entity = descriptor.entity;
        let snapshot = self.store.snapshot()?;

        let updated: Vec<Row> = snapshot
            .rows(entity)
            .iter()
            .filter(|row| matcher.matches(row))
            .map(|row| apply_update(entity, row, changes, self.user_id.as_deref()))
            .collect();
        self.store.put_many(entity, &updated)?;

        let changes = updated
            .iter()
            .map(|row| Change {
                kind: MutationKind::Update,
                entity,
                row: row.clone(),
            })
            .collect();
        self.finish(descriptor, updated, changes)
    }

    fn delete(&self, descriptor: &Descriptor, matcher: &Matcher<'_>) -> Result<Executed, QueryError> {
        let entity = descriptor.entity;
        let snapshot = self.store.snapshot()?;

        let deleted: Vec<Row> = snapshot
            .rows(entity)
            .iter()
            .filter(|row| matcher.matches(row))
            .cloned()
            .collect();
        let ids: Vec<&str> = deleted.iter().filter_map(row_id).collect();
        self.store.delete_many(entity, &ids)?;

        let changes = deleted
            .iter()
            .map(|row| Change {
                kind: MutationKind::Delete,
                entity,
                row: row.clone(),
            })
            .collect();
        self.finish(descriptor, deleted, changes)
    }

    fn upsert(
        &self,
        descriptor: &Descriptor,
        rows: &[Row],
        on_conflict: &[String],
    ) -> Result<Executed, QueryError> {
        let entity = descriptor.entity;
        let user_id = self.user_id.as_deref();
        let mut table = self.store.get_all(entity)?;
        let mut written = Vec::with_capacity(rows.len());
        let mut changes = Vec::with_capacity(rows.len());

        for raw in rows {
            let cleaned = sanitize(entity, raw);
            // A row missing any conflict key never matches
            let keyed = on_conflict
                .iter()
                .all(|key| cleaned.get(key).is_some_and(|v| !v.is_null()));
            let existing = keyed
                .then(|| {
                    table.iter().position(|row| {
                        on_conflict.iter().all(|key| row.get(key) == cleaned.get(key))
                    })
                })
                .flatten();

            let (kind, next) = match existing {
                Some(index) => {
                    let next = apply_update(entity, &table[index], &cleaned, user_id);
                    table[index] = next.clone();
                    (MutationKind::Update, next)
                }
                None => {
                    let next = prepare_insert(entity, &cleaned, user_id);
                    table.push(next.clone());
                    (MutationKind::Create, next)
                }
            };

            changes.push(Change {
                kind,
                entity,
                row: next.clone(),
            });
            written.push(next);
        }

        self.store.put_many(entity, &written)?;
        self.finish(descriptor, written, changes)
    }

    /// Build the response to a mutation
    ///
    /// Rows come back (with relations attached) only in returning mode.
    fn finish(
        &self,
        descriptor: &Descriptor,
        affected: Vec<Row>,
        changes: Vec<Change>,
    ) -> Result<Executed, QueryError> {
        let count = descriptor.count.then_some(affected.len());
        let rows = if descriptor.returning {
            let snapshot = self.store.snapshot()?;
            Some(attach(descriptor.entity, affected, &snapshot))
        } else {
            None
        };

        Ok(Executed {
            response: QueryResponse::shaped(rows, count, descriptor.single),
            changes,
        })
    }
}
