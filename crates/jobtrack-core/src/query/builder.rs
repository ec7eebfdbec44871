//! Chainable query construction
//!
//! ```ignore
//! let response = tracker
//!     .query(EntityType::JobApplication)
//!     .eq("status", "interviewing")
//!     .order("applied_date", false)
//!     .range(0, 9)
//!     .count()
//!     .execute()
//!     .await;
//! ```

use async_trait::async_trait;
use serde_json::Value;

use super::descriptor::{Action, Descriptor, Order};
use super::filter::Filter;
use super::response::QueryResponse;
use crate::models::{EntityType, Row};

/// Something that can run a descriptor
#[async_trait]
pub trait QueryTarget: Send + Sync {
    async fn execute(&self, descriptor: Descriptor) -> QueryResponse;
}

/// Builder for one request against a collection
pub struct QueryBuilder<'a> {
    target: &'a dyn QueryTarget,
    descriptor: Descriptor,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(target: &'a dyn QueryTarget, entity: EntityType) -> Self {
        Self {
            target,
            descriptor: Descriptor::new(entity),
        }
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.descriptor.filters.push(Filter::Eq {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn ilike(mut self, column: &str, pattern: &str) -> Self {
        self.descriptor.filters.push(Filter::Ilike {
            column: column.to_string(),
            pattern: pattern.to_string(),
        });
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.descriptor.filters.push(Filter::Gte {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn lte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.descriptor.filters.push(Filter::Lte {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    /// Sort on one column; a later call replaces an earlier one
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.descriptor.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.descriptor.limit = Some(count);
        self
    }

    /// Inclusive, zero-based row window
    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.descriptor.range = Some((from, to));
        self
    }

    /// Expect exactly one row
    ///
    /// After a mutation this also asks for the affected row back.
    pub fn single(mut self) -> Self {
        self.descriptor.single = true;
        if self.descriptor.is_mutation() {
            self.descriptor.returning = true;
        }
        self
    }

    /// After a mutation, ask for the affected rows back
    pub fn select(mut self) -> Self {
        if self.descriptor.is_mutation() {
            self.descriptor.returning = true;
        }
        self
    }

    pub fn count(mut self) -> Self {
        self.descriptor.count = true;
        self
    }

    /// Count without payload
    pub fn head(mut self) -> Self {
        self.descriptor.head = true;
        self
    }

    pub fn insert(self, row: Row) -> Self {
        self.insert_many(vec![row])
    }

    pub fn insert_many(mut self, rows: Vec<Row>) -> Self {
        self.descriptor.action = Action::Insert { rows };
        self
    }

    pub fn update(mut self, changes: Row) -> Self {
        self.descriptor.action = Action::Update { changes };
        self
    }

    pub fn delete(mut self) -> Self {
        self.descriptor.action = Action::Delete;
        self
    }

    /// Upsert keyed on `id` unless [`on_conflict`](Self::on_conflict) says otherwise
    pub fn upsert(self, row: Row) -> Self {
        self.upsert_many(vec![row])
    }

    pub fn upsert_many(mut self, rows: Vec<Row>) -> Self {
        self.descriptor.action = Action::Upsert {
            rows,
            on_conflict: vec!["id".to_string()],
        };
        self
    }

    /// Comma-separated conflict columns for a preceding upsert
    pub fn on_conflict(mut self, columns: &str) -> Self {
        if let Action::Upsert { on_conflict, .. } = &mut self.descriptor.action {
            *on_conflict = columns
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }
        self
    }

    /// The composed descriptor
    pub fn build(self) -> Descriptor {
        self.descriptor
    }

    pub async fn execute(self) -> QueryResponse {
        self.target.execute(self.descriptor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records descriptors and answers with an empty success
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Descriptor>>,
    }

    #[async_trait]
    impl QueryTarget for Recorder {
        async fn execute(&self, descriptor: Descriptor) -> QueryResponse {
            self.seen.lock().unwrap().push(descriptor);
            QueryResponse::default()
        }
    }

    #[test]
    fn test_builder_composes_filters() {
        let recorder = Recorder::default();
        let descriptor = QueryBuilder::new(&recorder, EntityType::JobApplication)
            .eq("status", "applied")
            .gte("applied_date", "2024-01-01")
            .ilike("title", "%rust%")
            .order("applied_date", false)
            .range(0, 4)
            .limit(3)
            .count()
            .build();

        assert_eq!(descriptor.filters.len(), 3);
        assert_eq!(descriptor.filters[0].column(), "status");
        assert_eq!(descriptor.order.as_ref().unwrap().column, "applied_date");
        assert!(!descriptor.order.unwrap().ascending);
        assert_eq!(descriptor.range, Some((0, 4)));
        assert_eq!(descriptor.limit, Some(3));
        assert!(descriptor.count);
        assert_eq!(descriptor.action, Action::Select);
    }

    #[test]
    fn test_returning_only_after_action() {
        let recorder = Recorder::default();
        let row = json!({"name": "Acme"}).as_object().unwrap().clone();

        let plain = QueryBuilder::new(&recorder, EntityType::Company)
            .select()
            .insert(row.clone())
            .build();
        assert!(!plain.returning);

        let returning = QueryBuilder::new(&recorder, EntityType::Company)
            .insert(row.clone())
            .select()
            .build();
        assert!(returning.returning);

        let single = QueryBuilder::new(&recorder, EntityType::Company)
            .insert(row)
            .single()
            .build();
        assert!(single.returning);
        assert!(single.single);
    }

    #[test]
    fn test_on_conflict_splits_columns() {
        let recorder = Recorder::default();
        let row = json!({"email": "a@example.com"}).as_object().unwrap().clone();
        let descriptor = QueryBuilder::new(&recorder, EntityType::Contact)
            .upsert(row)
            .on_conflict("email, user_id")
            .build();

        match descriptor.action {
            Action::Upsert { on_conflict, .. } => {
                assert_eq!(on_conflict, vec!["email", "user_id"]);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_upsert_defaults_to_id() {
        let recorder = Recorder::default();
        let descriptor = QueryBuilder::new(&recorder, EntityType::Contact)
            .upsert(Row::new())
            .build();
        assert!(matches!(
            descriptor.action,
            Action::Upsert { ref on_conflict, .. } if on_conflict == &vec!["id".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_execute_hands_descriptor_to_target() {
        let recorder = Recorder::default();
        let response = QueryBuilder::new(&recorder, EntityType::Interview)
            .eq("id", "i1")
            .delete()
            .execute()
            .await;

        assert!(response.is_ok());
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].action, Action::Delete);
    }
}
