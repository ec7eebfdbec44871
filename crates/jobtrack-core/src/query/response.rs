//! Query results
//!
//! Execution never fails outright: problems travel inside the response as a
//! [`QueryError`] next to an empty payload.

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::models::Row;
use crate::storage::StorageError;

/// Structured failure carried in a [`QueryResponse`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// `single` was requested and the result did not hold exactly one row
    #[error("Expected a single row, found {found}")]
    NotExactlyOneRow { found: usize },

    /// The local store failed
    #[error("Local store error: {message}")]
    Storage {
        message: String,
        /// Only the destructive store reset gets past this
        reset_required: bool,
    },

    /// The remote backend failed or rejected the request
    #[error("Remote error: {0}")]
    Remote(String),

    /// The descriptor cannot be executed
    #[error("Invalid query: {0}")]
    InvalidDescriptor(String),
}

impl QueryError {
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            QueryError::Storage {
                reset_required: true,
                ..
            }
        )
    }
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        QueryError::Storage {
            reset_required: err.requires_reset(),
            message: err.to_string(),
        }
    }
}

impl Serialize for QueryError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Rows returned by a request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    One(Row),
    Many(Vec<Row>),
}

impl Payload {
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Payload::One(row) => vec![row],
            Payload::Many(rows) => rows,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::One(_) => 1,
            Payload::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of executing a descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResponse {
    pub data: Option<Payload>,
    pub error: Option<QueryError>,
    pub count: Option<usize>,
}

impl QueryResponse {
    /// Shape a result set the way the request asked for it
    ///
    /// With `single`, anything other than exactly one row becomes
    /// [`QueryError::NotExactlyOneRow`] and the payload is dropped. The
    /// count is kept either way.
    pub fn shaped(rows: Option<Vec<Row>>, count: Option<usize>, single: bool) -> Self {
        if !single {
            return Self {
                data: rows.map(Payload::Many),
                error: None,
                count,
            };
        }

        match rows {
            Some(mut rows) if rows.len() == 1 => Self {
                data: rows.pop().map(Payload::One),
                error: None,
                count,
            },
            other => Self {
                data: None,
                error: Some(QueryError::NotExactlyOneRow {
                    found: other.map_or(0, |rows| rows.len()),
                }),
                count,
            },
        }
    }

    /// A failed request with no payload
    pub fn failure(error: impl Into<QueryError>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
            count: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Returned rows, empty when there is no payload
    pub fn rows(&self) -> Vec<Row> {
        match &self.data {
            Some(Payload::One(row)) => vec![row.clone()],
            Some(Payload::Many(rows)) => rows.clone(),
            None => Vec::new(),
        }
    }

    /// Split into the payload or the error
    pub fn into_result(self) -> Result<Option<Payload>, QueryError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(id));
        row
    }

    #[test]
    fn test_single_with_one_row() {
        let response = QueryResponse::shaped(Some(vec![row("a")]), None, true);
        assert!(response.is_ok());
        assert_eq!(response.data, Some(Payload::One(row("a"))));
    }

    #[test]
    fn test_single_with_two_rows_fails() {
        let response = QueryResponse::shaped(Some(vec![row("a"), row("b")]), Some(2), true);
        assert!(response.data.is_none());
        assert_eq!(
            response.error,
            Some(QueryError::NotExactlyOneRow { found: 2 })
        );
        assert_eq!(response.count, Some(2));
    }

    #[test]
    fn test_single_without_payload_fails() {
        let response = QueryResponse::shaped(None, None, true);
        assert_eq!(
            response.error,
            Some(QueryError::NotExactlyOneRow { found: 0 })
        );
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: QueryError = StorageError::SchemaDrift {
            details: "unexpected layout".to_string(),
        }
        .into();
        assert!(err.requires_reset());

        let err: QueryError = StorageError::LockPoisoned.into();
        assert!(!err.requires_reset());
    }

    #[test]
    fn test_serializes_error_as_message() {
        let response = QueryResponse::failure(QueryError::NotExactlyOneRow { found: 0 });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"], json!("Expected a single row, found 0"));
        assert_eq!(value["data"], json!(null));
    }

    #[test]
    fn test_into_result() {
        let ok = QueryResponse::shaped(Some(vec![row("a")]), None, false);
        assert_eq!(ok.rows().len(), 1);
        assert_eq!(ok.into_result().unwrap().unwrap().len(), 1);

        let failed = QueryResponse::failure(QueryError::Remote("boom".into()));
        assert!(failed.rows().is_empty());
        assert!(failed.into_result().is_err());
    }
}
