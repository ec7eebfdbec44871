//! In-process backend
//!
//! Runs the local query engine over its own in-memory store, so the whole
//! data layer works with no hosted service at all. Every request is
//! recorded for inspection.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{RemoteBackend, RemoteError};
use crate::query::{Descriptor, QueryEngine, QueryResponse};
use crate::storage::{LocalStore, StorageResult};

/// Backend serving requests from an in-memory store
pub struct MemoryBackend {
    engine: QueryEngine,
    requests: Mutex<Vec<Descriptor>>,
}

impl MemoryBackend {
    pub fn new() -> StorageResult<Self> {
        Self::with_user(None)
    }

    /// Backend that attributes written rows to `user_id`
    pub fn with_user(user_id: Option<String>) -> StorageResult<Self> {
        let store = Arc::new(LocalStore::open_in_memory()?);
        Ok(Self {
            engine: QueryEngine::new(store, user_id),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// The backing store
    pub fn store(&self) -> &Arc<LocalStore> {
        self.engine.store()
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<Descriptor> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn clear_requests(&self) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.clear();
        }
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn execute(&self, descriptor: &Descriptor) -> Result<QueryResponse, RemoteError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(descriptor.clone());
        }
        Ok(self.engine.execute(descriptor).response)
    }

    async fn health_check(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;
    use crate::query::Action;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_requests() {
        let backend = MemoryBackend::new().unwrap();
        let mut insert = Descriptor::new(EntityType::Company);
        insert.action = Action::Insert {
            rows: vec![json!({"id": "c1", "name": "Acme"}).as_object().unwrap().clone()],
        };

        let response = backend.execute(&insert).await.unwrap();
        assert!(response.is_ok());

        let select = Descriptor::new(EntityType::Company);
        let response = backend.execute(&select).await.unwrap();
        assert_eq!(response.rows().len(), 1);

        assert_eq!(backend.request_count(), 2);
        assert_eq!(backend.requests()[0].action.name(), "insert");
        assert_eq!(backend.store().count(EntityType::Company).unwrap(), 1);

        backend.clear_requests();
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_attributes_rows_to_user() {
        let backend = MemoryBackend::with_user(Some("demo-user".to_string())).unwrap();
        let mut insert = Descriptor::new(EntityType::Contact);
        insert.action = Action::Insert {
            rows: vec![json!({"name": "Sam"}).as_object().unwrap().clone()],
        };
        backend.execute(&insert).await.unwrap();

        let stored = backend.store().get_all(EntityType::Contact).unwrap();
        assert_eq!(stored[0]["user_id"], json!("demo-user"));
        assert!(backend.health_check().await.is_ok());
    }
}
