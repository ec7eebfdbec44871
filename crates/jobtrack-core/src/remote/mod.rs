//! Remote backend adapters
//!
//! The hosted backend is reached through the [`RemoteBackend`] trait:
//!
//! - [`RestBackend`]: PostgREST-style HTTP service
//! - [`MemoryBackend`]: the local query engine over an in-memory store, for
//!   demo mode and tests
//! - [`UnavailableBackend`]: stands in when no remote is configured

pub mod error;
pub mod memory;
pub mod rest;

use async_trait::async_trait;

pub use error::{with_timeout, RemoteError};
pub use memory::MemoryBackend;
pub use rest::RestBackend;

use crate::query::{Descriptor, QueryResponse};

/// A backend that executes descriptors remotely
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Execute one descriptor
    ///
    /// `Err` means the call itself failed. A response carrying an `error`
    /// means the backend answered and refused the request.
    async fn execute(&self, descriptor: &Descriptor) -> Result<QueryResponse, RemoteError>;

    /// Check that the backend is reachable
    async fn health_check(&self) -> Result<(), RemoteError>;
}

/// Backend used when no remote is configured; every call fails
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

#[async_trait]
impl RemoteBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn execute(&self, _descriptor: &Descriptor) -> Result<QueryResponse, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn health_check(&self) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    #[tokio::test]
    async fn test_unavailable_backend_refuses_everything() {
        let backend = UnavailableBackend;
        let descriptor = Descriptor::new(EntityType::Company);

        assert!(matches!(
            backend.execute(&descriptor).await,
            Err(RemoteError::NotConfigured)
        ));
        assert!(backend.health_check().await.is_err());
    }
}
