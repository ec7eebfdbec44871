//! Remote backend errors

use std::time::Duration;

use thiserror::Error;

use crate::query::QueryError;

/// Errors talking to the remote backend
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The request never produced a response
    #[error("Request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status
    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be read
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// No answer within the configured limit
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered but reported an error for the request
    #[error("Backend rejected the request: {0}")]
    Rejected(String),

    /// No remote backend is configured
    #[error("No remote backend configured")]
    NotConfigured,
}

impl RemoteError {
    /// Whether retrying later might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Request(_) | RemoteError::Timeout(_) => true,
            RemoteError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Request(err.to_string())
        }
    }
}

impl From<RemoteError> for QueryError {
    fn from(err: RemoteError) -> Self {
        QueryError::Remote(err.to_string())
    }
}

/// Bound a remote call by `limit`
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, RemoteError>
where
    F: std::future::Future<Output = Result<T, RemoteError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| RemoteError::Timeout(limit))?
}
