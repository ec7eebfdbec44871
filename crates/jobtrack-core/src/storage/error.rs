//! Storage error handling
//!
//! Provides typed errors for local store operations with descriptive
//! messages and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stored data no longer matches the expected layout
    #[error("Local store needs a reset: {details}")]
    SchemaDrift { details: String },

    /// A stored row could not be decoded
    #[error("Corrupt row '{id}' in '{table}': {source}")]
    CorruptRow {
        table: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// A row handed to the store carries no identifier
    #[error("Row for '{table}' has no id")]
    MissingId { table: String },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to encode a row
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another holder of the connection panicked
    #[error("Local store lock poisoned")]
    LockPoisoned,

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            _ if is_disk_full_error(&error) => StorageError::DiskFull {
                path,
                source: error,
            },
            _ => StorageError::CreateDirectory {
                path,
                source: error,
            },
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::DiskFull { .. }
                | StorageError::PermissionDenied { .. }
                | StorageError::SchemaDrift { .. }
                | StorageError::CorruptRow { .. }
        )
    }

    /// Whether the only way forward is the destructive store reset
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            StorageError::SchemaDrift { .. } | StorageError::CorruptRow { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free up disk space and try again."),
            StorageError::PermissionDenied { .. } => {
                Some("Check file and directory permissions. You may need to run with different permissions or change ownership.")
            }
            StorageError::SchemaDrift { .. } | StorageError::CorruptRow { .. } => {
                Some("Reset the local store. Pending offline changes that have not been synced will be lost.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_classification() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from_io(io_err, PathBuf::from("/test/path"));

        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.is_recoverable());
        assert!(!err.requires_reset());
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_disk_full_detection() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::from_io(io_err, PathBuf::from("/full/disk"));

        assert!(matches!(err, StorageError::DiskFull { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_schema_drift_requires_reset() {
        let err = StorageError::SchemaDrift {
            details: "schema version 3 is newer than supported version 1".to_string(),
        };

        assert!(err.requires_reset());
        assert!(err.to_string().contains("reset"));
        assert!(err.recovery_suggestion().unwrap().contains("Reset"));
    }

    #[test]
    fn test_corrupt_row_display() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = StorageError::CorruptRow {
            table: "companies".to_string(),
            id: "c1".to_string(),
            source,
        };

        let msg = err.to_string();
        assert!(msg.contains("companies"));
        assert!(msg.contains("c1"));
        assert!(err.requires_reset());
    }
}
