//! Storage layer
//!
//! Durable local state for offline operation.
//!
//! ## Architecture
//!
//! - **Collections**: one SQLite table per entity type, row JSON keyed by id
//! - **Mutation queue**: offline writes awaiting replay, oldest first
//!
//! The local store is a cache of the remote backend plus the pending
//! mutations needed to bring the remote up to date.

pub mod error;
pub mod local;
pub mod queue;
pub mod schema;

pub use error::{StorageError, StorageResult};
pub use local::{LocalStore, Snapshot};
pub use queue::{MutationKind, NewQueueEntry, QueueEntry};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
