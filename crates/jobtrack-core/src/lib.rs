//! jobtrack Core Library
//!
//! This crate provides the local-first data layer for jobtrack, a tracker
//! for job applications, interviews, contacts and companies.
//!
//! # Architecture
//!
//! - **SQLite**: local store for every collection plus the mutation queue
//! - **Query engine**: evaluates chained query descriptors against the
//!   local store with the same semantics as the remote backend
//! - **Remote backend**: REST client speaking the hosted database's
//!   query-string dialect
//! - **Sync**: replays queued offline writes once connectivity returns
//!
//! # Quick Start
//!
//! ```text
//! let tracker = Tracker::open(Config::load()?)?;
//! tracker.initialize().await;
//!
//! // Save a company
//! let acme = tracker.save_entity(&Company::new("Acme")).await?;
//!
//! // Query applications
//! let response = tracker
//!     .query(EntityType::JobApplication)
//!     .ilike("company_name", "%tech%")
//!     .order("applied_date", false)
//!     .range(0, 9)
//!     .execute()
//!     .await;
//! ```
//!
//! # Modules
//!
//! - `tracker`: Unified data interface (main entry point)
//! - `query`: Query builder, descriptors and the local query engine
//! - `models`: Entity types and rows
//! - `relations`: Nested relation attachment and sanitization
//! - `storage`: SQLite store and mutation queue
//! - `remote`: Remote backend adapters
//! - `sync`: Queue reconciliation and network state
//! - `config`: Application configuration

pub mod config;
pub mod models;
pub mod query;
pub mod relations;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod timestamp;
pub mod tracker;

pub use config::Config;
pub use models::{
    ApplicationStatus, Company, Contact, Entity, EntityType, Interview, InterviewStatus,
    InterviewType, JobApplication, Row,
};
pub use query::{Descriptor, Filter, QueryBuilder, QueryError, QueryResponse, QueryTarget};
pub use remote::{MemoryBackend, RemoteBackend, RemoteError, RestBackend};
pub use storage::{LocalStore, MutationKind, QueueEntry, StorageError};
pub use sync::{Connectivity, DrainReport, SyncStatus};
pub use tracker::Tracker;
