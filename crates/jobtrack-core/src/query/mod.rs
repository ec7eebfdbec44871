//! Query emulation
//!
//! Descriptors describe a select or mutation against one collection. They
//! run either on the remote backend or, disconnected, on the local
//! [`QueryEngine`], which reproduces the backend's semantics over the local
//! store.

pub mod builder;
pub mod compare;
pub mod descriptor;
pub mod engine;
pub mod filter;
pub mod response;
pub mod write;

pub use builder::{QueryBuilder, QueryTarget};
pub use compare::compare_values;
pub use descriptor::{Action, Descriptor, Order};
pub use engine::{Change, Executed, QueryEngine};
pub use filter::{ilike_regex, Filter, Matcher};
pub use response::{Payload, QueryError, QueryResponse};
pub use write::{apply_update, new_id, prepare_insert};
