//! Command handlers

pub mod config;
pub mod query;
pub mod record;
pub mod status;
pub mod sync;
