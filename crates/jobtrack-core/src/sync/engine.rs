//! Queue reconciliation
//!
//! Replays queued offline mutations against the remote backend and keeps
//! the local cache filled from remote state.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::{row_str, EntityType, Row};
use crate::query::{Action, Descriptor, Filter, QueryResponse};
use crate::relations::sanitize;
use crate::remote::{with_timeout, RemoteBackend, RemoteError};
use crate::storage::{LocalStore, MutationKind, QueueEntry, StorageError, StorageResult};

/// Errors from operations touching both the local store and the remote
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Outcome of one queue drain
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrainReport {
    /// Entries applied remotely and removed from the queue
    pub applied: usize,
    /// Entries that failed and stay queued
    pub failed: usize,
    /// One message per failed entry
    pub errors: Vec<String>,
    /// Another drain was already running, nothing was done
    pub skipped: bool,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Reconciliation engine between the local store and the remote backend
pub struct SyncEngine {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteBackend>,
    /// Limit for each remote call
    timeout: Duration,
    /// Held for the duration of a drain
    drain_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteBackend>, timeout: Duration) -> Self {
        Self {
            store,
            remote,
            timeout,
            drain_lock: Mutex::new(()),
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteBackend> {
        &self.remote
    }

    /// Replay the queue, oldest entry first
    ///
    /// Failed entries are logged and kept; later entries are still tried.
    /// Applied entries are removed in one batch at the end. A drain started
    /// while another is running returns a skipped report immediately.
    pub async fn drain(&self) -> StorageResult<DrainReport> {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            debug!("Drain already in progress, skipping");
            return Ok(DrainReport::skipped());
        };

        let entries = self.store.list_queue()?;
        if entries.is_empty() {
            return Ok(DrainReport::default());
        }

        info!(
            "Replaying {} queued mutations against {}",
            entries.len(),
            self.remote.name()
        );

        let mut report = DrainReport::default();
        let mut applied = Vec::with_capacity(entries.len());
        for entry in &entries {
            match self.replay(entry).await {
                Ok(()) => applied.push(entry.seq),
                Err(e) => {
                    let outlook = if e.is_transient() { "will retry" } else { "not retryable" };
                    warn!(
                        "Failed to sync #{} ({} on {}): {} ({})",
                        entry.seq, entry.kind, entry.entity, e, outlook
                    );
                    report.failed += 1;
                    report.errors.push(format!(
                        "#{} {} on {}: {} ({})",
                        entry.seq, entry.kind, entry.entity, e, outlook
                    ));
                }
            }
        }

        report.applied = self.store.delete_queue_entries(&applied)?;
        info!(
            "Drain finished: {} applied, {} still queued",
            report.applied, report.failed
        );
        Ok(report)
    }

    async fn replay(&self, entry: &QueueEntry) -> Result<(), RemoteError> {
        match entry.kind {
            MutationKind::Create | MutationKind::Update => {
                self.upsert_row(entry.entity, sanitize(entry.entity, &entry.payload))
                    .await
            }
            MutationKind::Delete => match row_str(&entry.payload, "id") {
                Some(id) if !id.is_empty() => self.delete_by_id(entry.entity, id).await,
                _ => Err(RemoteError::Rejected(
                    "queued delete carries no id".to_string(),
                )),
            },
        }
    }

    /// Run a descriptor remotely under the call timeout
    ///
    /// A response carrying an error counts as a failed call.
    async fn call(&self, descriptor: &Descriptor) -> Result<QueryResponse, RemoteError> {
        let response = with_timeout(self.timeout, self.remote.execute(descriptor)).await?;
        match response.error {
            Some(error) => Err(RemoteError::Rejected(error.to_string())),
            None => Ok(response),
        }
    }

    /// Upsert one row on the remote, keyed on `id`
    pub async fn upsert_row(&self, entity: EntityType, row: Row) -> Result<(), RemoteError> {
        let mut descriptor = Descriptor::new(entity);
        descriptor.action = Action::Upsert {
            rows: vec![row],
            on_conflict: vec!["id".to_string()],
        };
        self.call(&descriptor).await.map(|_| ())
    }

    /// Delete one row on the remote
    pub async fn delete_by_id(&self, entity: EntityType, id: &str) -> Result<(), RemoteError> {
        let mut descriptor = Descriptor::new(entity);
        descriptor.filters.push(Filter::Eq {
            column: "id".to_string(),
            value: id.into(),
        });
        descriptor.action = Action::Delete;
        self.call(&descriptor).await.map(|_| ())
    }

    /// Look up one row on the remote
    pub async fn fetch_row(&self, entity: EntityType, id: &str) -> Result<Option<Row>, RemoteError> {
        let mut descriptor = Descriptor::new(entity);
        descriptor.filters.push(Filter::Eq {
            column: "id".to_string(),
            value: id.into(),
        });
        descriptor.limit = Some(1);
        let response = self.call(&descriptor).await?;
        Ok(response.rows().into_iter().next())
    }

    /// Fetch a whole collection and cache it locally
    ///
    /// Offline, the cached collection is returned untouched. Online, every
    /// remote row overwrites or adds its local copy; local rows missing
    /// remotely are kept.
    pub async fn fetch_and_cache(&self, entity: EntityType, online: bool) -> Result<Vec<Row>, SyncError> {
        if !online {
            return Ok(self.store.get_all(entity)?);
        }

        let descriptor = Descriptor::new(entity);
        let rows = self.call(&descriptor).await?.rows();
        let cached: Vec<Row> = rows.iter().map(|row| sanitize(entity, row)).collect();
        self.store.put_many(entity, &cached)?;
        debug!("Cached {} rows of {}", cached.len(), entity);
        Ok(rows)
    }

    /// Warm the cache from the remote, then drain the queue
    ///
    /// Fetch failures are logged and do not stop the drain.
    pub async fn initialize(&self, online: bool) -> StorageResult<DrainReport> {
        if online {
            let [applications, interviews, contacts, companies] = EntityType::ALL;
            let results = tokio::join!(
                self.fetch_and_cache(applications, true),
                self.fetch_and_cache(interviews, true),
                self.fetch_and_cache(contacts, true),
                self.fetch_and_cache(companies, true),
            );
            for (entity, result) in EntityType::ALL
                .into_iter()
                .zip([results.0, results.1, results.2, results.3])
            {
                if let Err(e) = result {
                    warn!("Failed to cache {}: {}", entity, e);
                }
            }
        }

        self.drain().await
    }
}
