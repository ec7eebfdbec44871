//! Unified data interface
//!
//! The `Tracker` wires the local store, the remote backend, the
//! reconciliation engine and the network orchestrator together, and routes
//! each operation by connectivity:
//!
//! - **Online**: requests go to the remote backend
//! - **Offline**: requests run on the local query engine and every mutated
//!   row is queued for replay
//!
//! ## Usage
//!
//! ```ignore
//! let tracker = Tracker::open(Config::load()?)?;
//! tracker.initialize().await;
//!
//! let company = tracker.save_row(EntityType::Company, row).await?;
//! let open = tracker
//!     .query(EntityType::JobApplication)
//!     .eq("status", "interviewing")
//!     .execute()
//!     .await;
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::models::{row_id, Entity, EntityType, Row};
use crate::query::{
    Action, Change, Descriptor, QueryBuilder, QueryEngine, QueryResponse, QueryTarget,
};
use crate::relations::sanitize;
use crate::remote::{with_timeout, RemoteBackend, RestBackend, UnavailableBackend};
use crate::storage::{
    LocalStore, MutationKind, NewQueueEntry, QueueEntry, StorageError, StorageResult,
};
use crate::sync::{Connectivity, DrainReport, NetworkOrchestrator, SyncEngine, SyncStatus};

/// Local-first access to the job tracking data
pub struct Tracker {
    config: Config,
    store: Arc<LocalStore>,
    engine: QueryEngine,
    remote: Arc<dyn RemoteBackend>,
    sync: Arc<SyncEngine>,
    network: Arc<NetworkOrchestrator>,
}

impl Tracker {
    /// Open the tracker with the configured remote, if any
    ///
    /// Without a remote the tracker starts offline and stays usable on the
    /// local store alone.
    pub fn open(config: Config) -> Result<Self> {
        let remote: Arc<dyn RemoteBackend> =
            match RestBackend::from_config(&config).context("Failed to build remote client")? {
                Some(rest) => Arc::new(rest),
                None => Arc::new(UnavailableBackend),
            };
        let connectivity = Connectivity::from(config.has_remote());
        Self::open_with_remote(config, remote, connectivity)
    }

    /// Recreate the configured store without opening it first
    ///
    /// For stores that fail to open, see [`Tracker::needs_reset`].
    pub fn reset_store_at(config: &Config) -> Result<()> {
        let path = config.sqlite_path();
        LocalStore::reset_path(&path)
            .with_context(|| format!("Failed to reset local store at {}", path.display()))?;
        Ok(())
    }

    /// Whether an open failure can only be cleared by a reset
    pub fn needs_reset(error: &anyhow::Error) -> bool {
        error
            .chain()
            .filter_map(|cause| cause.downcast_ref::<StorageError>())
            .any(StorageError::requires_reset)
    }

    /// Open with an explicit backend and starting connectivity
    pub fn open_with_remote(
        config: Config,
        remote: Arc<dyn RemoteBackend>,
        connectivity: Connectivity,
    ) -> Result<Self> {
        let store = LocalStore::open(&config).with_context(|| {
            format!(
                "Failed to open local store at {}",
                config.sqlite_path().display()
            )
        })?;
        Ok(Self::assemble(config, Arc::new(store), remote, connectivity))
    }

    /// Tracker over an in-memory local store
    pub fn open_in_memory(
        config: Config,
        remote: Arc<dyn RemoteBackend>,
        connectivity: Connectivity,
    ) -> Result<Self> {
        let store = LocalStore::open_in_memory().context("Failed to open in-memory store")?;
        Ok(Self::assemble(config, Arc::new(store), remote, connectivity))
    }

    fn assemble(
        config: Config,
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteBackend>,
        connectivity: Connectivity,
    ) -> Self {
        let engine = QueryEngine::new(store.clone(), config.user_id.clone());
        let sync = Arc::new(SyncEngine::new(
            store.clone(),
            remote.clone(),
            config.request_timeout(),
        ));
        let network = Arc::new(NetworkOrchestrator::new(
            sync.clone(),
            store.clone(),
            connectivity,
        ));

        Self {
            config,
            store,
            engine,
            remote,
            sync,
            network,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<NetworkOrchestrator> {
        &self.network
    }

    /// Start a query against a collection
    pub fn query(&self, entity: EntityType) -> QueryBuilder<'_> {
        QueryBuilder::new(self, entity)
    }

    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    // ==================== Collections ====================

    /// Fetch a collection from the remote and cache it; offline, read the cache
    pub async fn fetch_and_cache(&self, entity: EntityType) -> Result<Vec<Row>> {
        self.sync
            .fetch_and_cache(entity, self.is_online())
            .await
            .with_context(|| format!("Failed to fetch {}", entity))
    }

    /// Like [`fetch_and_cache`](Self::fetch_and_cache), falling back to the
    /// cache when the remote fetch fails
    pub async fn fetch_all(&self, entity: EntityType) -> Result<Vec<Row>> {
        match self.sync.fetch_and_cache(entity, self.is_online()).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!("Fetching {} failed, using cached rows: {}", entity, e);
                self.store
                    .get_all(entity)
                    .with_context(|| format!("Failed to read cached {}", entity))
            }
        }
    }

    /// Save a row locally and, when online, on the remote
    ///
    /// Rows without an id get one. Offline, the write is queued. Online, a
    /// remote failure is returned after the local write has been committed;
    /// it is queued only when `queue_failed_writes` is set.
    pub async fn save_row(&self, entity: EntityType, row: Row) -> Result<Row> {
        let mut descriptor = Descriptor::new(entity);
        descriptor.action = Action::Upsert {
            rows: vec![row],
            on_conflict: vec!["id".to_string()],
        };

        let executed = self.engine.execute(&descriptor);
        if let Some(error) = executed.response.error {
            return Err(error).with_context(|| format!("Failed to save {} row", entity));
        }
        let change = executed
            .changes
            .into_iter()
            .next()
            .with_context(|| format!("Saving {} row produced no change", entity))?;

        if !self.is_online() {
            self.enqueue_changes(std::slice::from_ref(&change))
                .context("Failed to queue offline save")?;
            return Ok(change.row);
        }

        let remote_row = sanitize(entity, &change.row);
        if let Err(e) = self.sync.upsert_row(entity, remote_row).await {
            self.queue_after_failure(&change);
            return Err(e).with_context(|| format!("Failed to save {} row remotely", entity));
        }
        Ok(change.row)
    }

    /// Delete a row locally and, when online, on the remote
    ///
    /// Returns whether a local row was removed.
    pub async fn delete_row(&self, entity: EntityType, id: &str) -> Result<bool> {
        let removed = self
            .store
            .delete(entity, id)
            .with_context(|| format!("Failed to delete {} row '{}'", entity, id))?;

        let mut payload = Row::new();
        payload.insert("id".to_string(), id.into());
        let change = Change {
            kind: MutationKind::Delete,
            entity,
            row: payload,
        };

        if !self.is_online() {
            self.enqueue_changes(std::slice::from_ref(&change))
                .context("Failed to queue offline delete")?;
            return Ok(removed);
        }

        if let Err(e) = self.sync.delete_by_id(entity, id).await {
            self.queue_after_failure(&change);
            return Err(e).with_context(|| format!("Failed to delete {} row '{}' remotely", entity, id));
        }
        Ok(removed)
    }

    /// Look a row up locally, then on the remote when online
    ///
    /// A row found remotely is cached.
    pub async fn get_row(&self, entity: EntityType, id: &str) -> Result<Option<Row>> {
        if let Some(row) = self
            .store
            .get(entity, id)
            .with_context(|| format!("Failed to read {} row '{}'", entity, id))?
        {
            return Ok(Some(row));
        }
        if !self.is_online() {
            return Ok(None);
        }

        let found = self
            .sync
            .fetch_row(entity, id)
            .await
            .with_context(|| format!("Failed to fetch {} row '{}'", entity, id))?;
        if let Some(row) = &found {
            self.store
                .put(entity, &sanitize(entity, row))
                .context("Failed to cache fetched row")?;
        }
        Ok(found)
    }

    /// Save a typed entity, returning it as stored
    pub async fn save_entity<E: Entity>(&self, entity: &E) -> Result<E> {
        let row = self.save_row(E::TYPE, entity.to_row()?).await?;
        E::from_row(row)
    }

    /// Look up a typed entity by id
    pub async fn get_entity<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        self.get_row(E::TYPE, id).await?.map(E::from_row).transpose()
    }

    // ==================== Sync ====================

    /// Warm the cache and drain the queue, when online
    pub async fn initialize(&self) -> Option<DrainReport> {
        self.network.initialize().await
    }

    /// Record connectivity; coming online drains the queue
    pub async fn set_online(&self, online: bool) -> Option<DrainReport> {
        self.network.set_connectivity(Connectivity::from(online)).await
    }

    /// Drain the queue now, if online and not already draining
    pub async fn sync_pending(&self) -> Option<DrainReport> {
        self.network.sync_pending().await
    }

    /// Check that the remote backend answers
    pub async fn check_remote(&self) -> Result<()> {
        with_timeout(self.config.request_timeout(), self.remote.health_check())
            .await
            .with_context(|| format!("Remote backend '{}' is not reachable", self.remote.name()))
    }

    pub fn status(&self) -> SyncStatus {
        self.network.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.network.subscribe()
    }

    /// "Online" or "Offline"
    pub fn network_status(&self) -> &'static str {
        self.network.network_status()
    }

    /// Number of queued mutations
    pub fn pending_operations(&self) -> Result<usize> {
        self.store.queue_len().context("Failed to read queue length")
    }

    /// Every queued mutation, oldest first
    pub fn queued(&self) -> Result<Vec<QueueEntry>> {
        self.store.list_queue().context("Failed to read mutation queue")
    }

    /// Destroy and recreate the local store
    ///
    /// Unsynced mutations are lost. Returns whether the reset succeeded.
    pub fn reset_local_store(&self) -> bool {
        match self.store.reset() {
            Ok(()) => {
                self.network.mark_reset();
                true
            }
            Err(e) => {
                error!("Failed to reset local store: {}", e);
                false
            }
        }
    }

    // ==================== Queueing ====================

    fn enqueue_changes(&self, changes: &[Change]) -> StorageResult<()> {
        for change in changes {
            let entry = match change.kind {
                MutationKind::Delete => match row_id(&change.row) {
                    Some(id) => NewQueueEntry::delete(change.entity, id),
                    None => continue,
                },
                kind => NewQueueEntry::now(kind, change.entity, change.row.clone()),
            };
            self.store.enqueue(&entry)?;
        }
        if !changes.is_empty() {
            self.network.refresh_pending();
        }
        Ok(())
    }

    fn queue_after_failure(&self, change: &Change) {
        if !self.config.queue_failed_writes {
            return;
        }
        debug!("Queueing failed {} on {} for retry", change.kind, change.entity);
        if let Err(e) = self.enqueue_changes(std::slice::from_ref(change)) {
            warn!("Failed to queue {} on {}: {}", change.kind, change.entity, e);
        }
    }
}

#[async_trait]
impl QueryTarget for Tracker {
    async fn execute(&self, descriptor: Descriptor) -> QueryResponse {
        if self.is_online() {
            return match with_timeout(
                self.config.request_timeout(),
                self.remote.execute(&descriptor),
            )
            .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("Remote {} on {} failed: {}", descriptor.action.name(), descriptor.entity, e);
                    QueryResponse::failure(e)
                }
            };
        }

        let executed = self.engine.execute(&descriptor);
        let mut response = executed.response;
        if let Err(e) = self.enqueue_changes(&executed.changes) {
            warn!("Failed to queue offline {}: {}", descriptor.action.name(), e);
            response.error = Some(e.into());
        }
        response
    }
}
