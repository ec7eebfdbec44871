//! Network-state orchestration
//!
//! Tracks connectivity, triggers a drain whenever the connection comes
//! back, and publishes a [`SyncStatus`] to subscribers over a watch
//! channel. Connectivity changes can also arrive as [`ConnectivitySignal`]s
//! through a listener task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::{DrainReport, SyncEngine};
use crate::storage::LocalStore;

/// Whether the remote backend is reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        self == Connectivity::Online
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            Connectivity::Online => "Online",
            Connectivity::Offline => "Offline",
        }
    }
}

impl From<bool> for Connectivity {
    fn from(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }
}

/// Published sync state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub connectivity: Connectivity,
    /// A drain is running
    pub is_syncing: bool,
    /// End of the last drain that ran to completion
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Queue length after the last drain or local mutation
    pub pending_operations: usize,
    /// Failure of the last drain, if it failed
    pub last_error: Option<String>,
}

impl SyncStatus {
    fn new(connectivity: Connectivity, pending_operations: usize) -> Self {
        Self {
            connectivity,
            is_syncing: false,
            last_sync_at: None,
            pending_operations,
            last_error: None,
        }
    }

    /// "Online" or "Offline"
    pub fn network_status(&self) -> &'static str {
        self.connectivity.label()
    }
}

/// Signals consumed by the connectivity listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySignal {
    Online,
    Offline,
    /// Drain now if online
    SyncRequested,
    /// Stop the listener
    Shutdown,
}

/// Owner of connectivity state and drain triggering
pub struct NetworkOrchestrator {
    engine: Arc<SyncEngine>,
    store: Arc<LocalStore>,
    status: watch::Sender<SyncStatus>,
}

impl NetworkOrchestrator {
    pub fn new(engine: Arc<SyncEngine>, store: Arc<LocalStore>, connectivity: Connectivity) -> Self {
        let pending = store.queue_len().unwrap_or_else(|e| {
            warn!("Could not read queue length: {}", e);
            0
        });
        let (status, _) = watch::channel(SyncStatus::new(connectivity, pending));
        Self {
            engine,
            store,
            status,
        }
    }

    /// Current status snapshot
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Receive every status change
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn connectivity(&self) -> Connectivity {
        self.status.borrow().connectivity
    }

    pub fn is_online(&self) -> bool {
        self.connectivity().is_online()
    }

    /// "Online" or "Offline"
    pub fn network_status(&self) -> &'static str {
        self.connectivity().label()
    }

    /// Record a connectivity change
    ///
    /// Going from offline to online drains the queue; the drain report is
    /// returned when one ran.
    pub async fn set_connectivity(&self, connectivity: Connectivity) -> Option<DrainReport> {
        let mut previous = connectivity;
        self.status.send_if_modified(|status| {
            previous = status.connectivity;
            status.connectivity = connectivity;
            previous != connectivity
        });

        if previous == connectivity {
            return None;
        }
        info!("Network is now {}", connectivity.label());

        if connectivity.is_online() {
            self.sync_pending().await
        } else {
            None
        }
    }

    /// Drain the queue unless offline or already draining
    pub async fn sync_pending(&self) -> Option<DrainReport> {
        let mut started = false;
        self.status.send_if_modified(|status| {
            if !status.connectivity.is_online() || status.is_syncing {
                return false;
            }
            status.is_syncing = true;
            started = true;
            true
        });
        if !started {
            debug!("Sync not started: offline or already syncing");
            return None;
        }

        let result = self.engine.drain().await;
        self.finish_sync(&result);
        result.ok()
    }

    /// Warm the cache and drain, when online
    pub async fn initialize(&self) -> Option<DrainReport> {
        let mut started = false;
        self.status.send_if_modified(|status| {
            if !status.connectivity.is_online() || status.is_syncing {
                return false;
            }
            status.is_syncing = true;
            started = true;
            true
        });
        if !started {
            return None;
        }

        let result = self.engine.initialize(true).await;
        self.finish_sync(&result);
        result.ok()
    }

    fn finish_sync(&self, result: &Result<DrainReport, crate::storage::StorageError>) {
        let pending = self.store.queue_len();
        self.status.send_modify(|status| {
            status.is_syncing = false;
            match result {
                Ok(report) if report.skipped => {}
                Ok(report) if report.failed == 0 => {
                    status.last_sync_at = Some(Utc::now());
                    status.last_error = None;
                }
                Ok(report) => {
                    status.last_error =
                        Some(format!("{} queued operation(s) failed to sync", report.failed));
                }
                Err(e) => {
                    warn!("Sync failed: {}", e);
                    status.last_error = Some(e.to_string());
                }
            }
            if let Ok(pending) = pending {
                status.pending_operations = pending;
            }
        });
    }

    /// Recompute the pending count after local mutations
    pub fn refresh_pending(&self) {
        match self.store.queue_len() {
            Ok(pending) => {
                self.status.send_if_modified(|status| {
                    let changed = status.pending_operations != pending;
                    status.pending_operations = pending;
                    changed
                });
            }
            Err(e) => warn!("Could not read queue length: {}", e),
        }
    }

    /// Forget sync history after the local store was reset
    pub fn mark_reset(&self) {
        self.status.send_modify(|status| {
            status.last_sync_at = None;
            status.pending_operations = 0;
            status.last_error = None;
        });
    }
}

/// Handle to a running connectivity listener
pub struct ConnectivityListener {
    pub signals: mpsc::Sender<ConnectivitySignal>,
    pub task: JoinHandle<()>,
}

/// Spawn a task applying connectivity signals to the orchestrator
pub fn spawn_connectivity_listener(orchestrator: Arc<NetworkOrchestrator>) -> ConnectivityListener {
    let (signals, mut rx) = mpsc::channel(16);

    let task = tokio::spawn(async move {
        while let Some(signal) = rx.recv().await {
            debug!("Connectivity signal: {:?}", signal);
            match signal {
                ConnectivitySignal::Online => {
                    orchestrator.set_connectivity(Connectivity::Online).await;
                }
                ConnectivitySignal::Offline => {
                    orchestrator.set_connectivity(Connectivity::Offline).await;
                }
                ConnectivitySignal::SyncRequested => {
                    orchestrator.sync_pending().await;
                }
                ConnectivitySignal::Shutdown => break,
            }
        }
        debug!("Connectivity listener stopped");
    });

    ConnectivityListener { signals, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;
    use crate::remote::MemoryBackend;
    use crate::query::{Descriptor, QueryResponse};
    use crate::remote::{RemoteBackend, RemoteError, UnavailableBackend};
    use crate::storage::NewQueueEntry;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Backend that answers from memory after a delay
    struct SlowBackend {
        inner: Arc<MemoryBackend>,
    }

    #[async_trait]
    impl RemoteBackend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn execute(&self, descriptor: &Descriptor) -> Result<QueryResponse, RemoteError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.inner.execute(descriptor).await
        }

        async fn health_check(&self) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    fn orchestrator_with(
        remote: Arc<dyn RemoteBackend>,
    ) -> (Arc<LocalStore>, NetworkOrchestrator) {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let engine = Arc::new(SyncEngine::new(store.clone(), remote, Duration::from_secs(5)));
        let orchestrator = NetworkOrchestrator::new(engine, store.clone(), Connectivity::Online);
        (store, orchestrator)
    }

    fn setup(connectivity: Connectivity) -> (Arc<LocalStore>, Arc<MemoryBackend>, NetworkOrchestrator) {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryBackend::new().unwrap());
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            remote.clone(),
            Duration::from_secs(5),
        ));
        let orchestrator = NetworkOrchestrator::new(engine, store.clone(), connectivity);
        (store, remote, orchestrator)
    }

    #[tokio::test]
    async fn test_coming_online_drains() {
        let (store, remote, orchestrator) = setup(Connectivity::Offline);
        store
            .enqueue(&NewQueueEntry::delete(EntityType::Company, "c1"))
            .unwrap();
        orchestrator.refresh_pending();
        assert_eq!(orchestrator.status().pending_operations, 1);
        assert_eq!(orchestrator.network_status(), "Offline");

        let report = orchestrator
            .set_connectivity(Connectivity::Online)
            .await
            .unwrap();
        assert_eq!(report.applied, 1);

        let status = orchestrator.status();
        assert_eq!(status.network_status(), "Online");
        assert_eq!(status.pending_operations, 0);
        assert!(status.last_sync_at.is_some());
        assert!(!status.is_syncing);
        assert_eq!(remote.request_count(), 1);
    }

    #[tokio::test]
    async fn test_same_state_does_not_drain() {
        let (_store, remote, orchestrator) = setup(Connectivity::Online);
        assert!(orchestrator.set_connectivity(Connectivity::Online).await.is_none());
        assert!(orchestrator.set_connectivity(Connectivity::Offline).await.is_none());
        assert_eq!(remote.request_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_pending_offline_is_noop() {
        let (store, _remote, orchestrator) = setup(Connectivity::Offline);
        store
            .enqueue(&NewQueueEntry::delete(EntityType::Company, "c1"))
            .unwrap();
        assert!(orchestrator.sync_pending().await.is_none());
        assert_eq!(store.queue_len().unwrap(), 1);
        assert!(orchestrator.status().last_sync_at.is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let (_store, _remote, orchestrator) = setup(Connectivity::Offline);
        let mut rx = orchestrator.subscribe();

        orchestrator.set_connectivity(Connectivity::Online).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().connectivity, Connectivity::Online);
    }

    #[tokio::test]
    async fn test_listener_applies_signals() {
        let (store, _remote, orchestrator) = setup(Connectivity::Offline);
        store
            .enqueue(&NewQueueEntry::delete(EntityType::Contact, "d1"))
            .unwrap();
        let orchestrator = Arc::new(orchestrator);
        let listener = spawn_connectivity_listener(orchestrator.clone());

        listener.signals.send(ConnectivitySignal::Online).await.unwrap();
        listener.signals.send(ConnectivitySignal::Shutdown).await.unwrap();
        listener.task.await.unwrap();

        assert!(orchestrator.is_online());
        assert_eq!(store.queue_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_reset_clears_history() {
        let (_store, _remote, orchestrator) = setup(Connectivity::Online);
        orchestrator.sync_pending().await.unwrap();
        assert!(orchestrator.status().last_sync_at.is_some());

        orchestrator.mark_reset();
        let status = orchestrator.status();
        assert!(status.last_sync_at.is_none());
        assert_eq!(status.pending_operations, 0);
    }

    #[tokio::test]
    async fn test_concurrent_sync_runs_once() {
        let remote = Arc::new(MemoryBackend::new().unwrap());
        let (store, orchestrator) = orchestrator_with(Arc::new(SlowBackend {
            inner: remote.clone(),
        }));
        store
            .enqueue(&NewQueueEntry::delete(EntityType::Company, "c1"))
            .unwrap();

        let (first, second) = tokio::join!(orchestrator.sync_pending(), orchestrator.sync_pending());

        assert_eq!([&first, &second].iter().filter(|r| r.is_some()).count(), 1);
        assert_eq!(remote.request_count(), 1);
        let status = orchestrator.status();
        assert!(!status.is_syncing);
        assert_eq!(status.pending_operations, 0);
    }

    #[tokio::test]
    async fn test_failed_entries_do_not_stamp_sync_time() {
        let (store, orchestrator) = orchestrator_with(Arc::new(UnavailableBackend));
        store
            .enqueue(&NewQueueEntry::delete(EntityType::Company, "c1"))
            .unwrap();

        let report = orchestrator.sync_pending().await.unwrap();
        assert_eq!(report.failed, 1);

        let status = orchestrator.status();
        assert!(status.last_sync_at.is_none());
        assert!(status.last_error.is_some());
        assert_eq!(status.pending_operations, 1);
    }

    #[test]
    fn test_connectivity_from_bool() {
        assert_eq!(Connectivity::from(true), Connectivity::Online);
        assert_eq!(Connectivity::from(false).label(), "Offline");
    }
}
