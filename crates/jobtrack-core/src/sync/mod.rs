//! Offline queue reconciliation
//!
//! Writes made while disconnected are queued locally and replayed against
//! the remote backend once connectivity returns.
//!
//! ## Flow
//!
//! 1. Local mutations while offline append queue entries
//! 2. The orchestrator sees the transition to online
//! 3. The engine replays the queue in timestamp order
//! 4. Applied entries are removed; failed ones wait for the next drain

mod engine;
mod network;

pub use engine::{DrainReport, SyncEngine, SyncError};
pub use network::{
    spawn_connectivity_listener, Connectivity, ConnectivityListener, ConnectivitySignal,
    NetworkOrchestrator, SyncStatus,
};
