//! Service context — the process-wide state every connection task shares.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Semaphore;

use conway_core::config::DispatchConfig;

use crate::engine_client::EngineBackend;
use crate::telemetry::TelemetryEmitter;

/// Live client connections, keyed by a process-local id.
///
/// Its size is the `num_clients_active` gauge reported in telemetry. Reads
/// race with connects and disconnects; the gauge is approximate.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<DashMap<u64, SocketAddr>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `peer` until the returned guard is dropped.
    pub fn register(&self, peer: SocketAddr) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(id, peer);
        ConnectionGuard {
            id,
            entries: self.entries.clone(),
        }
    }

    pub fn active(&self) -> usize {
        self.entries.len()
    }
}

/// Removes its connection from the registry on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: u64,
    entries: Arc<DashMap<u64, SocketAddr>>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.entries.remove(&self.id);
    }
}

/// Shared state handed to every connection task.
pub struct ServiceContext<E> {
    pub engine: E,
    pub telemetry: TelemetryEmitter,
    /// Bounds concurrent engine round-trips, not connections.
    pub dispatch: Arc<Semaphore>,
    pub dispatch_capacity: usize,
    pub connections: ConnectionRegistry,
    /// Name of the machine running the dispatcher, reported in telemetry.
    pub host_node: String,
    pub max_frame_bytes: usize,
}

impl<E: EngineBackend> ServiceContext<E> {
    pub fn new(
        engine: E,
        telemetry: TelemetryEmitter,
        dispatch: &DispatchConfig,
        host_node: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            telemetry,
            dispatch: Arc::new(Semaphore::new(dispatch.permits())),
            dispatch_capacity: dispatch.permits(),
            connections: ConnectionRegistry::new(),
            host_node: host_node.into(),
            max_frame_bytes: dispatch.max_frame_bytes,
        }
    }

    /// Engine round-trips currently running.
    pub fn in_flight(&self) -> usize {
        self.dispatch_capacity
            .saturating_sub(self.dispatch.available_permits())
    }
}
