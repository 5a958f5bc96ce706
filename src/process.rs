//! Process-wide state — `spec.md` §3 ("Process state") and §5.
//!
//! There is deliberately no `static`/`lazy_static` singleton here (see
//! SPEC_FULL.md §9): `ProcessState` is constructed explicitly in `main.rs`
//! and threaded through as `Arc<ProcessState>`, so tests can instantiate
//! independent gateways in one process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::connection::OutboundFrame;
use crate::mesh::Mesh;

pub type ConnectionId = u64;

/// A live connection's only process-visible handle: a channel into its
/// owning task, used for shutdown fan-out. Never used to touch the socket
/// directly from here — see `spec.md` §4.5.
pub struct ActiveConnection {
    pub sender: mpsc::UnboundedSender<OutboundFrame>,
}

pub struct ProcessState {
    pub running: Arc<AtomicBool>,
    active: Mutex<HashMap<ConnectionId, ActiveConnection>>,
    next_id: AtomicU64,
    pub mesh: Arc<Mesh>,
}

impl ProcessState {
    pub fn new(mesh: Arc<Mesh>) -> Arc<Self> {
        Arc::new(Self {
            running: Arc::new(AtomicBool::new(true)),
            active: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            mesh,
        })
    }

    pub async fn register(&self, sender: mpsc::UnboundedSender<OutboundFrame>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.active.lock().await.insert(id, ActiveConnection { sender });
        id
    }

    /// Invariant: a connection is removed from `active` exactly once, on
    /// close — `spec.md` §3.
    pub async fn unregister(&self, id: ConnectionId) {
        self.active.lock().await.remove(&id);
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Process shutdown (SIGINT/SIGTERM): flip `running`, defer a close of
    /// every active socket onto its own owning task.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let active = self.active.lock().await;
        for conn in active.values() {
            let _ = conn
                .sender
                .send(OutboundFrame::Close(1001, "server shutting down".into()));
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    #[tokio::test]
    async fn register_and_unregister_round_trip() {
        let mesh = Arc::new(Mesh::new(GatewayConfig::for_test().root.clone()));
        let proc = ProcessState::new(mesh);
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = proc.register(tx).await;
        assert_eq!(proc.active_count().await, 1);
        proc.unregister(id).await;
        assert_eq!(proc.active_count().await, 0);
    }

    #[tokio::test]
    async fn shutdown_flips_running_and_notifies_active_connections() {
        let mesh = Arc::new(Mesh::new(GatewayConfig::for_test().root.clone()));
        let proc = ProcessState::new(mesh);
        let (tx, mut rx) = mpsc::unbounded_channel();
        proc.register(tx).await;
        assert!(proc.is_running());
        proc.shutdown().await;
        assert!(!proc.is_running());
        match rx.recv().await {
            Some(OutboundFrame::Close(_, _)) => {}
            other => panic!("expected a Close frame, got {other:?}"),
        }
    }
}
