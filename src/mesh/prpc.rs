//! Progressive RPC — a request that gets a stream of reply packets
//! terminated by a final `done = true` packet. Responders are registered
//! per topic; an unregistered topic gets a default single-packet echo.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use super::Packet;

/// A registered responder. Receives the request packet and a cancellation
/// flag it should check between sends (set by [`PrpcRegistry::cancel`],
/// called when the client disconnects — `spec.md` §3 "Closed").
pub type PrpcHandler =
    Arc<dyn Fn(Packet, Arc<AtomicBool>) -> mpsc::UnboundedReceiver<(Packet, bool)> + Send + Sync>;

#[derive(Default)]
pub struct PrpcRegistry {
    handlers: Mutex<HashMap<String, PrpcHandler>>,
    cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl PrpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, topic: impl Into<String>, handler: PrpcHandler) {
        self.handlers.lock().await.insert(topic.into(), handler);
    }

    /// Connects a request to its responder, keyed by `connection_id` so a
    /// later `cancel` can stop production for this stream specifically.
    pub async fn connect(
        &self,
        topic: &str,
        connection_id: String,
        request: Packet,
    ) -> mpsc::UnboundedReceiver<(Packet, bool)> {
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .lock()
            .await
            .insert(connection_id, cancel_flag.clone());

        let handler = self.handlers.lock().await.get(topic).cloned();
        match handler {
            Some(h) => h(request, cancel_flag),
            None => default_echo(request, cancel_flag),
        }
    }

    pub async fn cancel(&self, connection_id: &str) {
        if let Some(flag) = self.cancel_flags.lock().await.remove(connection_id) {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

fn default_echo(
    request: Packet,
    cancel_flag: Arc<AtomicBool>,
) -> mpsc::UnboundedReceiver<(Packet, bool)> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if cancel_flag.load(Ordering::SeqCst) {
            return;
        }
        let reply = Packet { seq: 1, headers: request.headers, payload: request.payload };
        let _ = tx.send((reply, true));
    });
    rx
}
