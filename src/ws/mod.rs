//! WebSocket route handlers — the event-loop bridge and per-route producer
//! adapters, `spec.md` §4.3/§4.5.
//!
//! [`handle_socket`] is the single "owning task" for a connection: it is
//! the only code that ever touches the `WebSocket` half directly. Each
//! route's producer task runs independently and reaches the owning task
//! only through the `mpsc::UnboundedSender<OutboundFrame>` handed to it —
//! the literal analog of the teacher's `ipc/mod.rs::handle_connection`
//! `tokio::select!` between `stream.next()` and a broadcast receiver.

pub mod discover;
pub mod log;
pub mod prpc;
pub mod read;
pub mod sub;

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::connection::{FlowControl, OutboundFrame};
use crate::error::GatewayError;
use crate::handshake::{Handshake, SchedulerMode};
use crate::observability::LatencyTracker;
use crate::AppState;

/// Which WebSocket route accepted this connection — selects the producer
/// adapter to spawn once the handshake is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum Route {
    Sub,
    Read,
    Log,
    Prpc,
    Discover,
}

impl Route {
    fn spawn(
        self,
        state: &Arc<AppState>,
        handshake: &Handshake,
        flow: &Arc<FlowControl>,
        tx: mpsc::UnboundedSender<OutboundFrame>,
        conn_id: String,
    ) -> Result<JoinHandle<()>, GatewayError> {
        match self {
            Route::Sub => sub::spawn(state, handshake, flow, tx),
            Route::Read => read::spawn(state, handshake, flow, tx),
            Route::Log => log::spawn(state, handshake, flow, tx),
            Route::Prpc => prpc::spawn(state, handshake, flow, tx, conn_id),
            Route::Discover => discover::spawn(state, handshake, flow, tx),
        }
    }
}

/// Snapshots `pre_send_cnt`, enqueues the frame, arms the `ON_DRAIN`
/// credit, and waits — steps 4, 6, 7 of `spec.md` §4.3's callback body,
/// shared by every adapter. Returns `false` if the owning task is gone.
pub(crate) async fn send_and_wait(
    flow: &FlowControl,
    tx: &mpsc::UnboundedSender<OutboundFrame>,
    frame: String,
) -> bool {
    let pre = flow.pre_send_cnt();
    if tx.send(OutboundFrame::Text(frame)).is_err() {
        return false;
    }
    if flow.scheduler() == SchedulerMode::OnDrain {
        flow.mark_send_pending();
    }
    flow.wait(pre).await;
    true
}

fn close_frame(code: u16, reason: String) -> Message {
    Message::Close(Some(CloseFrame { code, reason: reason.into() }))
}

pub async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, route: Route) {
    let first_text = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(t))) => break t.to_string(),
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(err = %e, "socket error awaiting handshake");
                return;
            }
        }
    };

    let handshake = match Handshake::parse(&first_text) {
        Ok(h) => h,
        Err(e) => {
            let _ = socket.send(close_frame(e.close_code(), e.to_string())).await;
            return;
        }
    };

    let flow = FlowControl::new(handshake.scheduler, state.process.running.clone());
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let conn_id = state.process.register(tx.clone()).await;
    let latency = LatencyTracker::start(format!("{route:?}"));

    let producer = match route.spawn(&state, &handshake, &flow, tx.clone(), conn_id.to_string()) {
        Ok(handle) => handle,
        Err(e) => {
            state.process.unregister(conn_id).await;
            let _ = socket.send(close_frame(e.close_code(), e.to_string())).await;
            return;
        }
    };

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(OutboundFrame::Text(text)) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                        if handshake.scheduler == SchedulerMode::OnDrain {
                            flow.wake_on_send_success();
                        }
                    }
                    Some(OutboundFrame::Close(code, reason)) => {
                        let _ = socket.send(close_frame(code, reason)).await;
                        break;
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(t))) => {
                        if handshake.scheduler == SchedulerMode::OnAck && t.as_str() == "ACK" {
                            flow.wake_on_ack();
                        } else {
                            let _ = socket
                                .send(close_frame(
                                    crate::error::HANDSHAKE_CLOSE_CODE,
                                    "Handshake only allowed once per websocket.".to_string(),
                                ))
                                .await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(err = %e, "socket error while streaming");
                        break;
                    }
                }
            }
        }
    }

    flow.mark_done();
    producer.abort();
    if route == Route::Prpc {
        state.process.mesh.prpc.cancel(&conn_id.to_string()).await;
    }
    state.process.unregister(conn_id).await;
    latency.finish();
    info!(conn_id, ?route, "connection closed");
}
