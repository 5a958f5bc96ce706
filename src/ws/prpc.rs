//! `/wsapi/prpc` — progressive RPC. `spec.md` §4.3 "Progressive-RPC NEWEST
//! mode", §6.1.
//!
//! `iter=NEXT` streams every reply in order through the same
//! send-then-wait loop the other adapters use. `iter=NEWEST` instead
//! keeps a single overwriting slot and drains it from a `wake_hook`, so
//! the client only ever sees the most recent reply — grounded on
//! `original_source/include/a0/api/actions/ws_prpc.hpp`'s
//! `AlephZeroCallback::{operator(), send_newest_locked}`.

use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::{FlowControl, OutboundFrame};
use crate::error::GatewayError;
use crate::handshake::{Handshake, ReaderIter, SchedulerMode};
use crate::mesh::Packet;
use crate::ws::send_and_wait;
use crate::AppState;

#[derive(Serialize)]
struct PrpcFrame<'a> {
    headers: &'a [(String, String)],
    payload: String,
    done: bool,
}

fn encode_frame(pkt: &Packet, done: bool, encoding: crate::codec::Codec) -> Result<String, GatewayError> {
    let payload = encoding.encode(&pkt.payload)?;
    let frame = PrpcFrame { headers: &pkt.headers, payload, done };
    Ok(serde_json::to_string(&frame).expect("PrpcFrame always serializes"))
}

pub fn spawn(
    state: &Arc<AppState>,
    handshake: &Handshake,
    flow: &Arc<FlowControl>,
    tx: mpsc::UnboundedSender<OutboundFrame>,
    conn_id: String,
) -> Result<JoinHandle<()>, GatewayError> {
    let topic_name = handshake.require_topic()?.to_string();
    let response_encoding = handshake.response_encoding;
    let request = Packet::new(handshake.headers.clone(), handshake.payload.clone());
    let mesh = state.process.mesh.clone();
    let flow = flow.clone();
    let iter = handshake.reader_iter;

    Ok(tokio::spawn(async move {
        let mut rx = mesh.prpc.connect(&topic_name, conn_id, request).await;

        match iter {
            ReaderIter::Next => {
                while flow.is_running() && !flow.is_done() {
                    let Some((pkt, done)) = rx.recv().await else { break };
                    let text = match encode_frame(&pkt, done, response_encoding) {
                        Ok(t) => t,
                        Err(e) => {
                            let _ = tx.send(OutboundFrame::Close(e.close_code(), e.to_string()));
                            break;
                        }
                    };
                    if !send_and_wait(&flow, &tx, text).await || done {
                        break;
                    }
                }
            }
            ReaderIter::Newest => run_newest(rx, tx, flow, response_encoding).await,
        }
    }))
}

/// A single-slot mailbox: at most one undelivered reply waits here at a
/// time, always the most recent one seen.
struct NewestSlot {
    pending: Option<(Packet, bool)>,
    /// `true` once the owning task has confirmed there is no send in
    /// flight and a fresh reply may go out immediately.
    ready: bool,
}

async fn run_newest(
    mut rx: mpsc::UnboundedReceiver<(Packet, bool)>,
    tx: mpsc::UnboundedSender<OutboundFrame>,
    flow: Arc<FlowControl>,
    response_encoding: crate::codec::Codec,
) {
    let slot = Arc::new(StdMutex::new(NewestSlot { pending: None, ready: true }));

    let hook_slot = slot.clone();
    let hook_tx = tx.clone();
    let hook_flow = flow.clone();
    flow.set_wake_hook(Box::new(move || {
        let mut s = hook_slot.lock().unwrap();
        match s.pending.take() {
            Some((pkt, done)) => {
                s.ready = false;
                drop(s);
                if let Ok(text) = encode_frame(&pkt, done, response_encoding) {
                    let _ = hook_tx.send(OutboundFrame::Text(text));
                    if hook_flow.scheduler() == SchedulerMode::OnDrain {
                        hook_flow.mark_send_pending();
                    }
                }
            }
            None => s.ready = true,
        }
    }));

    while let Some((pkt, done)) = rx.recv().await {
        if !flow.is_running() || flow.is_done() {
            break;
        }
        let mut s = slot.lock().unwrap();
        if s.ready {
            // Under IMMEDIATE, nothing ever calls `wake()` (ws/mod.rs only
            // wakes on ON_DRAIN/ON_ACK), so the wake_hook above never fires
            // to re-arm the slot — leave `ready` set so every subsequent
            // packet sends immediately instead of buffering into `pending`
            // forever. Mirrors the same IMMEDIATE exception in the
            // wake_hook closure above.
            if flow.scheduler() != SchedulerMode::Immediate {
                s.ready = false;
            }
            drop(s);
            match encode_frame(&pkt, done, response_encoding) {
                Ok(text) => {
                    if tx.send(OutboundFrame::Text(text)).is_err() {
                        break;
                    }
                    if flow.scheduler() == SchedulerMode::OnDrain {
                        flow.mark_send_pending();
                    }
                }
                Err(e) => {
                    let _ = tx.send(OutboundFrame::Close(e.close_code(), e.to_string()));
                    break;
                }
            }
        } else {
            s.pending = Some((pkt, done));
        }
        if done {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn text_of(frame: OutboundFrame) -> String {
        match frame {
            OutboundFrame::Text(t) => t,
            OutboundFrame::Close(code, reason) => panic!("unexpected close({code}, {reason})"),
        }
    }

    /// Regression: under IMMEDIATE, nothing ever calls `wake()`/the
    /// wake_hook (the owning task only wakes on ON_ACK/ON_DRAIN), so the
    /// slot must stay `ready` across sends instead of going stale after
    /// the first packet — every packet in a burst must reach the client,
    /// including the final `done` one.
    #[tokio::test]
    async fn immediate_newest_delivers_every_burst_packet_not_just_the_first() {
        let running = Arc::new(AtomicBool::new(true));
        let flow = FlowControl::new(SchedulerMode::Immediate, running);
        let (pkt_tx, pkt_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(run_newest(pkt_rx, out_tx, flow, crate::codec::Codec::None));

        for i in 0..3u32 {
            let done = i == 2;
            let pkt = Packet::new(vec![], format!("r{i}").into_bytes());
            pkt_tx.send((pkt, done)).unwrap();
        }
        drop(pkt_tx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("run_newest must not hang under IMMEDIATE")
            .unwrap();

        let mut payloads = Vec::new();
        while let Ok(frame) = out_rx.try_recv() {
            let v: serde_json::Value = serde_json::from_str(&text_of(frame)).unwrap();
            payloads.push(v["payload"].as_str().unwrap().to_string());
        }
        assert_eq!(payloads, vec!["r0", "r1", "r2"]);
    }
}
