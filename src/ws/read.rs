//! `/wsapi/read` — read a raw file-backed stream. `spec.md` §6.1.
//!
//! Shares `Topic`'s replay/live shape with `/wsapi/sub`; the only
//! difference is the registry (`mesh.files` instead of `mesh.pubsub`) and
//! the required field (`path` instead of `topic`).

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::{FlowControl, OutboundFrame};
use crate::error::GatewayError;
use crate::handshake::Handshake;
use crate::ws::send_and_wait;
use crate::AppState;

#[derive(Serialize)]
struct ReadFrame<'a> {
    headers: &'a [(String, String)],
    payload: String,
}

pub fn spawn(
    state: &Arc<AppState>,
    handshake: &Handshake,
    flow: &Arc<FlowControl>,
    tx: mpsc::UnboundedSender<OutboundFrame>,
) -> Result<JoinHandle<()>, GatewayError> {
    let path = handshake.require_path()?.to_string();
    let seq_min = handshake.reader_seq_min;
    let init = handshake.reader_init;
    let response_encoding = handshake.response_encoding;
    let mesh = state.process.mesh.clone();
    let flow = flow.clone();

    Ok(tokio::spawn(async move {
        let topic = mesh.files.get_or_create(&path).await;
        let mut subscription = topic.subscribe(init, seq_min).await;

        while flow.is_running() && !flow.is_done() {
            let Some(pkt) = subscription.next().await else { break };
            let payload = match response_encoding.encode(&pkt.payload) {
                Ok(p) => p,
                Err(e) => {
                    let _ = tx.send(OutboundFrame::Close(e.close_code(), e.to_string()));
                    break;
                }
            };
            let frame = ReadFrame { headers: &pkt.headers, payload };
            let text = serde_json::to_string(&frame).expect("ReadFrame always serializes");
            if !send_and_wait(&flow, &tx, text).await {
                break;
            }
        }
    }))
}
