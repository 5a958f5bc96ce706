//! `/wsapi/sub` — subscribe to a pub/sub topic. `spec.md` §6.1.

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
struct SubFrame<'a> {
    headers: &'a [(String, String)],
    payload: String,
}

pub fn spawn(
    state: &Arc<AppState>,
    handshake: &Handshake,
    flow: &Arc<FlowControl>,
    tx: mpsc::UnboundedSender<OutboundFrame>,
) -> Result<JoinHandle<()>, GatewayError> {
    let topic_name = handshake.require_topic()?.to_string();
    let seq_min = handshake.reader_seq_min;
    let init = handshake.reader_init;
    let response_encoding = handshake.response_encoding;
    let mesh = state.process.mesh.clone();
    let flow = flow.clone();

    Ok(tokio::spawn(async move {
        let topic = mesh.pubsub.get_or_create(&topic_name).await;
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
            let frame = SubFrame { headers: &pkt.headers, payload };
            let text = serde_json::to_string(&frame).expect("SubFrame always serializes");
            if !send_and_wait(&flow, &tx, text).await {
                break;
            }
        }
    }))
}
