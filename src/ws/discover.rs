//! `/wsapi/discover` — topic watcher. `spec.md` §4.3 "Discover", §6.1.
//!
//! The `{topic}` placeholder's position in a protocol's path template
//! (e.g. `pubsub/{topic}.pubsub`) tells us both which directory to watch
//! (`pubsub/`) and how to recover a topic name from a directory entry
//! (strip the template's literal suffix, e.g. `.pubsub`) — the same
//! slicing `ws_discover.hpp`'s `AlephZeroCallback` does against an
//! absolute path, expressed here against the entry name `notify` already
//! gives us.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::{FlowControl, OutboundFrame};
use crate::error::{GatewayError, PRODUCER_CLOSE_CODE};
use crate::handshake::Handshake;
use crate::mesh::discover::DiscoverKind;
use crate::AppState;

#[derive(Serialize)]
struct DiscoverFrame {
    abspath: String,
    relpath: String,
    topic: String,
}

pub fn spawn(
    state: &Arc<AppState>,
    handshake: &Handshake,
    flow: &Arc<FlowControl>,
    tx: mpsc::UnboundedSender<OutboundFrame>,
) -> Result<JoinHandle<()>, GatewayError> {
    let protocol = handshake.require_protocol()?;
    let topic_glob = handshake.require_topic()?.to_string();
    let root = state.process.mesh.root.clone();
    let flow = flow.clone();

    let template = protocol.template();
    let placeholder_at = template
        .find("{topic}")
        .expect("every protocol template names {topic}");
    let suffix_len = template.len() - placeholder_at - "{topic}".len();
    let container = template[..placeholder_at].trim_end_matches('/').to_string();

    let pattern = glob::Pattern::new(&topic_glob)
        .map_err(|e| GatewayError::handshake(format!("invalid topic glob '{topic_glob}': {e}")))?;

    Ok(tokio::spawn(async move {
        let watch_dir = if container.is_empty() { "." } else { container.as_str() };
        let mut events = match crate::mesh::discover::watch(root.clone(), watch_dir).await {
            Ok(rx) => rx,
            Err(e) => {
                let _ = tx.send(OutboundFrame::Close(PRODUCER_CLOSE_CODE, e.to_string()));
                return;
            }
        };

        while flow.is_running() && !flow.is_done() {
            let Some(event) = events.recv().await else { break };
            if event.kind != DiscoverKind::Added {
                continue;
            }
            let topic = if suffix_len > 0 && event.topic.len() > suffix_len {
                event.topic[..event.topic.len() - suffix_len].to_string()
            } else {
                event.topic.clone()
            };
            if !pattern.matches(&topic) {
                continue;
            }
            let relpath = if container.is_empty() {
                event.topic.clone()
            } else {
                format!("{container}/{}", event.topic)
            };
            let abspath = root.join(&relpath).to_string_lossy().into_owned();
            let frame = DiscoverFrame { abspath, relpath, topic };
            let text = serde_json::to_string(&frame).expect("DiscoverFrame always serializes");
            // Discover events are one-shot notifications, not a paced
            // stream — spec.md §4.3 gives discover no seq_min filter and
            // no backlog; still honor the scheduler's wait so ON_ACK/
            // ON_DRAIN clients aren't flooded.
            if !crate::ws::send_and_wait(&flow, &tx, text).await {
                break;
            }
        }
    }))
}
