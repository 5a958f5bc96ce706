//! `POST /rest/rpc/{topic}` — a one-shot RPC call. Request/response only:
//! unlike `/wsapi/prpc`, the REST route waits for the final (`done`)
//! reply and returns just that packet. Grounded on `rest_rpc.hpp`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::Codec;
use crate::error::GatewayError;
use crate::mesh::Packet;
use crate::AppState;

#[derive(Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    headers: Vec<(String, String)>,
    #[serde(default)]
    payload: String,
    request_encoding: Option<String>,
    response_encoding: Option<String>,
}

#[derive(Serialize)]
pub struct RpcResponse {
    headers: Vec<(String, String)>,
    payload: String,
}

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Json(req): Json<RpcRequest>,
) -> Result<Json<RpcResponse>, GatewayError> {
    let request_encoding = match req.request_encoding.as_deref() {
        Some(v) => Codec::parse(v)?,
        None => Codec::None,
    };
    let response_encoding = match req.response_encoding.as_deref() {
        Some(v) => Codec::parse(v)?,
        None => Codec::None,
    };
    let payload = request_encoding.decode(&req.payload);
    let request = Packet::new(req.headers, payload);

    let connection_id = Uuid::new_v4().to_string();
    let mut rx = state.process.mesh.prpc.connect(&topic, connection_id.clone(), request).await;

    let mut last = None;
    while let Some((pkt, done)) = rx.recv().await {
        last = Some(pkt);
        if done {
            break;
        }
    }
    state.process.mesh.prpc.cancel(&connection_id).await;

    let pkt = last.ok_or_else(|| GatewayError::producer("rpc responder produced no reply"))?;
    let payload = response_encoding.encode(&pkt.payload)?;
    Ok(Json(RpcResponse { headers: pkt.headers, payload }))
}
