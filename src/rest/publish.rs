//! `POST /rest/pub/{topic}` — publish a packet to a pub/sub topic.
//! Grounded on `rest_pub.hpp`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::PacketRequest;
use crate::error::GatewayError;
use crate::AppState;

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Json(req): Json<PacketRequest>,
) -> Result<StatusCode, GatewayError> {
    let payload = req.decode_payload()?;
    let topic = state.process.mesh.pubsub.get_or_create(&topic).await;
    topic.publish(req.headers, payload).await;
    Ok(StatusCode::NO_CONTENT)
}
