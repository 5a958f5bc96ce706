//! `POST /rest/write/{path}` — append a packet to a file-backed stream,
//! the REST counterpart to `/wsapi/read`. Grounded on `rest_write.hpp`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::PacketRequest;
use crate::error::GatewayError;
use crate::AppState;

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Json(req): Json<PacketRequest>,
) -> Result<StatusCode, GatewayError> {
    let payload = req.decode_payload()?;
    let topic = state.process.mesh.files.get_or_create(&path).await;
    topic.publish(req.headers, payload).await;
    Ok(StatusCode::NO_CONTENT)
}
