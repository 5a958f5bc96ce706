//! `GET /rest/ls/{protocol}/{glob}` — list topics matching a glob under a
//! protocol's container directory. Grounded on `rest_ls.hpp`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::GatewayError;
use crate::handshake::Protocol;
use crate::AppState;

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Path((protocol_str, glob_pattern)): Path<(String, String)>,
) -> Result<Json<Vec<String>>, GatewayError> {
    let protocol = Protocol::parse(&protocol_str)?;
    let template = protocol.template();
    let placeholder_at = template
        .find("{topic}")
        .expect("every protocol template names {topic}");
    let suffix_len = template.len() - placeholder_at - "{topic}".len();
    let container = template[..placeholder_at].trim_end_matches('/').to_string();
    let dir = if container.is_empty() {
        state.process.mesh.root.clone()
    } else {
        state.process.mesh.root.join(&container)
    };

    let pattern = glob::Pattern::new(&glob_pattern)
        .map_err(|e| GatewayError::handshake(format!("invalid glob '{glob_pattern}': {e}")))?;

    let mut topics = Vec::new();
    if let Ok(entries) = std::fs::read_dir(&dir) {
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
            let topic = if suffix_len > 0 && name.len() > suffix_len {
                name[..name.len() - suffix_len].to_string()
            } else {
                name
            };
            if pattern.matches(&topic) {
                topics.push(topic);
            }
        }
    }
    topics.sort();
    Ok(Json(topics))
}
