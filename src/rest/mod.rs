//! REST endpoints — `ls`, `pub`, `rpc`, `write`. `spec.md` §1 names these
//! as out-of-scope external collaborators ("straightforward
//! request/response handlers with no streaming state"); they are
//! implemented here only so the gateway is runnable end to end, grounded
//! on `original_source/include/a0/api/actions/rest_*.hpp`.

pub mod ls;
pub mod publish;
pub mod rpc;
pub mod write;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use serde::Deserialize;

use crate::codec::Codec;
use crate::error::GatewayError;
use crate::AppState;

/// Request body shared by `pub` and `write`: a packet plus the codec its
/// `payload` string is encoded with.
#[derive(Deserialize)]
pub struct PacketRequest {
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub payload: String,
    pub request_encoding: Option<String>,
}

impl PacketRequest {
    pub fn decode_payload(&self) -> Result<Vec<u8>, GatewayError> {
        let codec = match &self.request_encoding {
            Some(v) => Codec::parse(v)?,
            None => Codec::None,
        };
        Ok(codec.decode(&self.payload))
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rest/ls/{protocol}/{*glob}", get(ls::handle))
        .route("/rest/pub/{*topic}", post(publish::handle))
        .route("/rest/rpc/{*topic}", post(rpc::handle))
        .route("/rest/write/{*path}", post(write::handle))
}
