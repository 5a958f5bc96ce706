//! Error taxonomy for the gateway core — see `spec.md` §7.
//!
//! Every variant maps to exactly one WebSocket close behavior in
//! [`GatewayError::close_code`]. Nothing here is retried by the gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed JSON, missing required field, unknown enum value, unknown
    /// codec name, or a duplicate handshake. Always closes with code 4000.
    #[error("{0}")]
    Handshake(String),

    /// An outbound frame could not be serialized (e.g. non-UTF-8 payload
    /// bytes under `response_encoding=none`). Closes with code 1011.
    #[error("{0}")]
    Serialization(String),

    /// The mesh runtime signaled an irrecoverable failure after handshake
    /// (e.g. a reader's backing path vanished). Closes with code 1011.
    #[error("{0}")]
    Producer(String),

    /// Errors surfaced by the mesh stand-in runtime.
    #[error(transparent)]
    Mesh(#[from] crate::mesh::MeshError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// WebSocket close code a given error terminates the connection with.
pub const HANDSHAKE_CLOSE_CODE: u16 = 4000;
pub const PRODUCER_CLOSE_CODE: u16 = 1011;

impl GatewayError {
    pub fn close_code(&self) -> u16 {
        match self {
            GatewayError::Handshake(_) => HANDSHAKE_CLOSE_CODE,
            GatewayError::Serialization(_) | GatewayError::Producer(_) => PRODUCER_CLOSE_CODE,
            GatewayError::Mesh(_) | GatewayError::Io(_) => PRODUCER_CLOSE_CODE,
        }
    }

    pub fn handshake(msg: impl Into<String>) -> Self {
        GatewayError::Handshake(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        GatewayError::Serialization(msg.into())
    }

    pub fn producer(msg: impl Into<String>) -> Self {
        GatewayError::Producer(msg.into())
    }
}

/// REST handlers (`rest/`) have no close-code concept; map the same
/// taxonomy onto HTTP status codes instead.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Handshake(_) => StatusCode::BAD_REQUEST,
            GatewayError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Producer(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Mesh(_) | GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
