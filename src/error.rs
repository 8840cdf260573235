//! Error types shared by both agent binaries.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

/// Closed error taxonomy for the batching agent (spec.md §7).
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// Missing/invalid input at the HTTP boundary. Never enters the batcher.
    #[error("invalid request: {0}")]
    Validation(String),

    /// An operation type reached the batcher without a recognized grouping key.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The backend returned an error (network, auth, per-command).
    #[error("backend error: {0}")]
    Backend(String),

    /// The request was submitted during or after shutdown.
    #[error("agent is shutting down")]
    ShuttingDown,

    /// The response could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be resolved at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to bind the HTTP listener or otherwise start the process.
    #[error("startup error: {0}")]
    Startup(String),
}

impl AgentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AgentError::Validation(_) => StatusCode::BAD_REQUEST,
            AgentError::UnsupportedOperation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::ShuttingDown => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::Config(_) | AgentError::Startup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}
