//! Error types for the network client.

use revstore_core::backend::{BackendError, ErrorCode};
use thiserror::Error;

use crate::protocol::ErrorResponse;

/// Errors returned by `RevstoreClient` methods.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(serde_json::Error),

    #[error("server disconnected")]
    Disconnected,

    #[error("connect to {0} timed out")]
    Timeout(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server error: {}: {}", .0.error, .0.message)]
    Server(ErrorResponse),
}

impl From<ClientError> for BackendError {
    fn from(err: ClientError) -> Self {
        match err {
            // The server reports backend failures with their error class.
            ClientError::Server(resp) => {
                BackendError::new(ErrorCode::parse(&resp.error), resp.message)
            }
            other => BackendError::driver(other.to_string()),
        }
    }
}
