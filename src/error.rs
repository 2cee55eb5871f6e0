use std::time::Duration;

use crate::state::SessionState;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectFailed { endpoint: String, reason: String },
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error("handshake timed out after {duration:?}")]
    HandshakeTimeout { duration: Duration },
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("{field} = {value} is outside {min}..={max}")]
    InvalidField {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("session is {0}, frames can only be sent while active")]
    NotActive(SessionState),
    #[error("session cannot move from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
    #[error("transport closed")]
    TransportClosed,
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("no admin credential for {0}")]
    MissingCredential(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Handshake timeouts count as rejections when tallying a run.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            ClientError::AuthRejected(_) | ClientError::HandshakeTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::MalformedMessage(e.to_string())
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
