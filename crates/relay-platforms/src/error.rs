//! Platform adapter error types.

use chat_relay::RelayError;
use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Errors raised while talking to a chat platform or a webhook.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON payloads
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection-related errors (handshake, closed socket)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Unexpected page or protocol content
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The channel has no live chat right now
    #[error("{0}")]
    NotLive(String),
}

impl PlatformError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

impl From<PlatformError> for RelayError {
    fn from(err: PlatformError) -> Self {
        match &err {
            PlatformError::NotLive(msg) => RelayError::not_live(msg.clone()),
            PlatformError::WebSocket(_) | PlatformError::Connection(_) => {
                RelayError::navigation(err.to_string())
            }
            _ => RelayError::retrieval(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_mapping() {
        let not_live: RelayError = PlatformError::NotLive("offline".into()).into();
        assert!(not_live.is_benign());

        let conn: RelayError = PlatformError::connection("socket closed").into();
        assert!(matches!(conn, RelayError::Navigation(_)));

        let proto: RelayError = PlatformError::protocol("no chat data").into();
        assert!(matches!(proto, RelayError::Retrieval(_)));
    }
}
