//! Relay error types.

use std::time::Duration;

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can occur while watching a chat source or relaying a batch.
///
/// Every variant except [`RelayError::Config`] is recoverable: the poll loop
/// and the flusher log it and carry on with the next iteration.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The entry list was not ready within the retrieval timeout.
    #[error("entry list not ready after {0:?}")]
    RetrievalTimeout(Duration),

    /// The source has no live chat to read right now (offline channel, ended broadcast).
    #[error("no live chat available: {0}")]
    NotLive(String),

    /// Unexpected failure while fetching the entry list.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Navigation, reload or resource discovery failed.
    #[error("navigation error: {0}")]
    Navigation(String),

    /// The outbound transport rejected or failed to deliver a batch.
    #[error("dispatch failure: {0}")]
    Dispatch(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Create a retrieval error.
    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    /// Create a navigation error.
    pub fn navigation(msg: impl Into<String>) -> Self {
        Self::Navigation(msg.into())
    }

    /// Create a dispatch error.
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Create a "not live" error.
    pub fn not_live(msg: impl Into<String>) -> Self {
        Self::NotLive(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is an expected condition rather than a fault.
    ///
    /// Benign errors are logged at low severity and retried after a fixed delay
    /// instead of going through exponential backoff.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::RetrievalTimeout(_) | Self::NotLive(_))
    }
}
