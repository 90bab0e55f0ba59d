//! Error types for the visibility layer.

use std::time::Duration;
use thiserror::Error;

/// A failed forward read against the log.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("read backend unavailable: {0}")]
    Unavailable(String),

    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    #[error("log access denied: {0}")]
    AccessDenied(String),
}

/// Error returned by a consumer's per-event handler.
///
/// Fatal to the subscription that delivered the event: the event is neither
/// retried nor skipped silently.
#[derive(Debug, Error)]
#[error("event handler failed: {message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError {
            message: message.into(),
        }
    }
}

/// Terminal subscription failure, carried as the cause of a drop.
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// The server refused to establish the subscription.
    #[error("subscription refused by server: {0}")]
    Refused(String),

    /// The server terminated an established subscription.
    #[error("server closed the subscription: {0}")]
    ServerClosed(String),

    /// The connection to the backend closed (client side or transport).
    #[error("connection to the backend closed")]
    ConnectionClosed,

    /// Forward reads failed past the retry policy.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The consumer's handler rejected an event.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Result type for subscription operations.
pub type Result<T, E = SubscribeError> = std::result::Result<T, E>;
