//! Crate-level error types.
//!
//! [`OptioError`] unifies every error source (configuration, WebSocket,
//! JSON, waiting on the server) behind a single enum so callers can match
//! on the variant they care about while still using the `?` operator for
//! easy propagation.

use std::time::Duration;

use uuid::Uuid;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OptioError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum OptioError {
    /// Configuration could not be loaded from the environment.
    #[error("configuration error: {0}")]
    Config(String),

    /// The session credential string could not be parsed.
    #[error("invalid session credential: {0}")]
    Ssid(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regex validator was built from an invalid pattern.
    #[error("invalid validator pattern: {0}")]
    Regex(#[from] regex::Error),

    /// A frame body could not be interpreted.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// No inbound frame matched a validator within its wait window.
    #[error("no frame matched the validator within {0:?}")]
    ValidationTimeout(Duration),

    /// The server did not answer a request (order, history) in time.
    #[error("no answer from the server within {0:?}")]
    RequestTimeout(Duration),

    /// A timestamp fell outside the range of usable unix times.
    #[error("unusable timestamp: {0}")]
    InvalidTimestamp(f64),

    /// The first wait for a trade result expired; one more attempt remains.
    #[error("no result for trade {id} yet, one more attempt is allowed")]
    ResultWaitExpired { id: Uuid },

    /// Both attempts to obtain a trade result expired.
    #[error("no result for trade {id} after {attempts} attempts")]
    TradeResultTimeout { id: Uuid, attempts: u8 },

    /// The trade id has no pending entry.
    #[error("unknown trade id: {0}")]
    UnknownTradeId(Uuid),

    /// Another caller is already waiting on this trade's result.
    #[error("trade {0} already has a caller waiting for its result")]
    AlreadyAwaiting(Uuid),

    /// The server refused to open the order.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// A candle duration of zero or otherwise unusable was requested.
    #[error("invalid candle duration: {0}")]
    InvalidDuration(String),

    /// The subscription stream was cancelled or its session ended.
    #[error("subscription stream cancelled")]
    StreamCancelled,

    /// The session loop is no longer running.
    #[error("session closed")]
    SessionClosed,
}
