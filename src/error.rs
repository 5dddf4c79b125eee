//! Error types for the WebSocket layer.

use thiserror::Error;

/// Errors produced by the connection registry, dispatcher and session layer.
#[derive(Error, Debug)]
pub enum WsError {
    /// An identity was registered twice.
    #[error("duplicate identity: {0}")]
    DuplicateIdentity(String),

    /// No connection is registered under the given identity.
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    /// The named room does not exist (nobody has joined it).
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// No provider of the requested type was registered with the injector.
    #[error("provider not found: {0}")]
    ProviderNotFound(&'static str),

    /// Send attempted on a connection that is closing or closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Underlying WebSocket protocol failure.
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An application event handler failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// The outbound queue rejected a message.
    #[error("failed to enqueue message: {0}")]
    Send(String),

    /// Operation timed out
    #[error("operation timed out")]
    Timeout,

    /// Server error
    #[error("server error: {0}")]
    Server(String),
}

/// Result type for WebSocket operations.
pub type WsResult<T> = Result<T, WsError>;
