//! Connection-event hooks for application code.

use crate::connection::Connection;
use crate::error::WsError;
use async_trait::async_trait;

/// Callbacks fired over a connection's lifetime.
///
/// Text frames do not arrive here; they go through the
/// [`Router`](crate::Router). These hooks cover everything else: the
/// connection edges, binary payloads, and transport errors. All methods
/// have no-op defaults.
#[async_trait]
pub trait WsHandler: Send + Sync + 'static {
    /// A client connected and was registered.
    async fn on_connect(&self, connection: &Connection) {
        let _ = connection;
    }

    /// A binary frame arrived.
    async fn on_binary(&self, connection_id: &str, payload: &[u8]) {
        let _ = (connection_id, payload);
    }

    /// A pong frame arrived. Pings are answered automatically.
    async fn on_pong(&self, connection_id: &str, payload: &[u8]) {
        let _ = (connection_id, payload);
    }

    /// The transport failed while serving. The session is already on
    /// its way to Closing when this fires.
    async fn on_error(&self, connection_id: &str, error: &WsError) {
        tracing::error!(connection_id = %connection_id, error = %error, "connection error");
    }

    /// The connection was unregistered and torn down.
    async fn on_disconnect(&self, connection_id: &str) {
        let _ = connection_id;
    }
}

/// The default hooks: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

#[async_trait]
impl WsHandler for NoopHandler {}

/// Hooks that log connection edges.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl WsHandler for LoggingHandler {
    async fn on_connect(&self, connection: &Connection) {
        tracing::info!(
            connection_id = %connection.id(),
            remote_addr = ?connection.remote_addr(),
            "client connected"
        );
    }

    async fn on_binary(&self, connection_id: &str, payload: &[u8]) {
        tracing::debug!(
            connection_id = %connection_id,
            payload_len = payload.len(),
            "binary message received"
        );
    }

    async fn on_disconnect(&self, connection_id: &str) {
        tracing::info!(connection_id = %connection_id, "client disconnected");
    }
}
