//! The per-client connection handle.

use crate::error::{WsError, WsResult};
use crate::message::Message;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unique identifier for a connection.
///
/// Either a caller-supplied primary key or a generated UUID.
pub type ConnectionId = String;

/// Connection state. Transitions only ever move forward:
/// `Open -> Closing -> Closed`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Registered and serving; sends are accepted.
    Open,
    /// Teardown started; pending sends are flushed, new sends rejected.
    Closing,
    /// Fully torn down and removed from the registry.
    Closed,
}

/// Handle to one live client connection.
///
/// Cheap to clone; all clones share the same state and outbound queue.
/// The handle never owns the transport itself: sends go through the
/// session's outbound queue and are written by the connection's own task.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
    state: Arc<RwLock<ConnectionState>>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        remote_addr: Option<SocketAddr>,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: Utc::now(),
            state: Arc::new(RwLock::new(ConnectionState::Open)),
            outbound,
        }
    }

    /// The connection's identity.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Remote peer address, when the host knows it.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// When the connection was accepted.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether sends are still accepted.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Enqueue a message for transmission.
    ///
    /// Fails with [`WsError::ConnectionClosed`] once the connection has
    /// left the `Open` state. Enqueued messages are sent whole; a frame
    /// is never split across two transport writes.
    pub fn send(&self, message: Message) -> WsResult<()> {
        if !self.is_open() {
            return Err(WsError::ConnectionClosed);
        }
        self.outbound
            .send(message)
            .map_err(|e| WsError::Send(e.to_string()))
    }

    /// Enqueue a text message.
    pub fn send_text<S: Into<String>>(&self, text: S) -> WsResult<()> {
        self.send(Message::text(text))
    }

    /// Enqueue a binary message.
    pub fn send_binary<B: Into<bytes::Bytes>>(&self, data: B) -> WsResult<()> {
        self.send(Message::binary(data))
    }

    /// Serialize a value and enqueue it as a text message.
    pub fn send_json<T: serde::Serialize>(&self, value: &T) -> WsResult<()> {
        self.send(Message::json(value)?)
    }

    /// Initiate a server-side close.
    ///
    /// Marks the connection `Closing` and enqueues a close frame; the
    /// session's serve loop finishes the teardown. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.write();
        if *state == ConnectionState::Open {
            *state = ConnectionState::Closing;
            // Bypasses send(): the state is no longer Open.
            let _ = self.outbound.send(Message::close());
        }
    }

    /// Advance the state machine. Backward transitions are ignored.
    pub(crate) fn advance(&self, to: ConnectionState) {
        let mut state = self.state.write();
        if to > *state {
            *state = to;
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_connection() -> (Connection, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new("c1".to_string(), None, tx), rx)
    }

    #[test]
    fn send_while_open_enqueues() {
        let (connection, mut rx) = open_connection();
        connection.send_text("hi").unwrap();
        assert!(rx.try_recv().unwrap().is_text());
    }

    #[test]
    fn send_after_close_is_rejected() {
        let (connection, mut rx) = open_connection();
        connection.close();
        assert_eq!(connection.state(), ConnectionState::Closing);
        assert!(matches!(
            connection.send_text("late"),
            Err(WsError::ConnectionClosed)
        ));
        // The only queued frame is the close itself.
        assert!(rx.try_recv().unwrap().is_close());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn state_never_moves_backward() {
        let (connection, _rx) = open_connection();
        connection.advance(ConnectionState::Closed);
        connection.advance(ConnectionState::Open);
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[test]
    fn close_is_idempotent() {
        let (connection, mut rx) = open_connection();
        connection.close();
        connection.close();
        assert!(rx.try_recv().unwrap().is_close());
        assert!(rx.try_recv().is_err());
    }
}
