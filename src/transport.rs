//! The transport seam between the core and the hosting framework.

use crate::error::{WsError, WsResult};
use crate::message::Message;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;

/// An already-negotiated bidirectional message transport.
///
/// The HTTP handshake and upgrade are the hosting framework's job; the
/// core only exchanges whole frames over whatever the host hands it.
/// [`WsTransport`] adapts a `tokio-tungstenite` stream; tests use an
/// in-memory channel pair.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Receive the next inbound frame.
    ///
    /// `None` means the peer is gone; `Some(Err(_))` is a transport
    /// failure that moves the session to Closing.
    async fn next_message(&mut self) -> Option<WsResult<Message>>;

    /// Transmit one frame, whole or not at all.
    async fn send_message(&mut self, message: Message) -> WsResult<()>;

    /// Release the transport. Idempotent best-effort.
    async fn close(&mut self) -> WsResult<()>;
}

/// [`Transport`] over a negotiated `tokio-tungstenite` stream.
#[derive(Debug)]
pub struct WsTransport<S> {
    inner: WebSocketStream<S>,
}

impl<S> WsTransport<S> {
    /// Wrap a stream the host has already upgraded.
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_message(&mut self) -> Option<WsResult<Message>> {
        match self.inner.next().await {
            Some(Ok(raw)) => Some(Ok(raw.into())),
            Some(Err(e)) => Some(Err(WsError::Transport(e))),
            None => None,
        }
    }

    async fn send_message(&mut self, message: Message) -> WsResult<()> {
        self.inner
            .send(message.into())
            .await
            .map_err(WsError::Transport)
    }

    async fn close(&mut self) -> WsResult<()> {
        match self.inner.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(WsError::Transport(e)),
        }
    }
}
