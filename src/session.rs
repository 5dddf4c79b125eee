//! The per-connection lifecycle controller.

use crate::connection::{Connection, ConnectionState};
use crate::dispatcher::Dispatcher;
use crate::envelope::Response;
use crate::error::{WsError, WsResult};
use crate::handler::WsHandler;
use crate::injector::Injector;
use crate::message::{Message, MessageKind};
use crate::service::{WsConfig, WsService};
use crate::transport::Transport;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Lifecycle phase of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport handed over, identity not yet registered.
    Accepted,
    /// Identity registered; the serve loop has not started.
    Registered,
    /// Inbound and outbound loops running.
    Serving,
    /// Teardown started; pending outbound messages flushing.
    Closing,
    /// Torn down and unregistered.
    Closed,
}

/// Options for accepting one connection.
#[derive(Debug, Default)]
pub struct SessionOptions {
    identity: Option<String>,
    remote_addr: Option<SocketAddr>,
    injector: Injector,
}

impl SessionOptions {
    /// Defaults: generated identity, no remote address, empty injector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the connection under a caller-supplied primary key
    /// instead of a generated UUID.
    pub fn identity<S: Into<String>>(mut self, identity: S) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Record the remote peer address on the connection handle.
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Attach request-scoped providers for this connection's handlers.
    pub fn injector(mut self, injector: Injector) -> Self {
        self.injector = injector;
        self
    }

    pub(crate) fn into_parts(self) -> (Option<String>, Option<SocketAddr>, Injector) {
        (self.identity, self.remote_addr, self.injector)
    }
}

/// Owns the accept-to-close state machine for one connection:
/// `Accepted -> Registered -> Serving -> Closing -> Closed`.
///
/// Created by [`WsService::accept`], already in the Registered phase.
/// [`serve`](Self::serve) drives the connection to Closed and cleans up
/// on every exit path: client close, server close, transport error.
pub struct Session<T: Transport> {
    transport: T,
    connection: Connection,
    outbound: mpsc::UnboundedReceiver<Message>,
    service: WsService,
    injector: Arc<Injector>,
    phase: SessionPhase,
}

impl<T: Transport> Session<T> {
    pub(crate) fn new(
        transport: T,
        connection: Connection,
        outbound: mpsc::UnboundedReceiver<Message>,
        service: WsService,
        injector: Arc<Injector>,
    ) -> Self {
        Self {
            transport,
            connection,
            outbound,
            service,
            injector,
            phase: SessionPhase::Registered,
        }
    }

    /// Handle to this session's connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Drive the connection until it closes.
    ///
    /// Runs as one task per connection, multiplexing the inbound frame
    /// stream and the outbound queue, so a slow peer only ever stalls
    /// itself. Returns the transport error that ended the session, if
    /// any; cleanup has already run either way.
    pub async fn serve(mut self) -> WsResult<()> {
        let id = self.connection.id().clone();
        let hooks = self.service.hooks();
        let dispatcher = self.service.dispatcher().clone();
        let config = self.service.config().clone();

        self.phase = SessionPhase::Serving;
        tracing::debug!(connection_id = %id, "session serving");
        hooks.on_connect(&self.connection).await;

        let mut failure: Option<WsError> = None;
        loop {
            tokio::select! {
                inbound = self.transport.next_message() => {
                    match inbound {
                        // Peer went away without a close frame.
                        None => break,
                        // A broken connection is not resumable.
                        Some(Err(e)) => {
                            hooks.on_error(&id, &e).await;
                            failure = Some(e);
                            break;
                        }
                        Some(Ok(message)) => {
                            if self
                                .handle_inbound(&id, message, &hooks, &dispatcher, &config)
                                .await
                            {
                                break;
                            }
                        }
                    }
                }
                outbound = self.outbound.recv() => {
                    match outbound {
                        Some(message) => {
                            let closing = message.is_close();
                            if let Err(e) = self.transport.send_message(message).await {
                                hooks.on_error(&id, &e).await;
                                failure = Some(e);
                                break;
                            }
                            // Server-initiated close: the close frame is out.
                            if closing {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        self.phase = SessionPhase::Closing;
        self.connection.advance(ConnectionState::Closing);
        tracing::debug!(connection_id = %id, "session closing");

        // No new sends land after this; only already-queued messages
        // are flushed.
        self.outbound.close();
        self.flush_pending(&id, config.close_flush_timeout).await;
        if let Err(e) = self.transport.close().await {
            tracing::debug!(connection_id = %id, error = %e, "transport close failed");
        }

        self.service.registry().remove(&id);
        self.connection.advance(ConnectionState::Closed);
        self.phase = SessionPhase::Closed;
        hooks.on_disconnect(&id).await;
        tracing::debug!(connection_id = %id, "session closed");

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Returns `true` when the session should move to Closing.
    async fn handle_inbound(
        &mut self,
        id: &str,
        message: Message,
        hooks: &Arc<dyn WsHandler>,
        dispatcher: &Dispatcher,
        config: &WsConfig,
    ) -> bool {
        if message.payload.len() > config.max_message_size {
            tracing::warn!(
                connection_id = %id,
                size = message.payload.len(),
                limit = config.max_message_size,
                "inbound message exceeds size limit"
            );
            let _ = self
                .connection
                .send_json(&Response::rejection("message exceeds size limit"));
            return false;
        }

        match message.kind {
            MessageKind::Close => true,
            MessageKind::Ping => {
                let _ = self.connection.send(Message::pong(message.payload));
                false
            }
            MessageKind::Pong => {
                hooks.on_pong(id, message.as_bytes()).await;
                false
            }
            MessageKind::Text => {
                match message.as_text() {
                    Some(text) => {
                        dispatcher.dispatch(id, text, &self.injector).await;
                    }
                    None => {
                        tracing::warn!(connection_id = %id, "text frame with invalid utf-8");
                    }
                }
                false
            }
            MessageKind::Binary => {
                hooks.on_binary(id, message.as_bytes()).await;
                false
            }
        }
    }

    /// Best-effort flush of already-queued outbound messages, bounded
    /// by the configured timeout. Failures are logged; teardown is
    /// unconditional.
    async fn flush_pending(&mut self, id: &str, timeout: Duration) {
        let mut pending = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            if !message.is_close() {
                pending.push(message);
            }
        }
        if pending.is_empty() {
            return;
        }

        let count = pending.len();
        let transport = &mut self.transport;
        let flush = async move {
            for message in pending {
                transport.send_message(message).await?;
            }
            Ok::<(), WsError>(())
        };
        match tokio::time::timeout(timeout, flush).await {
            Ok(Ok(())) => {
                tracing::debug!(connection_id = %id, count, "pending messages flushed");
            }
            Ok(Err(e)) => {
                tracing::warn!(connection_id = %id, error = %e, "flush failed, discarding pending messages");
            }
            Err(_) => {
                tracing::warn!(connection_id = %id, count, "flush timed out, discarding pending messages");
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.connection)
            .field("phase", &self.phase)
            .finish()
    }
}
