//! The service object tying registry, router and dispatcher together.

use crate::connection::Connection;
use crate::dispatcher::Dispatcher;
use crate::error::WsResult;
use crate::handler::{NoopHandler, WsHandler};
use crate::registry::ConnectionRegistry;
use crate::router::Router;
use crate::session::{Session, SessionOptions};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Behavioral configuration shared by all connections of a service.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Deliver room/broadcast replies back to their sender.
    pub echo_broadcast: bool,
    /// How long a closing session may spend flushing queued messages.
    pub close_flush_timeout: Duration,
    /// Maximum accepted inbound frame size in bytes.
    pub max_message_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            echo_broadcast: false,
            close_flush_timeout: Duration::from_secs(5),
            max_message_size: 64 * 1024, // 64KB
        }
    }
}

/// The framework-facing core of the library.
///
/// Owns the shared state — connection registry, router, configuration,
/// connection hooks — and hands out one [`Session`] per upgraded
/// connection. Cheap to clone; all clones share the same state.
///
/// ```rust,no_run
/// use ws_master::{Reply, Router, SessionOptions, WsService, WsTransport};
/// # async fn host(stream: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> ws_master::WsResult<()> {
/// let router = Router::new();
/// router.route("echo").on_fn("ping", |_ctx| async {
///     Ok(Reply::Sender(serde_json::json!({"data": "Pong"})))
/// });
/// let service = WsService::new(router);
///
/// // Once per connection the host has already upgraded:
/// service
///     .serve(WsTransport::new(stream), SessionOptions::new())
///     .await
/// # }
/// ```
#[derive(Clone)]
pub struct WsService {
    registry: Arc<ConnectionRegistry>,
    router: Arc<Router>,
    hooks: Arc<dyn WsHandler>,
    dispatcher: Dispatcher,
    config: WsConfig,
}

impl WsService {
    /// A service with the given router, default configuration and no-op
    /// hooks.
    pub fn new(router: Router) -> Self {
        Self::builder().router(router).build()
    }

    /// Start building a service.
    pub fn builder() -> WsServiceBuilder {
        WsServiceBuilder::new()
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The router serving this service's connections.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Handle for application-initiated sends and broadcasts.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The service configuration.
    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    pub(crate) fn hooks(&self) -> Arc<dyn WsHandler> {
        Arc::clone(&self.hooks)
    }

    /// Take ownership of an upgraded transport and register it.
    ///
    /// Called once per connection by the hosting framework. Assigns the
    /// identity (caller-supplied or a fresh UUID), registers the handle,
    /// and returns the session lifecycle controller, ready to
    /// [`serve`](Session::serve). Fails with
    /// [`WsError::DuplicateIdentity`](crate::WsError::DuplicateIdentity)
    /// when the identity is taken; the transport is dropped in that case.
    pub fn accept<T: Transport>(
        &self,
        transport: T,
        options: SessionOptions,
    ) -> WsResult<Session<T>> {
        let (identity, remote_addr, injector) = options.into_parts();
        let identity = identity.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new(identity, remote_addr, tx);
        self.registry.add(connection.clone())?;
        tracing::debug!(
            connection_id = %connection.id(),
            remote_addr = ?connection.remote_addr(),
            "connection registered"
        );

        Ok(Session::new(
            transport,
            connection,
            rx,
            self.clone(),
            Arc::new(injector),
        ))
    }

    /// [`accept`](Self::accept) and drive the session to Closed.
    pub async fn serve<T: Transport>(
        &self,
        transport: T,
        options: SessionOptions,
    ) -> WsResult<()> {
        self.accept(transport, options)?.serve().await
    }
}

impl std::fmt::Debug for WsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsService")
            .field("connections", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`WsService`].
pub struct WsServiceBuilder {
    router: Router,
    hooks: Arc<dyn WsHandler>,
    config: WsConfig,
}

impl WsServiceBuilder {
    /// Start from an empty router, no-op hooks and default config.
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            hooks: Arc::new(NoopHandler),
            config: WsConfig::default(),
        }
    }

    /// Use a pre-populated router.
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Install connection-event hooks.
    pub fn hooks<H: WsHandler>(mut self, hooks: H) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Deliver room/broadcast replies back to their sender.
    pub fn echo_broadcast(mut self, echo: bool) -> Self {
        self.config.echo_broadcast = echo;
        self
    }

    /// Bound the flush on close.
    pub fn close_flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_flush_timeout = timeout;
        self
    }

    /// Bound inbound frame size.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Build the service.
    pub fn build(self) -> WsService {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(self.router);
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&router),
            self.config.clone(),
        );
        WsService {
            registry,
            router,
            hooks: self.hooks,
            dispatcher,
            config: self.config,
        }
    }
}

impl Default for WsServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
