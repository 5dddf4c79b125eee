//! Routing of application events to registered handlers.
//!
//! A [`Router`] maps a request's `route` to a [`RouteTable`], which maps
//! its `event` to a handler. Both lookups are resolved against a typed
//! dispatch table built at registration time.

use crate::connection::ConnectionId;
use crate::envelope::Request;
use crate::error::{WsError, WsResult};
use crate::injector::Injector;
use crate::message::Message;
use crate::registry::ConnectionRegistry;
use crate::room::RoomId;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// What a handler wants done with its result — the respondent strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// No response.
    None,
    /// Answer the requester; the correlation id is echoed back.
    Sender(Value),
    /// Broadcast to a room. The sender is excluded unless
    /// [`WsConfig::echo_broadcast`](crate::WsConfig) is set.
    Room {
        /// Target room.
        room: RoomId,
        /// Response payload.
        data: Value,
    },
    /// Broadcast to every registered connection, under the same echo
    /// policy as [`Reply::Room`].
    All(Value),
}

/// Context handed to an event handler for one request.
pub struct EventContext {
    sender: ConnectionId,
    request: Request,
    registry: Arc<ConnectionRegistry>,
    injector: Arc<Injector>,
}

impl EventContext {
    pub(crate) fn new(
        sender: ConnectionId,
        request: Request,
        registry: Arc<ConnectionRegistry>,
        injector: Arc<Injector>,
    ) -> Self {
        Self {
            sender,
            request,
            registry,
            injector,
        }
    }

    /// Identity of the connection that sent the request.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// The decoded request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Deserialize the request's `data` payload into a typed value.
    pub fn data<T: DeserializeOwned>(&self) -> WsResult<T> {
        serde_json::from_value(self.request.data.clone()).map_err(WsError::from)
    }

    /// Resolve a provider from the connection's injector.
    pub fn inject<T: Send + Sync + 'static>(&self) -> WsResult<Arc<T>> {
        self.injector.get::<T>()
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Put the sender into a room.
    pub fn join(&self, room: &str) {
        self.registry.rooms().join(&self.sender, room);
    }

    /// Take the sender out of a room.
    pub fn leave(&self, room: &str) {
        self.registry.rooms().leave(&self.sender, room);
    }

    /// Send a message directly to another connection.
    pub fn send_to(&self, connection_id: &str, message: Message) -> WsResult<()> {
        self.registry.get(connection_id)?.send(message)
    }
}

impl std::fmt::Debug for EventContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventContext")
            .field("sender", &self.sender)
            .field("request", &self.request)
            .finish()
    }
}

/// An application event handler.
///
/// Errors returned here are caught by the dispatcher, logged, and
/// answered with an error response; they never reach the serve loop.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one request and choose the respondent strategy.
    async fn handle(&self, ctx: EventContext) -> WsResult<Reply>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = WsResult<Reply>> + Send + 'static,
{
    async fn handle(&self, ctx: EventContext) -> WsResult<Reply> {
        (self.0)(ctx).await
    }
}

/// Event-to-handler table for one route.
#[derive(Default)]
pub struct RouteTable {
    route: String,
    events: DashMap<String, Arc<dyn EventHandler>>,
}

impl RouteTable {
    fn new(route: String) -> Self {
        Self {
            route,
            events: DashMap::new(),
        }
    }

    /// The route this table serves.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Register a handler for `event`. A later registration for the
    /// same event replaces the earlier one.
    pub fn on<E: Into<String>, H: EventHandler>(&self, event: E, handler: H) -> &Self {
        self.register(event.into(), Arc::new(handler));
        self
    }

    /// Register a closure for `event`.
    pub fn on_fn<E, F, Fut>(&self, event: E, handler: F) -> &Self
    where
        E: Into<String>,
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WsResult<Reply>> + Send + 'static,
    {
        self.register(event.into(), Arc::new(FnHandler(handler)));
        self
    }

    fn register(&self, event: String, handler: Arc<dyn EventHandler>) {
        tracing::debug!(route = %self.route, event = %event, "event handler registered");
        self.events.insert(event, handler);
    }

    fn resolve(&self, event: &str) -> Option<Arc<dyn EventHandler>> {
        self.events.get(event).map(|h| Arc::clone(h.value()))
    }

    /// Number of registered events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are registered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("route", &self.route)
            .field("events", &self.events.len())
            .finish()
    }
}

/// Maps request routes to their handler tables.
#[derive(Default)]
pub struct Router {
    routes: DashMap<String, Arc<RouteTable>>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the handler table for `route`.
    pub fn route<R: Into<String>>(&self, route: R) -> Arc<RouteTable> {
        let route = route.into();
        self.routes
            .entry(route.clone())
            .or_insert_with(|| Arc::new(RouteTable::new(route)))
            .clone()
    }

    /// Resolve the handler registered for `route`/`event`.
    pub fn resolve(&self, route: &str, event: &str) -> WsResult<Arc<dyn EventHandler>> {
        let table = self
            .routes
            .get(route)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| WsError::Handler(format!("unknown route: {route}")))?;
        table
            .resolve(event)
            .ok_or_else(|| WsError::Handler(format!("unknown event: {route}/{event}")))
    }

    /// Names of all registered routes.
    pub fn route_ids(&self) -> Vec<String> {
        self.routes.iter().map(|r| r.key().clone()).collect()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(request: Request) -> EventContext {
        EventContext::new(
            "sender".to_string(),
            request,
            Arc::new(ConnectionRegistry::new()),
            Arc::new(Injector::new()),
        )
    }

    #[tokio::test]
    async fn resolves_registered_handler() {
        let router = Router::new();
        router
            .route("echo")
            .on_fn("ping", |_ctx| async { Ok(Reply::Sender(json!({"data": "Pong"}))) });

        let handler = router.resolve("echo", "ping").unwrap();
        let reply = handler
            .handle(context(Request::new("echo", "ping")))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Sender(json!({"data": "Pong"})));
    }

    #[tokio::test]
    async fn unknown_route_and_event_fail() {
        let router = Router::new();
        router.route("echo").on_fn("ping", |_ctx| async { Ok(Reply::None) });

        assert!(matches!(
            router.resolve("nope", "ping"),
            Err(WsError::Handler(_))
        ));
        assert!(matches!(
            router.resolve("echo", "nope"),
            Err(WsError::Handler(_))
        ));
    }

    #[tokio::test]
    async fn context_deserializes_typed_data() {
        #[derive(serde::Deserialize)]
        struct UserData {
            user_id: u64,
        }

        let request = Request::new("echo", "user").with_data(json!({"user_id": 11}));
        let ctx = context(request);
        let data: UserData = ctx.data().unwrap();
        assert_eq!(data.user_id, 11);

        let bad: WsResult<Vec<String>> = ctx.data();
        assert!(matches!(bad, Err(WsError::Serialization(_))));
    }

    #[test]
    fn route_table_is_reused() {
        let router = Router::new();
        let first = router.route("echo");
        first.on_fn("ping", |_ctx| async { Ok(Reply::None) });
        let second = router.route("echo");
        assert_eq!(second.len(), 1);
        assert_eq!(router.route_ids(), vec!["echo".to_string()]);
    }
}
