//! Message dispatch: inbound requests to handlers, outbound messages to
//! connections.

use crate::connection::Connection;
use crate::envelope::{Request, Response};
use crate::error::{WsError, WsResult};
use crate::injector::Injector;
use crate::message::Message;
use crate::registry::ConnectionRegistry;
use crate::router::{EventContext, Reply, Router};
use crate::service::WsConfig;
use std::sync::Arc;

/// Routes inbound requests to registered handlers and outbound messages
/// to target connections.
///
/// Handler failures are caught here: they are logged, answered with an
/// error [`Response`], and never propagated, so one failing handler
/// cannot tear down a serve loop or affect other connections.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    router: Arc<Router>,
    config: WsConfig,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<ConnectionRegistry>,
        router: Arc<Router>,
        config: WsConfig,
    ) -> Self {
        Self {
            registry,
            router,
            config,
        }
    }

    /// Enqueue a message for one connection.
    ///
    /// Fails with [`WsError::ConnectionNotFound`] when the identity is
    /// absent, or [`WsError::ConnectionClosed`] when it is tearing down.
    pub fn send(&self, connection_id: &str, message: Message) -> WsResult<()> {
        self.registry.get(connection_id)?.send(message)
    }

    /// Serialize a value and send it as a text message.
    pub fn send_json<T: serde::Serialize>(&self, connection_id: &str, value: &T) -> WsResult<()> {
        self.send(connection_id, Message::json(value)?)
    }

    /// Deliver a message to every member of a room at call time.
    ///
    /// Best-effort, not transactional: a member that disconnects
    /// mid-broadcast is skipped silently. Returns the delivered count,
    /// or [`WsError::RoomNotFound`] when the room does not exist.
    pub fn broadcast(&self, room_id: &str, message: Message) -> WsResult<usize> {
        if !self.registry.rooms().contains_room(room_id) {
            return Err(WsError::RoomNotFound(room_id.to_string()));
        }
        Ok(self.deliver(self.registry.list_by_room(room_id), message, None))
    }

    /// Like [`broadcast`](Self::broadcast), excluding one identity.
    pub fn broadcast_except(
        &self,
        room_id: &str,
        message: Message,
        except: &str,
    ) -> WsResult<usize> {
        if !self.registry.rooms().contains_room(room_id) {
            return Err(WsError::RoomNotFound(room_id.to_string()));
        }
        Ok(self.deliver(self.registry.list_by_room(room_id), message, Some(except)))
    }

    /// Deliver a message to every registered connection.
    pub fn broadcast_all(&self, message: Message) -> usize {
        self.deliver(self.registry.connections(), message, None)
    }

    /// Deliver a message to every registered connection except one.
    pub fn broadcast_all_except(&self, message: Message, except: &str) -> usize {
        self.deliver(self.registry.connections(), message, Some(except))
    }

    fn deliver(
        &self,
        targets: Vec<Connection>,
        message: Message,
        except: Option<&str>,
    ) -> usize {
        let mut delivered = 0;
        for connection in targets {
            if except.is_some_and(|id| id == connection.id()) {
                continue;
            }
            if connection.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Run one inbound text frame through the router.
    pub(crate) async fn dispatch(&self, sender: &str, text: &str, injector: &Arc<Injector>) {
        let request: Request = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(connection_id = %sender, error = %e, "undecodable request");
                self.respond(sender, &Response::rejection(format!("invalid request: {e}")));
                return;
            }
        };

        let handler = match self.router.resolve(&request.route, &request.event) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::warn!(
                    connection_id = %sender,
                    route = %request.route,
                    event = %request.event,
                    "no handler for request"
                );
                self.respond(sender, &Response::failure(&request, e.to_string()));
                return;
            }
        };

        let ctx = EventContext::new(
            sender.to_string(),
            request.clone(),
            Arc::clone(&self.registry),
            Arc::clone(injector),
        );
        match handler.handle(ctx).await {
            Ok(reply) => self.apply_reply(sender, &request, reply),
            Err(e) => {
                tracing::warn!(
                    connection_id = %sender,
                    route = %request.route,
                    event = %request.event,
                    error = %e,
                    "event handler failed"
                );
                self.respond(sender, &Response::failure(&request, e.to_string()));
            }
        }
    }

    fn apply_reply(&self, sender: &str, request: &Request, reply: Reply) {
        match reply {
            Reply::None => {}
            Reply::Sender(data) => {
                self.respond(sender, &Response::success(request, data));
            }
            Reply::Room { room, data } => {
                let Some(message) = self.encode(&Response::success(request, data)) else {
                    return;
                };
                let result = if self.config.echo_broadcast {
                    self.broadcast(&room, message)
                } else {
                    self.broadcast_except(&room, message, sender)
                };
                match result {
                    Ok(delivered) => {
                        tracing::debug!(room = %room, delivered, "room reply delivered");
                    }
                    Err(e) => {
                        tracing::debug!(room = %room, error = %e, "room reply dropped");
                    }
                }
            }
            Reply::All(data) => {
                let Some(message) = self.encode(&Response::success(request, data)) else {
                    return;
                };
                let delivered = if self.config.echo_broadcast {
                    self.broadcast_all(message)
                } else {
                    self.broadcast_all_except(message, sender)
                };
                tracing::debug!(delivered, "broadcast reply delivered");
            }
        }
    }

    fn respond(&self, target: &str, response: &Response) {
        let Some(message) = self.encode(response) else {
            return;
        };
        // Fire-and-forget: the target may have disconnected since.
        if let Err(e) = self.send(target, message) {
            tracing::debug!(connection_id = %target, error = %e, "response dropped");
        }
    }

    fn encode(&self, response: &Response) -> Option<Message> {
        match Message::json(response) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response");
                None
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("connections", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn dispatcher(config: WsConfig) -> (Arc<ConnectionRegistry>, Arc<Router>, Dispatcher) {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(Router::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&router), config);
        (registry, router, dispatcher)
    }

    fn register(registry: &ConnectionRegistry, id: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry
            .add(Connection::new(id.to_string(), None, tx))
            .unwrap();
        rx
    }

    fn next_response(rx: &mut mpsc::UnboundedReceiver<Message>) -> Response {
        rx.try_recv().unwrap().parse_json().unwrap()
    }

    #[test]
    fn send_to_absent_identity_fails() {
        let (_registry, _router, dispatcher) = dispatcher(WsConfig::default());
        assert!(matches!(
            dispatcher.send("ghost", Message::text("hi")),
            Err(WsError::ConnectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn handler_reply_reaches_sender() {
        let (registry, router, dispatcher) = dispatcher(WsConfig::default());
        let mut rx = register(&registry, "a");
        router
            .route("echo")
            .on_fn("ping", |_ctx| async { Ok(Reply::Sender(json!({"data": "Pong"}))) });

        let request = serde_json::to_string(&Request::new("echo", "ping").with_id(5)).unwrap();
        dispatcher
            .dispatch("a", &request, &Arc::new(Injector::new()))
            .await;

        let response = next_response(&mut rx);
        assert!(response.is_success());
        assert_eq!(response.id, Some(json!(5)));
        assert_eq!(response.data, json!({"data": "Pong"}));
    }

    #[tokio::test]
    async fn handler_error_becomes_error_response() {
        let (registry, router, dispatcher) = dispatcher(WsConfig::default());
        let mut rx = register(&registry, "a");
        router.route("echo").on_fn("boom", |_ctx| async {
            Err(WsError::Handler("nope".to_string()))
        });

        let request = serde_json::to_string(&Request::new("echo", "boom")).unwrap();
        dispatcher
            .dispatch("a", &request, &Arc::new(Injector::new()))
            .await;

        let response = next_response(&mut rx);
        assert_eq!(response.error.as_deref(), Some("handler error: nope"));
        // The connection is untouched.
        assert!(registry.contains("a"));
        assert!(registry.get("a").unwrap().is_open());
    }

    #[tokio::test]
    async fn undecodable_frame_is_rejected_not_fatal() {
        let (registry, _router, dispatcher) = dispatcher(WsConfig::default());
        let mut rx = register(&registry, "a");

        dispatcher
            .dispatch("a", "not json", &Arc::new(Injector::new()))
            .await;

        let response = next_response(&mut rx);
        assert!(response.error.is_some());
        assert!(registry.contains("a"));
    }

    #[tokio::test]
    async fn unknown_event_reports_error() {
        let (registry, router, dispatcher) = dispatcher(WsConfig::default());
        let mut rx = register(&registry, "a");
        router.route("echo").on_fn("ping", |_ctx| async { Ok(Reply::None) });

        let request = serde_json::to_string(&Request::new("echo", "missing")).unwrap();
        dispatcher
            .dispatch("a", &request, &Arc::new(Injector::new()))
            .await;

        let response = next_response(&mut rx);
        assert!(response.error.unwrap().contains("unknown event"));
    }

    #[tokio::test]
    async fn room_reply_excludes_sender_by_default() {
        let (registry, router, dispatcher) = dispatcher(WsConfig::default());
        let mut rx_a = register(&registry, "a");
        let mut rx_b = register(&registry, "b");
        registry.rooms().join("a", "room1");
        registry.rooms().join("b", "room1");
        router.route("chat").on_fn("say", |ctx| async move {
            let data = ctx.request().data.clone();
            Ok(Reply::Room {
                room: "room1".to_string(),
                data,
            })
        });

        let request = serde_json::to_string(
            &Request::new("chat", "say").with_data(json!({"text": "hello"})),
        )
        .unwrap();
        dispatcher
            .dispatch("a", &request, &Arc::new(Injector::new()))
            .await;

        let response = next_response(&mut rx_b);
        assert_eq!(response.data, json!({"text": "hello"}));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_reply_echoes_when_configured() {
        let config = WsConfig {
            echo_broadcast: true,
            ..WsConfig::default()
        };
        let (registry, router, dispatcher) = dispatcher(config);
        let mut rx_a = register(&registry, "a");
        registry.rooms().join("a", "room1");
        router.route("chat").on_fn("say", |_ctx| async {
            Ok(Reply::Room {
                room: "room1".to_string(),
                data: json!({"text": "hi"}),
            })
        });

        let request = serde_json::to_string(&Request::new("chat", "say")).unwrap();
        dispatcher
            .dispatch("a", &request, &Arc::new(Injector::new()))
            .await;

        assert_eq!(next_response(&mut rx_a).data, json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn broadcast_skips_vanished_members() {
        let (registry, _router, dispatcher) = dispatcher(WsConfig::default());
        let _rx_a = register(&registry, "a");
        let mut rx_b = register(&registry, "b");
        registry.rooms().join("a", "room1");
        registry.rooms().join("b", "room1");

        // "a" disconnects between the membership snapshot and delivery:
        // closing its handle makes sends fail, which broadcast skips.
        registry.get("a").unwrap().close();

        let delivered = dispatcher
            .broadcast("room1", Message::text("hello"))
            .unwrap();
        assert_eq!(delivered, 1);
        assert!(rx_b.try_recv().unwrap().is_text());
    }

    #[test]
    fn broadcast_to_missing_room_fails() {
        let (_registry, _router, dispatcher) = dispatcher(WsConfig::default());
        assert!(matches!(
            dispatcher.broadcast("ghost", Message::text("hi")),
            Err(WsError::RoomNotFound(_))
        ));
    }
}
