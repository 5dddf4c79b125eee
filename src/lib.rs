//! # ws-master
//!
//! Simple package to create a WebSocket server.
//!
//! A lightweight layer for building WebSocket endpoints on top of an
//! existing web framework: the host performs the HTTP upgrade and hands
//! the negotiated stream to [`WsService::accept`]; this crate tracks
//! live connections, routes messages to registered handlers, manages
//! room membership for scoped broadcast, and tears connections down
//! cleanly on every exit path.
//!
//! ## Features
//!
//! - Connection registry keyed by caller-supplied primary keys or
//!   generated UUIDs
//! - Route/event handler tables over a JSON request/response envelope
//! - Rooms with implicit creation and scoped broadcast
//! - Per-connection dependency injection for request-scoped values
//! - A standalone `tokio-tungstenite` host for framework-less use
//!
//! ## Example
//!
//! ```rust,no_run
//! use ws_master::{Reply, Router, WsServer, WsService};
//!
//! #[tokio::main]
//! async fn main() -> ws_master::WsResult<()> {
//!     let router = Router::new();
//!     router.route("echo").on_fn("ping", |_ctx| async {
//!         Ok(Reply::Sender(serde_json::json!({"data": "Pong"})))
//!     });
//!     router.route("chat").on_fn("say", |ctx| async move {
//!         ctx.join("room1");
//!         Ok(Reply::Room {
//!             room: "room1".to_string(),
//!             data: ctx.request().data.clone(),
//!         })
//!     });
//!
//!     let service = WsService::new(router);
//!     WsServer::builder()
//!         .bind("127.0.0.1:9001")?
//!         .build(service)
//!         .run()
//!         .await
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod connection;
mod dispatcher;
mod envelope;
mod error;
mod handler;
mod injector;
mod message;
mod registry;
mod room;
mod router;
mod server;
mod service;
mod session;
mod transport;

pub use connection::{Connection, ConnectionId, ConnectionState};
pub use dispatcher::Dispatcher;
pub use envelope::{Request, Response};
pub use error::{WsError, WsResult};
pub use handler::{LoggingHandler, NoopHandler, WsHandler};
pub use injector::Injector;
pub use message::{Message, MessageKind};
pub use registry::ConnectionRegistry;
pub use room::{Room, RoomId, RoomManager};
pub use router::{EventContext, EventHandler, Reply, RouteTable, Router};
pub use server::{WsServer, WsServerBuilder};
pub use service::{WsConfig, WsService, WsServiceBuilder};
pub use session::{Session, SessionOptions, SessionPhase};
pub use transport::{Transport, WsTransport};

// Re-export commonly used types from tungstenite
pub use tungstenite::Message as RawMessage;
pub use tungstenite::protocol::CloseFrame;
