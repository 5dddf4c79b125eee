//! Self-contained TCP host for applications without a web framework.

use crate::error::{WsError, WsResult};
use crate::service::WsService;
use crate::session::SessionOptions;
use crate::transport::WsTransport;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

/// A minimal WebSocket server: listens, performs the protocol
/// handshake, and hands every connection to a [`WsService`].
///
/// Everything it does goes through the public service surface, so
/// applications hosted inside a web framework get identical behavior.
pub struct WsServer {
    bind_addr: SocketAddr,
    service: WsService,
}

impl WsServer {
    /// Create a server for the given address and service.
    pub fn new(bind_addr: SocketAddr, service: WsService) -> Self {
        Self { bind_addr, service }
    }

    /// Start building a server.
    pub fn builder() -> WsServerBuilder {
        WsServerBuilder::new()
    }

    /// The service behind this server.
    pub fn service(&self) -> &WsService {
        &self.service
    }

    /// Accept connections forever.
    ///
    /// Each accepted socket is upgraded and served on its own task;
    /// handshake and connection failures are logged and never stop the
    /// accept loop.
    pub async fn run(&self) -> WsResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "WebSocket server listening");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let service = self.service.clone();
                    tokio::spawn(async move {
                        match accept_async(stream).await {
                            Ok(ws_stream) => {
                                let transport = WsTransport::new(ws_stream);
                                let options = SessionOptions::new().remote_addr(addr);
                                if let Err(e) = service.serve(transport, options).await {
                                    tracing::error!(addr = %addr, error = %e, "connection error");
                                }
                            }
                            Err(e) => {
                                tracing::error!(addr = %addr, error = %e, "handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}

impl std::fmt::Debug for WsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsServer")
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

/// Builder for [`WsServer`].
#[derive(Debug)]
pub struct WsServerBuilder {
    bind_addr: SocketAddr,
}

impl WsServerBuilder {
    /// Defaults to binding `0.0.0.0:9001`.
    pub fn new() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9001)),
        }
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the bind address from a string.
    pub fn bind(mut self, addr: &str) -> WsResult<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| WsError::Server(format!("invalid address: {e}")))?;
        Ok(self)
    }

    /// Build the server around a service.
    pub fn build(self, service: WsService) -> WsServer {
        WsServer::new(self.bind_addr, service)
    }
}

impl Default for WsServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;

    #[test]
    fn builder_parses_bind_address() {
        let service = WsService::new(Router::new());
        let server = WsServer::builder()
            .bind("127.0.0.1:9100")
            .unwrap()
            .build(service);
        assert_eq!(server.bind_addr, "127.0.0.1:9100".parse().unwrap());
    }

    #[test]
    fn builder_rejects_garbage_address() {
        assert!(matches!(
            WsServer::builder().bind("not-an-addr"),
            Err(WsError::Server(_))
        ));
    }
}
