//! TCP listener for the relay server.
//!
//! WebSocket upgrades and the plain HTTP endpoints share one listener,
//! served by axum over hyper.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::Transport;
use crate::error::{HuddleError, Result};

/// Plain TCP listener
#[derive(Debug, Clone)]
pub struct TcpTransport {
    listen_addr: SocketAddr,
}

impl TcpTransport {
    /// Listen on `listen_addr`
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self { listen_addr }
    }

    /// Listen on 127.0.0.1:`port`
    pub fn localhost(port: u16) -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    /// Bind without serving. Port 0 picks a free port.
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| HuddleError::Server(format!("Failed to bind {}: {e}", self.listen_addr)))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::localhost(8080)
    }
}

/// Serve `router` on a bound listener until `shutdown` resolves.
///
/// In-flight connections are drained before this returns.
pub async fn serve_listener<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| HuddleError::Server(format!("Listener failed: {e}")))
}

impl Transport for TcpTransport {
    fn serve(&self, router: Router) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let listener = self.bind().await?;
            info!(addr = %self.listen_addr, "listening");
            serve_listener(listener, router, std::future::pending()).await
        })
    }

    fn name(&self) -> &'static str {
        "TCP/HTTP"
    }

    fn listen_addr(&self) -> String {
        format!("http://{}", self.listen_addr)
    }
}
