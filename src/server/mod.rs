//! Huddle relay server.
//!
//! Serves the session-relay protocol over WebSockets, plus a couple of
//! HTTP endpoints for operators:
//! - `GET /ws`: protocol connection (WebSocket upgrade)
//! - `GET /health`: liveness
//! - `GET /status`: live sessions and connections
//!
//! # Example
//!
//! ```rust,ignore
//! use huddle::server::{Server, ServerConfig};
//!
//! let config = ServerConfig::default().with_port(8080);
//! let server = Server::new(config);
//! server.run().await?;
//! ```

mod config;
mod connection;
mod handlers;
mod registry;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub use config::ServerConfig;
pub use connection::dispatch;
pub use handlers::{create_router, health_check};
pub use registry::{SessionRegistry, SessionSummary};
pub use state::AppState;

use crate::error::Result;
use crate::transport::{serve_listener, TcpTransport, Transport};

/// Relay server: registry, router and listener
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    /// Create a server from configuration
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: Arc::new(AppState::new(config)),
        }
    }

    /// Shared state (registry and config)
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Serve until the listener fails.
    pub async fn run(self) -> Result<()> {
        let transport = TcpTransport::new(self.state.config.addr);
        let sweeper = self.state.spawn_sweeper();

        tracing::info!(
            "Huddle server listening on {}",
            transport.listen_addr()
        );
        let result = transport.serve(create_router(self.state())).await;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        result
    }

    /// Bind and serve in the background.
    ///
    /// Binding to port 0 picks a free port; the returned handle reports it.
    pub async fn start(self) -> Result<ServerHandle> {
        let transport = TcpTransport::new(self.state.config.addr);
        let listener = transport.bind().await?;
        let addr = listener.local_addr()?;

        let sweeper = self.state.spawn_sweeper();
        let router = create_router(self.state());
        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(serve_listener(listener, router, async move {
            let _ = signal.await;
        }));

        tracing::info!("Huddle server listening on {}", addr);
        Ok(ServerHandle {
            addr,
            state: self.state,
            stop_tx: shutdown,
            task,
            sweeper,
        })
    }
}

/// A server running in the background
pub struct ServerHandle {
    addr: SocketAddr,
    state: Arc<AppState>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// WebSocket URL of the protocol endpoint
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, crate::protocol::WS_ENDPOINT)
    }

    /// Shared state (registry and config)
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Stop accepting connections. Open WebSocket connections are left to
    /// finish on their own.
    pub fn shutdown(self) {
        let _ = self.stop_tx.send(());
        if let Some(sweeper) = self.sweeper {
            sweeper.abort();
        }
    }

    /// Stop accepting connections and wait for the listener to wind down
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(());
        if let Some(sweeper) = self.sweeper {
            sweeper.abort();
        }
        self.task
            .await
            .map_err(|e| crate::error::HuddleError::Server(format!("Listener task failed: {e}")))?
    }
}
