//! Transport layer for Huddle.
//!
//! Two sides of the same WebSocket link:
//! - **Server**: [`Transport`] serves the axum router on a listener
//!   ([`TcpTransport`]).
//! - **Client**: [`connect_websocket`] opens a connection and exposes it as
//!   an ordered stream of inbound text frames plus a sink for outbound ones,
//!   which is all the client's correlation engine needs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐            ┌──────────────────────┐
//! │    SessionClient      │            │      Huddle Server    │
//! │  (sink + stream)      │            │  (transport-agnostic) │
//! └──────────┬───────────┘            └──────────┬───────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌──────────────────────┐   ws://   ┌──────────────────────┐
//! │  connect_websocket    │ ────────> │     TcpTransport      │
//! │  (tokio-tungstenite)  │           │    (axum + hyper)     │
//! └──────────────────────┘            └──────────────────────┘
//! ```

mod tcp;
mod websocket;

pub use tcp::{serve_listener, TcpTransport};
pub use websocket::connect_websocket;

use crate::error::Result;
use axum::Router;
use std::future::Future;
use std::pin::Pin;

/// Transport trait for pluggable network backends.
///
/// Implementations handle the low-level network protocol while
/// the server remains transport-agnostic.
pub trait Transport: Send + Sync {
    /// Serve the given Axum router on this transport.
    ///
    /// This method should run until shutdown is signaled.
    fn serve(&self, router: Router) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;

    /// Get the listen address as a string.
    fn listen_addr(&self) -> String;
}
