//! # Huddle - Ephemeral Session Relay
//!
//! Small rendezvous protocol over WebSockets: clients create short-lived
//! sessions, others join them by id, and any member can relay an opaque
//! payload to every other member of its session.
//!
//! ## Protocol Overview
//!
//! One JSON object per frame. Commands carry a `type`; the server answers
//! each command with exactly one control response on the same connection,
//! in the order the commands arrived. Successful `message` commands
//! additionally deliver the raw `payload` string, with no envelope, to every
//! other member of the session.
//!
//! ### Architecture
//!
//! ```text
//! Client A                      Huddle Server                     Client B
//!    |                               |                                |
//!    |-- {"type":"create"} -------->|                                |
//!    |<- {"response":"success",id} -|                                |
//!    |                               |<------- {"type":"join",id} ----|
//!    |                               |-- {"response":"success",id} -->|
//!    |                               |                                |
//!    |-- {"type":"message",...} --->|------------ payload ---------->|
//!    |<- {"status":"sent"} ---------|                                |
//! ```
//!
//! ### Commands
//!
//! | Type      | Required keys     | Success response                          |
//! |-----------|-------------------|-------------------------------------------|
//! | `create`  | -                 | `{"response":"success","id":S}`           |
//! | `join`    | `id`              | `{"response":"success","id":S}`           |
//! | `leave`   | `id`              | `{"response":"success"}`                  |
//! | `message` | `id`, `payload`   | `{"response":"success","status":"sent"}`  |
//!
//! Commands may carry a numeric `request_id`; the server echoes it in the
//! response, which is how [`SessionClient`] pairs responses with commands.
//!
//! ### Response Statuses
//!
//! | Status        | Meaning                                              |
//! |---------------|------------------------------------------------------|
//! | `success`     | Command applied                                      |
//! | `bad_message` | Frame unparseable, `type` missing or unknown         |
//! | `bad_request` | Missing key, unknown session, not a member           |
//! | `error`       | Membership conflict (`user already in session`)      |
//!
//! ## Quick Start
//!
//! ### Server
//!
//! ```rust,no_run
//! use huddle::{Server, ServerConfig};
//!
//! # async fn run() -> huddle::Result<()> {
//! Server::new(ServerConfig::default().with_port(8080)).run().await
//! # }
//! ```
//!
//! ### Client
//!
//! ```rust,no_run
//! use huddle::SessionClient;
//!
//! # async fn run() -> huddle::Result<()> {
//! let client = SessionClient::connect("ws://127.0.0.1:8080/ws").await?;
//! let id = client.create_session().await?;
//! println!("share this id: {id}");
//!
//! let _sub = client.on_message(|payload| println!("<< {payload}"));
//! client.send_message("hello everyone").await?;
//! client.leave_session().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Wire envelopes, response statuses, identifiers, frame decoding
//! - [`server`]: Session registry, connection loop, HTTP/WebSocket router
//! - [`client`]: Correlation engine and session facade
//! - [`transport`]: TCP listener and client WebSocket adapter
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

// Re-exports for convenience
pub use client::{ClientConfig, CorrelationEngine, SessionClient, Subscription};
pub use config::Config;
pub use error::{HuddleError, Result};
pub use protocol::{
    Command, CommandType, ConnectionId, ControlResponse, ResponseStatus, SessionId,
    PROTOCOL_VERSION,
};
pub use server::{AppState, Server, ServerConfig, ServerHandle, SessionRegistry};
pub use transport::{TcpTransport, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
