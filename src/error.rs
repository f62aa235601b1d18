//! Huddle error types.
//!
//! # Error Families
//!
//! Errors fall into the same families the wire protocol reports:
//!
//! - **Structural / request-validation / state-conflict**: the server answered a
//!   command with a non-success status. These surface on the client as
//!   [`HuddleError::Rejected`], carrying the server's status and reason.
//! - **Local-client**: failures raised before any transport I/O, or by the
//!   client's own bookkeeping (not connected, not in a session, timeouts,
//!   send failures, closed connections).
//! - **Infrastructure**: network, configuration, serialization and I/O errors.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::ResponseStatus;

/// Huddle errors.
#[derive(Error, Debug)]
pub enum HuddleError {
    /// Operation requires an open connection.
    #[error("Not connected")]
    NotConnected,

    /// Operation requires a current session.
    #[error("Not in a session")]
    NotInSession,

    /// No response arrived within the command timeout.
    #[error("Command timeout: request {request_id} got no response within {after:?}")]
    Timeout {
        /// Identifier of the request that timed out.
        request_id: u64,
        /// Timeout that elapsed.
        after: Duration,
    },

    /// Writing the command to the transport failed.
    #[error("Failed to send command: {0}")]
    SendFailed(String),

    /// The connection closed while the operation was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server answered with a non-success response.
    #[error("Failed to {operation}: {reason}")]
    Rejected {
        /// Operation that was rejected (e.g. "join session").
        operation: &'static str,
        /// Status the server replied with.
        status: ResponseStatus,
        /// Reason reported by the server.
        reason: String,
    },

    /// The server answered with a success response missing expected fields.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// Server-side error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Huddle operations
pub type Result<T> = std::result::Result<T, HuddleError>;

impl HuddleError {
    /// Build a rejection error from a server status and reason.
    pub fn rejected(operation: &'static str, status: ResponseStatus, reason: Option<&str>) -> Self {
        HuddleError::Rejected {
            operation,
            status,
            reason: reason.unwrap_or("Unknown error").to_string(),
        }
    }

    /// Server status of a rejected operation, if this is a rejection.
    pub fn status(&self) -> Option<ResponseStatus> {
        match self {
            HuddleError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for HuddleError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        HuddleError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for HuddleError {
    fn from(err: toml::de::Error) -> Self {
        HuddleError::Config(err.to_string())
    }
}
