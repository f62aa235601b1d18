//! Protocol messages for Huddle communication.
//!
//! Defines the wire format for commands (client → server), control
//! responses (server → client) and the classification of inbound frames on
//! the client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Command types in the Huddle protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    /// Create a new session
    Create,
    /// Join an existing session
    Join,
    /// Leave the current session
    Leave,
    /// Relay a payload to the other session members
    Message,
}

impl CommandType {
    /// All command types accepted by the server.
    pub const ALL: [CommandType; 4] = [
        CommandType::Create,
        CommandType::Join,
        CommandType::Leave,
        CommandType::Message,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Message => "message",
        }
    }

    /// Keys a command of this type must carry besides `type`.
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Create => &[],
            Self::Join | Self::Leave => &["id"],
            Self::Message => &["id", "payload"],
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown key {s}"))
    }
}

/// Command envelope (client → server)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Command type
    #[serde(rename = "type")]
    pub command_type: CommandType,
    /// Session ID (join/leave/message)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Relayed payload (message)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Client-chosen request identifier, echoed in the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl Command {
    fn new(command_type: CommandType) -> Self {
        Self {
            command_type,
            id: None,
            payload: None,
            request_id: None,
        }
    }

    /// Create a `create` command
    pub fn create() -> Self {
        Self::new(CommandType::Create)
    }

    /// Create a `join` command
    pub fn join(session_id: &str) -> Self {
        Self {
            id: Some(session_id.to_string()),
            ..Self::new(CommandType::Join)
        }
    }

    /// Create a `leave` command
    pub fn leave(session_id: &str) -> Self {
        Self {
            id: Some(session_id.to_string()),
            ..Self::new(CommandType::Leave)
        }
    }

    /// Create a `message` command
    pub fn message(session_id: &str, payload: &str) -> Self {
        Self {
            id: Some(session_id.to_string()),
            payload: Some(payload.to_string()),
            ..Self::new(CommandType::Message)
        }
    }

    /// Attach a request identifier
    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Serialize to a text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Command succeeded
    Success,
    /// Command conflicts with current membership
    Error,
    /// Missing field or unknown session
    BadRequest,
    /// Unparseable or schema-violating frame
    BadMessage,
}

impl ResponseStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::BadRequest => "bad_request",
            Self::BadMessage => "bad_message",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control response envelope (server → client)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Outcome
    pub response: ResponseStatus,
    /// Session ID (create/join)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Delivery status (message)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Echo of the command's request identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl ControlResponse {
    fn new(response: ResponseStatus) -> Self {
        Self {
            response,
            id: None,
            status: None,
            reason: None,
            request_id: None,
        }
    }

    /// Session created
    pub fn created(session_id: &str) -> Self {
        Self {
            id: Some(session_id.to_string()),
            ..Self::new(ResponseStatus::Success)
        }
    }

    /// Session joined
    pub fn joined(session_id: &str) -> Self {
        Self::created(session_id)
    }

    /// Session left
    pub fn left() -> Self {
        Self::new(ResponseStatus::Success)
    }

    /// Payload relayed
    pub fn sent() -> Self {
        Self {
            status: Some("sent".to_string()),
            ..Self::new(ResponseStatus::Success)
        }
    }

    /// Non-success response with a reason
    pub fn failure(response: ResponseStatus, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new(response)
        }
    }

    /// Attach (or clear) the echoed request identifier
    pub fn with_request_id(mut self, request_id: Option<u64>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Check if the command succeeded
    pub fn is_success(&self) -> bool {
        self.response == ResponseStatus::Success
    }

    /// Check if the server could have sent this as the answer to a
    /// `command` command.
    pub fn could_answer(&self, command: CommandType) -> bool {
        if !self.is_success() {
            return self.reason.is_some() && self.id.is_none() && self.status.is_none();
        }
        if self.reason.is_some() {
            return false;
        }
        match command {
            CommandType::Create | CommandType::Join => self.id.is_some() && self.status.is_none(),
            CommandType::Leave => self.id.is_none() && self.status.is_none(),
            CommandType::Message => self.id.is_none() && self.status.as_deref() == Some("sent"),
        }
    }

    /// Serialize to a text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A command the server refused, before or after touching session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Status to report
    pub status: ResponseStatus,
    /// Reason to report
    pub reason: String,
}

impl Rejection {
    /// Structural failure
    pub fn bad_message(reason: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::BadMessage,
            reason: reason.into(),
        }
    }

    /// Request-validation failure
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::BadRequest,
            reason: reason.into(),
        }
    }

    /// State conflict
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            reason: reason.into(),
        }
    }

    /// Convert into the response sent back to the originating connection
    pub fn into_response(self) -> ControlResponse {
        ControlResponse::failure(self.status, self.reason)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.reason)
    }
}

/// An inbound frame as seen by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Frame has the shape of a control response; `raw` is the frame as received
    Response { response: ControlResponse, raw: String },
    /// Anything else: an opaque relayed payload
    Relayed(String),
}

impl InboundFrame {
    /// Classify a text frame.
    ///
    /// Shape alone does not make a frame a response to one of our commands;
    /// the correlation engine additionally requires a matching `request_id`.
    pub fn classify(frame: String) -> Self {
        match serde_json::from_str::<ControlResponse>(&frame) {
            Ok(response) => InboundFrame::Response { response, raw: frame },
            Err(_) => InboundFrame::Relayed(frame),
        }
    }
}
