//! Huddle wire protocol.
//!
//! Clients rendezvous in ephemeral sessions over one WebSocket each and
//! relay opaque payloads to the other members of their session.
//!
//! # Message Flow
//!
//! ```text
//! Client A                          Server                          Client B
//!    |                                |                                |
//!    |-- {"type":"create"} --------->|                                |
//!    |<- {"response":"success",id} --|                                |
//!    |                                |<------- {"type":"join",id} ----|
//!    |                                |--- {"response":"success",id} ->|
//!    |                                |                                |
//!    |-- {"type":"message",id,       |                                |
//!    |    "payload":"hi"} ---------->|----------- hi ---------------->|
//!    |<- {"response":"success",      |                                |
//!    |    "status":"sent"} ----------|                                |
//! ```
//!
//! Relayed payloads travel verbatim, without an envelope.
//!
//! # Commands
//!
//! | Type      | Required keys      | Success response                         |
//! |-----------|--------------------|------------------------------------------|
//! | `create`  |                    | `{"response":"success","id":S}`          |
//! | `join`    | `id`               | `{"response":"success","id":S}`          |
//! | `leave`   | `id`               | `{"response":"success"}`                 |
//! | `message` | `id`, `payload`    | `{"response":"success","status":"sent"}` |
//!
//! Every command may carry `"request_id": <u64>`, which the server echoes in
//! its response.
//!
//! # Response Statuses
//!
//! | Status        | Meaning                                        |
//! |---------------|------------------------------------------------|
//! | `success`     | Command applied                                |
//! | `bad_message` | Unparseable frame, missing/unknown `type`      |
//! | `bad_request` | Missing key, unknown session, not a member     |
//! | `error`       | Conflicts with membership (duplicate join)     |

mod codec;
mod message;
mod session;

pub use codec::{decode, DecodedFrame, Request};
pub use message::{Command, CommandType, ControlResponse, InboundFrame, Rejection, ResponseStatus};
pub use session::{ConnectionId, Session, SessionId};

/// Protocol version
pub const PROTOCOL_VERSION: &str = "1.1";

/// WebSocket endpoint path
pub const WS_ENDPOINT: &str = "/ws";

/// Default command timeout (milliseconds)
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;
