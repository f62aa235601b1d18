//! Server-side request decoding.
//!
//! Turns an inbound text frame into a validated [`Request`] or the
//! [`Rejection`] that must be reported back. Checks run in a fixed order:
//!
//! 1. JSON syntax (`bad_message` with the parser's reason)
//! 2. `type` present, a string, and known (`bad_message`)
//! 3. every required key present (`bad_request "missing key '<k>'"`)
//! 4. every required key a string (`bad_request "key '<k>' must be a string"`)
//!
//! Referential and membership checks belong to the session registry and run
//! only after decoding succeeds.

use serde_json::{Map, Value};

use super::message::{CommandType, Rejection};

/// A structurally valid command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Create a session
    Create,
    /// Join session `id`
    Join {
        /// Session ID
        id: String,
    },
    /// Leave session `id`
    Leave {
        /// Session ID
        id: String,
    },
    /// Relay `payload` to the other members of session `id`
    Message {
        /// Session ID
        id: String,
        /// Opaque payload
        payload: String,
    },
}

impl Request {
    /// Command type of this request
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::Create => CommandType::Create,
            Self::Join { .. } => CommandType::Join,
            Self::Leave { .. } => CommandType::Leave,
            Self::Message { .. } => CommandType::Message,
        }
    }
}

/// Result of decoding one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Request identifier to echo, when the frame carried a usable one
    pub request_id: Option<u64>,
    /// The request, or why it was refused
    pub request: Result<Request, Rejection>,
}

/// Decode an inbound text frame.
pub fn decode(frame: &str) -> DecodedFrame {
    let value: Value = match serde_json::from_str(frame) {
        Ok(value) => value,
        Err(e) => {
            return DecodedFrame {
                request_id: None,
                request: Err(Rejection::bad_message(e.to_string())),
            }
        },
    };

    let request_id = value.get("request_id").and_then(Value::as_u64);
    let request = match value.as_object() {
        Some(object) => decode_object(object),
        None => Err(Rejection::bad_message("missing key 'type'")),
    };

    DecodedFrame {
        request_id,
        request,
    }
}

fn decode_object(object: &Map<String, Value>) -> Result<Request, Rejection> {
    let command_type = match object.get("type") {
        None => return Err(Rejection::bad_message("missing key 'type'")),
        Some(Value::String(name)) => name.parse::<CommandType>().map_err(Rejection::bad_message)?,
        Some(_) => return Err(Rejection::bad_message("key 'type' must be a string")),
    };

    let required = command_type.required_keys();
    if let Some(missing) = required.iter().find(|key| !object.contains_key(**key)) {
        return Err(Rejection::bad_request(format!("missing key '{missing}'")));
    }

    let string_field = |key: &str| match object.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(Rejection::bad_request(format!("key '{key}' must be a string"))),
    };

    Ok(match command_type {
        CommandType::Create => Request::Create,
        CommandType::Join => Request::Join {
            id: string_field("id")?,
        },
        CommandType::Leave => Request::Leave {
            id: string_field("id")?,
        },
        CommandType::Message => Request::Message {
            id: string_field("id")?,
            payload: string_field("payload")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseStatus;
    use proptest::prelude::*;

    fn rejection(frame: &str) -> Rejection {
        decode(frame).request.unwrap_err()
    }

    #[test]
    fn test_decode_valid_commands() {
        assert_eq!(decode(r#"{"type":"create"}"#).request, Ok(Request::Create));
        assert_eq!(
            decode(r#"{"type":"join","id":"s1"}"#).request,
            Ok(Request::Join { id: "s1".into() })
        );
        assert_eq!(
            decode(r#"{"type":"message","id":"s1","payload":"hi"}"#).request,
            Ok(Request::Message {
                id: "s1".into(),
                payload: "hi".into()
            })
        );
    }

    #[test]
    fn test_structural_failures() {
        assert_eq!(rejection("{}"), Rejection::bad_message("missing key 'type'"));
        assert_eq!(rejection("[1,2]"), Rejection::bad_message("missing key 'type'"));
        assert_eq!(
            rejection(r#"{"type":"invalid_type"}"#),
            Rejection::bad_message("unknown key invalid_type")
        );
        assert_eq!(
            rejection(r#"{"type":5}"#),
            Rejection::bad_message("key 'type' must be a string")
        );

        let parse_error = rejection("{invalid json}");
        assert_eq!(parse_error.status, ResponseStatus::BadMessage);
        assert!(!parse_error.reason.is_empty());
    }

    #[test]
    fn test_missing_keys_reported_in_order() {
        assert_eq!(
            rejection(r#"{"type":"join"}"#),
            Rejection::bad_request("missing key 'id'")
        );
        assert_eq!(
            rejection(r#"{"type":"message","payload":"test"}"#),
            Rejection::bad_request("missing key 'id'")
        );
        assert_eq!(
            rejection(r#"{"type":"message","id":"s1"}"#),
            Rejection::bad_request("missing key 'payload'")
        );
        // Missing key wins over a wrongly typed one.
        assert_eq!(
            rejection(r#"{"type":"message","id":42}"#),
            Rejection::bad_request("missing key 'payload'")
        );
    }

    #[test]
    fn test_non_string_fields() {
        assert_eq!(
            rejection(r#"{"type":"leave","id":null}"#),
            Rejection::bad_request("key 'id' must be a string")
        );
        assert_eq!(
            rejection(r#"{"type":"message","id":"s1","payload":{"a":1}}"#),
            Rejection::bad_request("key 'payload' must be a string")
        );
    }

    #[test]
    fn test_request_id_echo() {
        assert_eq!(decode(r#"{"type":"create","request_id":9}"#).request_id, Some(9));
        assert_eq!(decode(r#"{"type":"nope","request_id":4}"#).request_id, Some(4));
        assert_eq!(decode(r#"{"type":"create","request_id":"9"}"#).request_id, None);
        assert_eq!(decode(r#"{"type":"create","request_id":-1}"#).request_id, None);
        assert_eq!(decode("not json").request_id, None);
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(frame in ".*") {
            let decoded = decode(&frame);
            if let Err(rejection) = decoded.request {
                prop_assert!(rejection.status != ResponseStatus::Success);
            }
        }

        #[test]
        fn prop_payload_kept_verbatim(payload in ".*") {
            let frame = serde_json::json!({"type": "message", "id": "s", "payload": payload.clone()}).to_string();
            prop_assert_eq!(
                decode(&frame).request,
                Ok(Request::Message { id: "s".to_string(), payload })
            );
        }
    }
}
