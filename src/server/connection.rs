//! WebSocket connection lifecycle: one connected client from upgrade
//! through disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::registry::SessionRegistry;
use super::state::AppState;
use crate::protocol::{decode, ConnectionId, ControlResponse, Rejection, Request};

/// Apply one inbound text frame to the registry and build the response.
///
/// Relayed frames for a `message` command are queued to the peers before
/// this returns, so they always precede the sender's own response.
pub async fn dispatch(registry: &SessionRegistry, conn: ConnectionId, frame: &str) -> ControlResponse {
    let decoded = decode(frame);

    let outcome = match decoded.request {
        Err(rejection) => {
            info!(%conn, %rejection, "rejected frame");
            Err(rejection)
        },
        Ok(Request::Create) => registry
            .create(conn)
            .await
            .map(|id| ControlResponse::created(id.as_str())),
        Ok(Request::Join { id }) => registry
            .join(conn, &id)
            .await
            .map(|id| ControlResponse::joined(id.as_str())),
        Ok(Request::Leave { id }) => registry.leave(conn, &id).await.map(|()| ControlResponse::left()),
        Ok(Request::Message { id, payload }) => registry
            .message(conn, &id, &payload)
            .await
            .map(|_| ControlResponse::sent()),
    };

    outcome
        .unwrap_or_else(Rejection::into_response)
        .with_request_id(decoded.request_id)
}

/// Run a connected client until either side closes.
///
/// 1. Registers the connection and its outbound queue with the registry
/// 2. Forwards queued frames (responses and relays) to the socket
/// 3. Dispatches inbound text frames as commands
/// 4. Removes the connection from its session on disconnect
#[instrument(skip_all)]
pub async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (send_tx, mut send_rx) = mpsc::channel::<String>(state.config.outbound_queue);
    let conn = state.registry.register(send_tx).await;
    info!(%conn, "client connected");

    // Ends when the registry drops the queue handle (disconnect or eviction).
    let mut outbound = tokio::spawn(async move {
        while let Some(frame) = send_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                let text = match msg {
                    Message::Text(t) => t.to_string(),
                    Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!(%conn, len = data.len(), "received non-UTF8 binary frame");
                            let response =
                                Rejection::bad_message("binary frame is not valid UTF-8").into_response();
                            if !reply(&state, conn, &response).await {
                                break;
                            }
                            continue;
                        },
                    },
                    Message::Close(_) => {
                        debug!(%conn, "client sent close frame");
                        break;
                    },
                    Message::Ping(_) | Message::Pong(_) => continue,
                };

                let response = dispatch(&state.registry, conn, &text).await;
                if !reply(&state, conn, &response).await {
                    break;
                }
            }
            _ = &mut outbound => {
                debug!(%conn, "outbound writer finished");
                break;
            }
        }
    }

    state.registry.disconnect(conn).await;
    outbound.abort();
    info!(%conn, "client disconnected");
}

async fn reply(state: &AppState, conn: ConnectionId, response: &ControlResponse) -> bool {
    match response.to_json() {
        Ok(json) => state.registry.reply(conn, json).await,
        Err(e) => {
            warn!(%conn, error = %e, "failed to encode response");
            true
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseStatus;
    use serde_json::{json, Value};

    async fn connect(registry: &SessionRegistry) -> (ConnectionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        (registry.register(tx).await, rx)
    }

    fn as_value(response: &ControlResponse) -> Value {
        serde_json::from_str(&response.to_json().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_create_and_join() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = connect(&registry).await;
        let (b, _rx_b) = connect(&registry).await;

        let created = dispatch(&registry, a, r#"{"type":"create","request_id":1}"#).await;
        assert!(created.is_success());
        assert_eq!(created.request_id, Some(1));
        let id = created.id.unwrap();

        let joined = dispatch(&registry, b, &json!({"type": "join", "id": id}).to_string()).await;
        assert_eq!(as_value(&joined), json!({"response": "success", "id": id}));

        let again = dispatch(&registry, b, &json!({"type": "join", "id": id}).to_string()).await;
        assert_eq!(
            as_value(&again),
            json!({"response": "error", "reason": "user already in session"})
        );
    }

    #[tokio::test]
    async fn test_dispatch_message_validation_order() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = connect(&registry).await;

        // Missing id is reported even though the session does not exist.
        let response = dispatch(&registry, a, r#"{"type":"message","payload":"x"}"#).await;
        assert_eq!(
            as_value(&response),
            json!({"response": "bad_request", "reason": "missing key 'id'"})
        );

        let response = dispatch(&registry, a, r#"{"type":"message","id":"nope","payload":"x"}"#).await;
        assert_eq!(
            as_value(&response),
            json!({"response": "bad_request", "reason": "session not found"})
        );
    }

    #[tokio::test]
    async fn test_dispatch_message_relays_before_responding() {
        let registry = SessionRegistry::new();
        let (a, mut rx_a) = connect(&registry).await;
        let (b, mut rx_b) = connect(&registry).await;
        let id = registry.create(a).await.unwrap();
        registry.join(b, id.as_str()).await.unwrap();

        let payload = r#"{"response":"success","status":"sent"}"#;
        let frame = json!({"type": "message", "id": id.as_str(), "payload": payload}).to_string();
        let response = dispatch(&registry, a, &frame).await;

        assert_eq!(as_value(&response), json!({"response": "success", "status": "sent"}));
        assert_eq!(rx_b.try_recv().unwrap(), payload);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_leave() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = connect(&registry).await;
        let id = registry.create(a).await.unwrap();

        let frame = json!({"type": "leave", "id": id.as_str(), "request_id": 5}).to_string();
        let response = dispatch(&registry, a, &frame).await;
        assert_eq!(as_value(&response), json!({"response": "success", "request_id": 5}));

        let response = dispatch(&registry, a, &frame).await;
        assert_eq!(response.response, ResponseStatus::BadRequest);
        assert_eq!(response.reason.as_deref(), Some("session not found"));
    }

    #[tokio::test]
    async fn test_dispatch_bad_messages() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = connect(&registry).await;

        let response = dispatch(&registry, a, "{}").await;
        assert_eq!(
            as_value(&response),
            json!({"response": "bad_message", "reason": "missing key 'type'"})
        );

        let response = dispatch(&registry, a, "{invalid json}").await;
        assert_eq!(response.response, ResponseStatus::BadMessage);
        assert!(response.reason.is_some());
    }
}
