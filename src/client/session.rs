//! Session facade: one connection, at most one tracked session.

use std::sync::{Arc, OnceLock};

use futures::{Sink, Stream};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::config::ClientConfig;
use super::correlation::CorrelationEngine;
use super::subscribers::{Subscribers, Subscription};
use crate::error::{HuddleError, Result};
use crate::protocol::{Command, ControlResponse};
use crate::transport::connect_websocket;

/// High-level client for the session relay.
///
/// ```no_run
/// use huddle::SessionClient;
///
/// # async fn demo() -> huddle::Result<()> {
/// let client = SessionClient::connect("ws://127.0.0.1:8080/ws").await?;
/// let id = client.create_session().await?;
/// let _sub = client.on_message(|payload| println!("peer: {payload}"));
/// client.send_message("hello").await?;
/// println!("session {id}");
/// # Ok(())
/// # }
/// ```
pub struct SessionClient {
    engine: CorrelationEngine,
    subscribers: Arc<Subscribers>,
    current_session: Mutex<Option<String>>,
}

impl SessionClient {
    /// Connect to a server with the default timeout
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(&ClientConfig::new(url)).await
    }

    /// Connect using an explicit configuration
    pub async fn connect_with(config: &ClientConfig) -> Result<Self> {
        let (sink, stream) = connect_websocket(&config.url).await?;
        Ok(Self::from_transport(sink, stream, config))
    }

    /// Build a client over any frame sink/stream pair.
    ///
    /// `config.url` is ignored. Must be called within a tokio runtime.
    pub fn from_transport<Si, St>(sink: Si, stream: St, config: &ClientConfig) -> Self
    where
        Si: Sink<String, Error = HuddleError> + Unpin + Send + 'static,
        St: Stream<Item = Result<String>> + Unpin + Send + 'static,
    {
        let subscribers = Arc::new(Subscribers::new());
        let engine = CorrelationEngine::spawn(
            sink,
            stream,
            config.command_timeout,
            Arc::clone(&subscribers),
        );
        Self {
            engine,
            subscribers,
            current_session: Mutex::new(None),
        }
    }

    /// Check if the connection is open
    pub fn is_connected(&self) -> bool {
        self.engine.is_open()
    }

    /// Session this client is currently in, if any
    pub fn current_session_id(&self) -> Option<String> {
        if !self.is_connected() {
            self.current_session.lock().take();
            return None;
        }
        self.current_session.lock().clone()
    }

    /// Create a session; the client becomes its first member.
    pub async fn create_session(&self) -> Result<String> {
        let response = self.round_trip("create session", Command::create()).await?;
        let id = response.id.ok_or_else(|| {
            HuddleError::UnexpectedResponse("create succeeded without a session id".to_string())
        })?;
        info!(session = %id, "session created");
        *self.current_session.lock() = Some(id.clone());
        Ok(id)
    }

    /// Join an existing session.
    pub async fn join_session(&self, id: &str) -> Result<String> {
        let response = self.round_trip("join session", Command::join(id)).await?;
        let id = response.id.unwrap_or_else(|| id.to_string());
        info!(session = %id, "session joined");
        *self.current_session.lock() = Some(id.clone());
        Ok(id)
    }

    /// Leave the current session.
    pub async fn leave_session(&self) -> Result<()> {
        let id = self.require_session()?;
        self.round_trip("leave session", Command::leave(&id)).await?;
        info!(session = %id, "session left");
        let mut current = self.current_session.lock();
        if current.as_deref() == Some(id.as_str()) {
            *current = None;
        }
        Ok(())
    }

    /// Relay `payload` to every other member of the current session.
    pub async fn send_message(&self, payload: &str) -> Result<()> {
        let id = self.require_session()?;
        self.round_trip("send message", Command::message(&id, payload))
            .await?;
        debug!(session = %id, bytes = payload.len(), "message sent");
        Ok(())
    }

    /// Subscribe to relayed messages.
    ///
    /// Handlers run on the connection's driver task, in subscription order.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.subscribers.add(Arc::new(handler));
        Subscription::new(id, &self.subscribers)
    }

    /// Relayed messages as a channel.
    ///
    /// The channel closes when the connection does. The underlying
    /// subscription is dropped once the receiver is gone and the next message
    /// arrives.
    pub fn messages(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let own: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());

        let subscription = self.on_message({
            let own = Arc::clone(&own);
            move |frame: &str| {
                if tx.send(frame.to_string()).is_err() {
                    if let Some(subscription) = own.get() {
                        subscription.unsubscribe();
                    }
                }
            }
        });
        let _ = own.set(subscription);
        rx
    }

    /// Close the connection. Pending commands fail with
    /// [`HuddleError::ConnectionClosed`].
    pub fn disconnect(&self) {
        self.engine.close();
        self.current_session.lock().take();
        info!("disconnected");
    }

    fn require_session(&self) -> Result<String> {
        if !self.is_connected() {
            return Err(HuddleError::NotConnected);
        }
        self.current_session
            .lock()
            .clone()
            .ok_or(HuddleError::NotInSession)
    }

    async fn round_trip(&self, operation: &'static str, command: Command) -> Result<ControlResponse> {
        let response = self.engine.send_command(command).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(HuddleError::rejected(
                operation,
                response.response,
                response.reason.as_deref(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseStatus;
    use futures::channel::mpsc as fmpsc;
    use futures::{SinkExt, StreamExt};
    use serde_json::Value;
    use std::time::Duration;

    struct Peer {
        rx: fmpsc::UnboundedReceiver<String>,
        tx: fmpsc::UnboundedSender<Result<String>>,
    }

    impl Peer {
        async fn next_command(&mut self) -> Value {
            serde_json::from_str(&self.rx.next().await.unwrap()).unwrap()
        }

        fn answer(&self, command: &Value, response: ControlResponse) {
            let id = command["request_id"].as_u64();
            let frame = response.with_request_id(id).to_json().unwrap();
            self.tx.unbounded_send(Ok(frame)).unwrap();
        }

        fn relay(&self, payload: &str) {
            self.tx.unbounded_send(Ok(payload.to_string())).unwrap();
        }
    }

    fn client(timeout: Duration) -> (Arc<SessionClient>, Peer) {
        let (client_tx, server_rx) = fmpsc::unbounded::<String>();
        let (server_tx, client_rx) = fmpsc::unbounded::<Result<String>>();
        let sink = client_tx.sink_map_err(|e| HuddleError::SendFailed(e.to_string()));
        let config = ClientConfig::default().with_timeout(timeout);
        let client = SessionClient::from_transport(sink, client_rx, &config);
        (
            Arc::new(client),
            Peer {
                rx: server_rx,
                tx: server_tx,
            },
        )
    }

    #[tokio::test]
    async fn test_create_tracks_session() {
        let (client, mut peer) = client(Duration::from_secs(5));
        let task = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.create_session().await }
        });

        let command = peer.next_command().await;
        assert_eq!(command["type"], "create");
        peer.answer(&command, ControlResponse::created("s1"));

        assert_eq!(task.await.unwrap().unwrap(), "s1");
        assert_eq!(client.current_session_id().as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_send_and_leave_require_session() {
        let (client, _peer) = client(Duration::from_secs(5));
        assert!(matches!(
            client.send_message("hi").await,
            Err(HuddleError::NotInSession)
        ));
        assert!(matches!(
            client.leave_session().await,
            Err(HuddleError::NotInSession)
        ));
    }

    #[tokio::test]
    async fn test_join_rejection_is_descriptive() {
        let (client, mut peer) = client(Duration::from_secs(5));
        let task = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.join_session("missing").await }
        });

        let command = peer.next_command().await;
        assert_eq!(command["id"], "missing");
        peer.answer(
            &command,
            ControlResponse::failure(ResponseStatus::BadRequest, "session not found"),
        );

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.status(), Some(ResponseStatus::BadRequest));
        assert_eq!(err.to_string(), "Failed to join session: session not found");
        assert!(client.current_session_id().is_none());
    }

    #[tokio::test]
    async fn test_send_message_and_leave() {
        let (client, mut peer) = client(Duration::from_secs(5));

        let join = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.join_session("s9").await }
        });
        let command = peer.next_command().await;
        peer.answer(&command, ControlResponse::joined("s9"));
        join.await.unwrap().unwrap();

        let send = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.send_message("payload").await }
        });
        let command = peer.next_command().await;
        assert_eq!(command["type"], "message");
        assert_eq!(command["id"], "s9");
        assert_eq!(command["payload"], "payload");
        peer.answer(&command, ControlResponse::sent());
        send.await.unwrap().unwrap();

        let leave = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.leave_session().await }
        });
        let command = peer.next_command().await;
        assert_eq!(command["type"], "leave");
        peer.answer(&command, ControlResponse::left());
        leave.await.unwrap().unwrap();
        assert!(client.current_session_id().is_none());
    }

    #[tokio::test]
    async fn test_relayed_messages_reach_handlers_and_channel() {
        let (client, peer) = client(Duration::from_secs(5));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = client.on_message({
            let seen = Arc::clone(&seen);
            move |frame: &str| seen.lock().push(frame.to_string())
        });
        let mut rx = client.messages();

        peer.relay("one");
        peer.relay(r#"{"response":"success","id":"looks-like-control"}"#);

        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(
            rx.recv().await.unwrap(),
            r#"{"response":"success","id":"looks-like-control"}"#
        );
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_client_usable() {
        let (client, mut peer) = client(Duration::from_millis(50));
        let err = client.create_session().await.unwrap_err();
        assert!(matches!(err, HuddleError::Timeout { .. }));
        let _ignored = peer.next_command().await;

        let task = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.create_session().await }
        });
        let command = peer.next_command().await;
        peer.answer(&command, ControlResponse::created("s2"));
        assert_eq!(task.await.unwrap().unwrap(), "s2");
    }

    #[tokio::test]
    async fn test_disconnect_rejects_pending_and_clears_session() {
        let (client, mut peer) = client(Duration::from_secs(5));
        let task = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.join_session("s1").await }
        });
        let _command = peer.next_command().await;

        client.disconnect();
        assert!(matches!(
            task.await.unwrap(),
            Err(HuddleError::ConnectionClosed)
        ));
        assert!(!client.is_connected());
        assert!(client.current_session_id().is_none());
        assert!(matches!(
            client.create_session().await,
            Err(HuddleError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_server_close_clears_session() {
        let (client, mut peer) = client(Duration::from_secs(5));
        let task = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.create_session().await }
        });
        let command = peer.next_command().await;
        peer.answer(&command, ControlResponse::created("s1"));
        task.await.unwrap().unwrap();

        drop(peer);
        for _ in 0..100 {
            if !client.is_connected() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!client.is_connected());
        assert!(client.current_session_id().is_none());
    }

    #[tokio::test]
    async fn test_messages_channel_closes_with_connection() {
        let (client, peer) = client(Duration::from_secs(5));
        let mut rx = client.messages();
        peer.relay("last");
        drop(peer);

        assert_eq!(rx.recv().await.as_deref(), Some("last"));
        assert_eq!(rx.recv().await, None);
    }
}
