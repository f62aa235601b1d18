//! Command/response correlation.
//!
//! Every command is sent with a fresh, monotonically increasing
//! `request_id`, and the server echoes it back. A single driver task owns
//! the transport: it writes queued commands and routes each inbound frame
//! either to the pending command with the matching id or, failing that, to
//! the relayed-message subscribers.
//!
//! ```text
//!   send_command ──(request_id, frame)──> driver ──> sink
//!        ▲                                   │
//!        │ oneshot                           │ stream.next()
//!        │                                   ▼
//!   pending[request_id] <── response ── classify ── relayed ──> Subscribers
//! ```
//!
//! A command that times out is forgotten, but its id and type are
//! remembered for a while so that a late response is dropped instead of
//! being published as a relayed message. Only a frame whose fields fit the
//! expired command's type counts as its late response.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::subscribers::Subscribers;
use crate::error::{HuddleError, Result};
use crate::protocol::{Command, CommandType, ControlResponse, InboundFrame};

/// How many timed-out request ids are remembered.
const EXPIRED_CAPACITY: usize = 1024;

type Pending = oneshot::Sender<Result<ControlResponse>>;

enum Outbound {
    Frame { request_id: u64, frame: String },
    Close,
}

/// State shared between callers and the driver task
struct Shared {
    pending: Mutex<HashMap<u64, Pending>>,
    expired: Mutex<VecDeque<(u64, CommandType)>>,
    subscribers: Arc<Subscribers>,
    open: AtomicBool,
}

impl Shared {
    fn resolve(&self, request_id: u64, result: Result<ControlResponse>) -> bool {
        match self.pending.lock().remove(&request_id) {
            Some(tx) => {
                let _ = tx.send(result);
                true
            },
            None => false,
        }
    }

    /// Register a pending command. Fails once the engine has shut down, so
    /// nothing can be left waiting after the final rejection sweep.
    fn track(&self, request_id: u64, tx: Pending) -> bool {
        self.pending.lock().insert(request_id, tx);
        if self.open.load(Ordering::Acquire) {
            return true;
        }
        self.pending.lock().remove(&request_id);
        false
    }

    fn remember_expired(&self, request_id: u64, command: CommandType) {
        let mut expired = self.expired.lock();
        if expired.len() == EXPIRED_CAPACITY {
            expired.pop_front();
        }
        expired.push_back((request_id, command));
    }

    fn take_expired(&self, request_id: u64, response: &ControlResponse) -> bool {
        let mut expired = self.expired.lock();
        let found = expired
            .iter()
            .position(|(id, command)| *id == request_id && response.could_answer(*command));
        match found {
            Some(index) => {
                expired.remove(index);
                true
            },
            None => false,
        }
    }

    /// Route one inbound frame.
    fn route(&self, frame: String) {
        let frame = match InboundFrame::classify(frame) {
            InboundFrame::Response { response, raw } => {
                let Some(request_id) = response.request_id else {
                    self.subscribers.publish(&raw);
                    return;
                };
                if self.resolve(request_id, Ok(response.clone())) {
                    return;
                }
                if self.take_expired(request_id, &response) {
                    debug!(request_id, "dropping response to timed-out command");
                    return;
                }
                raw
            },
            InboundFrame::Relayed(frame) => frame,
        };
        self.subscribers.publish(&frame);
    }

    /// Terminal: reject everything still pending.
    fn shutdown(&self) {
        self.open.store(false, Ordering::Release);
        self.subscribers.clear();
        let pending: Vec<Pending> = self.pending.lock().drain().map(|(_, tx)| tx).collect();
        if !pending.is_empty() {
            debug!(count = pending.len(), "rejecting pending commands");
        }
        for tx in pending {
            let _ = tx.send(Err(HuddleError::ConnectionClosed));
        }
    }
}

/// Correlates commands with their responses over one transport
pub struct CorrelationEngine {
    outbound: mpsc::UnboundedSender<Outbound>,
    shared: Arc<Shared>,
    next_request_id: AtomicU64,
    timeout: Duration,
}

impl CorrelationEngine {
    /// Start the driver task over a transport's two halves.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<Si, St>(sink: Si, stream: St, timeout: Duration, subscribers: Arc<Subscribers>) -> Self
    where
        Si: Sink<String, Error = HuddleError> + Unpin + Send + 'static,
        St: Stream<Item = Result<String>> + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            expired: Mutex::new(VecDeque::new()),
            subscribers,
            open: AtomicBool::new(true),
        });

        tokio::spawn(drive(sink, stream, outbound_rx, Arc::clone(&shared)));

        Self {
            outbound,
            shared,
            next_request_id: AtomicU64::new(1),
            timeout,
        }
    }

    /// Check if the transport is still open
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Number of commands awaiting a response
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Command timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `command` and wait for its response.
    ///
    /// Resolves with whatever the server answered, success or not; only
    /// local failures (closed transport, send failure, timeout) are errors.
    pub async fn send_command(&self, command: Command) -> Result<ControlResponse> {
        if !self.is_open() {
            return Err(HuddleError::NotConnected);
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let command_type = command.command_type;
        let frame = command.with_request_id(request_id).to_json()?;

        let (tx, rx) = oneshot::channel();
        if !self.shared.track(request_id, tx) {
            return Err(HuddleError::NotConnected);
        }

        if self
            .outbound
            .send(Outbound::Frame { request_id, frame })
            .is_err()
        {
            self.shared.pending.lock().remove(&request_id);
            return Err(HuddleError::NotConnected);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HuddleError::ConnectionClosed),
            Err(_) => {
                if self.shared.pending.lock().remove(&request_id).is_some() {
                    self.shared.remember_expired(request_id, command_type);
                }
                warn!(request_id, timeout = ?self.timeout, "command timed out");
                Err(HuddleError::Timeout {
                    request_id,
                    after: self.timeout,
                })
            },
        }
    }

    /// Close the transport and reject all pending commands.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
        self.shared.shutdown();
    }
}

impl Drop for CorrelationEngine {
    fn drop(&mut self) {
        self.close();
    }
}

async fn drive<Si, St>(
    mut sink: Si,
    mut stream: St,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
) where
    Si: Sink<String, Error = HuddleError> + Unpin,
    St: Stream<Item = Result<String>> + Unpin,
{
    loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(Outbound::Frame { request_id, frame }) => {
                    if let Err(e) = sink.send(frame).await {
                        warn!(request_id, error = %e, "failed to send command");
                        shared.resolve(request_id, Err(HuddleError::SendFailed(e.to_string())));
                    }
                },
                Some(Outbound::Close) | None => {
                    let _ = sink.close().await;
                    debug!("transport closed locally");
                    break;
                },
            },
            inbound = stream.next() => match inbound {
                Some(Ok(frame)) => shared.route(frame),
                Some(Err(e)) => {
                    warn!(error = %e, "transport error");
                    break;
                },
                None => {
                    debug!("transport closed by peer");
                    break;
                },
            },
        }
    }

    shared.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseStatus;
    use futures::channel::mpsc as fmpsc;
    use serde_json::Value;

    /// In-memory transport: returns the engine plus the "server" ends.
    fn engine(
        timeout: Duration,
    ) -> (
        CorrelationEngine,
        fmpsc::UnboundedReceiver<String>,
        fmpsc::UnboundedSender<Result<String>>,
        Arc<Subscribers>,
    ) {
        let (client_tx, server_rx) = fmpsc::unbounded::<String>();
        let (server_tx, client_rx) = fmpsc::unbounded::<Result<String>>();
        let sink = client_tx.sink_map_err(|e| HuddleError::SendFailed(e.to_string()));
        let subscribers = Arc::new(Subscribers::new());
        let engine = CorrelationEngine::spawn(sink, client_rx, timeout, Arc::clone(&subscribers));
        (engine, server_rx, server_tx, subscribers)
    }

    fn request_id(frame: &str) -> u64 {
        let value: Value = serde_json::from_str(frame).unwrap();
        value["request_id"].as_u64().unwrap()
    }

    fn reply(server_tx: &fmpsc::UnboundedSender<Result<String>>, response: ControlResponse, id: u64) {
        let frame = response.with_request_id(Some(id)).to_json().unwrap();
        server_tx.unbounded_send(Ok(frame)).unwrap();
    }

    fn collect(subscribers: &Arc<Subscribers>) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        subscribers.add(Arc::new(move |frame: &str| sink.lock().push(frame.to_string())));
        log
    }

    #[tokio::test]
    async fn test_responses_matched_by_request_id_out_of_order() {
        let (engine, mut server_rx, server_tx, _subs) = engine(Duration::from_secs(5));
        let engine = Arc::new(engine);

        let first = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.send_command(Command::join("first")).await }
        });
        let id_first = request_id(&server_rx.next().await.unwrap());

        let second = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.send_command(Command::join("second")).await }
        });
        let id_second = request_id(&server_rx.next().await.unwrap());
        assert!(id_second > id_first);

        // Answer in reverse order.
        reply(&server_tx, ControlResponse::joined("second"), id_second);
        reply(&server_tx, ControlResponse::joined("first"), id_first);

        assert_eq!(first.await.unwrap().unwrap().id.as_deref(), Some("first"));
        assert_eq!(second.await.unwrap().unwrap().id.as_deref(), Some("second"));
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_relayed_frames_go_to_subscribers() {
        let (engine, mut server_rx, server_tx, subscribers) = engine(Duration::from_secs(5));
        let log = collect(&subscribers);

        let pending = tokio::spawn(async move {
            let result = engine.send_command(Command::create()).await;
            (engine, result)
        });
        let id = request_id(&server_rx.next().await.unwrap());

        // Relays arriving while a command is pending, including a JSON
        // payload shaped like a control response.
        server_tx.unbounded_send(Ok("plain text".to_string())).unwrap();
        server_tx
            .unbounded_send(Ok(r#"{"response":"success","status":"sent"}"#.to_string()))
            .unwrap();
        reply(&server_tx, ControlResponse::created("s1"), id);

        let (_engine, result) = pending.await.unwrap();
        assert_eq!(result.unwrap().id.as_deref(), Some("s1"));

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], "plain text");
        let relayed: Value = serde_json::from_str(&log[1]).unwrap();
        assert_eq!(relayed["status"], "sent");
    }

    #[tokio::test]
    async fn test_non_success_response_resolves() {
        let (engine, mut server_rx, server_tx, _subs) = engine(Duration::from_secs(5));
        let pending = tokio::spawn(async move { engine.send_command(Command::join("x")).await });
        let id = request_id(&server_rx.next().await.unwrap());

        reply(
            &server_tx,
            ControlResponse::failure(ResponseStatus::BadRequest, "session not found"),
            id,
        );
        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.response, ResponseStatus::BadRequest);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_connection_still_usable() {
        let (engine, mut server_rx, server_tx, subscribers) = engine(Duration::from_millis(100));
        let log = collect(&subscribers);
        let engine = Arc::new(engine);

        let err = engine.send_command(Command::create()).await.unwrap_err();
        let late_id = match err {
            HuddleError::Timeout { request_id, .. } => request_id,
            other => panic!("expected timeout, got {other:?}"),
        };
        assert_eq!(request_id(&server_rx.next().await.unwrap()), late_id);
        assert_eq!(engine.pending_count(), 0);

        let next = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.send_command(Command::join("s2")).await }
        });
        let next_id = request_id(&server_rx.next().await.unwrap());

        // The late response must not be taken for the next command's answer.
        reply(&server_tx, ControlResponse::created("late"), late_id);
        reply(&server_tx, ControlResponse::joined("s2"), next_id);

        assert_eq!(next.await.unwrap().unwrap().id.as_deref(), Some("s2"));
        assert!(log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_reusing_expired_id_still_published() {
        let (engine, mut server_rx, server_tx, subscribers) = engine(Duration::from_millis(100));
        let log = collect(&subscribers);

        let err = engine.send_command(Command::create()).await.unwrap_err();
        let late_id = match err {
            HuddleError::Timeout { request_id, .. } => request_id,
            other => panic!("expected timeout, got {other:?}"),
        };
        server_rx.next().await.unwrap();

        // Shaped like a `message` answer, which a `create` never gets.
        let relayed = ControlResponse::sent().with_request_id(Some(late_id)).to_json().unwrap();
        server_tx.unbounded_send(Ok(relayed.clone())).unwrap();
        // The real late answer is still dropped.
        reply(&server_tx, ControlResponse::created("late"), late_id);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*log.lock(), vec![relayed]);
        drop(engine);
    }

    #[tokio::test]
    async fn test_track_after_shutdown_is_refused() {
        let (engine, _server_rx, _server_tx, _subs) = engine(Duration::from_secs(5));
        engine.shared.shutdown();

        let (tx, mut rx) = oneshot::channel();
        assert!(!engine.shared.track(7, tx));
        assert_eq!(engine.pending_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_transport_close_rejects_pending() {
        let (engine, mut server_rx, server_tx, _subs) = engine(Duration::from_secs(5));
        let engine = Arc::new(engine);

        let pending = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.send_command(Command::create()).await }
        });
        server_rx.next().await.unwrap();
        drop(server_tx);

        assert!(matches!(
            pending.await.unwrap(),
            Err(HuddleError::ConnectionClosed)
        ));
        assert!(!engine.is_open());
        assert!(matches!(
            engine.send_command(Command::create()).await,
            Err(HuddleError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_send_failure_rejects_command() {
        let (engine, server_rx, _server_tx, _subs) = engine(Duration::from_secs(5));
        drop(server_rx);

        assert!(matches!(
            engine.send_command(Command::create()).await,
            Err(HuddleError::SendFailed(_))
        ));
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let (engine, _server_rx, _server_tx, _subs) = engine(Duration::from_secs(5));
        engine.close();
        assert!(!engine.is_open());
        assert!(matches!(
            engine.send_command(Command::create()).await,
            Err(HuddleError::NotConnected)
        ));
    }
}
