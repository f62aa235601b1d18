//! Session registry.
//!
//! The registry is the sole owner of session state. It maps live sessions
//! to their member sets and every connection to its outbound queue and
//! current session. All mutations (`create`, `join`, `leave`, `disconnect`)
//! take the write lock; `message` fans out under the read lock, so a relay
//! never races a membership change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::protocol::{ConnectionId, Rejection, Session, SessionId};

/// Owns all live sessions and connection bookkeeping
pub struct SessionRegistry {
    /// Sessions and connections
    inner: RwLock<RegistryInner>,
    /// Next connection identity
    next_connection: AtomicU64,
    /// How long an empty session is kept
    empty_session_grace: Duration,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, Session>,
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

/// Connection entry with its outbound queue
struct ConnectionEntry {
    /// Frames queued for the connection's writer task
    outbound: mpsc::Sender<String>,
    /// Session the connection currently belongs to
    session: Option<SessionId>,
}

/// Point-in-time view of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Session ID
    pub id: SessionId,
    /// Number of members
    pub members: usize,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

enum Delivery {
    Queued,
    Overflow,
    Closed,
}

fn deliver(outbound: &mpsc::Sender<String>, frame: String) -> Delivery {
    match outbound.try_send(frame) {
        Ok(()) => Delivery::Queued,
        Err(TrySendError::Full(_)) => Delivery::Overflow,
        Err(TrySendError::Closed(_)) => Delivery::Closed,
    }
}

impl RegistryInner {
    /// Remove `conn` from its current session. An emptied session is
    /// destroyed on the spot when there is no grace period.
    fn detach(&mut self, conn: ConnectionId, grace: Duration) -> Option<SessionId> {
        let session_id = self.connections.get_mut(&conn)?.session.take()?;

        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.remove_member(conn);
            if session.is_empty() && grace.is_zero() {
                self.sessions.remove(&session_id);
                info!(session_id = %session_id, "destroyed empty session");
            }
        }

        Some(session_id)
    }

    /// Make `conn` a member of `session_id`. The caller detaches it first.
    fn attach(&mut self, conn: ConnectionId, session_id: &SessionId) -> bool {
        let (Some(entry), Some(session)) = (
            self.connections.get_mut(&conn),
            self.sessions.get_mut(session_id),
        ) else {
            return false;
        };

        entry.session = Some(session_id.clone());
        session.add_member(conn)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Create new registry
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            next_connection: AtomicU64::new(1),
            empty_session_grace: Duration::ZERO,
        }
    }

    /// Keep empty sessions for `grace` instead of destroying them immediately
    pub fn with_empty_session_grace(mut self, grace: Duration) -> Self {
        self.empty_session_grace = grace;
        self
    }

    /// Register a connection and the queue its writer task drains
    pub async fn register(&self, outbound: mpsc::Sender<String>) -> ConnectionId {
        let conn = ConnectionId::new(self.next_connection.fetch_add(1, Ordering::Relaxed));
        self.inner.write().await.connections.insert(
            conn,
            ConnectionEntry {
                outbound,
                session: None,
            },
        );
        debug!(%conn, "registered connection");
        conn
    }

    /// Create a session with `conn` as its first member
    pub async fn create(&self, conn: ConnectionId) -> Result<SessionId, Rejection> {
        let mut inner = self.inner.write().await;
        if !inner.connections.contains_key(&conn) {
            return Err(Rejection::bad_request("connection not registered"));
        }

        let mut id = SessionId::generate();
        while inner.sessions.contains_key(&id) {
            id = SessionId::generate();
        }

        if let Some(previous) = inner.detach(conn, self.empty_session_grace) {
            debug!(%conn, session_id = %previous, "left previous session on create");
        }
        inner.sessions.insert(id.clone(), Session::new(id.clone()));
        inner.attach(conn, &id);

        info!(%conn, session_id = %id, "created session");
        Ok(id)
    }

    /// Add `conn` to an existing session
    pub async fn join(&self, conn: ConnectionId, id: &str) -> Result<SessionId, Rejection> {
        let id = SessionId::from(id);
        let mut inner = self.inner.write().await;

        let Some(session) = inner.sessions.get(&id) else {
            return Err(Rejection::bad_request("session not found"));
        };
        if session.contains(conn) {
            return Err(Rejection::conflict("user already in session"));
        }
        if !inner.connections.contains_key(&conn) {
            return Err(Rejection::bad_request("connection not registered"));
        }

        if let Some(previous) = inner.detach(conn, self.empty_session_grace) {
            debug!(%conn, session_id = %previous, "left previous session on join");
        }
        inner.attach(conn, &id);

        info!(%conn, session_id = %id, "joined session");
        Ok(id)
    }

    /// Remove `conn` from session `id`
    pub async fn leave(&self, conn: ConnectionId, id: &str) -> Result<(), Rejection> {
        let id = SessionId::from(id);
        let mut inner = self.inner.write().await;

        let Some(session) = inner.sessions.get(&id) else {
            return Err(Rejection::bad_request("session not found"));
        };
        if !session.contains(conn) {
            return Err(Rejection::bad_request(format!("user not in session {id}")));
        }

        inner.detach(conn, self.empty_session_grace);
        info!(%conn, session_id = %id, "left session");
        Ok(())
    }

    /// Relay `payload` verbatim to every member of `id` except `conn`.
    ///
    /// Returns the number of peers the payload was queued for. Peers whose
    /// outbound queue is full are evicted.
    pub async fn message(
        &self,
        conn: ConnectionId,
        id: &str,
        payload: &str,
    ) -> Result<usize, Rejection> {
        let id = SessionId::from(id);
        let mut overflowed = Vec::new();
        let mut relayed = 0;

        {
            let inner = self.inner.read().await;
            let Some(session) = inner.sessions.get(&id) else {
                return Err(Rejection::bad_request("session not found"));
            };
            if !session.contains(conn) {
                return Err(Rejection::bad_request(format!("user not in session {id}")));
            }

            for peer in session.peers_of(conn) {
                let Some(entry) = inner.connections.get(&peer) else {
                    continue;
                };
                match deliver(&entry.outbound, payload.to_string()) {
                    Delivery::Queued => relayed += 1,
                    Delivery::Overflow => overflowed.push(peer),
                    Delivery::Closed => {},
                }
            }
        }

        for peer in overflowed {
            warn!(conn = %peer, session_id = %id, "outbound queue full, evicting");
            self.disconnect(peer).await;
        }

        debug!(%conn, session_id = %id, peers = relayed, "relayed payload");
        Ok(relayed)
    }

    /// Queue a control response for `conn`.
    ///
    /// Returns `false` if the connection is gone or was evicted for
    /// overflowing its queue.
    pub async fn reply(&self, conn: ConnectionId, frame: String) -> bool {
        let delivery = {
            let inner = self.inner.read().await;
            match inner.connections.get(&conn) {
                Some(entry) => deliver(&entry.outbound, frame),
                None => return false,
            }
        };

        match delivery {
            Delivery::Queued => true,
            Delivery::Overflow => {
                warn!(%conn, "outbound queue full, evicting");
                self.disconnect(conn).await;
                false
            },
            Delivery::Closed => false,
        }
    }

    /// Forget `conn`, removing it from its session (implicit leave).
    ///
    /// Dropping the registry's queue handle ends the connection's writer.
    pub async fn disconnect(&self, conn: ConnectionId) -> Option<SessionId> {
        let mut inner = self.inner.write().await;
        let left = inner.detach(conn, self.empty_session_grace);
        if inner.connections.remove(&conn).is_some() {
            info!(%conn, session_id = ?left.as_ref().map(SessionId::as_str), "connection removed");
        }
        left
    }

    /// Destroy sessions that have been empty for longer than the grace period
    pub async fn sweep(&self) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.sessions.len();
        let grace = self.empty_session_grace;

        inner.sessions.retain(|_, session| {
            session
                .empty_since()
                .map_or(true, |since| since.elapsed() < grace)
        });

        let removed = before - inner.sessions.len();
        if removed > 0 {
            info!(removed, "swept empty sessions");
        }
        removed
    }

    /// Get session count
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Get connection count
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Members of session `id`
    pub async fn members(&self, id: &str) -> Option<Vec<ConnectionId>> {
        self.inner
            .read()
            .await
            .sessions
            .get(&SessionId::from(id))
            .map(|s| s.members().collect())
    }

    /// Session `conn` currently belongs to
    pub async fn session_of(&self, conn: ConnectionId) -> Option<SessionId> {
        self.inner
            .read()
            .await
            .connections
            .get(&conn)
            .and_then(|entry| entry.session.clone())
    }

    /// Summaries of all live sessions, oldest first
    pub async fn snapshot(&self) -> Vec<SessionSummary> {
        let inner = self.inner.read().await;
        let mut summaries: Vec<SessionSummary> = inner
            .sessions
            .values()
            .map(|s| SessionSummary {
                id: s.id().clone(),
                members: s.member_count(),
                created_at: s.created_at(),
            })
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }
}
