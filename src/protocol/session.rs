//! Session and connection identity.
//!
//! A [`Session`] is the registry's record of one rendezvous group: its
//! identifier, its member set and when it was created. Members are plain
//! [`ConnectionId`]s; the connections themselves belong to the transport.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, server-generated session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Borrow as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned identity of one transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw identifier
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live session
#[derive(Debug, Clone)]
pub struct Session {
    /// Session ID
    id: SessionId,
    /// Current members
    members: BTreeSet<ConnectionId>,
    /// Creation time
    created_at: DateTime<Utc>,
    /// When the member set last became empty
    empty_since: Option<Instant>,
}

impl Session {
    /// Create an empty session
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            members: BTreeSet::new(),
            created_at: Utc::now(),
            empty_since: Some(Instant::now()),
        }
    }

    /// Get session ID
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Get creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Add a member. Returns `false` if it was already one.
    pub fn add_member(&mut self, conn: ConnectionId) -> bool {
        let added = self.members.insert(conn);
        if added {
            self.empty_since = None;
        }
        added
    }

    /// Remove a member. Returns `false` if it was not one.
    pub fn remove_member(&mut self, conn: ConnectionId) -> bool {
        let removed = self.members.remove(&conn);
        if removed && self.members.is_empty() {
            self.empty_since = Some(Instant::now());
        }
        removed
    }

    /// Check membership
    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.members.contains(&conn)
    }

    /// Iterate over members in identity order
    pub fn members(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.members.iter().copied()
    }

    /// Members other than `conn`
    pub fn peers_of(&self, conn: ConnectionId) -> impl Iterator<Item = ConnectionId> + '_ {
        self.members().filter(move |m| *m != conn)
    }

    /// Number of members
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if the session has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// When the session became empty, if it currently is
    pub fn empty_since(&self) -> Option<Instant> {
        self.empty_since
    }
}
