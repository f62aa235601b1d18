//! Relayed-message subscribers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

/// Callback invoked for every relayed frame.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Ordered set of relayed-message handlers.
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, MessageHandler)>>,
}

impl Subscribers {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler, returning its subscription id
    pub fn add(&self, handler: MessageHandler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, handler));
        id
    }

    /// Remove a handler. Returns `false` if it was already gone.
    pub fn remove(&self, id: u64) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    /// Drop every handler. Channels fed by handlers close as a result.
    pub fn clear(&self) {
        self.handlers.lock().clear();
    }

    /// Number of handlers
    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Check if there are no handlers
    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }

    /// Deliver `frame` to every handler registered at the time of the call,
    /// in subscription order.
    ///
    /// Handlers run on a snapshot, without the lock held, so they may
    /// subscribe or unsubscribe (themselves included) freely.
    pub fn publish(&self, frame: &str) {
        let snapshot: Vec<MessageHandler> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(frame))).is_err() {
                warn!("message handler panicked");
            }
        }
    }
}

/// Handle returned by `on_message`; removes the handler when asked.
///
/// Dropping the handle keeps the handler registered.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    pub(crate) fn new(id: u64, subscribers: &Arc<Subscribers>) -> Self {
        Self {
            id,
            subscribers: Arc::downgrade(subscribers),
        }
    }

    /// Subscription id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop receiving messages. Idempotent.
    pub fn unsubscribe(&self) -> bool {
        self.subscribers
            .upgrade()
            .is_some_and(|subscribers| subscribers.remove(self.id))
    }
}
