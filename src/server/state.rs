//! Server state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

use super::config::ServerConfig;
use super::registry::SessionRegistry;

/// Application state shared across handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Session registry
    pub registry: SessionRegistry,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServerConfig) -> Self {
        let registry = SessionRegistry::new().with_empty_session_grace(config.empty_session_grace);

        Self {
            config,
            registry,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Spawn the empty-session sweeper.
    ///
    /// Returns `None` when sessions are destroyed as soon as they empty.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.config.empty_session_grace.is_zero() {
            return None;
        }

        let state = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(state.config.sweep_interval);
            loop {
                interval.tick().await;
                let removed = state.registry.sweep().await;
                if removed > 0 {
                    debug!(removed, "sweeper pass");
                }
            }
        }))
    }
}
