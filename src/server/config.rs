//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::config::ServerSection;
use crate::error::{HuddleError, Result};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub addr: SocketAddr,
    /// How long an empty session survives before it is destroyed
    pub empty_session_grace: Duration,
    /// How often empty sessions are swept (only used with a grace period)
    pub sweep_interval: Duration,
    /// Per-connection outbound queue capacity (frames)
    pub outbound_queue: usize,
    /// Maximum inbound frame size (bytes)
    pub max_frame_bytes: usize,
    /// Enable request logging
    pub logging: bool,
    /// CORS enabled
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            empty_session_grace: Duration::ZERO,
            sweep_interval: Duration::from_secs(30),
            outbound_queue: 1024,
            max_frame_bytes: 1024 * 1024, // 1MB
            logging: true,
            cors_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Build from the `[server]` section of a config file
    pub fn from_section(section: &ServerSection) -> Result<Self> {
        let addr: SocketAddr = section.listen_addr().parse().map_err(|e| {
            HuddleError::Config(format!("Invalid listen address {}: {e}", section.listen_addr()))
        })?;

        Ok(Self {
            addr,
            empty_session_grace: Duration::from_secs(section.empty_session_grace_secs),
            sweep_interval: Duration::from_secs(section.sweep_interval_secs.max(1)),
            outbound_queue: section.outbound_queue.max(1),
            max_frame_bytes: section.max_frame_bytes,
            ..Default::default()
        })
    }

    /// Create with custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    /// Bind to all interfaces
    pub fn bind_all(mut self) -> Self {
        self.addr = SocketAddr::from(([0, 0, 0, 0], self.addr.port()));
        self
    }

    /// Set address directly
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Keep empty sessions alive for `grace` before destroying them
    pub fn with_empty_session_grace(mut self, grace: Duration) -> Self {
        self.empty_session_grace = grace;
        self
    }

    /// Set sweep interval for empty sessions
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set per-connection outbound queue capacity
    pub fn with_outbound_queue(mut self, frames: usize) -> Self {
        self.outbound_queue = frames.max(1);
        self
    }

    /// Set max inbound frame size
    pub fn with_max_frame_bytes(mut self, size: usize) -> Self {
        self.max_frame_bytes = size;
        self
    }

    /// Disable logging
    pub fn without_logging(mut self) -> Self {
        self.logging = false;
        self
    }

    /// Disable CORS
    pub fn without_cors(mut self) -> Self {
        self.cors_enabled = false;
        self
    }
}
