//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`HUDDLE_*`)
//! - CLI arguments (applied last by the binary)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{HuddleError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Relay server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Client settings
    #[serde(default)]
    pub client: ClientSection,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            HuddleError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content)
            .map_err(|e| HuddleError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config file location (`<config dir>/huddle/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("huddle").join("config.toml"))
    }

    /// Load the default config file if it exists, otherwise defaults
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("HUDDLE_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("HUDDLE_PORT") {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }
        if let Ok(grace) = std::env::var("HUDDLE_SESSION_GRACE_SECS") {
            if let Ok(grace) = grace.parse() {
                config.server.empty_session_grace_secs = grace;
            }
        }

        if let Ok(url) = std::env::var("HUDDLE_URL") {
            config.client.url = url;
        }
        if let Ok(timeout) = std::env::var("HUDDLE_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse() {
                config.client.timeout_ms = timeout;
            }
        }

        config
    }

    /// Merge with another config (other takes precedence where it differs
    /// from the defaults)
    pub fn merge(self, other: Self) -> Self {
        let server_defaults = ServerSection::default();
        let client_defaults = ClientSection::default();

        Self {
            server: ServerSection {
                host: pick(self.server.host, other.server.host, &server_defaults.host),
                port: pick(self.server.port, other.server.port, &server_defaults.port),
                empty_session_grace_secs: pick(
                    self.server.empty_session_grace_secs,
                    other.server.empty_session_grace_secs,
                    &server_defaults.empty_session_grace_secs,
                ),
                sweep_interval_secs: pick(
                    self.server.sweep_interval_secs,
                    other.server.sweep_interval_secs,
                    &server_defaults.sweep_interval_secs,
                ),
                outbound_queue: pick(
                    self.server.outbound_queue,
                    other.server.outbound_queue,
                    &server_defaults.outbound_queue,
                ),
                max_frame_bytes: pick(
                    self.server.max_frame_bytes,
                    other.server.max_frame_bytes,
                    &server_defaults.max_frame_bytes,
                ),
                verbose: self.server.verbose || other.server.verbose,
            },
            client: ClientSection {
                url: pick(self.client.url, other.client.url, &client_defaults.url),
                timeout_ms: pick(
                    self.client.timeout_ms,
                    other.client.timeout_ms,
                    &client_defaults.timeout_ms,
                ),
            },
        }
    }
}

fn pick<T: PartialEq>(base: T, over: T, default: &T) -> T {
    if over != *default {
        over
    } else {
        base
    }
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Seconds an empty session is kept before destruction (0 = immediately)
    pub empty_session_grace_secs: u64,

    /// Seconds between sweeps of empty sessions
    pub sweep_interval_secs: u64,

    /// Per-connection outbound queue capacity
    pub outbound_queue: usize,

    /// Maximum inbound frame size in bytes
    pub max_frame_bytes: usize,

    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            empty_session_grace_secs: 0,
            sweep_interval_secs: 30,
            outbound_queue: 1024,
            max_frame_bytes: 1024 * 1024, // 1 MB
            verbose: false,
        }
    }
}

impl ServerSection {
    /// Get the full listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `[client]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// Server WebSocket URL
    pub url: String,

    /// Command timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            timeout_ms: crate::protocol::DEFAULT_COMMAND_TIMEOUT_MS,
        }
    }
}
