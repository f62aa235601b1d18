//! Client configuration.

use std::time::Duration;

use crate::config::ClientSection;
use crate::protocol::DEFAULT_COMMAND_TIMEOUT_MS;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server WebSocket URL
    pub url: String,
    /// How long a command waits for its response
    pub command_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_section(&ClientSection::default())
    }
}

impl ClientConfig {
    /// Create for a server URL with the default timeout
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
        }
    }

    /// Build from the `[client]` section of a config file
    pub fn from_section(section: &ClientSection) -> Self {
        Self {
            url: section.url.clone(),
            command_timeout: Duration::from_millis(section.timeout_ms),
        }
    }

    /// Set the command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}
