//! Engine configuration
//!
//! Configuration is plain serde data, so it can be built in code or loaded from
//! YAML:
//!
//! ```rust
//! use ephys_link::LinkConfig;
//!
//! let config = LinkConfig::from_yaml_str(
//!     "application: Simple Plotter\nchannel_count: 16\nheartbeat_interval_ms: 1500\n",
//! )
//! .unwrap();
//! assert_eq!(config.channel_count, 16);
//! assert_eq!(config.data_endpoint, "tcp://localhost:5556");
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{LinkError, Result};

pub const DEFAULT_APPLICATION: &str = "OpenEphys Process";
pub const DEFAULT_DATA_ENDPOINT: &str = "tcp://localhost:5556";
pub const DEFAULT_COMMAND_ENDPOINT: &str = "tcp://localhost:5557";

/// Connection and timing settings for a [`Supervisor`](crate::Supervisor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Name reported to the controller with every command.
    pub application: String,
    /// Subscribe endpoint carrying continuous data and events.
    pub data_endpoint: String,
    /// Request/reply endpoint for commands and heartbeats.
    pub command_endpoint: String,
    /// Channels per continuous-data cycle; the last index closes a frame.
    pub channel_count: usize,
    pub heartbeat_interval_ms: u64,
    /// Silence on the command channel after which it is rebuilt.
    pub dead_connection_ms: u64,
    pub poll_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            application: DEFAULT_APPLICATION.to_string(),
            data_endpoint: DEFAULT_DATA_ENDPOINT.to_string(),
            command_endpoint: DEFAULT_COMMAND_ENDPOINT.to_string(),
            channel_count: 32,
            heartbeat_interval_ms: 2_000,
            dead_connection_ms: 10_000,
            poll_timeout_ms: 1,
        }
    }
}

impl LinkConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LinkConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| LinkError::config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| LinkError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 {
            return Err(LinkError::config("channel_count must be at least 1"));
        }
        if self.data_endpoint.trim().is_empty() || self.command_endpoint.trim().is_empty() {
            return Err(LinkError::config("endpoints must not be empty"));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(LinkError::config("heartbeat_interval_ms must be positive"));
        }
        if self.dead_connection_ms <= self.heartbeat_interval_ms {
            return Err(LinkError::config(format!(
                "dead_connection_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.dead_connection_ms, self.heartbeat_interval_ms
            )));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn dead_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.dead_connection_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    pub fn with_endpoints(mut self, data: impl Into<String>, command: impl Into<String>) -> Self {
        self.data_endpoint = data.into();
        self.command_endpoint = command.into();
        self
    }

    pub fn with_channel_count(mut self, channel_count: usize) -> Self {
        self.channel_count = channel_count;
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration, dead_connection: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self.dead_connection_ms = dead_connection.as_millis() as u64;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = timeout.as_millis() as u64;
        self
    }
}
