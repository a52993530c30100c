//! Timeout configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// External command timeout in seconds (builds, clones, package installs).
    pub command_seconds: u64,

    /// HTTP request timeout in seconds.
    pub http_seconds: u64,

    /// Health check timeout in seconds.
    pub health_seconds: u64,

    /// Database / cache reachability probe timeout in seconds.
    pub probe_seconds: u64,

    /// Pause between stop and start on restart, in seconds.
    pub restart_pause_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_seconds: 900,
            http_seconds: 30,
            health_seconds: 5,
            probe_seconds: 3,
            restart_pause_seconds: 2,
        }
    }
}

impl TimeoutConfig {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_seconds)
    }

    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http_seconds)
    }

    pub fn health(&self) -> Duration {
        Duration::from_secs(self.health_seconds)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_seconds)
    }

    pub fn restart_pause(&self) -> Duration {
        Duration::from_secs(self.restart_pause_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_config_default() {
        let config = TimeoutConfig::default();
        assert_eq!(config.command_seconds, 900);
        assert_eq!(config.http_seconds, 30);
        assert_eq!(config.health_seconds, 5);
        assert_eq!(config.restart_pause(), Duration::from_secs(2));
    }
}
