//! Transport configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// WebSocket transport settings
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Opening handshake timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl TransportConfig {
    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Validate transport configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > 120 {
            return Err(ValidationError::InvalidConnectTimeout);
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}
