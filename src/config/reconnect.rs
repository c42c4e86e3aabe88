//! Reconnection policy configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::realtime::{Backoff, ReconnectPolicy};

/// Delay growth for chat channel retries
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Linear,
    Exponential,
}

/// Chat channel reconnection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Base delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Attempts before a channel gives up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How the delay grows between attempts
    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Cap for exponential growth, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Policy for chat channels
    pub fn policy(&self) -> ReconnectPolicy {
        let backoff = match self.strategy {
            BackoffStrategy::Linear => Backoff::Linear {
                base: self.base_delay(),
            },
            BackoffStrategy::Exponential => Backoff::Exponential {
                base: self.base_delay(),
                max: self.max_delay(),
            },
        };
        ReconnectPolicy {
            backoff,
            max_attempts: Some(self.max_attempts),
        }
    }

    /// Validate reconnection settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.base_delay_ms == 0 {
            return Err(ValidationError::InvalidDelay("RECONNECT__BASE_DELAY_MS"));
        }
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidMaxAttempts);
        }
        if self.strategy == BackoffStrategy::Exponential && self.max_delay_ms < self.base_delay_ms {
            return Err(ValidationError::MaxDelayBelowBase);
        }
        Ok(())
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            strategy: BackoffStrategy::default(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Notification stream reconnection settings
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Fixed delay between attempts in milliseconds. Never gives up.
    #[serde(default = "default_base_delay_ms")]
    pub retry_delay_ms: u64,
}

impl NotificationsConfig {
    /// Policy for the notification stream
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            backoff: Backoff::Fixed(Duration::from_millis(self.retry_delay_ms)),
            max_attempts: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.retry_delay_ms == 0 {
            return Err(ValidationError::InvalidDelay("NOTIFICATIONS__RETRY_DELAY_MS"));
        }
        Ok(())
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    3_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_max_delay_ms() -> u64 {
    30_000
}
