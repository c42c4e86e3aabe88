//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `CHAT_REALTIME` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use chat_realtime::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Chat server at {}", config.endpoint.host);
//! ```

mod endpoint;
mod error;
mod logging;
mod reconnect;
mod transport;

pub use endpoint::EndpointConfig;
pub use error::{ConfigError, ValidationError};
pub use logging::LoggingConfig;
pub use reconnect::{BackoffStrategy, NotificationsConfig, ReconnectConfig};
pub use transport::TransportConfig;

use serde::Deserialize;

use crate::application::ManagerConfig;

/// Root application configuration
///
/// Every section has defaults, so an empty environment yields a client for
/// `ws://localhost:8000`. Load using [`AppConfig::load()`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Chat server location
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Chat channel reconnection policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Notification stream reconnection policy
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// WebSocket transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `CHAT_REALTIME` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `CHAT_REALTIME__ENDPOINT__HOST=chat.example.com` -> `endpoint.host`
    /// - `CHAT_REALTIME__RECONNECT__MAX_ATTEMPTS=8` -> `reconnect.max_attempts`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CHAT_REALTIME")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.endpoint.validate()?;
        self.reconnect.validate()?;
        self.notifications.validate()?;
        self.transport.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Settings for [`crate::application::RealtimeManager::start`]
    pub fn manager_config(&self) -> Result<ManagerConfig, ValidationError> {
        Ok(ManagerConfig::new(self.endpoint.endpoint()?)
            .with_chat_policy(self.reconnect.policy())
            .with_notification_policy(self.notifications.policy()))
    }
}
