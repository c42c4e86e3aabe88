//! Chat server endpoint configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::realtime::Endpoint;

/// Where the chat server lives
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Host (and optional port) of the chat server, e.g. `chat.example.com`
    #[serde(default = "default_host")]
    pub host: String,

    /// Use `wss://` instead of `ws://`
    #[serde(default)]
    pub secure: bool,
}

impl EndpointConfig {
    /// Build the domain endpoint
    pub fn endpoint(&self) -> Result<Endpoint, ValidationError> {
        Endpoint::new(self.host.as_str(), self.secure).map_err(|_| ValidationError::InvalidHost)
    }

    /// Validate endpoint configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingRequired("ENDPOINT__HOST"));
        }
        self.endpoint().map(|_| ())
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            secure: false,
        }
    }
}

fn default_host() -> String {
    "localhost:8000".to_string()
}
