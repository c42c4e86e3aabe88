//! Stream URL construction.
//!
//! The chat server exposes one stream path per channel and one fixed path
//! for notifications:
//!
//! ```text
//! ws[s]://{host}/ws/chat/{channel_id}/
//! ws[s]://{host}/ws/notifications/
//! ```

use crate::domain::foundation::{ChannelId, ValidationError};

/// Where the chat server lives and whether to use TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    secure: bool,
}

impl Endpoint {
    /// Creates an endpoint. `host` may carry a port (`chat.example.com:8443`)
    /// but no scheme or path.
    pub fn new(host: impl Into<String>, secure: bool) -> Result<Self, ValidationError> {
        let host = host.into();
        let trimmed = host.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("host"));
        }
        if trimmed.contains("://") {
            return Err(ValidationError::invalid_format(
                "host",
                "must not include a scheme; use the secure flag instead",
            ));
        }
        if trimmed.contains('/') || trimmed.chars().any(char::is_whitespace) {
            return Err(ValidationError::invalid_format(
                "host",
                "must be a bare host[:port]",
            ));
        }
        Ok(Self {
            host: trimmed.to_string(),
            secure,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// `wss` when secure, `ws` otherwise.
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// URL of a chat channel's stream.
    pub fn chat_url(&self, channel: &ChannelId) -> String {
        format!("{}://{}/ws/chat/{}/", self.scheme(), self.host, channel)
    }

    /// URL of the notification stream.
    pub fn notifications_url(&self) -> String {
        format!("{}://{}/ws/notifications/", self.scheme(), self.host)
    }
}
