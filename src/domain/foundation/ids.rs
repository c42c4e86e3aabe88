//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// Identifier of a chat channel.
///
/// Opaque to this crate: the server decides the format (usually a UUID).
/// It is embedded as a single path segment of the channel's stream URL, so
/// it must be non-empty, must not be a dot segment, and must not contain URL
/// delimiters or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    /// Creates a ChannelId, returning error if empty or not path-safe.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::empty_field("channel_id"));
        }
        if let Some(c) = id
            .chars()
            .find(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace())
        {
            return Err(ValidationError::invalid_format(
                "channel_id",
                format!("character {:?} is not allowed in a path segment", c),
            ));
        }
        if id.chars().all(|c| c == '.') {
            return Err(ValidationError::invalid_format(
                "channel_id",
                "dot segments are not allowed",
            ));
        }
        Ok(Self(id))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}
