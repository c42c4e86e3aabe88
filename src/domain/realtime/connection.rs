//! Connection lifecycle states and the status snapshot exposed to callers.
//!
//! ## Transitions
//!
//! ```text
//! Connecting --[transport opened]--> Open
//! Connecting --[transport closed]--> Closed
//! Open       --[transport closed]--> Closed
//! Closed     --[retry timer fired]--> Connecting
//! ```
//!
//! A channel whose retries are exhausted stays `Closed` for good; that is
//! recorded in [`ConnectionStatus::retries_exhausted`] rather than as a
//! separate state, so the state enum keeps the three states of the wire.

use std::fmt;
use std::time::Duration;

use crate::domain::foundation::{ChannelId, StateMachine};

/// Lifecycle state of one stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Stream open requested, not yet established.
    Connecting,

    /// Stream established; outbound frames are transmitted.
    Open,

    /// Stream gone. A retry may be pending.
    Closed,
}

impl ConnectionState {
    /// Only an open stream transmits. Sends in any other state are dropped.
    pub fn allows_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Open or on its way to open.
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

impl StateMachine for ConnectionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Connecting, Open) | (Connecting, Closed) | (Open, Closed) | (Closed, Connecting)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionState::*;
        match self {
            Connecting => vec![Open, Closed],
            Open => vec![Closed],
            Closed => vec![Connecting],
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Which registry slot a connection occupies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionKey {
    /// A chat channel stream.
    Channel(ChannelId),

    /// The account-wide notification stream.
    Notifications,
}

impl ConnectionKey {
    /// Returns the channel id for channel keys.
    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            ConnectionKey::Channel(id) => Some(id),
            ConnectionKey::Notifications => None,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKey::Channel(id) => write!(f, "channel:{}", id),
            ConnectionKey::Notifications => write!(f, "notifications"),
        }
    }
}

impl From<ChannelId> for ConnectionKey {
    fn from(id: ChannelId) -> Self {
        ConnectionKey::Channel(id)
    }
}

/// Point-in-time view of a connection, published on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,

    /// Reconnection attempts since the last successful open.
    pub reconnect_attempts: u32,

    /// Set when the reconnect policy refused another attempt. Only
    /// reachable for bounded policies (chat channels).
    pub retries_exhausted: bool,

    /// Delay of the pending retry, when one is scheduled.
    pub next_retry_in: Option<Duration>,
}

impl ConnectionStatus {
    /// Status of a freshly requested connection.
    pub fn connecting() -> Self {
        Self {
            state: ConnectionState::Connecting,
            reconnect_attempts: 0,
            retries_exhausted: false,
            next_retry_in: None,
        }
    }

    /// Closed with no retry left. The caller must open the channel again.
    pub fn is_terminal(&self) -> bool {
        self.state == ConnectionState::Closed && self.retries_exhausted
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::connecting()
    }
}
