//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the connection manager to external systems:
//! - `transport` - WebSocket and mock stream transports

pub mod transport;

pub use transport::{MockLinkController, MockTransport, WebSocketTransport};
